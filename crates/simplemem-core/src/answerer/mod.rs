//! Compose a grounded answer from retrieved units and the original query
//! (spec §4.G).

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::memory::MemoryUnit;
use crate::provider::{ChatMessage, ProviderError, ProviderGateway};

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum AnswererError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub answer_text: String,
    pub cited_unit_ids: Vec<i64>,
}

const NO_INFORMATION_TEXT: &str = "No information available.";

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "answer_text": { "type": "string" },
            "cited_unit_ids": { "type": "array", "items": { "type": "integer" } }
        },
        "required": ["answer_text", "cited_unit_ids"]
    })
}

pub struct Answerer;

impl Answerer {
    /// Empty retrieval set short-circuits before any gateway call,
    /// structurally guaranteeing "never fabricated" rather than relying on
    /// the prompt alone (spec §4.G).
    pub async fn answer(
        query: &str,
        units: &[MemoryUnit],
        gateway: &dyn ProviderGateway,
    ) -> Result<AnswerResult, AnswererError> {
        if units.is_empty() {
            return Ok(AnswerResult { answer_text: NO_INFORMATION_TEXT.to_string(), cited_unit_ids: vec![] });
        }

        let catalog = units
            .iter()
            .map(|u| format!("[id={}] {}", u.id, u.text))
            .collect::<Vec<_>>()
            .join("\n");
        let system = format!(
            "Answer the question using only the following units. Cite only their ids; never cite an id \
             not listed here.\n\n{catalog}"
        );

        let response = gateway.chat(&system, &[ChatMessage::user(query.to_string())], Some(&schema())).await?;

        let Some(structured) = response.structured else {
            return Ok(AnswerResult { answer_text: response.text, cited_unit_ids: vec![] });
        };

        let answer_text = structured["answer_text"].as_str().unwrap_or("").to_string();
        let valid_ids: std::collections::HashSet<i64> = units.iter().map(|u| u.id).collect();
        // Never trust the model's citation list verbatim: filter to ids
        // that were actually in the retrieved set.
        let cited_unit_ids = structured["cited_unit_ids"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_i64()).filter(|id| valid_ids.contains(id)).collect())
            .unwrap_or_default();

        Ok(AnswerResult { answer_text, cited_unit_ids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{UnitKind, UnitMetadata};
    use crate::provider::testing::{FakeGateway, ScriptedReply};
    use chrono::Utc;

    fn unit(id: i64, text: &str) -> MemoryUnit {
        MemoryUnit {
            id,
            text: text.to_string(),
            embedding: vec![],
            tokens: vec![],
            metadata: UnitMetadata { timestamp_utc: Utc::now(), entities: vec![], persons: vec![], source_session_id: None, source_event_ids: vec![] },
            kind: UnitKind::Atomic,
            children: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            score_decay: 1.0,
            tombstoned: false,
            synthesized_at: None,
        }
    }

    #[tokio::test]
    async fn empty_units_short_circuits_without_gateway_call() {
        let gateway = FakeGateway::new(4);
        let result = Answerer::answer("anything", &[], &gateway).await.unwrap();
        assert_eq!(result.answer_text, NO_INFORMATION_TEXT);
        assert!(result.cited_unit_ids.is_empty());
    }

    #[tokio::test]
    async fn citations_outside_retrieved_set_are_filtered() {
        let gateway = FakeGateway::new(4);
        gateway.push_reply(ScriptedReply::Structured(json!({
            "answer_text": "They meet at Starbucks.",
            "cited_unit_ids": [1, 999]
        })));
        let units = vec![unit(1, "Alice and Bob meet at Starbucks")];
        let result = Answerer::answer("where do they meet", &units, &gateway).await.unwrap();
        assert_eq!(result.cited_unit_ids, vec![1]);
    }
}
