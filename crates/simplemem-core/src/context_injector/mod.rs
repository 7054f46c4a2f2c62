//! Budgeted assembly of prior-session context at session start (spec §4.I).

use crate::memory::MemoryUnit;
use crate::planner::{Planner, PlannerError};
use crate::provider::ProviderGateway;
use crate::retriever::{Retriever, RetrieverError};
use crate::storage::TenantStore;
use std::time::Duration;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ContextInjectorError {
    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Retriever(#[from] RetrieverError),
}

#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub summary_block: String,
    pub units: Vec<MemoryUnit>,
    pub total_tokens: usize,
}

/// Whitespace+punctuation approximate tokenizer, used consistently between
/// the greedy fill loop and the final budget check. Not meant to match any
/// particular model's real tokenizer.
pub fn approx_token_count(text: &str) -> usize {
    text.split(|c: char| c.is_whitespace() || ",.;:!?()\"'".contains(c)).filter(|w| !w.is_empty()).count()
}

pub struct ContextInjector {
    planner: Planner,
    retriever: Retriever,
}

impl ContextInjector {
    pub fn new(top_k: usize) -> Self {
        Self { planner: Planner::new(top_k), retriever: Retriever::default() }
    }

    /// Greedily fill a token budget with retrieved units in descending rank
    /// order, stopping the moment a candidate would overflow the budget
    /// rather than truncating it (spec §4.I "never return partial
    /// sentences"). The session summary always occupies the head of the
    /// bundle, truncated on a word boundary if it alone exceeds the budget.
    pub async fn build(
        &self,
        store: &TenantStore,
        session_summary: &str,
        user_prompt: &str,
        query_embedding: &[f32],
        budget_tokens: usize,
        deadline: Duration,
        gateway: &dyn ProviderGateway,
    ) -> Result<ContextBundle, ContextInjectorError> {
        let summary_block = truncate_to_budget(session_summary, budget_tokens);
        let mut total_tokens = approx_token_count(&summary_block);

        let plan = self.planner.plan(user_prompt, gateway).await?;
        let ranked = self
            .retriever
            .retrieve(store, &plan, query_embedding, deadline, query_embedding.len())
            .await;
        let ranked = match ranked {
            Ok(units) => units,
            Err(RetrieverError::DeadlineExceeded) => vec![],
            Err(e) => return Err(e.into()),
        };

        let mut units = Vec::new();
        for unit in ranked {
            let cost = approx_token_count(&unit.text);
            if total_tokens + cost > budget_tokens {
                continue;
            }
            total_tokens += cost;
            units.push(unit);
        }

        Ok(ContextBundle { summary_block, units, total_tokens })
    }
}

/// Truncates on a whitespace boundary so the result never ends mid-word or
/// mid-sentence fragment, while counting cost with `approx_token_count` —
/// the same tokenizer the budget is ultimately checked against — so a
/// punctuation-dense word can't let the result sneak past the budget.
fn truncate_to_budget(text: &str, budget_tokens: usize) -> String {
    if approx_token_count(text) <= budget_tokens {
        return text.to_string();
    }
    let mut kept = Vec::new();
    let mut tokens_so_far = 0;
    for word in text.split_whitespace() {
        let cost = approx_token_count(word);
        if tokens_so_far + cost > budget_tokens {
            break;
        }
        tokens_so_far += cost;
        kept.push(word);
    }
    kept.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{tokenize, DraftUnit, UnitMetadata};
    use crate::provider::testing::{FakeGateway, ScriptedReply};
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn draft(text: &str, embedding: Vec<f32>) -> DraftUnit {
        DraftUnit {
            text: text.to_string(),
            embedding,
            tokens: tokenize(text),
            metadata: UnitMetadata {
                timestamp_utc: Utc::now(),
                entities: vec![],
                persons: vec![],
                source_session_id: None,
                source_event_ids: vec![],
            },
        }
    }

    #[test]
    fn truncate_never_splits_a_word() {
        let out = truncate_to_budget("one two three four five", 3);
        assert_eq!(out, "one two three");
    }

    #[test]
    fn truncate_respects_approx_token_count_on_punctuation_dense_words() {
        // Whitespace-only splitting would see this as 3 "words"; the real
        // tokenizer used by approx_token_count sees 6 tokens.
        let out = truncate_to_budget("a,b,c d,e,f g,h,i", 3);
        assert!(approx_token_count(&out) <= 3);
    }

    #[tokio::test]
    async fn greedy_fill_skips_units_that_would_overflow() {
        let dir = TempDir::new().unwrap();
        let store = TenantStore::open(dir.path(), "u1", 4).unwrap();
        store.insert(draft("alpha fact about coffee", vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        store.insert(draft("beta fact about tea and a much longer elaboration that costs many tokens", vec![0.9, 0.1, 0.0, 0.0])).unwrap();

        let gateway = FakeGateway::new(4);
        gateway.push_reply(ScriptedReply::Structured(json!({"intent": "lookup", "paraphrase": "coffee"})));

        let injector = ContextInjector::new(8);
        let bundle = injector
            .build(&store, "prior session discussed drinks", "coffee", &[1.0, 0.0, 0.0, 0.0], 6, Duration::from_secs(1), &gateway)
            .await
            .unwrap();
        assert!(bundle.total_tokens <= 6);
        assert!(bundle.summary_block.starts_with("prior"));
    }
}
