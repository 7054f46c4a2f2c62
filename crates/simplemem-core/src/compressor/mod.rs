//! Turn a windowed dialogue into atomic memory units (spec §4.C).

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::memory::{tokenize, DialogueTurn, DraftUnit, UnitMetadata};
use crate::provider::{ChatMessage, ProviderError, ProviderGateway};

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CompressorError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Pronoun and relative-time blocklists used to validate atomicization
/// output (Testable Property #1). A violating statement is dropped, not
/// the whole window.
const PRONOUN_BLOCKLIST: &[&str] = &["he", "she", "they", "it", "him", "her", "them", "his", "hers", "their"];
const RELATIVE_TIME_BLOCKLIST: &[&str] =
    &["yesterday", "tomorrow", "today", "next week", "last week", "next month", "last month", "tonight", "soon"];

fn violates_atomicity(text: &str) -> bool {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
    if words.iter().any(|w| PRONOUN_BLOCKLIST.contains(w)) {
        return true;
    }
    RELATIVE_TIME_BLOCKLIST.iter().any(|phrase| lower.contains(phrase))
}

fn density_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": { "dense": { "type": "boolean" }, "reason": { "type": "string" } },
        "required": ["dense", "reason"]
    })
}

fn atomicization_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "statements": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "text": { "type": "string" },
                        "timestamp_utc": { "type": "string" },
                        "entities": { "type": "array", "items": { "type": "string" } },
                        "persons": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["text", "timestamp_utc"]
                }
            }
        },
        "required": ["statements"]
    })
}

pub struct Compressor;

impl Compressor {
    /// Density gate → atomicization → in-process indexing (spec §4.C
    /// steps 1-3). Step 4 "Handoff" is the caller's responsibility
    /// (typically `insert_with_synthesis`, spec §4.D).
    pub async fn compress(
        window: &[DialogueTurn],
        anchor: DateTime<Utc>,
        source_session_id: Option<&str>,
        source_event_ids: &[String],
        gateway: &dyn ProviderGateway,
    ) -> Result<Vec<DraftUnit>, CompressorError> {
        if window.is_empty() {
            return Ok(vec![]);
        }

        let transcript = window
            .iter()
            .map(|t| format!("[{}] {}: {}", t.timestamp_utc.to_rfc3339(), t.speaker, t.text))
            .collect::<Vec<_>>()
            .join("\n");

        let density_system = "Judge whether this dialogue window contains durable, worth-remembering \
                               information versus small talk or noise.";
        let density = gateway
            .chat(density_system, &[ChatMessage::user(transcript.clone())], Some(&density_schema()))
            .await?;
        let is_dense = density.structured.as_ref().and_then(|v| v["dense"].as_bool()).unwrap_or(false);
        if !is_dense {
            return Ok(vec![]);
        }

        let atomic_system = format!(
            "The current anchor time is {}. Resolve every coreference to a named entity and every \
             relative time phrase to an absolute UTC timestamp. Produce a list of independently \
             meaningful, self-contained statements.",
            anchor.to_rfc3339()
        );
        let atomicized = gateway
            .chat(&atomic_system, &[ChatMessage::user(transcript)], Some(&atomicization_schema()))
            .await?;

        let Some(structured) = atomicized.structured else { return Ok(vec![]) };
        let Some(statements) = structured["statements"].as_array() else { return Ok(vec![]) };

        let mut texts = Vec::new();
        let mut parsed = Vec::new();
        for stmt in statements {
            let Some(text) = stmt["text"].as_str() else { continue };
            if violates_atomicity(text) {
                tracing::warn!(text, "dropping non-atomic statement from compressor output");
                continue;
            }
            let timestamp_utc = stmt["timestamp_utc"]
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or(anchor);
            let entities: Vec<String> = stmt["entities"]
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            let persons: Vec<String> = stmt["persons"]
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            texts.push(text.to_string());
            parsed.push((text.to_string(), timestamp_utc, entities, persons));
        }

        if parsed.is_empty() {
            return Ok(vec![]);
        }

        let embeddings = gateway.embed(&texts).await?;

        Ok(parsed
            .into_iter()
            .zip(embeddings)
            .map(|((text, timestamp_utc, entities, persons), embedding)| DraftUnit {
                tokens: tokenize(&text),
                metadata: UnitMetadata {
                    timestamp_utc,
                    entities,
                    persons,
                    source_session_id: source_session_id.map(str::to_string),
                    source_event_ids: source_event_ids.to_vec(),
                },
                text,
                embedding,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{FakeGateway, ScriptedReply};

    fn turn(speaker: &str, text: &str, ts: &str) -> DialogueTurn {
        DialogueTurn {
            speaker: speaker.to_string(),
            text: text.to_string(),
            timestamp_utc: DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc),
        }
    }

    #[tokio::test]
    async fn below_density_threshold_returns_empty() {
        let gateway = FakeGateway::new(4);
        gateway.push_reply(ScriptedReply::Structured(json!({"dense": false, "reason": "small talk"})));
        let window = vec![turn("Alice", "hey", "2025-11-15T14:30:00Z")];
        let units = Compressor::compress(&window, Utc::now(), None, &[], &gateway).await.unwrap();
        assert!(units.is_empty());
    }

    #[tokio::test]
    async fn relative_time_phrase_is_dropped_not_whole_window() {
        let gateway = FakeGateway::new(4);
        gateway.push_reply(ScriptedReply::Structured(json!({"dense": true, "reason": "plans"})));
        gateway.push_reply(ScriptedReply::Structured(json!({
            "statements": [
                {"text": "We meet tomorrow", "timestamp_utc": "2025-11-16T14:00:00Z"},
                {"text": "Alice and Bob will meet at Starbucks on 2025-11-16", "timestamp_utc": "2025-11-16T14:00:00Z", "persons": ["Alice", "Bob"], "entities": ["Starbucks"]}
            ]
        })));
        let window = vec![turn("Alice", "Bob, let's meet tomorrow", "2025-11-15T14:30:00Z")];
        let units = Compressor::compress(&window, Utc::now(), None, &[], &gateway).await.unwrap();
        assert_eq!(units.len(), 1);
        assert!(units[0].text.contains("Starbucks"));
    }

    #[test]
    fn violates_atomicity_catches_pronouns_and_relative_time() {
        assert!(violates_atomicity("He said they would go tomorrow"));
        assert!(!violates_atomicity("Alice said Bob would go on 2025-11-16"));
    }
}
