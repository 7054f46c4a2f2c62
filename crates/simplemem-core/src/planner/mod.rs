//! From a query, produce a retrieval plan: multi-view queries + depth
//! (spec §4.E).

use chrono::{NaiveDate, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::OnceLock;

use crate::memory::tokenize;
use crate::provider::{ChatMessage, ProviderError, ProviderGateway};
use crate::search::SymbolicPredicate;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Lookup,
    Aggregation,
    Temporal,
    Unknown,
}

/// The retrieval plan data structure (spec §4.E) — not executable code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub q_sem: String,
    #[serde(default)]
    pub q_lex: Vec<String>,
    #[serde(default)]
    pub q_sym: Option<SymbolicPredicate>,
    pub depth: usize,
}

fn iso_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap())
}

fn capitalized_word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b([A-Z][a-z]{1,})\b").unwrap())
}

/// Sentence-initial capitals and common query words that shouldn't be
/// treated as a proper-noun hit.
const CAPITALIZED_STOPWORDS: &[&str] = &["What", "When", "Where", "Who", "Why", "How", "Did", "Does", "Do", "Is", "Are", "Was", "Were", "The", "I"];

/// Lightweight date-pattern and proper-noun detection over the raw query
/// (spec §4.E): an ISO date becomes a day-wide `TimeRange`, capitalized
/// words become an `Or` over `PersonsContain`/`EntitiesContain` since we
/// can't tell at this stage which metadata column holds the name. Returns
/// `None` when neither signal fires, matching a pure-semantic plan.
fn infer_symbolic(query: &str) -> Option<SymbolicPredicate> {
    let mut clauses = Vec::new();

    if let Some(caps) = iso_date_pattern().captures(query) {
        let (y, m, d) = (caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?);
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            let from = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
            let to = Utc.from_utc_datetime(&date.and_hms_opt(23, 59, 59)?);
            clauses.push(SymbolicPredicate::TimeRange { from, to });
        }
    }

    let mut names: Vec<String> = Vec::new();
    for caps in capitalized_word_pattern().captures_iter(query) {
        let word = caps[1].to_string();
        if CAPITALIZED_STOPWORDS.contains(&word.as_str()) || names.contains(&word) {
            continue;
        }
        names.push(word);
    }
    for name in names {
        clauses.push(SymbolicPredicate::Or {
            clauses: vec![
                SymbolicPredicate::PersonsContain { person: name.clone() },
                SymbolicPredicate::EntitiesContain { entity: name },
            ],
        });
    }

    match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(SymbolicPredicate::And { clauses }),
    }
}

fn intent_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "intent": { "type": "string", "enum": ["lookup", "aggregation", "temporal", "unknown"] },
            "paraphrase": { "type": "string" }
        },
        "required": ["intent", "paraphrase"]
    })
}

pub struct Planner {
    pub top_k: usize,
}

impl Planner {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    /// Classify intent with a single lightweight gateway call, then build
    /// the plan (spec §4.E). `q_sym`/`q_lex` are omitted when inference
    /// yields nothing useful.
    pub async fn plan(&self, query: &str, gateway: &dyn ProviderGateway) -> Result<Plan, PlannerError> {
        let system = "Classify the user's query intent as lookup (a specific fact), aggregation \
                       (summarize/count across many facts), or temporal (about a time window), and \
                       produce a paraphrase optimized for embedding-based retrieval.";
        let response = gateway.chat(system, &[ChatMessage::user(query.to_string())], Some(&intent_schema())).await?;

        let (intent, paraphrase) = match response.structured {
            Some(v) => {
                let intent = match v["intent"].as_str() {
                    Some("lookup") => Intent::Lookup,
                    Some("aggregation") => Intent::Aggregation,
                    Some("temporal") => Intent::Temporal,
                    _ => Intent::Unknown,
                };
                let paraphrase = v["paraphrase"].as_str().unwrap_or(query).to_string();
                (intent, paraphrase)
            }
            None => (Intent::Unknown, query.to_string()),
        };

        let depth = match intent {
            Intent::Lookup => 4,
            Intent::Aggregation => 20,
            Intent::Temporal => 12,
            Intent::Unknown => self.top_k,
        };

        let q_lex = tokenize(query);
        let q_sym = infer_symbolic(query);

        Ok(Plan { q_sem: paraphrase, q_lex, q_sym, depth })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{FakeGateway, ScriptedReply};

    #[test]
    fn infer_symbolic_detects_iso_date() {
        let sym = infer_symbolic("what did we decide on 2025-11-16").unwrap();
        match sym {
            SymbolicPredicate::TimeRange { from, to } => {
                assert_eq!(from.to_rfc3339(), "2025-11-16T00:00:00+00:00");
                assert_eq!(to.to_rfc3339(), "2025-11-16T23:59:59+00:00");
            }
            other => panic!("expected TimeRange, got {other:?}"),
        }
    }

    #[test]
    fn infer_symbolic_detects_proper_noun() {
        let sym = infer_symbolic("what did Alice say about Starbucks").unwrap();
        match sym {
            SymbolicPredicate::And { clauses } => assert_eq!(clauses.len(), 2),
            other => panic!("expected And over two proper nouns, got {other:?}"),
        }
    }

    #[test]
    fn infer_symbolic_ignores_sentence_initial_stopwords() {
        assert!(infer_symbolic("What time is the meeting").is_none());
    }

    #[tokio::test]
    async fn lookup_intent_yields_small_depth() {
        let gateway = FakeGateway::new(4);
        gateway.push_reply(ScriptedReply::Structured(json!({"intent": "lookup", "paraphrase": "meeting time and place"})));
        let plan = Planner::new(8).plan("when and where do we meet", &gateway).await.unwrap();
        assert_eq!(plan.depth, 4);
        assert_eq!(plan.q_sem, "meeting time and place");
    }

    #[tokio::test]
    async fn aggregation_intent_yields_large_depth() {
        let gateway = FakeGateway::new(4);
        gateway.push_reply(ScriptedReply::Structured(json!({"intent": "aggregation", "paraphrase": "all decisions made"})));
        let plan = Planner::new(8).plan("what decisions did we make", &gateway).await.unwrap();
        assert_eq!(plan.depth, 20);
    }

    #[tokio::test]
    async fn unknown_intent_falls_back_to_top_k() {
        let gateway = FakeGateway::new(4);
        gateway.push_reply(ScriptedReply::Structured(json!({"intent": "unknown", "paraphrase": "query"})));
        let plan = Planner::new(8).plan("query", &gateway).await.unwrap();
        assert_eq!(plan.depth, 8);
    }
}
