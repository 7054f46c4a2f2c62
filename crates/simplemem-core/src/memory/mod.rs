//! The memory unit data model (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Atomic vs synthesized, per spec §3/GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Atomic,
    Synthesized,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Atomic => "atomic",
            UnitKind::Synthesized => "synthesized",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "atomic" => Some(UnitKind::Atomic),
            "synthesized" => Some(UnitKind::Synthesized),
            _ => None,
        }
    }
}

/// `metadata` attached to a unit, per spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitMetadata {
    pub timestamp_utc: DateTime<Utc>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub persons: Vec<String>,
    #[serde(default)]
    pub source_session_id: Option<String>,
    #[serde(default)]
    pub source_event_ids: Vec<String>,
}

impl UnitMetadata {
    /// Union of two metadata blocks' entities/persons, earliest timestamp.
    /// Used by the synthesizer when merging children into an abstraction.
    pub fn merge(a: &UnitMetadata, b: &UnitMetadata) -> UnitMetadata {
        let mut entities = a.entities.clone();
        for e in &b.entities {
            if !entities.contains(e) {
                entities.push(e.clone());
            }
        }
        let mut persons = a.persons.clone();
        for p in &b.persons {
            if !persons.contains(p) {
                persons.push(p.clone());
            }
        }
        let mut source_event_ids = a.source_event_ids.clone();
        source_event_ids.extend(b.source_event_ids.iter().cloned());
        UnitMetadata {
            timestamp_utc: a.timestamp_utc.min(b.timestamp_utc),
            entities,
            persons,
            source_session_id: a.source_session_id.clone().or_else(|| b.source_session_id.clone()),
            source_event_ids,
        }
    }
}

/// The atomic fact, spec §3 "Memory unit".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUnit {
    pub id: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    pub tokens: Vec<String>,
    pub metadata: UnitMetadata,
    pub kind: UnitKind,
    #[serde(default)]
    pub children: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub score_decay: f64,
    #[serde(default)]
    pub tombstoned: bool,
    #[serde(default)]
    pub synthesized_at: Option<DateTime<Utc>>,
}

/// A unit not yet assigned an id, produced by the compressor before insertion.
#[derive(Debug, Clone)]
pub struct DraftUnit {
    pub text: String,
    pub embedding: Vec<f32>,
    pub tokens: Vec<String>,
    pub metadata: UnitMetadata,
}

/// A single dialogue turn fed to the compressor (spec §4.C input).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DialogueTurn {
    pub speaker: String,
    pub text: String,
    pub timestamp_utc: DateTime<Utc>,
}

/// Lowercase, stopword-filtered tokenization shared by the compressor and
/// the lexical search query path. No stemming (BM25-only per spec §4.C).
pub fn tokenize(text: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "a", "an", "the", "and", "or", "but", "is", "are", "was", "were", "be", "been", "being",
        "to", "of", "in", "on", "at", "for", "with", "by", "from", "as", "it", "this", "that",
        "i", "you", "he", "she", "we", "they", "it's", "im",
    ];
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_kind_roundtrip() {
        for k in [UnitKind::Atomic, UnitKind::Synthesized] {
            assert_eq!(UnitKind::parse_name(k.as_str()), Some(k));
        }
        assert_eq!(UnitKind::parse_name("bogus"), None);
    }

    #[test]
    fn tokenize_drops_stopwords_and_lowercases() {
        let toks = tokenize("The Quick Brown Fox is at the Starbucks");
        assert!(toks.contains(&"quick".to_string()));
        assert!(toks.contains(&"starbucks".to_string()));
        assert!(!toks.contains(&"the".to_string()));
        assert!(!toks.contains(&"is".to_string()));
    }

    #[test]
    fn metadata_merge_takes_earliest_timestamp_and_unions() {
        let t0 = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let t1 = DateTime::parse_from_rfc3339("2025-01-02T00:00:00Z").unwrap().with_timezone(&Utc);
        let a = UnitMetadata {
            timestamp_utc: t1,
            entities: vec!["Coffee".into()],
            persons: vec!["Alice".into()],
            source_session_id: None,
            source_event_ids: vec!["e1".into()],
        };
        let b = UnitMetadata {
            timestamp_utc: t0,
            entities: vec!["Oat Milk".into()],
            persons: vec!["Alice".into(), "Bob".into()],
            source_session_id: Some("s1".into()),
            source_event_ids: vec!["e2".into()],
        };
        let merged = UnitMetadata::merge(&a, &b);
        assert_eq!(merged.timestamp_utc, t0);
        assert_eq!(merged.persons, vec!["Alice".to_string(), "Bob".to_string()]);
        assert_eq!(merged.entities.len(), 2);
        assert_eq!(merged.source_session_id, Some("s1".to_string()));
        assert_eq!(merged.source_event_ids, vec!["e1".to_string(), "e2".to_string()]);
    }
}
