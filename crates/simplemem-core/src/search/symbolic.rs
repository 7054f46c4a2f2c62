//! The symbolic metadata predicate algebra (spec §4.B, §4.E), a small
//! closed set serializable to JSON so it can cross the MCP wire as a tool
//! argument and be unit-tested without a gateway call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::UnitMetadata;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SymbolicPredicate {
    TimeRange { from: DateTime<Utc>, to: DateTime<Utc> },
    PersonsContain { person: String },
    EntitiesContain { entity: String },
    And { clauses: Vec<SymbolicPredicate> },
    Or { clauses: Vec<SymbolicPredicate> },
}

impl SymbolicPredicate {
    pub fn matches(&self, metadata: &UnitMetadata) -> bool {
        match self {
            SymbolicPredicate::TimeRange { from, to } => {
                metadata.timestamp_utc >= *from && metadata.timestamp_utc <= *to
            }
            SymbolicPredicate::PersonsContain { person } => {
                metadata.persons.iter().any(|p| p.eq_ignore_ascii_case(person))
            }
            SymbolicPredicate::EntitiesContain { entity } => {
                metadata.entities.iter().any(|e| e.eq_ignore_ascii_case(entity))
            }
            SymbolicPredicate::And { clauses } => clauses.iter().all(|c| c.matches(metadata)),
            SymbolicPredicate::Or { clauses } => clauses.iter().any(|c| c.matches(metadata)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(persons: &[&str], entities: &[&str], ts: &str) -> UnitMetadata {
        UnitMetadata {
            timestamp_utc: DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc),
            entities: entities.iter().map(|s| s.to_string()).collect(),
            persons: persons.iter().map(|s| s.to_string()).collect(),
            source_session_id: None,
            source_event_ids: vec![],
        }
    }

    #[test]
    fn persons_contain_is_case_insensitive() {
        let m = meta(&["Alice", "Bob"], &[], "2025-11-15T14:30:00Z");
        let p = SymbolicPredicate::PersonsContain { person: "alice".to_string() };
        assert!(p.matches(&m));
    }

    #[test]
    fn and_requires_all_clauses() {
        let m = meta(&["Alice"], &["Starbucks"], "2025-11-15T14:30:00Z");
        let p = SymbolicPredicate::And {
            clauses: vec![
                SymbolicPredicate::PersonsContain { person: "Alice".to_string() },
                SymbolicPredicate::EntitiesContain { entity: "Starbucks".to_string() },
            ],
        };
        assert!(p.matches(&m));

        let p2 = SymbolicPredicate::And {
            clauses: vec![
                SymbolicPredicate::PersonsContain { person: "Alice".to_string() },
                SymbolicPredicate::EntitiesContain { entity: "Nowhere".to_string() },
            ],
        };
        assert!(!p2.matches(&m));
    }

    #[test]
    fn time_range_is_inclusive() {
        let m = meta(&[], &[], "2025-11-15T14:30:00Z");
        let from = DateTime::parse_from_rfc3339("2025-11-15T00:00:00Z").unwrap().with_timezone(&Utc);
        let to = DateTime::parse_from_rfc3339("2025-11-15T23:59:59Z").unwrap().with_timezone(&Utc);
        assert!(SymbolicPredicate::TimeRange { from, to }.matches(&m));
    }
}
