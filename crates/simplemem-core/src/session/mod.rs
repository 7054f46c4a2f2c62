//! Session lifecycle, event recording with redaction, and observation
//! extraction (spec §4.H).

mod observation;
mod redaction;

pub use observation::extract_observations;
pub use redaction::Redactor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provider::ProviderGateway;
use crate::storage::MetadataStore;

/// `active → stopped → ended`, spec §4.H.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Stopped,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Ended => "ended",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "stopped" => Some(SessionStatus::Stopped),
            "ended" => Some(SessionStatus::Ended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub memory_session_id: String,
    pub content_session_id: String,
    pub project: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationCategory {
    Decision,
    Discovery,
    Learning,
    Other,
}

impl ObservationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationCategory::Decision => "decision",
            ObservationCategory::Discovery => "discovery",
            ObservationCategory::Learning => "learning",
            ObservationCategory::Other => "other",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s {
            "decision" => ObservationCategory::Decision,
            "discovery" => ObservationCategory::Discovery,
            "learning" => ObservationCategory::Learning,
            _ => ObservationCategory::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub observation_id: String,
    pub category: ObservationCategory,
    pub text: String,
    pub evidence_event_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReport {
    pub entries_stored: usize,
    pub observations: Vec<Observation>,
    pub summary: String,
}

/// Event kinds (spec §3 "Event").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Message,
    ToolUse,
    FileChange,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::ToolUse => "tool_use",
            EventKind::FileChange => "file_change",
        }
    }
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is not active")]
    NotActive,

    #[error("session already ended")]
    AlreadyEnded,

    #[error(transparent)]
    Store(#[from] crate::storage::StoreError),
}

/// Orchestrates the session state machine, redaction, and observation
/// extraction. Holds no tenant data itself — every call is routed through
/// `MetadataStore`, which is the single owner of persistent state (spec §3
/// "Ownership").
pub struct SessionManager {
    metadata: std::sync::Arc<MetadataStore>,
    redactor: Redactor,
}

impl SessionManager {
    pub fn new(metadata: std::sync::Arc<MetadataStore>, redaction_patterns: &[String]) -> Self {
        Self { metadata, redactor: Redactor::new(redaction_patterns) }
    }

    pub fn start(
        &self,
        user_id: &str,
        content_session_id: &str,
        project: Option<&str>,
    ) -> Result<String, SessionError> {
        let memory_session_id = Uuid::new_v4().to_string();
        self.metadata.create_session(&memory_session_id, user_id, content_session_id, project)?;
        Ok(memory_session_id)
    }

    pub fn record_event(
        &self,
        user_id: &str,
        memory_session_id: &str,
        kind: EventKind,
        payload: &str,
    ) -> Result<String, SessionError> {
        let session = self.metadata.get_session(user_id, memory_session_id)?;
        if session.status != SessionStatus::Active {
            return Err(SessionError::NotActive);
        }
        let redacted = self.redactor.redact(payload);
        let event_id = Uuid::new_v4().to_string();
        self.metadata.append_event(&event_id, memory_session_id, user_id, kind.as_str(), &redacted, Utc::now())?;
        Ok(event_id)
    }

    /// Freeze events, extract observations (degrading gracefully on
    /// gateway failure per spec §7), compute a summary, mark `stopped`.
    pub async fn stop(
        &self,
        user_id: &str,
        memory_session_id: &str,
        gateway: &dyn ProviderGateway,
    ) -> Result<StopReport, SessionError> {
        let session = self.metadata.get_session(user_id, memory_session_id)?;
        if session.status == SessionStatus::Ended {
            return Err(SessionError::AlreadyEnded);
        }
        if session.status == SessionStatus::Stopped {
            // idempotent: return the already-computed report's summary only
            return Ok(StopReport {
                entries_stored: 0,
                observations: vec![],
                summary: session.summary.unwrap_or_default(),
            });
        }

        let events = self.metadata.events_for_session(user_id, memory_session_id)?;
        let entries_stored = events.len();

        let observations = match extract_observations(&events, gateway).await {
            Ok(obs) => obs,
            Err(e) => {
                tracing::warn!(error = %e, memory_session_id, "observation extraction failed, degrading gracefully");
                vec![]
            }
        };

        for obs in &observations {
            self.metadata.save_observation(user_id, memory_session_id, obs)?;
        }

        let summary = if observations.is_empty() {
            format!("Session with {entries_stored} event(s); no observations extracted.")
        } else {
            format!(
                "Session with {entries_stored} event(s); {} observation(s): {}",
                observations.len(),
                observations.iter().map(|o| o.text.as_str()).collect::<Vec<_>>().join("; ")
            )
        };

        self.metadata.set_session_status(user_id, memory_session_id, SessionStatus::Stopped, Some(&summary))?;

        Ok(StopReport { entries_stored, observations, summary })
    }

    pub fn end(&self, user_id: &str, memory_session_id: &str) -> Result<(), SessionError> {
        let session = self.metadata.get_session(user_id, memory_session_id)?;
        if session.status == SessionStatus::Ended {
            return Err(SessionError::AlreadyEnded);
        }
        self.metadata.set_session_status(user_id, memory_session_id, SessionStatus::Ended, None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::FakeGateway;
    use tempfile::TempDir;

    fn manager() -> (SessionManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let metadata = std::sync::Arc::new(MetadataStore::open(&dir.path().join("meta.db")).unwrap());
        metadata.create_user("u1", "ct", 4).unwrap();
        (SessionManager::new(metadata, &[]), dir)
    }

    #[tokio::test]
    async fn record_after_stop_fails_with_not_active() {
        let (mgr, _dir) = manager();
        let sid = mgr.start("u1", "content-1", None).unwrap();
        let gateway = FakeGateway::new(4);
        mgr.stop("u1", &sid, &gateway).await.unwrap();
        let err = mgr.record_event("u1", &sid, EventKind::Message, "hi").unwrap_err();
        assert!(matches!(err, SessionError::NotActive));
    }

    #[tokio::test]
    async fn end_after_end_fails() {
        let (mgr, _dir) = manager();
        let sid = mgr.start("u1", "content-1", None).unwrap();
        mgr.end("u1", &sid).unwrap();
        let err = mgr.end("u1", &sid).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyEnded));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (mgr, _dir) = manager();
        let sid = mgr.start("u1", "content-1", None).unwrap();
        let gateway = FakeGateway::new(4);
        let r1 = mgr.stop("u1", &sid, &gateway).await.unwrap();
        let r2 = mgr.stop("u1", &sid, &gateway).await.unwrap();
        assert_eq!(r1.summary, r2.summary);
    }

    #[tokio::test]
    async fn redaction_is_applied_on_record() {
        let (mgr, _dir) = manager();
        let sid = mgr.start("u1", "content-1", None).unwrap();
        mgr.record_event("u1", &sid, EventKind::Message, "my key is sk-abcdefghijklmnopqrstuvwxyz").unwrap();
        let events = mgr.metadata.events_for_session("u1", &sid).unwrap();
        assert!(!events[0].payload.contains("sk-abcdefghijklmnopqrstuvwxyz"));
    }
}
