//! The shared cross-tenant metadata database: `users`, `sessions`,
//! `events`, `observations`, `consolidation_history` (spec §3, §6).
//! Every row is keyed by `user_id`; no query here ever spans tenants
//! without an explicit `user_id` predicate (spec §9 tenant isolation).

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{migrations, StoreError};
use crate::session::{Observation, Session, SessionStatus};

pub struct MetadataStore {
    conn: Mutex<rusqlite::Connection>,
}

impl MetadataStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        migrations::apply(&conn, migrations::METADATA_MIGRATIONS)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    // ---- users -------------------------------------------------------

    pub fn create_user(&self, user_id: &str, encrypted_key: &str, embedding_dim: usize) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (user_id, provider_key_nonce_ct, embedding_dim, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, encrypted_key, embedding_dim as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn user_encrypted_key(&self, user_id: &str) -> Result<String, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT provider_key_nonce_ct FROM users WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::UserNotFound(user_id.to_string()))
    }

    pub fn user_embedding_dim(&self, user_id: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT embedding_dim FROM users WHERE user_id = ?1", [user_id], |row| {
            row.get::<_, i64>(0)
        })
        .optional()?
        .map(|d| d as usize)
        .ok_or_else(|| StoreError::UserNotFound(user_id.to_string()))
    }

    pub fn user_exists(&self, user_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users WHERE user_id = ?1", [user_id], |row| row.get(0))?;
        Ok(count > 0)
    }

    // ---- sessions ------------------------------------------------------

    pub fn create_session(
        &self,
        memory_session_id: &str,
        user_id: &str,
        content_session_id: &str,
        project: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions (memory_session_id, user_id, content_session_id, project, started_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'active')",
            params![memory_session_id, user_id, content_session_id, project, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_session(&self, user_id: &str, memory_session_id: &str) -> Result<Session, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT memory_session_id, content_session_id, project, started_at, ended_at, status, summary
             FROM sessions WHERE user_id = ?1 AND memory_session_id = ?2",
            params![user_id, memory_session_id],
            row_to_session,
        )
        .optional()?
        .ok_or_else(|| StoreError::SessionNotFound(memory_session_id.to_string()))
    }

    pub fn set_session_status(
        &self,
        user_id: &str,
        memory_session_id: &str,
        status: SessionStatus,
        summary: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let ended_at = if status == SessionStatus::Ended { Some(Utc::now().to_rfc3339()) } else { None };
        let n = conn.execute(
            "UPDATE sessions SET status = ?1, summary = COALESCE(?2, summary), ended_at = COALESCE(?3, ended_at)
             WHERE user_id = ?4 AND memory_session_id = ?5",
            params![status.as_str(), summary, ended_at, user_id, memory_session_id],
        )?;
        if n == 0 {
            return Err(StoreError::SessionNotFound(memory_session_id.to_string()));
        }
        Ok(())
    }

    // ---- events ----------------------------------------------------------

    pub fn append_event(
        &self,
        event_id: &str,
        memory_session_id: &str,
        user_id: &str,
        kind: &str,
        redacted_payload: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let seq: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM events WHERE memory_session_id = ?1",
                [memory_session_id],
                |row| row.get(0),
            )
            .unwrap_or(1);
        conn.execute(
            "INSERT INTO events (event_id, memory_session_id, user_id, kind, payload, timestamp, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![event_id, memory_session_id, user_id, kind, redacted_payload, timestamp.to_rfc3339(), seq],
        )?;
        Ok(seq)
    }

    pub fn events_for_session(&self, user_id: &str, memory_session_id: &str) -> Result<Vec<StoredEvent>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT event_id, kind, payload, timestamp FROM events
             WHERE user_id = ?1 AND memory_session_id = ?2 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![user_id, memory_session_id], |row| {
            Ok(StoredEvent {
                event_id: row.get(0)?,
                kind: row.get(1)?,
                payload: row.get(2)?,
                timestamp: row.get::<_, String>(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    // ---- observations ------------------------------------------------

    pub fn save_observation(&self, user_id: &str, memory_session_id: &str, obs: &Observation) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO observations (observation_id, memory_session_id, user_id, category, text, evidence_event_ids)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                obs.observation_id,
                memory_session_id,
                user_id,
                obs.category.as_str(),
                obs.text,
                serde_json::to_string(&obs.evidence_event_ids).unwrap(),
            ],
        )?;
        Ok(())
    }

    // ---- consolidation history ------------------------------------------

    pub fn last_consolidation(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row: Option<String> = conn
            .query_row("SELECT last_run_at FROM consolidation_history WHERE user_id = ?1", [user_id], |row| row.get(0))
            .optional()?;
        Ok(row.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)))
    }

    pub fn record_consolidation(&self, user_id: &str, decayed: usize, merged: usize, pruned: usize) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO consolidation_history (user_id, last_run_at, decayed, merged, pruned)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET last_run_at = excluded.last_run_at,
                decayed = excluded.decayed, merged = excluded.merged, pruned = excluded.pruned",
            params![user_id, Utc::now().to_rfc3339(), decayed as i64, merged as i64, pruned as i64],
        )?;
        Ok(())
    }

    /// Most recent session summary for a tenant, used to seed the context
    /// injector's summary block at the next session's start (spec §4.H).
    pub fn latest_session_summary(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT summary FROM sessions WHERE user_id = ?1 AND summary IS NOT NULL
             ORDER BY started_at DESC LIMIT 1",
            [user_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn all_user_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT user_id FROM users")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }
}

pub struct StoredEvent {
    pub event_id: String,
    pub kind: String,
    pub payload: String,
    pub timestamp: String,
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    let status_str: String = row.get(5)?;
    Ok(Session {
        memory_session_id: row.get(0)?,
        content_session_id: row.get(1)?,
        project: row.get(2)?,
        started_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(3)?)
            .unwrap()
            .with_timezone(&Utc),
        ended_at: row
            .get::<_, Option<String>>(4)?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
        status: SessionStatus::parse_name(&status_str).unwrap_or(SessionStatus::Active),
        summary: row.get(6)?,
    })
}
