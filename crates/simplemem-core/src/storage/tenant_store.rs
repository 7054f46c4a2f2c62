//! One tenant's triple index: units table + vector index + FTS5 lexical
//! index + symbolic filter over metadata columns (spec §4.B).
//!
//! Grounded in the teacher's `Storage` struct: writer and reader
//! connections behind separate `Mutex`es so every method takes `&self`,
//! making `TenantStore` `Send + Sync` and lettable behind a bare `Arc`
//! rather than `Arc<Mutex<TenantStore>>`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;

use super::{migrations, StoreError};
use crate::memory::{MemoryUnit, UnitKind, UnitMetadata};
use crate::search::{vector::VectorIndexConfig, SymbolicPredicate, VectorIndex};

pub struct TenantStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    vector_index: Mutex<VectorIndex>,
    dimension: usize,
    vector_index_path: PathBuf,
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    Ok(())
}

impl TenantStore {
    /// Open (creating if absent) the shard at `dir/<user_id>/store.db`.
    /// `dimension` is write-once: the first open for a tenant records it
    /// in `tenant_meta`; subsequent opens must match (spec I3).
    pub fn open(dir: &Path, user_id: &str, dimension: usize) -> Result<Self, StoreError> {
        let tenant_dir = dir.join(user_id);
        std::fs::create_dir_all(&tenant_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tenant_dir, std::fs::Permissions::from_mode(0o700))?;
        }
        let db_path = tenant_dir.join("store.db");

        let writer = Connection::open(&db_path)?;
        configure_connection(&writer)?;
        migrations::apply(&writer, migrations::TENANT_MIGRATIONS)?;

        let existing_dim: Option<usize> = writer
            .query_row("SELECT embedding_dim FROM tenant_meta LIMIT 1", [], |row| {
                row.get::<_, i64>(0)
            })
            .ok()
            .map(|d| d as usize);

        let effective_dim = match existing_dim {
            Some(d) if d != dimension => {
                return Err(StoreError::DimensionMismatch { expected: d, actual: dimension })
            }
            Some(d) => d,
            None => {
                writer.execute("INSERT INTO tenant_meta (embedding_dim) VALUES (?1)", [dimension as i64])?;
                dimension
            }
        };

        let reader = Connection::open(&db_path)?;
        configure_connection(&reader)?;

        let vector_index_path = tenant_dir.join("vectors.usearch");
        let vector_index = VectorIndex::load(VectorIndexConfig::new(effective_dim), &vector_index_path)
            .map_err(|e| StoreError::VectorIndex(e.to_string()))?;

        let store = TenantStore {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            vector_index: Mutex::new(vector_index),
            dimension: effective_dim,
            vector_index_path,
        };
        store.rebuild_vector_index_if_empty()?;
        Ok(store)
    }

    /// If the persisted index file was missing/stale, repopulate it from
    /// `node_embeddings` so a fresh store.db + missing sidecar still works.
    fn rebuild_vector_index_if_empty(&self) -> Result<(), StoreError> {
        let needs_rebuild = {
            let idx = self.vector_index.lock().unwrap();
            idx.is_empty()
        };
        if !needs_rebuild {
            return Ok(());
        }
        let writer = self.writer.lock().unwrap();
        let mut stmt = writer.prepare("SELECT unit_id, embedding FROM node_embeddings")?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((id, blob))
        })?;
        let mut idx = self.vector_index.lock().unwrap();
        for row in rows {
            let (id, blob) = row?;
            let embedding = bytes_to_vec(&blob);
            idx.add(id, &embedding).map_err(|e| StoreError::VectorIndex(e.to_string()))?;
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert an atomic unit. Touches `units`, `node_embeddings`, and the
    /// FTS5 index atomically via one SQLite transaction — this is the
    /// "all three updated or none" guarantee from spec §4.B, provided by
    /// SQLite's own WAL commit rather than a hand-rolled recovery log.
    pub fn insert(&self, draft: crate::memory::DraftUnit) -> Result<MemoryUnit, StoreError> {
        if draft.embedding.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: draft.embedding.len(),
            });
        }
        let now = Utc::now();
        let mut writer = self.writer.lock().unwrap();
        let tx = writer.transaction()?;

        let tokens_json = serde_json::to_string(&draft.tokens).unwrap();
        let entities_json = serde_json::to_string(&draft.metadata.entities).unwrap();
        let persons_json = serde_json::to_string(&draft.metadata.persons).unwrap();
        let source_events_json = serde_json::to_string(&draft.metadata.source_event_ids).unwrap();

        tx.execute(
            "INSERT INTO units (text, tokens, timestamp_utc, entities, persons, source_session_id,
                source_event_ids, kind, children, created_at, updated_at, score_decay, tombstoned)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'atomic', '[]', ?8, ?8, 1.0, 0)",
            rusqlite::params![
                draft.text,
                tokens_json,
                draft.metadata.timestamp_utc.to_rfc3339(),
                entities_json,
                persons_json,
                draft.metadata.source_session_id,
                source_events_json,
                now.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        let embedding_bytes = vec_to_bytes(&draft.embedding);
        tx.execute(
            "INSERT INTO node_embeddings (unit_id, embedding) VALUES (?1, ?2)",
            rusqlite::params![id, embedding_bytes],
        )?;

        tx.commit()?;

        {
            let mut idx = self.vector_index.lock().unwrap();
            idx.add(id, &draft.embedding).map_err(|e| StoreError::VectorIndex(e.to_string()))?;
            idx.save(&self.vector_index_path).map_err(|e| StoreError::VectorIndex(e.to_string()))?;
        }

        Ok(MemoryUnit {
            id,
            text: draft.text,
            embedding: draft.embedding,
            tokens: draft.tokens,
            metadata: draft.metadata,
            kind: UnitKind::Atomic,
            children: vec![],
            created_at: now,
            updated_at: now,
            score_decay: 1.0,
            tombstoned: false,
            synthesized_at: None,
        })
    }

    /// Insert a synthesized unit subsuming `children`, tombstoning them in
    /// the same transaction (spec §4.D step 3 `merge_*`).
    pub fn insert_synthesized(
        &self,
        text: &str,
        embedding: &[f32],
        tokens: &[String],
        metadata: &UnitMetadata,
        children: &[i64],
    ) -> Result<MemoryUnit, StoreError> {
        if embedding.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        let now = Utc::now();
        let mut writer = self.writer.lock().unwrap();
        let tx = writer.transaction()?;

        let tokens_json = serde_json::to_string(tokens).unwrap();
        let entities_json = serde_json::to_string(&metadata.entities).unwrap();
        let persons_json = serde_json::to_string(&metadata.persons).unwrap();
        let source_events_json = serde_json::to_string(&metadata.source_event_ids).unwrap();
        let children_json = serde_json::to_string(children).unwrap();

        tx.execute(
            "INSERT INTO units (text, tokens, timestamp_utc, entities, persons, source_session_id,
                source_event_ids, kind, children, created_at, updated_at, score_decay, tombstoned, synthesized_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'synthesized', ?8, ?9, ?9, 1.0, 0, ?9)",
            rusqlite::params![
                text,
                tokens_json,
                metadata.timestamp_utc.to_rfc3339(),
                entities_json,
                persons_json,
                metadata.source_session_id,
                source_events_json,
                children_json,
                now.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        let embedding_bytes = vec_to_bytes(embedding);
        tx.execute(
            "INSERT INTO node_embeddings (unit_id, embedding) VALUES (?1, ?2)",
            rusqlite::params![id, embedding_bytes],
        )?;

        for child in children {
            tx.execute("UPDATE units SET tombstoned = 1, updated_at = ?1 WHERE id = ?2", rusqlite::params![now.to_rfc3339(), child])?;
        }

        tx.commit()?;

        {
            let mut idx = self.vector_index.lock().unwrap();
            idx.add(id, embedding).map_err(|e| StoreError::VectorIndex(e.to_string()))?;
            idx.save(&self.vector_index_path).map_err(|e| StoreError::VectorIndex(e.to_string()))?;
        }

        Ok(MemoryUnit {
            id,
            text: text.to_string(),
            embedding: embedding.to_vec(),
            tokens: tokens.to_vec(),
            metadata: metadata.clone(),
            kind: UnitKind::Synthesized,
            children: children.to_vec(),
            created_at: now,
            updated_at: now,
            score_decay: 1.0,
            tombstoned: false,
            synthesized_at: Some(now),
        })
    }

    /// Update `score_decay` (consolidator decay phase).
    pub fn update_score_decay(&self, id: i64, score_decay: f64) -> Result<(), StoreError> {
        let writer = self.writer.lock().unwrap();
        let n = writer.execute(
            "UPDATE units SET score_decay = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![score_decay, Utc::now().to_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(StoreError::UnitNotFound(id));
        }
        Ok(())
    }

    /// Mark recall (score_decay bump) without changing any other field.
    pub fn record_recall(&self, id: i64, bump: f64) -> Result<(), StoreError> {
        let writer = self.writer.lock().unwrap();
        writer.execute(
            "UPDATE units SET score_decay = score_decay + ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![bump, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn tombstone(&self, id: i64) -> Result<(), StoreError> {
        let writer = self.writer.lock().unwrap();
        let n = writer.execute(
            "UPDATE units SET tombstoned = 1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![Utc::now().to_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(StoreError::UnitNotFound(id));
        }
        Ok(())
    }

    /// Hard-delete tombstoned units past the grace period with no
    /// synthesized unit still referencing them as children (spec §4.J GC
    /// sweep, distinct from the prune step that only tombstones).
    pub fn gc_tombstones(&self, grace_hours: i64) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::hours(grace_hours);
        let writer = self.writer.lock().unwrap();

        let mut stmt = writer.prepare(
            "SELECT id FROM units WHERE tombstoned = 1 AND updated_at < ?1",
        )?;
        let candidates: Vec<i64> = stmt
            .query_map([cutoff.to_rfc3339()], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        let mut all_children = String::new();
        {
            let mut stmt2 = writer.prepare("SELECT children FROM units WHERE tombstoned = 0")?;
            let rows = stmt2.query_map([], |row| row.get::<_, String>(0))?;
            for row in rows {
                all_children.push_str(&row?);
            }
        }

        let mut deleted = 0;
        for id in candidates {
            let marker = format!("{id}");
            if all_children.contains(&marker) {
                // conservative: a textual substring check can false-positive,
                // fall back to an exact JSON-array parse before deleting.
                let still_referenced = self.is_referenced_as_child(&writer, id)?;
                if still_referenced {
                    continue;
                }
            }
            writer.execute("DELETE FROM node_embeddings WHERE unit_id = ?1", [id])?;
            writer.execute("DELETE FROM units WHERE id = ?1", [id])?;
            self.vector_index
                .lock()
                .unwrap()
                .remove(id)
                .map_err(|e| StoreError::VectorIndex(e.to_string()))?;
            deleted += 1;
        }
        if deleted > 0 {
            self.vector_index
                .lock()
                .unwrap()
                .save(&self.vector_index_path)
                .map_err(|e| StoreError::VectorIndex(e.to_string()))?;
        }
        Ok(deleted)
    }

    fn is_referenced_as_child(&self, conn: &Connection, id: i64) -> Result<bool, StoreError> {
        let mut stmt = conn.prepare("SELECT children FROM units WHERE tombstoned = 0")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for row in rows {
            let children: Vec<i64> = serde_json::from_str(&row?).unwrap_or_default();
            if children.contains(&id) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn get(&self, ids: &[i64]) -> Result<Vec<MemoryUnit>, StoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let reader = self.reader.lock().unwrap();
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT u.id, u.text, u.tokens, u.timestamp_utc, u.entities, u.persons,
                    u.source_session_id, u.source_event_ids, u.kind, u.children,
                    u.created_at, u.updated_at, u.score_decay, u.tombstoned, u.synthesized_at,
                    e.embedding
             FROM units u LEFT JOIN node_embeddings e ON e.unit_id = u.id
             WHERE u.id IN ({placeholders})"
        );
        let mut stmt = reader.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params.as_slice(), row_to_unit)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// Oversample the HNSW index, then drop tombstoned ids, so a merge or
    /// delete doesn't leave superseded units ranked at full weight until
    /// the next `gc_tombstones` sweep (matches `lexical_search`'s
    /// `WHERE tombstoned = 0`).
    pub fn vector_search(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>, StoreError> {
        let oversample = k.saturating_mul(4).max(k + 16);
        let candidates = {
            let idx = self.vector_index.lock().unwrap();
            idx.search(query, oversample).map_err(|e| StoreError::VectorIndex(e.to_string()))?
        };
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let reader = self.reader.lock().unwrap();
        let ids: Vec<i64> = candidates.iter().map(|(id, _)| *id).collect();
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT id FROM units WHERE tombstoned = 0 AND id IN ({placeholders})");
        let mut stmt = reader.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params.as_slice(), |row| row.get::<_, i64>(0))?;
        let active: std::collections::HashSet<i64> = rows.collect::<rusqlite::Result<_>>()?;

        Ok(candidates.into_iter().filter(|(id, _)| active.contains(id)).take(k).collect())
    }

    pub fn lexical_search(&self, query_terms: &[String], k: usize) -> Result<Vec<(i64, f32)>, StoreError> {
        let reader = self.reader.lock().unwrap();
        crate::search::lexical::search(&reader, query_terms, k)
    }

    pub fn symbolic_filter(&self, predicate: &SymbolicPredicate, k: usize) -> Result<Vec<i64>, StoreError> {
        let reader = self.reader.lock().unwrap();
        let mut stmt = reader.prepare(
            "SELECT id, timestamp_utc, entities, persons FROM units WHERE tombstoned = 0",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let ts: String = row.get(1)?;
            let entities: String = row.get(2)?;
            let persons: String = row.get(3)?;
            Ok((id, ts, entities, persons))
        })?;

        let mut matched = Vec::new();
        for row in rows {
            let (id, ts, entities, persons) = row?;
            let metadata = UnitMetadata {
                timestamp_utc: chrono::DateTime::parse_from_rfc3339(&ts)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                entities: serde_json::from_str(&entities).unwrap_or_default(),
                persons: serde_json::from_str(&persons).unwrap_or_default(),
                source_session_id: None,
                source_event_ids: vec![],
            };
            if predicate.matches(&metadata) {
                matched.push(id);
                if matched.len() >= k {
                    break;
                }
            }
        }
        Ok(matched)
    }

    /// Every non-tombstoned unit's id and embedding, for consolidator
    /// sampling and full rebuilds. Not paginated — tenant shards are
    /// expected to stay in the tens-of-thousands range (spec §2 budget).
    pub fn all_active_ids(&self) -> Result<Vec<i64>, StoreError> {
        let reader = self.reader.lock().unwrap();
        let mut stmt = reader.prepare("SELECT id FROM units WHERE tombstoned = 0")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }
}

fn row_to_unit(row: &rusqlite::Row) -> rusqlite::Result<MemoryUnit> {
    let id: i64 = row.get(0)?;
    let text: String = row.get(1)?;
    let tokens_json: String = row.get(2)?;
    let ts: String = row.get(3)?;
    let entities_json: String = row.get(4)?;
    let persons_json: String = row.get(5)?;
    let source_session_id: Option<String> = row.get(6)?;
    let source_events_json: String = row.get(7)?;
    let kind_str: String = row.get(8)?;
    let children_json: String = row.get(9)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;
    let score_decay: f64 = row.get(12)?;
    let tombstoned: i64 = row.get(13)?;
    let synthesized_at: Option<String> = row.get(14)?;
    let embedding_blob: Option<Vec<u8>> = row.get(15)?;

    Ok(MemoryUnit {
        id,
        text,
        embedding: embedding_blob.map(|b| bytes_to_vec(&b)).unwrap_or_default(),
        tokens: serde_json::from_str(&tokens_json).unwrap_or_default(),
        metadata: UnitMetadata {
            timestamp_utc: chrono::DateTime::parse_from_rfc3339(&ts)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            entities: serde_json::from_str(&entities_json).unwrap_or_default(),
            persons: serde_json::from_str(&persons_json).unwrap_or_default(),
            source_session_id,
            source_event_ids: serde_json::from_str(&source_events_json).unwrap_or_default(),
        },
        kind: UnitKind::parse_name(&kind_str).unwrap_or(UnitKind::Atomic),
        children: serde_json::from_str(&children_json).unwrap_or_default(),
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        score_decay,
        tombstoned: tombstoned != 0,
        synthesized_at: synthesized_at
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
    })
}

fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_vec(b: &[u8]) -> Vec<f32> {
    b.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::DraftUnit;
    use tempfile::TempDir;

    fn draft(text: &str, embedding: Vec<f32>) -> DraftUnit {
        DraftUnit {
            text: text.to_string(),
            embedding,
            tokens: crate::memory::tokenize(text),
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
    fn insert_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = TenantStore::open(dir.path(), "u1", 4).unwrap();
        let unit = store.insert(draft("hello world", vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        let fetched = store.get(&[unit.id]).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].text, "hello world");
        assert_eq!(fetched[0].embedding, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn dimension_is_enforced() {
        let dir = TempDir::new().unwrap();
        let store = TenantStore::open(dir.path(), "u1", 4).unwrap();
        let err = store.insert(draft("x", vec![1.0, 0.0])).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[test]
    fn reopen_rejects_dimension_change() {
        let dir = TempDir::new().unwrap();
        {
            let _store = TenantStore::open(dir.path(), "u1", 4).unwrap();
        }
        let err = TenantStore::open(dir.path(), "u1", 8).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[test]
    fn tombstone_then_gc_removes_unreferenced_unit() {
        let dir = TempDir::new().unwrap();
        let store = TenantStore::open(dir.path(), "u1", 4).unwrap();
        let unit = store.insert(draft("ephemeral", vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        store.tombstone(unit.id).unwrap();
        // not yet past grace period
        assert_eq!(store.gc_tombstones(72).unwrap(), 0);
        let deleted = store.gc_tombstones(-1).unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get(&[unit.id]).unwrap().is_empty());
    }

    #[test]
    fn vector_search_excludes_tombstoned_units() {
        let dir = TempDir::new().unwrap();
        let store = TenantStore::open(dir.path(), "u1", 4).unwrap();
        let kept = store.insert(draft("alpha fact", vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        let superseded = store.insert(draft("alpha fact, superseded", vec![0.99, 0.01, 0.0, 0.0])).unwrap();
        store.tombstone(superseded.id).unwrap();

        let results = store.vector_search(&[1.0, 0.0, 0.0, 0.0], 10).unwrap();
        let ids: Vec<i64> = results.iter().map(|(id, _)| *id).collect();
        assert!(ids.contains(&kept.id));
        assert!(!ids.contains(&superseded.id));
    }

    #[test]
    fn synthesized_unit_tombstones_children_atomically() {
        let dir = TempDir::new().unwrap();
        let store = TenantStore::open(dir.path(), "u1", 4).unwrap();
        let a = store.insert(draft("user wants coffee", vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        let b = store.insert(draft("user prefers oat milk", vec![0.0, 1.0, 0.0, 0.0])).unwrap();
        let metadata = UnitMetadata {
            timestamp_utc: Utc::now(),
            entities: vec![],
            persons: vec![],
            source_session_id: None,
            source_event_ids: vec![],
        };
        let merged = store
            .insert_synthesized(
                "user wants coffee with oat milk",
                &[0.5, 0.5, 0.0, 0.0],
                &[],
                &metadata,
                &[a.id, b.id],
            )
            .unwrap();
        assert_eq!(merged.kind, crate::memory::UnitKind::Synthesized);
        let children = store.get(&[a.id, b.id]).unwrap();
        assert!(children.iter().all(|u| u.tombstoned));
    }
}
