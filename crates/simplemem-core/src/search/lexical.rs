//! Sparse lexical search over the tenant shard's FTS5 table (spec §4.B
//! "Lexical index"), BM25-ranked. No full-text search beyond BM25-style
//! scoring (spec §1 Non-goals).

use rusqlite::Connection;

use crate::storage::StoreError;

/// `lexical_search(query_terms, k)` contract (spec §4.B): monotonic in
/// relevance, highest first. SQLite's `bm25()` returns a more-negative
/// score for a better match, so we negate it to keep "higher is better"
/// uniform with the vector view.
pub fn search(
    conn: &Connection,
    query_terms: &[String],
    k: usize,
) -> Result<Vec<(i64, f32)>, StoreError> {
    if query_terms.is_empty() {
        return Ok(vec![]);
    }
    let fts_query = query_terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ");

    let mut stmt = conn.prepare(
        "SELECT u.id, bm25(units_fts) AS rank
         FROM units_fts
         JOIN units u ON u.id = units_fts.rowid
         WHERE units_fts MATCH ?1 AND u.tombstoned = 0
         ORDER BY rank
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(rusqlite::params![fts_query, k as i64], |row| {
        let id: i64 = row.get(0)?;
        let bm25: f64 = row.get(1)?;
        Ok((id, -(bm25 as f32)))
    })?;

    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{apply, TENANT_MIGRATIONS};

    fn fresh_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn, TENANT_MIGRATIONS).unwrap();
        conn
    }

    fn insert_unit(conn: &Connection, text: &str) -> i64 {
        conn.execute(
            "INSERT INTO units (text, tokens, timestamp_utc, entities, persons, source_event_ids, kind, created_at, updated_at)
             VALUES (?1, '[]', '2025-01-01T00:00:00Z', '[]', '[]', '[]', 'atomic', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [text],
        ).unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn matches_indexed_text() {
        let conn = fresh_conn();
        let id = insert_unit(&conn, "Alice and Bob will meet at Starbucks");
        let results = search(&conn, &["starbucks".to_string()], 10).unwrap();
        assert_eq!(results[0].0, id);
    }

    #[test]
    fn empty_query_returns_empty() {
        let conn = fresh_conn();
        insert_unit(&conn, "irrelevant text");
        assert!(search(&conn, &[], 10).unwrap().is_empty());
    }

    #[test]
    fn tombstoned_units_are_excluded() {
        let conn = fresh_conn();
        let id = insert_unit(&conn, "Meeting notes about the launch date");
        conn.execute("UPDATE units SET tombstoned = 1 WHERE id = ?1", [id]).unwrap();
        let results = search(&conn, &["launch".to_string()], 10).unwrap();
        assert!(results.is_empty());
    }
}
