//! Versioned migration ledgers for the metadata database and for each
//! per-tenant shard, applied idempotently on open (SPEC_FULL §2
//! "Idempotent migrations"), grounded in the teacher's
//! `storage::migrations` table-of-statements pattern.

/// One forward-only schema step.
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub up: &'static str,
}

/// Shared metadata database: `users`, `sessions`, `events`, `observations`,
/// `consolidation_history` (spec §3, §6 "Persisted state layout").
pub const METADATA_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "initial metadata schema",
    up: r#"
        CREATE TABLE users (
            user_id             TEXT PRIMARY KEY,
            provider_key_nonce_ct TEXT NOT NULL,
            embedding_dim       INTEGER NOT NULL,
            created_at          TEXT NOT NULL
        );

        CREATE TABLE sessions (
            memory_session_id   TEXT PRIMARY KEY,
            user_id             TEXT NOT NULL REFERENCES users(user_id),
            content_session_id  TEXT NOT NULL,
            project             TEXT,
            started_at          TEXT NOT NULL,
            ended_at            TEXT,
            status              TEXT NOT NULL,
            summary             TEXT
        );
        CREATE INDEX idx_sessions_user ON sessions(user_id);

        CREATE TABLE events (
            event_id            TEXT PRIMARY KEY,
            memory_session_id   TEXT NOT NULL REFERENCES sessions(memory_session_id),
            user_id             TEXT NOT NULL REFERENCES users(user_id),
            kind                TEXT NOT NULL,
            payload             TEXT NOT NULL,
            timestamp           TEXT NOT NULL,
            seq                 INTEGER NOT NULL
        );
        CREATE INDEX idx_events_session ON events(memory_session_id, seq);
        CREATE INDEX idx_events_user ON events(user_id);

        CREATE TABLE observations (
            observation_id       TEXT PRIMARY KEY,
            memory_session_id    TEXT NOT NULL REFERENCES sessions(memory_session_id),
            user_id              TEXT NOT NULL REFERENCES users(user_id),
            category             TEXT NOT NULL,
            text                 TEXT NOT NULL,
            evidence_event_ids   TEXT NOT NULL
        );
        CREATE INDEX idx_observations_session ON observations(memory_session_id);

        CREATE TABLE consolidation_history (
            user_id              TEXT PRIMARY KEY REFERENCES users(user_id),
            last_run_at          TEXT NOT NULL,
            decayed              INTEGER NOT NULL DEFAULT 0,
            merged               INTEGER NOT NULL DEFAULT 0,
            pruned               INTEGER NOT NULL DEFAULT 0
        );
    "#,
}];

/// One tenant shard: `units`, `node_embeddings`, FTS5 lexical index kept in
/// sync by triggers — directly grounded in the teacher's v1 migration
/// (`knowledge_nodes` + `knowledge_fts`), generalized to "memory unit."
pub const TENANT_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "initial tenant shard schema",
    up: r#"
        CREATE TABLE tenant_meta (
            embedding_dim   INTEGER NOT NULL
        );

        CREATE TABLE units (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            text                TEXT NOT NULL,
            tokens              TEXT NOT NULL,
            timestamp_utc       TEXT NOT NULL,
            entities            TEXT NOT NULL,
            persons             TEXT NOT NULL,
            source_session_id   TEXT,
            source_event_ids    TEXT NOT NULL,
            kind                TEXT NOT NULL,
            children             TEXT NOT NULL DEFAULT '[]',
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL,
            score_decay         REAL NOT NULL DEFAULT 1.0,
            tombstoned          INTEGER NOT NULL DEFAULT 0,
            synthesized_at      TEXT
        );
        CREATE INDEX idx_units_timestamp ON units(timestamp_utc);
        CREATE INDEX idx_units_tombstoned ON units(tombstoned);
        CREATE INDEX idx_units_session ON units(source_session_id);

        CREATE TABLE node_embeddings (
            unit_id     INTEGER PRIMARY KEY REFERENCES units(id),
            embedding   BLOB NOT NULL
        );

        CREATE VIRTUAL TABLE units_fts USING fts5(
            text,
            content='units',
            content_rowid='id'
        );

        CREATE TRIGGER units_ai AFTER INSERT ON units BEGIN
            INSERT INTO units_fts(rowid, text) VALUES (new.id, new.text);
        END;

        CREATE TRIGGER units_ad AFTER DELETE ON units BEGIN
            INSERT INTO units_fts(units_fts, rowid, text) VALUES ('delete', old.id, old.text);
        END;

        CREATE TRIGGER units_au AFTER UPDATE ON units BEGIN
            INSERT INTO units_fts(units_fts, rowid, text) VALUES ('delete', old.id, old.text);
            INSERT INTO units_fts(rowid, text) VALUES (new.id, new.text);
        END;
    "#,
}];

/// Apply every migration with `version > current` inside a transaction
/// per step, bumping `schema_version` as it goes. Safe to call on every
/// open — a freshly-applied schema and a re-opened one converge to the
/// same `schema_version` row.
pub fn apply(conn: &rusqlite::Connection, migrations: &[Migration]) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);
         INSERT INTO schema_version (version)
            SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM schema_version);",
    )?;

    let current: i64 =
        conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))?;

    for migration in migrations.iter().filter(|m| m.version > current) {
        tracing::info!(version = migration.version, desc = migration.description, "applying migration");
        conn.execute_batch(migration.up)?;
        conn.execute("UPDATE schema_version SET version = ?1", [migration.version])?;
    }
    Ok(())
}
