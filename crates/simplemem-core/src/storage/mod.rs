//! Per-tenant triple index plus the shared cross-session metadata store
//! (spec §3, §4.B), grounded in the teacher's `storage::sqlite` /
//! `storage::migrations` pair.

mod metadata;
mod migrations;
mod registry;
mod tenant_store;

pub use metadata::{MetadataStore, StoredEvent};
pub use migrations::{apply, Migration, METADATA_MIGRATIONS, TENANT_MIGRATIONS};
pub use registry::TenantRegistry;
pub use tenant_store::TenantStore;

use crate::search::SymbolicPredicate;

/// Storage-layer failures (spec §7 `StoreError`).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("unit not found: {0}")]
    UnitNotFound(i64),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("cyclic merge: unit {0} would become its own descendant")]
    CyclicMerge(i64),

    #[error("vector index error: {0}")]
    VectorIndex(String),
}

/// Pagination/limit argument shared by the three search primitives.
pub type Limit = usize;

/// A scored hit from either the dense or the lexical view (spec §4.B).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredHit {
    pub id: i64,
    pub score: f32,
}

/// Re-exported here so callers of `TenantStore::symbolic_filter` don't need
/// to reach into `crate::search` directly.
pub type Predicate = SymbolicPredicate;
