//! Test fixtures shared across end-to-end scenarios: an isolated
//! multi-tenant environment (metadata store + tenant registry + auth)
//! wired to a `FakeGateway`, the same deterministic stand-in the core
//! crate's own unit tests use.

use std::sync::Arc;

use chrono::Utc;
use simplemem_core::auth::{AuthService, TenantContext};
use simplemem_core::memory::{tokenize, DialogueTurn, UnitMetadata};
use simplemem_core::provider::testing::FakeGateway;
use simplemem_core::storage::{MetadataStore, TenantRegistry, TenantStore};
use tempfile::TempDir;

pub const EMBEDDING_DIM: usize = 8;

/// A registered tenant plus everything needed to drive the engine against
/// it without going through the MCP transport.
pub struct Tenant {
    pub context: TenantContext,
    pub token: String,
    pub store: Arc<TenantStore>,
    pub gateway: FakeGateway,
}

/// One isolated environment: a metadata DB and a tenant registry under a
/// fresh temp directory, plus an `AuthService` over them.
pub struct Environment {
    pub metadata: Arc<MetadataStore>,
    pub registry: TenantRegistry,
    pub auth: Arc<AuthService>,
    _dir: TempDir,
}

impl Environment {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let metadata = Arc::new(MetadataStore::open(&dir.path().join("meta.db")).expect("open metadata"));
        let registry = TenantRegistry::new(dir.path().join("tenants"), 3600);
        let auth = Arc::new(AuthService::new(metadata.clone(), "test-secret".to_string(), [3u8; 32], 30, 24));
        Self { metadata, registry, auth, _dir: dir }
    }

    /// Registers a tenant with its own `FakeGateway` and opens its store.
    pub async fn register_tenant(&self, provider_api_key: &str) -> Tenant {
        let (user_id, token) = self.auth.register(provider_api_key, EMBEDDING_DIM).expect("register");
        let context = self.auth.verify(&token).expect("verify");
        let store = self.registry.open(&user_id, EMBEDDING_DIM).await.expect("open tenant store");
        Tenant { context, token, store, gateway: FakeGateway::new(EMBEDDING_DIM) }
    }
}

/// A dialogue turn with a deterministic, direction-biased embedding so
/// scripted `FakeGateway` vector search behaves predictably across runs.
pub fn turn(speaker: &str, text: &str, minutes_from_now: i64) -> DialogueTurn {
    DialogueTurn { speaker: speaker.to_string(), text: text.to_string(), timestamp_utc: Utc::now() + chrono::Duration::minutes(minutes_from_now) }
}

pub fn metadata_for(text: &str, source_session_id: Option<&str>) -> UnitMetadata {
    UnitMetadata {
        timestamp_utc: Utc::now(),
        entities: vec![],
        persons: vec![],
        source_session_id: source_session_id.map(str::to_string),
        source_event_ids: vec![],
    }
}

pub fn tokens(text: &str) -> Vec<String> {
    tokenize(text)
}
