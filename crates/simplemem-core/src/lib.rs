//! Multi-tenant long-term memory engine for LLM agents.
//!
//! The crate is organized the way the control flow actually runs: a
//! provider gateway at the bottom, a tenant store above it, the memory
//! engine (compressor → synthesizer → planner → retriever → answerer) on
//! top of the store, and the cross-session orchestrator (session manager,
//! context injector, consolidator) coordinating all of it behind auth and
//! tenancy. The MCP transport crate is the only thing above this one.

pub mod answerer;
pub mod auth;
pub mod compressor;
pub mod config;
pub mod consolidator;
pub mod context_injector;
pub mod error;
pub mod memory;
pub mod planner;
pub mod provider;
pub mod retriever;
pub mod search;
pub mod session;
pub mod storage;
pub mod synthesizer;

pub use error::{Error, Result};

/// Re-exports the types a caller needs for a typical end-to-end wiring
/// without reaching into every submodule.
pub mod prelude {
    pub use crate::answerer::{AnswerResult, Answerer};
    pub use crate::auth::{AuthService, TenantContext};
    pub use crate::config::Config;
    pub use crate::consolidator::{Consolidator, ConsolidatorConfig};
    pub use crate::context_injector::ContextInjector;
    pub use crate::error::{Error, Result};
    pub use crate::memory::{DraftUnit, MemoryUnit, UnitKind, UnitMetadata};
    pub use crate::planner::{Plan, Planner};
    pub use crate::provider::{build_gateway, ProviderGateway};
    pub use crate::retriever::Retriever;
    pub use crate::session::SessionManager;
    pub use crate::storage::{MetadataStore, TenantRegistry, TenantStore};
}
