//! Top-level error type unifying every module's error enum.

use crate::answerer::AnswererError;
use crate::auth::AuthError;
use crate::compressor::CompressorError;
use crate::context_injector::ContextInjectorError;
use crate::planner::PlannerError;
use crate::provider::ProviderError;
use crate::retriever::RetrieverError;
use crate::session::SessionError;
use crate::storage::StoreError;
use crate::synthesizer::SynthesizerError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error surface for the engine, threaded through the MCP transport's
/// HTTP-status / JSON-RPC-code mapping (spec §7).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("tenant mismatch")]
    TenantMismatch,
}

impl Error {
    /// JSON-RPC error code per spec §7.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Error::Auth(_) => -32001,
            Error::TenantMismatch => -32002,
            Error::NotFound(_) => -32003,
            Error::InvalidArgument(_) => -32602,
            Error::Session(_) => -32004,
            Error::Provider(e) if e.is_permanent() => -32010,
            Error::Provider(_) => -32010,
            Error::Store(_) => -32020,
            Error::DeadlineExceeded => -32030,
        }
    }

    /// HTTP status code per spec §7.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Auth(_) => 401,
            Error::TenantMismatch => 403,
            Error::NotFound(_) => 404,
            Error::InvalidArgument(_) => 400,
            Error::Session(_) => 409,
            Error::Provider(_) => 502,
            Error::Store(_) => 500,
            Error::DeadlineExceeded => 504,
        }
    }
}

impl From<CompressorError> for Error {
    fn from(e: CompressorError) -> Self {
        match e {
            CompressorError::Provider(p) => Error::Provider(p),
        }
    }
}

impl From<SynthesizerError> for Error {
    fn from(e: SynthesizerError) -> Self {
        match e {
            SynthesizerError::Store(s) => Error::Store(s),
            SynthesizerError::Provider(p) => Error::Provider(p),
            SynthesizerError::CyclicMerge(id) => Error::InvalidArgument(format!("unit {id} would become its own descendant")),
        }
    }
}

impl From<PlannerError> for Error {
    fn from(e: PlannerError) -> Self {
        match e {
            PlannerError::Provider(p) => Error::Provider(p),
        }
    }
}

impl From<RetrieverError> for Error {
    fn from(e: RetrieverError) -> Self {
        match e {
            RetrieverError::Store(s) => Error::Store(s),
            RetrieverError::DeadlineExceeded => Error::DeadlineExceeded,
        }
    }
}

impl From<AnswererError> for Error {
    fn from(e: AnswererError) -> Self {
        match e {
            AnswererError::Provider(p) => Error::Provider(p),
        }
    }
}

impl From<ContextInjectorError> for Error {
    fn from(e: ContextInjectorError) -> Self {
        match e {
            ContextInjectorError::Planner(p) => p.into(),
            ContextInjectorError::Retriever(r) => r.into(),
        }
    }
}
