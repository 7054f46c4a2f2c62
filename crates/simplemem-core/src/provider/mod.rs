//! Uniform access to chat-completion and embedding capabilities across
//! providers (spec §4.A), grounded in the teacher's local-embeddings error
//! idiom but fronted by an HTTP client instead of in-process inference.

mod gateway;
mod litellm;
mod ollama;
mod openrouter;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use gateway::RetryingGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single turn in a chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage { role: "user".to_string(), content: content.into() }
    }
}

/// Result of a `chat` call. When a schema was supplied, `structured` holds
/// the validated JSON object; otherwise only `text` is populated.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
    pub structured: Option<serde_json::Value>,
}

/// Failure classification for retry/backoff decisions and for mapping onto
/// `simplemem_core::Error` (spec §7).
#[non_exhaustive]
#[derive(Debug, thiserror::Error, Clone)]
pub enum ProviderError {
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("permanent provider error: {0}")]
    Permanent(String),

    #[error("provider authentication failed: {0}")]
    Auth(String),

    #[error("provider call exceeded time budget")]
    Budget,
}

impl ProviderError {
    /// Whether a retry is pointless — everything except `Transient`.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, ProviderError::Transient(_))
    }
}

/// The capability interface every backend implements (spec §4.A).
///
/// Dynamic dispatch over providers, no runtime type introspection
/// (spec §9 "Dynamic dispatch over providers").
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
        schema: Option<&serde_json::Value>,
    ) -> Result<ChatResponse, ProviderError>;
}

/// Build the configured backend wrapped in the shared retry policy.
///
/// `api_key` is the tenant's own decrypted provider key (spec §4.L), and
/// takes precedence over whatever provider-specific env var the backend
/// would otherwise fall back to. Built fresh per authenticated request
/// rather than cached at process startup, since a single process serves
/// many tenants each with their own key.
pub fn build_gateway(config: &crate::config::Config, api_key: Option<String>) -> RetryingGateway {
    let inner: Box<dyn ProviderGateway> = match config.llm_provider {
        crate::config::LlmProvider::LiteLlm => {
            Box::new(litellm::LiteLlmGateway::new(config, api_key))
        }
        crate::config::LlmProvider::OpenRouter => {
            Box::new(openrouter::OpenRouterGateway::new(config, api_key))
        }
        crate::config::LlmProvider::Ollama => Box::new(ollama::OllamaGateway::new(config)),
    };
    RetryingGateway::new(inner, config.provider_timeout_ms)
}
