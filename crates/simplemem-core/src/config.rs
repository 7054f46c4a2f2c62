//! Process-wide configuration loaded from the environment (spec §6).
//!
//! Every recognized variable is collected here; a single `Config::from_env`
//! call either succeeds with a fully populated struct or fails with every
//! missing/invalid variable named at once, rather than stopping at the first.

use std::path::PathBuf;

/// Which upstream backend the provider gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    LiteLlm,
    OpenRouter,
    Ollama,
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "litellm" => Ok(LlmProvider::LiteLlm),
            "openrouter" => Ok(LlmProvider::OpenRouter),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(format!(
                "unknown LLM_PROVIDER '{other}' (expected litellm, openrouter, or ollama)"
            )),
        }
    }
}

/// Fully resolved process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret_key: String,
    pub encryption_key: [u8; 32],
    pub user_db_path: PathBuf,
    pub vector_db_path: PathBuf,
    pub llm_provider: LlmProvider,
    pub llm_base_url: Option<String>,
    pub llm_model: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub window_size: usize,
    pub top_k: usize,
    pub jwt_expiration_days: i64,
    pub jwt_refresh_grace_hours: i64,
    pub host: String,
    pub port: u16,
    pub base_url: Option<String>,
    pub consolidation_interval_hours: u64,
    pub tombstone_grace_hours: i64,
    pub provider_timeout_ms: u64,
    pub redaction_patterns: Vec<String>,
}

/// Every problem found while loading configuration, reported together.
#[derive(Debug, thiserror::Error)]
#[error("invalid configuration:\n{}", .0.join("\n"))]
pub struct ConfigError(pub Vec<String>);

struct Loader {
    problems: Vec<String>,
}

impl Loader {
    fn new() -> Self {
        Self { problems: Vec::new() }
    }

    fn require(&mut self, key: &str) -> Option<String> {
        match std::env::var(key) {
            Ok(v) if !v.is_empty() => Some(v),
            Ok(_) => {
                self.problems.push(format!("{key} is set but empty"));
                None
            }
            Err(_) => {
                self.problems.push(format!("{key} is required but not set"));
                None
            }
        }
    }

    fn optional_string(&self, key: &str, default: &str) -> String {
        std::env::var(key).unwrap_or_else(|_| default.to_string())
    }

    fn optional_parsed<T: std::str::FromStr>(&mut self, key: &str, default: T) -> T {
        match std::env::var(key) {
            Ok(v) => v.parse().unwrap_or_else(|_| {
                self.problems.push(format!("{key} is set but not parseable"));
                default
            }),
            Err(_) => default,
        }
    }
}

impl Config {
    /// Load configuration from the environment, returning every problem at once.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut loader = Loader::new();

        let jwt_secret_key = loader.require("JWT_SECRET_KEY");
        let encryption_key_b64 = loader.require("ENCRYPTION_KEY");

        let encryption_key = encryption_key_b64.as_ref().and_then(|b64| {
            use base64::Engine;
            match base64::engine::general_purpose::STANDARD.decode(b64) {
                Ok(bytes) if bytes.len() == 32 => {
                    let mut key = [0u8; 32];
                    key.copy_from_slice(&bytes);
                    Some(key)
                }
                Ok(bytes) => {
                    loader.problems.push(format!(
                        "ENCRYPTION_KEY must decode to 32 bytes, got {}",
                        bytes.len()
                    ));
                    None
                }
                Err(e) => {
                    loader.problems.push(format!("ENCRYPTION_KEY is not valid base64: {e}"));
                    None
                }
            }
        });

        let llm_provider = loader
            .require("LLM_PROVIDER")
            .and_then(|v| match v.parse::<LlmProvider>() {
                Ok(p) => Some(p),
                Err(e) => {
                    loader.problems.push(e);
                    None
                }
            });

        let user_db_path = loader.optional_string("USER_DB_PATH", "./data/users.db");
        let vector_db_path = loader.optional_string("VECTOR_DB_PATH", "./data/tenants");

        if !loader.problems.is_empty() {
            return Err(ConfigError(loader.problems));
        }

        Ok(Config {
            jwt_secret_key: jwt_secret_key.expect("checked above"),
            encryption_key: encryption_key.expect("checked above"),
            user_db_path: PathBuf::from(user_db_path),
            vector_db_path: PathBuf::from(vector_db_path),
            llm_provider: llm_provider.expect("checked above"),
            llm_base_url: std::env::var("LLM_BASE_URL").ok(),
            llm_model: loader.optional_string("LLM_MODEL", "gpt-4o-mini"),
            embedding_model: loader.optional_string("EMBEDDING_MODEL", "text-embedding-3-small"),
            embedding_dimension: loader.optional_parsed("EMBEDDING_DIMENSION", 1536),
            window_size: loader.optional_parsed("WINDOW_SIZE", 10),
            top_k: loader.optional_parsed("TOP_K", 8),
            jwt_expiration_days: loader.optional_parsed("JWT_EXPIRATION_DAYS", 30),
            jwt_refresh_grace_hours: loader.optional_parsed("JWT_REFRESH_GRACE_HOURS", 24),
            host: loader.optional_string("HOST", "127.0.0.1"),
            port: loader.optional_parsed("PORT", 3100),
            base_url: std::env::var("BASE_URL").ok(),
            consolidation_interval_hours: loader
                .optional_parsed("CONSOLIDATION_INTERVAL_HOURS", 6),
            tombstone_grace_hours: loader.optional_parsed("TOMBSTONE_GRACE_HOURS", 72),
            provider_timeout_ms: loader.optional_parsed("PROVIDER_TIMEOUT_MS", 10_000),
            redaction_patterns: std::env::var("REDACTION_PATTERNS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
        })
    }

    /// Build a config directly, for tests and embedders that don't want to
    /// touch the process environment.
    #[cfg(any(test, feature = "test-util"))]
    pub fn for_testing(data_dir: &std::path::Path) -> Self {
        Config {
            jwt_secret_key: "test-secret".to_string(),
            encryption_key: [7u8; 32],
            user_db_path: data_dir.join("users.db"),
            vector_db_path: data_dir.join("tenants"),
            llm_provider: LlmProvider::Ollama,
            llm_base_url: None,
            llm_model: "test-model".to_string(),
            embedding_model: "test-embed".to_string(),
            embedding_dimension: 16,
            window_size: 10,
            top_k: 8,
            jwt_expiration_days: 30,
            jwt_refresh_grace_hours: 24,
            host: "127.0.0.1".to_string(),
            port: 0,
            base_url: None,
            consolidation_interval_hours: 6,
            tombstone_grace_hours: 72,
            provider_timeout_ms: 10_000,
            redaction_patterns: vec![],
        }
    }
}
