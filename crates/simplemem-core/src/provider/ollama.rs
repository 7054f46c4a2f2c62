//! Ollama backend: local inference server, `/api/chat` and `/api/embed`,
//! no authentication, a different response envelope than the
//! OpenAI-compatible backends.

use async_trait::async_trait;
use serde_json::json;

use super::{ChatMessage, ChatResponse, ProviderError, ProviderGateway};

pub struct OllamaGateway {
    client: reqwest::Client,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl OllamaGateway {
    pub fn new(config: &crate::config::Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config
                .llm_base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: config.llm_model.clone(),
            embedding_model: config.embedding_model.clone(),
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
        if status.is_server_error() {
            ProviderError::Transient(format!("ollama {status}: {body}"))
        } else {
            ProviderError::Permanent(format!("ollama {status}: {body}"))
        }
    }
}

#[async_trait]
impl ProviderGateway for OllamaGateway {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let resp = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&json!({ "model": self.embedding_model, "input": texts }))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| ProviderError::Transient(e.to_string()))?;
        if !status.is_success() {
            return Err(Self::classify_status(status, &body));
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| ProviderError::Permanent(e.to_string()))?;
        let embeddings = parsed["embeddings"].as_array().ok_or_else(|| {
            ProviderError::Permanent("ollama response missing 'embeddings' array".to_string())
        })?;
        Ok(embeddings
            .iter()
            .map(|arr| {
                arr.as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|v| v.as_f64())
                    .map(|f| f as f32)
                    .collect()
            })
            .collect())
    }

    async fn chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
        schema: Option<&serde_json::Value>,
    ) -> Result<ChatResponse, ProviderError> {
        let mut msgs = vec![json!({ "role": "system", "content": system })];
        for m in messages {
            msgs.push(json!({ "role": m.role, "content": m.content }));
        }

        let mut body = json!({ "model": self.model, "messages": msgs, "stream": false });
        if let Some(schema) = schema {
            body["format"] = schema.clone();
        }

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = resp.status();
        let raw = resp.text().await.map_err(|e| ProviderError::Transient(e.to_string()))?;
        if !status.is_success() {
            return Err(Self::classify_status(status, &raw));
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| ProviderError::Permanent(e.to_string()))?;
        let text = parsed["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Permanent("missing message.content".to_string()))?
            .to_string();

        let structured = if schema.is_some() {
            Some(
                serde_json::from_str(&text)
                    .map_err(|e| ProviderError::Permanent(format!("schema mismatch: {e}")))?,
            )
        } else {
            None
        };

        Ok(ChatResponse { text, structured })
    }
}
