//! OpenRouter backend: OpenAI-compatible chat-completions envelope, no
//! native embeddings endpoint — `embed` is routed to the configured
//! embedding model via OpenRouter's `/embeddings` passthrough where the
//! upstream model supports it.

use async_trait::async_trait;
use serde_json::json;

use super::{ChatMessage, ChatResponse, ProviderError, ProviderGateway};

pub struct OpenRouterGateway {
    client: reqwest::Client,
    base_url: String,
    model: String,
    embedding_model: String,
    api_key: String,
}

impl OpenRouterGateway {
    /// `api_key` takes precedence over `OPENROUTER_API_KEY` when supplied,
    /// since each tenant carries its own decrypted provider key.
    pub fn new(config: &crate::config::Config, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config
                .llm_base_url
                .clone()
                .unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string()),
            model: config.llm_model.clone(),
            embedding_model: config.embedding_model.clone(),
            api_key: api_key.or_else(|| std::env::var("OPENROUTER_API_KEY").ok()).unwrap_or_default(),
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            ProviderError::Auth(format!("openrouter auth failed: {body}"))
        } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ProviderError::Transient(format!("openrouter {status}: {body}"))
        } else {
            ProviderError::Permanent(format!("openrouter {status}: {body}"))
        }
    }
}

#[async_trait]
impl ProviderGateway for OpenRouterGateway {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Auth("OPENROUTER_API_KEY not set".to_string()));
        }

        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
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
        let data = parsed["data"].as_array().ok_or_else(|| {
            ProviderError::Permanent("openrouter response missing 'data' array".to_string())
        })?;
        data.iter()
            .map(|item| {
                item["embedding"]
                    .as_array()
                    .map(|arr| arr.iter().filter_map(|v| v.as_f64()).map(|f| f as f32).collect())
                    .ok_or_else(|| ProviderError::Permanent("missing embedding field".to_string()))
            })
            .collect()
    }

    async fn chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
        schema: Option<&serde_json::Value>,
    ) -> Result<ChatResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Auth("OPENROUTER_API_KEY not set".to_string()));
        }

        let mut msgs = vec![json!({ "role": "system", "content": system })];
        for m in messages {
            msgs.push(json!({ "role": m.role, "content": m.content }));
        }

        let mut body = json!({ "model": self.model, "messages": msgs });
        if let Some(schema) = schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": { "name": "response", "schema": schema, "strict": true },
            });
        }

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "https://simplemem.local")
            .header("X-Title", "SimpleMem")
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
        let text = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Permanent("missing choices[0].message.content".to_string()))?
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
