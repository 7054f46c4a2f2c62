//! LiteLLM backend: OpenAI-compatible `/chat/completions` and `/embeddings`
//! behind a LiteLLM proxy.

use async_trait::async_trait;
use serde_json::json;

use super::{ChatMessage, ChatResponse, ProviderError, ProviderGateway};

pub struct LiteLlmGateway {
    client: reqwest::Client,
    base_url: String,
    model: String,
    embedding_model: String,
    api_key: Option<String>,
}

impl LiteLlmGateway {
    /// `api_key` takes precedence over `LITELLM_API_KEY` when supplied,
    /// since each tenant carries its own decrypted provider key.
    pub fn new(config: &crate::config::Config, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config
                .llm_base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:4000".to_string()),
            model: config.llm_model.clone(),
            embedding_model: config.embedding_model.clone(),
            api_key: api_key.or_else(|| std::env::var("LITELLM_API_KEY").ok()),
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            ProviderError::Auth(format!("litellm auth failed: {body}"))
        } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ProviderError::Transient(format!("litellm {status}: {body}"))
        } else {
            ProviderError::Permanent(format!("litellm {status}: {body}"))
        }
    }
}

#[async_trait]
impl ProviderGateway for LiteLlmGateway {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let resp = self
            .authorize(self.client.post(format!("{}/embeddings", self.base_url)))
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
            ProviderError::Permanent("litellm response missing 'data' array".to_string())
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
            .authorize(self.client.post(format!("{}/chat/completions", self.base_url)))
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
