//! A deterministic, network-free `ProviderGateway` for unit and `tests/e2e`
//! use — no model weights, no HTTP calls. Embeddings are a hash-based
//! pseudo-random projection; `chat` replies are scripted per-call.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatMessage, ChatResponse, ProviderError, ProviderGateway};

/// A single scripted `chat` reply: either a structured object or a plain
/// string, returned in the order enqueued.
pub enum ScriptedReply {
    Structured(serde_json::Value),
    Text(String),
    Fail(ProviderError),
}

pub struct FakeGateway {
    dimension: usize,
    replies: Mutex<VecDeque<ScriptedReply>>,
}

impl FakeGateway {
    pub fn new(dimension: usize) -> Self {
        Self { dimension, replies: Mutex::new(VecDeque::new()) }
    }

    /// Queue a reply to be returned by the next `chat` call.
    pub fn push_reply(&self, reply: ScriptedReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Deterministic pseudo-embedding: stable across calls for the same
    /// text, distinct for distinct text, unit-normalized.
    fn hash_embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimension];
        let mut state: u64 = 1469598103934665603; // FNV offset basis
        for byte in text.bytes() {
            state ^= byte as u64;
            state = state.wrapping_mul(1099511628211);
            let idx = (state as usize) % self.dimension;
            v[idx] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl ProviderGateway for FakeGateway {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| self.hash_embed(t)).collect())
    }

    async fn chat(
        &self,
        _system: &str,
        _messages: &[ChatMessage],
        schema: Option<&serde_json::Value>,
    ) -> Result<ChatResponse, ProviderError> {
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(ScriptedReply::Structured(v)) => {
                Ok(ChatResponse { text: v.to_string(), structured: Some(v) })
            }
            Some(ScriptedReply::Text(t)) => Ok(ChatResponse { text: t, structured: None }),
            Some(ScriptedReply::Fail(e)) => Err(e),
            None if schema.is_some() => {
                Ok(ChatResponse { text: "{}".to_string(), structured: Some(serde_json::json!({})) })
            }
            None => Ok(ChatResponse { text: String::new(), structured: None }),
        }
    }
}
