//! Shared retry/backoff/timeout logic wrapping any concrete backend
//! (spec §4.A "enforces retries with exponential backoff").

use std::time::Duration;

use async_trait::async_trait;

use super::{ChatMessage, ChatResponse, ProviderError, ProviderGateway};

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const BACKOFF_FACTOR: u32 = 2;
const MAX_ATTEMPTS: u32 = 5;

/// Wraps a concrete `ProviderGateway` backend with exponential backoff on
/// `ProviderError::Transient` and an overall wall-clock budget.
pub struct RetryingGateway {
    inner: Box<dyn ProviderGateway>,
    timeout: Duration,
}

impl RetryingGateway {
    pub fn new(inner: Box<dyn ProviderGateway>, timeout_ms: u64) -> Self {
        Self { inner, timeout: Duration::from_millis(timeout_ms) }
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let budget = tokio::time::Instant::now() + self.timeout;
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let remaining = budget.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(ProviderError::Budget);
            }

            let result = tokio::time::timeout(remaining, op()).await;
            match result {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if !e.is_permanent() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "transient provider error, retrying");
                    let sleep_for = backoff.min(remaining);
                    tokio::time::sleep(sleep_for).await;
                    backoff *= BACKOFF_FACTOR;
                }
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) => return Err(ProviderError::Budget),
            }
        }
    }
}

#[async_trait]
impl ProviderGateway for RetryingGateway {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.with_retry(|| self.inner.embed(texts)).await
    }

    async fn chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
        schema: Option<&serde_json::Value>,
    ) -> Result<ChatResponse, ProviderError> {
        self.with_retry(|| self.inner.chat(system, messages, schema)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyOnce {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ProviderGateway for FlakyOnce {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(ProviderError::Transient("first attempt fails".into()))
            } else {
                Ok(vec![vec![1.0, 2.0]])
            }
        }

        async fn chat(
            &self,
            _system: &str,
            _messages: &[ChatMessage],
            _schema: Option<&serde_json::Value>,
        ) -> Result<ChatResponse, ProviderError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let gw = RetryingGateway::new(Box::new(FlakyOnce { calls: calls.clone() }), 5_000);
        let result = gw.embed(&["hello".to_string()]).await.unwrap();
        assert_eq!(result, vec![vec![1.0, 2.0]]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct AlwaysPermanent;

    #[async_trait]
    impl ProviderGateway for AlwaysPermanent {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Err(ProviderError::Permanent("nope".into()))
        }
        async fn chat(
            &self,
            _system: &str,
            _messages: &[ChatMessage],
            _schema: Option<&serde_json::Value>,
        ) -> Result<ChatResponse, ProviderError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let gw = RetryingGateway::new(Box::new(AlwaysPermanent), 5_000);
        let err = gw.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)));
    }
}
