//! Exponential backoff retry for transient provider errors.

use std::future::Future;
use std::time::Duration;

use crate::domain::ports::LlmError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Run `operation` until it succeeds, fails permanently, or retries are
    /// exhausted. Only transient errors are retried.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut backoff = self.initial_backoff;
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_transient() {
                        return Err(err);
                    }
                    tracing::debug!(attempt, error = %err, "transient LLM error, backing off");
                    last_error = Some(err);
                    if attempt < self.max_retries {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(self.max_backoff);
                    }
                }
            }
        }

        Err(last_error.unwrap_or(LlmError::Timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let result = fast_policy()
            .execute(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(LlmError::RateLimited)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy()
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(LlmError::Api { status: 401, message: "bad key".to_string() }) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let result: Result<(), _> = fast_policy().execute(|| async { Err(LlmError::Timeout) }).await;
        assert!(matches!(result, Err(LlmError::Timeout)));
    }
}
