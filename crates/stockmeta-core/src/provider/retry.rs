//! Retry utilities for transient provider failures.
//!
//! Classifies retryable errors and runs an operation up to `max_retries + 1`
//! times with a configurable backoff between attempts.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::ProviderError;

/// Upper bound for any single backoff pause.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Determine whether a provider error is worth retrying.
///
/// Retryable errors: timeouts, unreachable backends, rate limits (429), server errors (5xx).
/// Non-retryable: auth failures, bad requests, capability and argument errors.
pub fn is_retryable(error: &ProviderError) -> bool {
    match error {
        ProviderError::Timeout { .. } | ProviderError::Unavailable { .. } => true,
        ProviderError::Api {
            status_code,
            message,
            ..
        } => {
            // Classify by HTTP status code when available (structured)
            if let Some(code) = status_code {
                return *code == 429 || (500..=599).contains(code);
            }
            // Fallback for non-HTTP errors (e.g., connection refused, DNS failure)
            message.contains("timed out") || message.contains("connect")
        }
        _ => false,
    }
}

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `retry_delay * (attempt + 1)`.
    #[default]
    Linear,
    /// `retry_delay` every time.
    Fixed,
    /// `retry_delay * 2^attempt`.
    Exponential,
}

/// Retry configuration owned by one provider instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_retries,
            retry_delay,
            backoff,
        }
    }

    /// Pause after failed attempt number `attempt` (zero-based), capped at 30 seconds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.retry_delay.as_millis() as u64;
        let delay = match self.backoff {
            Backoff::Fixed => base,
            Backoff::Linear => base.saturating_mul(u64::from(attempt) + 1),
            Backoff::Exponential => base.saturating_mul(2u64.saturating_pow(attempt)),
        };
        Duration::from_millis(delay.min(MAX_BACKOFF_MS))
    }

    /// Run `op`, retrying retryable failures. Returns the last error once exhausted.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{label}: attempt {}/{} failed ({e}), retrying in {}ms",
                        attempt + 1,
                        self.max_retries + 1,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn server_error() -> ProviderError {
        ProviderError::Api {
            provider: "mock".to_string(),
            message: "HTTP 503: service unavailable".to_string(),
            status_code: Some(503),
        }
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = ProviderError::Timeout {
            provider: "mock".to_string(),
            timeout_ms: 60000,
        };
        assert!(is_retryable(&err));
    }

    #[test]
    fn test_rate_limit_is_retryable() {
        let err = ProviderError::Api {
            provider: "mock".to_string(),
            message: "HTTP 429: rate limit exceeded".to_string(),
            status_code: Some(429),
        };
        assert!(is_retryable(&err));
        assert!(is_retryable(&server_error()));
    }

    #[test]
    fn test_auth_error_not_retryable() {
        let err = ProviderError::Api {
            provider: "mock".to_string(),
            message: "HTTP 401: unauthorized".to_string(),
            status_code: Some(401),
        };
        assert!(!is_retryable(&err));
    }

    #[test]
    fn test_capability_errors_not_retryable() {
        assert!(!is_retryable(&ProviderError::InvalidArgument("x".into())));
        assert!(!is_retryable(&ProviderError::not_supported("local", "polling")));
    }

    #[test]
    fn test_message_with_500_in_body_not_retryable_without_status() {
        // "Processed 500 tokens" must not look like a server error
        let err = ProviderError::api("mock", "Processed 500 tokens successfully");
        assert!(!is_retryable(&err));
    }

    #[test]
    fn test_connection_error_retryable_without_status() {
        let err = ProviderError::api("mock", "connection refused");
        assert!(is_retryable(&err));
    }

    #[test]
    fn test_backoff_shapes() {
        let linear = RetryPolicy::new(3, Duration::from_millis(1000), Backoff::Linear);
        assert_eq!(linear.delay_for(0), Duration::from_millis(1000));
        assert_eq!(linear.delay_for(2), Duration::from_millis(3000));

        let fixed = RetryPolicy::new(3, Duration::from_millis(500), Backoff::Fixed);
        assert_eq!(fixed.delay_for(4), Duration::from_millis(500));

        let exp = RetryPolicy::new(3, Duration::from_millis(1000), Backoff::Exponential);
        assert_eq!(exp.delay_for(3), Duration::from_millis(8000));
        assert_eq!(exp.delay_for(10), Duration::from_millis(30_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flaky_operation_succeeds_after_two_failures() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100), Backoff::Linear);
        let calls = AtomicU32::new(0);
        let result = policy
            .run("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(server_error())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_operation_exhausts_retries() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Backoff::Fixed);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy
            .run("broken", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(server_error()) }
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Api { status_code: Some(503), .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy
            .run("bad", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::InvalidArgument("nope".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
