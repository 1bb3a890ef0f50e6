//! Bounded retry for calls that cross an external boundary.
//!
//! Every external call (Reddit, the LLM provider) is retried at most
//! `max_retries` times and only when the error says it is retryable. There is
//! no unbounded retry anywhere in the workspace.

use crate::{CoreError, ErrorExt};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Retry configuration for one class of external call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt)
    pub max_retries: u32,
    /// Delay before the first retry when the error gives no hint
    pub initial_delay: Duration,
    /// Upper bound for any single delay, including server-provided hints
    pub max_delay: Duration,
    /// Random jitter added to each delay, as a fraction of it (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, never sleeps.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32, error: &CoreError) -> Duration {
        let base = error.retry_after().unwrap_or_else(|| {
            let exponent = attempt.saturating_sub(1).min(16);
            self.initial_delay.saturating_mul(1u32 << exponent)
        });
        let capped = base.min(self.max_delay);
        let jitter = capped.as_secs_f64() * self.jitter_factor.clamp(0.0, 1.0) * fastrand::f64();
        (capped + Duration::from_secs_f64(jitter)).min(self.max_delay)
    }

    /// Run `operation`, retrying retryable failures up to `max_retries` times.
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.max_retries || !error.is_retryable() {
                        debug!(
                            "{} failed after {} attempt(s): {}",
                            label,
                            attempt + 1,
                            error
                        );
                        return Err(error);
                    }

                    attempt += 1;
                    let delay = self.delay_for(attempt, &error);
                    info!(
                        "Retrying {} (attempt {}/{}) after {:?}: {}",
                        label, attempt, self.max_retries, delay, error
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfigError, LlmError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_factor: 0.0,
        }
    }

    #[tokio::test]
    async fn test_retryable_error_is_retried_once() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), CoreError> = fast_policy(1)
            .run("summarize", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::Llm(LlmError::ServiceUnavailable {
                    provider: "azure".to_string(),
                }))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), CoreError> = fast_policy(3)
            .run("summarize", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::Config(ConfigError::MissingField {
                    field: "llm.api_key".to_string(),
                }))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_after_transient_failure() {
        let calls = AtomicUsize::new(0);
        let result = fast_policy(2)
            .run("summarize", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CoreError::Timeout { seconds: 0 })
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delay_is_capped_by_max_delay() {
        let policy = fast_policy(1);
        let error = CoreError::Llm(LlmError::RateLimitExceeded {
            provider: "azure".to_string(),
            retry_after: 60,
        });
        assert_eq!(policy.delay_for(1, &error), Duration::from_millis(5));
    }
}
