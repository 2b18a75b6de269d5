//! Retry policy implementation.

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use strata_config::RetrySettings;
use strata_core::{CacheResult, FailureGuard};
use tracing::debug;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
    /// Whether to randomize delays by up to 25%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            multiplier: settings.multiplier,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with the specified max attempts.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Builds the backoff schedule. Attempts, not elapsed time, bound it.
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_max_interval(self.max_delay)
            .with_multiplier(self.multiplier)
            .with_randomization_factor(if self.jitter { 0.25 } else { 0.0 })
            .with_max_elapsed_time(None)
            .build()
    }

    /// Delays the policy would sleep between attempts, in order.
    pub fn delays(&self) -> Vec<Duration> {
        let mut backoff = self.backoff();
        (1..self.max_attempts)
            .filter_map(|_| backoff.next_backoff())
            .collect()
    }
}

/// Retries operations that fail with a retriable error.
///
/// Errors for which [`strata_core::CacheError::is_retriable`] is false are
/// returned on the first attempt.
#[derive(Debug, Clone, Default)]
pub struct RetryGuard {
    policy: RetryPolicy,
}

impl RetryGuard {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl FailureGuard for RetryGuard {
    async fn execute<T, F, Fut>(&self, mut operation: F) -> CacheResult<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        backoff::future::retry_notify(
            self.policy.backoff(),
            || {
                attempt += 1;
                let last = attempt >= max_attempts;
                let fut = operation();
                async move {
                    fut.await.map_err(|e| {
                        if e.is_retriable() && !last {
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
                }
            },
            |e, delay: Duration| {
                debug!(error = %e, delay_ms = delay.as_millis() as u64, "Retrying cache backend call");
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use strata_core::CacheError;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_retry_success() {
        let guard = RetryGuard::new(fast_policy(3));
        let result = guard.execute(|| async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_retry_eventual_success() {
        let guard = RetryGuard::new(fast_policy(3));
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = guard
            .execute(|| {
                let attempts = attempts_clone.clone();
                async move {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(CacheError::backend("redis", "timeout"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_counts_exact_attempts() {
        let guard = RetryGuard::new(fast_policy(3));
        let attempts = AtomicU32::new(0);

        let result = guard
            .execute(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(CacheError::backend("redis", "down"))
            })
            .await;

        assert!(matches!(result, Err(CacheError::BackendUnavailable { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retriable_error_is_returned_immediately() {
        let guard = RetryGuard::new(fast_policy(5));
        let attempts = AtomicU32::new(0);

        let result = guard
            .execute(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(CacheError::serialization("corrupt envelope"))
            })
            .await;

        assert!(matches!(result, Err(CacheError::Serialization(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_single_attempt() {
        let guard = RetryGuard::new(fast_policy(1));
        let attempts = AtomicU32::new(0);

        let result = guard
            .execute(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(CacheError::backend("redis", "down"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            multiplier: 2.0,
            jitter: false,
        };

        let delays = policy.delays();
        assert_eq!(delays.len(), 4);
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[3], Duration::from_millis(300));
    }

    #[test]
    fn test_policy_from_settings() {
        let settings = RetrySettings {
            enabled: true,
            max_attempts: 0,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            multiplier: 3.0,
        };
        let policy = RetryPolicy::from(&settings);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_delay, Duration::from_millis(10));
    }
}
