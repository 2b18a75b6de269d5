//! Circuit breaker implementation.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use strata_config::CircuitBreakerSettings;
use strata_core::{CacheError, CacheResult, FailureGuard};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Calls reach the backend.
    Closed = 0,
    /// Calls are rejected without reaching the backend.
    Open = 1,
    /// A limited number of probe calls reach the backend.
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive backend failures before opening the circuit.
    pub failure_threshold: u64,
    /// Probe successes needed to close the circuit from half-open.
    pub success_threshold: u64,
    /// How long the circuit stays open before probing.
    pub timeout: Duration,
    /// Probe calls allowed while half-open.
    pub half_open_requests: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(30),
            half_open_requests: 3,
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            success_threshold: settings.success_threshold.max(1),
            timeout: Duration::from_secs(settings.open_timeout_secs),
            half_open_requests: settings.half_open_requests.max(1),
        }
    }
}

/// Stops calling a backend that keeps failing.
///
/// Only errors for which [`CacheError::should_trip_circuit_breaker`] holds
/// count as failures. Any other outcome proves the backend answered and
/// counts as a success. A rejected call fails with
/// [`CacheError::BackendUnavailable`] naming the breaker.
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    half_open_requests: AtomicU64,
    rejected: AtomicU64,
    last_failure_time: RwLock<Option<Instant>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            half_open_requests: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            last_failure_time: RwLock::new(None),
            config,
        }
    }

    /// Creates a new circuit breaker with default configuration.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Returns the current state of the circuit breaker.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::SeqCst))
    }

    /// Returns the name of the circuit breaker.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls rejected while open or out of half-open probes.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    async fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let last_failure = self.last_failure_time.read().await;
                if let Some(time) = *last_failure {
                    if time.elapsed() >= self.config.timeout {
                        self.success_count.store(0, Ordering::SeqCst);
                        self.half_open_requests.store(1, Ordering::SeqCst);
                        self.state.store(CircuitState::HalfOpen as u8, Ordering::SeqCst);
                        debug!(breaker = %self.name, "Circuit breaker transitioning to half-open");
                        return true;
                    }
                }
                false
            }
            CircuitState::HalfOpen => {
                let requests = self.half_open_requests.fetch_add(1, Ordering::SeqCst);
                requests < self.config.half_open_requests
            }
        }
    }

    async fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold {
                    self.state.store(CircuitState::Closed as u8, Ordering::SeqCst);
                    self.failure_count.store(0, Ordering::SeqCst);
                    debug!(breaker = %self.name, "Circuit breaker closed after successful recovery");
                } else {
                    // Free the probe slot for the next caller.
                    self.half_open_requests.fetch_sub(1, Ordering::SeqCst);
                }
            }
            CircuitState::Open => {}
        }
    }

    async fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                *self.last_failure_time.write().await = Some(Instant::now());

                if failures >= self.config.failure_threshold {
                    self.state.store(CircuitState::Open as u8, Ordering::SeqCst);
                    warn!(breaker = %self.name, failures, "Circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                *self.last_failure_time.write().await = Some(Instant::now());
                self.state.store(CircuitState::Open as u8, Ordering::SeqCst);
                warn!(breaker = %self.name, "Circuit breaker reopened after failed probe");
            }
            CircuitState::Open => {
                *self.last_failure_time.write().await = Some(Instant::now());
            }
        }
    }

    /// Manually resets the circuit breaker to closed state.
    pub async fn reset(&self) {
        self.state.store(CircuitState::Closed as u8, Ordering::SeqCst);
        self.failure_count.store(0, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        *self.last_failure_time.write().await = None;
        debug!(breaker = %self.name, "Circuit breaker manually reset");
    }
}

#[async_trait]
impl FailureGuard for CircuitBreaker {
    async fn execute<T, F, Fut>(&self, mut operation: F) -> CacheResult<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send,
    {
        if !self.allow_request().await {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(CacheError::backend(
                self.name.clone(),
                "circuit breaker is open",
            ));
        }

        let result = operation().await;
        match &result {
            Err(e) if e.should_trip_circuit_breaker() => self.record_failure().await,
            _ => self.record_success().await,
        }
        result
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn backend_down() -> CacheError {
        CacheError::backend("redis", "connection refused")
    }

    #[tokio::test]
    async fn test_circuit_breaker_closed() {
        let cb = CircuitBreaker::with_defaults("test");

        let result = cb.execute(|| async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_on_failures() {
        let config = CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        };
        let cb = CircuitBreaker::new("redis", config);

        let _ = cb.execute(|| async { Err::<i32, _>(backend_down()) }).await;
        assert_eq!(cb.state(), CircuitState::Closed);

        let _ = cb.execute(|| async { Err::<i32, _>(backend_down()) }).await;
        assert_eq!(cb.state(), CircuitState::Open);

        let calls = AtomicU32::new(0);
        let result = cb
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await;

        assert!(matches!(result, Err(CacheError::BackendUnavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.rejected(), 1);
    }

    #[tokio::test]
    async fn test_serialization_errors_do_not_trip() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        let cb = CircuitBreaker::new("redis", config);

        let result = cb
            .execute(|| async { Err::<i32, _>(CacheError::serialization("bad payload")) })
            .await;

        assert!(matches!(result, Err(CacheError::Serialization(_))));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_recovery() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            timeout: Duration::from_millis(20),
            half_open_requests: 1,
        };
        let cb = CircuitBreaker::new("redis", config);

        let _ = cb.execute(|| async { Err::<i32, _>(backend_down()) }).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cb.execute(|| async { Ok(1) }).await, Ok(1));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.execute(|| async { Ok(2) }).await, Ok(2));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_failed_probe_reopens() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let cb = CircuitBreaker::new("redis", config);

        let _ = cb.execute(|| async { Err::<i32, _>(backend_down()) }).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = cb.execute(|| async { Err::<i32, _>(backend_down()) }).await;

        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_reset() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        let cb = CircuitBreaker::new("redis", config);
        let _ = cb.execute(|| async { Err::<i32, _>(backend_down()) }).await;

        cb.reset().await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_circuit_state_from_u8() {
        assert_eq!(CircuitState::from(0), CircuitState::Closed);
        assert_eq!(CircuitState::from(1), CircuitState::Open);
        assert_eq!(CircuitState::from(2), CircuitState::HalfOpen);
        assert_eq!(CircuitState::from(255), CircuitState::Closed);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = CircuitBreakerSettings {
            enabled: true,
            failure_threshold: 0,
            success_threshold: 2,
            open_timeout_secs: 10,
            half_open_requests: 4,
        };
        let config = CircuitBreakerConfig::from(&settings);
        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.half_open_requests, 4);
    }
}
