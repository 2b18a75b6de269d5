//! Guard composition.

use crate::{CircuitBreaker, CircuitBreakerConfig, RateLimitGuard, RetryGuard, RetryPolicy};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use strata_config::ResilienceConfig;
use strata_core::{CacheResult, FailureGuard};

/// Runs every operation exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

#[async_trait]
impl FailureGuard for Passthrough {
    async fn execute<T, F, Fut>(&self, mut operation: F) -> CacheResult<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send,
    {
        operation().await
    }
}

/// Runs `inner` under `outer`: every attempt the outer guard makes goes
/// through the inner guard.
#[derive(Debug, Clone, Default)]
pub struct Layered<Outer, Inner> {
    outer: Outer,
    inner: Inner,
}

impl<Outer, Inner> Layered<Outer, Inner> {
    pub fn new(outer: Outer, inner: Inner) -> Self {
        Self { outer, inner }
    }

    pub fn outer(&self) -> &Outer {
        &self.outer
    }

    pub fn inner(&self) -> &Inner {
        &self.inner
    }
}

#[async_trait]
impl<Outer, Inner> FailureGuard for Layered<Outer, Inner>
where
    Outer: FailureGuard,
    Inner: FailureGuard,
{
    async fn execute<T, F, Fut>(&self, operation: F) -> CacheResult<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send,
    {
        // Both guards may re-invoke; share the operation between attempts.
        let operation = Mutex::new(operation);
        let operation = &operation;
        let inner = &self.inner;

        self.outer
            .execute(|| inner.execute(move || (&mut *operation.lock())()))
            .await
    }
}

/// Guard stack built from [`ResilienceConfig`]: retry around rate limit
/// around circuit breaker. Disabled layers run the call straight through.
pub type ConfiguredGuard =
    Layered<Option<RetryGuard>, Layered<Option<RateLimitGuard>, Option<CircuitBreaker>>>;

/// Builds the guard stack for the backend called `name`.
pub fn guard_from_config(name: &str, config: &ResilienceConfig) -> ConfiguredGuard {
    let retry = config
        .retry
        .enabled
        .then(|| RetryGuard::new(RetryPolicy::from(&config.retry)));
    let rate_limit = config
        .rate_limit
        .enabled
        .then(|| RateLimitGuard::from_settings(name, &config.rate_limit));
    let breaker = config
        .circuit_breaker
        .enabled
        .then(|| CircuitBreaker::new(name, CircuitBreakerConfig::from(&config.circuit_breaker)));

    Layered::new(retry, Layered::new(rate_limit, breaker))
}
