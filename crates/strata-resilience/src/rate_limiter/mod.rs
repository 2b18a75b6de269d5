//! Rate limiter implementation.

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use strata_config::RateLimitSettings;
use strata_core::{CacheError, CacheResult, FailureGuard};

/// Caps the rate of backend calls.
///
/// A call over quota is rejected with [`CacheError::BackendUnavailable`]
/// rather than queued, so a cache read never waits on the limiter.
pub struct RateLimitGuard {
    name: String,
    limiter: Arc<GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl RateLimitGuard {
    /// Creates a new rate limiter with the specified requests per second.
    pub fn new(name: impl Into<String>, requests_per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
        Self {
            name: name.into(),
            limiter: Arc::new(GovernorRateLimiter::direct(quota)),
        }
    }

    /// Creates a rate limiter from settings.
    pub fn from_settings(name: impl Into<String>, settings: &RateLimitSettings) -> Self {
        Self::new(name, settings.requests_per_second)
    }

    /// Checks if a call is allowed (non-blocking).
    pub fn check(&self) -> CacheResult<()> {
        self.limiter
            .check()
            .map_err(|_| CacheError::backend(self.name.clone(), "rate limit exceeded"))
    }

    /// Waits until a call is allowed.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

#[async_trait]
impl FailureGuard for RateLimitGuard {
    async fn execute<T, F, Fut>(&self, mut operation: F) -> CacheResult<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send,
    {
        self.check()?;
        operation().await
    }
}

impl Clone for RateLimitGuard {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

impl std::fmt::Debug for RateLimitGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitGuard")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
