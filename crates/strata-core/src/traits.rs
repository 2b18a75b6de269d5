//! Collaborator seams the cache calls into but does not implement.

use crate::{BoxFuture, CacheKey, CacheResult};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Resilience wrapper (circuit breaker, retry, rate limit) invoked around
/// every backend call of a distributed adapter.
///
/// The adapter stays unaware of the guard's internal state machine; it only
/// hands over a re-invocable operation and receives its outcome.
#[async_trait]
pub trait FailureGuard: Send + Sync {
    /// Runs `operation` under the guard's policy.
    ///
    /// `operation` may be invoked more than once (e.g. by a retry policy) or
    /// not at all (e.g. by an open circuit).
    async fn execute<T, F, Fut>(&self, operation: F) -> CacheResult<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send;
}

#[async_trait]
impl<G: FailureGuard> FailureGuard for Arc<G> {
    async fn execute<T, F, Fut>(&self, operation: F) -> CacheResult<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send,
    {
        (**self).execute(operation).await
    }
}

/// An absent guard runs the operation once, unguarded.
#[async_trait]
impl<G: FailureGuard> FailureGuard for Option<G> {
    async fn execute<T, F, Fut>(&self, mut operation: F) -> CacheResult<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send,
    {
        match self {
            Some(guard) => guard.execute(operation).await,
            None => operation().await,
        }
    }
}

/// Hook through which a stampede-prevention collaborator collapses
/// concurrent loads of the same key.
#[async_trait]
pub trait StampedeGuard<V>: Send + Sync
where
    V: Clone + Send + 'static,
{
    /// Runs `load` for `key`, or joins a load already running for it.
    async fn coalesce(&self, key: &CacheKey, load: BoxFuture<'static, V>) -> CacheResult<V>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheError;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Reject;

    #[async_trait]
    impl FailureGuard for Reject {
        async fn execute<T, F, Fut>(&self, _operation: F) -> CacheResult<T>
        where
            T: Send,
            F: FnMut() -> Fut + Send,
            Fut: Future<Output = CacheResult<T>> + Send,
        {
            Err(CacheError::backend("test", "rejected"))
        }
    }

    #[tokio::test]
    async fn test_absent_guard_runs_once() {
        let calls = AtomicU32::new(0);
        let guard: Option<Reject> = None;

        let result = guard
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_present_guard_decides() {
        let guard = Arc::new(Some(Reject));
        let result = guard.execute(|| async { Ok(7) }).await;
        assert!(result.unwrap_err().is_retriable());
    }
}
