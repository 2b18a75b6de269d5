//! Timeout wrapper for backend calls.

use std::future::Future;
use std::time::Duration;
use strata_core::{CacheError, CacheResult};

/// Runs `f` with an upper bound on its duration.
///
/// An expired deadline is reported as [`CacheError::BackendUnavailable`]
/// for `backend`, so guards treat it like any other backend failure.
pub async fn with_timeout<F, Fut, T>(backend: &str, duration: Duration, f: F) -> CacheResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = CacheResult<T>>,
{
    tokio::time::timeout(duration, f()).await.map_err(|_| {
        CacheError::backend(backend, format!("operation timed out after {:?}", duration))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_success() {
        let result = with_timeout("redis", Duration::from_secs(1), || async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_timeout_exceeded() {
        let result = with_timeout("redis", Duration::from_millis(10), || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(42)
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_retriable());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result: CacheResult<()> = with_timeout("redis", Duration::from_secs(1), || async {
            Err(CacheError::serialization("bad"))
        })
        .await;
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }
}
