//! Store clients for the distributed adapter.
//!
//! A store client speaks one backend's wire protocol and nothing else: raw
//! bytes in, raw bytes out, native TTL. Envelope encoding, failure
//! translation and guarding live in [`crate::DistributedCache`].

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Result type for store client calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a store client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No connection could be obtained.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The store rejected or failed a command.
    #[error("Command failed: {0}")]
    Command(String),

    /// The store did not answer in time.
    #[error("Store timed out")]
    Timeout,
}

/// Narrow key-value client with native TTL support.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Reads a payload.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Writes a payload, expiring it after `ttl` when given.
    async fn set(&self, key: &str, payload: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()>;

    /// Deletes keys. Returns how many existed.
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;

    /// Checks whether a key exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Enumerates keys matching a Redis-style glob.
    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Reads several payloads. Results are in `keys` order.
    async fn batch_get(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>>;

    /// Writes several payloads.
    async fn batch_set(&self, entries: Vec<(String, Vec<u8>, Option<Duration>)>) -> StoreResult<()>;
}

#[async_trait]
impl<C: StoreClient + ?Sized> StoreClient for std::sync::Arc<C> {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, payload: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        (**self).set(key, payload, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        (**self).delete(keys).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        (**self).exists(key).await
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        (**self).scan(pattern).await
    }

    async fn batch_get(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        (**self).batch_get(keys).await
    }

    async fn batch_set(&self, entries: Vec<(String, Vec<u8>, Option<Duration>)>) -> StoreResult<()> {
        (**self).batch_set(entries).await
    }
}
