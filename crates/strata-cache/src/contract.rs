//! The operation set every adapter implements.

use async_trait::async_trait;
use std::sync::Arc;
use strata_core::{
    CacheKey, CacheResult, CacheStats, CacheValue, ClearPattern, Lookup, Outcome, SetOptions,
};

/// Storage-agnostic cache contract.
///
/// A miss is `Ok(Lookup::Miss)`, never an error. Errors are reserved for
/// conditions the caller did not expect: undecodable payloads, unreachable
/// backends, exhausted hard capacity.
#[async_trait]
pub trait Cache<V: CacheValue>: Send + Sync {
    /// Instance name used in logs and metric labels.
    fn name(&self) -> &str;

    /// Looks up a live entry.
    async fn get(&self, key: &CacheKey) -> CacheResult<Lookup<V>>;

    /// Stores `value`, replacing any previous entry for `key` wholesale.
    async fn set(&self, key: &CacheKey, value: V, options: SetOptions) -> CacheResult<()>;

    /// Removes the entry. Returns whether a live entry existed.
    async fn delete(&self, key: &CacheKey) -> CacheResult<bool>;

    /// Removes every entry, or only those whose key or tags match `pattern`.
    /// Returns the number removed.
    async fn clear(&self, pattern: Option<&ClearPattern>) -> CacheResult<u64>;

    /// Existence check that leaves hit/miss statistics untouched.
    async fn has(&self, key: &CacheKey) -> CacheResult<bool>;

    /// Looks up several keys. Results are in `keys` order.
    async fn get_many(&self, keys: &[CacheKey]) -> CacheResult<Vec<Lookup<V>>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }

    /// Stores several entries.
    async fn set_many(&self, entries: Vec<(CacheKey, V, SetOptions)>) -> CacheResult<()> {
        for (key, value, options) in entries {
            self.set(&key, value, options).await?;
        }
        Ok(())
    }

    /// Point-in-time statistics.
    fn stats(&self) -> CacheStats;

    /// Finishes deferred writes and stops background tasks, waiting for
    /// them. Adapters without background work return immediately.
    async fn shutdown(&self) -> CacheResult<()> {
        Ok(())
    }
}

/// Shared handle to any adapter.
pub type SharedCache<V> = Arc<dyn Cache<V>>;

#[async_trait]
impl<V, C> Cache<V> for Arc<C>
where
    V: CacheValue,
    C: Cache<V> + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn get(&self, key: &CacheKey) -> CacheResult<Lookup<V>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &CacheKey, value: V, options: SetOptions) -> CacheResult<()> {
        (**self).set(key, value, options).await
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        (**self).delete(key).await
    }

    async fn clear(&self, pattern: Option<&ClearPattern>) -> CacheResult<u64> {
        (**self).clear(pattern).await
    }

    async fn has(&self, key: &CacheKey) -> CacheResult<bool> {
        (**self).has(key).await
    }

    async fn get_many(&self, keys: &[CacheKey]) -> CacheResult<Vec<Lookup<V>>> {
        (**self).get_many(keys).await
    }

    async fn set_many(&self, entries: Vec<(CacheKey, V, SetOptions)>) -> CacheResult<()> {
        (**self).set_many(entries).await
    }

    fn stats(&self) -> CacheStats {
        (**self).stats()
    }

    async fn shutdown(&self) -> CacheResult<()> {
        (**self).shutdown().await
    }
}

/// Convenience methods over [`Cache`].
#[async_trait]
pub trait CacheExt<V: CacheValue>: Cache<V> {
    /// Looks up a value, dropping metadata.
    async fn get_value(&self, key: &CacheKey) -> CacheResult<Option<V>> {
        Ok(self.get(key).await?.into_value())
    }

    /// Looks up an entry as a flat [`Outcome`].
    async fn lookup(&self, key: &CacheKey) -> Outcome<V> {
        self.get(key).await.into()
    }

    /// Stores a value with the adapter's default options.
    async fn put(&self, key: &CacheKey, value: V) -> CacheResult<()> {
        self.set(key, value, SetOptions::default()).await
    }
}

impl<V: CacheValue, C: Cache<V> + ?Sized> CacheExt<V> for C {}
