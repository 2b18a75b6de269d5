//! Read-through loading with stampede protection.

use crate::{Cache, SharedCache};
use std::future::Future;
use std::sync::Arc;
use strata_core::{
    CacheError, CacheKey, CacheResult, CacheValue, Lookup, SetOptions, StampedeGuard,
};
use strata_resilience::SingleFlight;
use tracing::{debug, warn};

/// Loads missing values from an origin and stores them.
///
/// Concurrent misses on one key share a single origin load through the
/// [`StampedeGuard`].
pub struct ReadThrough<V: CacheValue> {
    cache: SharedCache<V>,
    guard: Arc<dyn StampedeGuard<V>>,
}

impl<V: CacheValue> Clone for ReadThrough<V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            guard: Arc::clone(&self.guard),
        }
    }
}

impl<V: CacheValue> ReadThrough<V> {
    /// Uses single-flight coalescing.
    pub fn new(cache: SharedCache<V>) -> Self {
        Self::with_guard(cache, Arc::new(SingleFlight::new()))
    }

    pub fn with_guard(cache: SharedCache<V>, guard: Arc<dyn StampedeGuard<V>>) -> Self {
        Self { cache, guard }
    }

    pub fn cache(&self) -> &SharedCache<V> {
        &self.cache
    }

    /// Returns the cached value, or loads, stores and returns it.
    ///
    /// A failed cache read is treated as a miss. A failed store is logged and
    /// the loaded value is still returned. Only a failed load is an error.
    pub async fn get_or_load<F, Fut>(
        &self,
        key: &CacheKey,
        options: SetOptions,
        load: F,
    ) -> CacheResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<V>> + Send + 'static,
    {
        match self.cache.get(key).await {
            Ok(Lookup::Hit(entry)) => return Ok(entry.value),
            Ok(Lookup::Miss) => {}
            Err(e) => {
                warn!(cache = %self.cache.name(), error = %e, "Cache read failed; loading from origin");
            }
        }

        let cache = Arc::clone(&self.cache);
        let store_key = key.clone();
        let origin = load();
        let task = Box::pin(async move {
            let value = origin.await?;
            if let Err(e) = cache.set(&store_key, value.clone(), options).await {
                warn!(cache = %cache.name(), error = %e, "Could not store loaded value");
            } else {
                debug!(cache = %cache.name(), "Stored loaded value");
            }
            Ok::<V, CacheError>(value)
        });

        self.guard.coalesce(key, task).await
    }
}
