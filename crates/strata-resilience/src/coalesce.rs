//! Single-flight coalescing of concurrent loads for the same key.

use async_trait::async_trait;
use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_core::{BoxFuture, CacheKey, CacheResult, StampedeGuard};
use tracing::trace;

type InFlight<V> = Shared<BoxFuture<'static, V>>;

/// Runs at most one load per key at a time; concurrent callers for the same
/// key await the first caller's load and receive a clone of its result,
/// including its error.
pub struct SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    in_flight: Mutex<HashMap<String, InFlight<V>>>,
    coalesced: AtomicU64,
}

impl<V> SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Keys with a load currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Callers that joined an existing load instead of starting one.
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

impl<V> Default for SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the leader's entry once its load settles or the leader is dropped.
struct LeaderSlot<'a, V>
where
    V: Clone + Send + Sync + 'static,
{
    map: &'a Mutex<HashMap<String, InFlight<V>>>,
    key: &'a str,
    shared: InFlight<V>,
}

impl<V> Drop for LeaderSlot<'_, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let mut map = self.map.lock();
        if map
            .get(self.key)
            .is_some_and(|current| Shared::ptr_eq(current, &self.shared))
        {
            map.remove(self.key);
        }
    }
}

#[async_trait]
impl<V> StampedeGuard<V> for SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn coalesce(&self, key: &CacheKey, load: BoxFuture<'static, V>) -> CacheResult<V> {
        let (shared, leader) = {
            let mut map = self.in_flight.lock();
            match map.get(key.as_str()) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let shared = load.shared();
                    map.insert(key.as_str().to_string(), shared.clone());
                    (shared, true)
                }
            }
        };

        if !leader {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Joined in-flight load");
            return shared.await;
        }

        let slot = LeaderSlot {
            map: &self.in_flight,
            key: key.as_str(),
            shared: shared.clone(),
        };
        let result = shared.await;
        drop(slot);
        result
    }
}

impl<V> std::fmt::Debug for SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.in_flight())
            .field("coalesced", &self.coalesced())
            .finish()
    }
}
