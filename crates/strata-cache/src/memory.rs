//! Bounded in-process adapter.
//!
//! One mutex guards the whole store. Every operation is short and CPU-bound,
//! so readers never observe a partially written entry and nothing here
//! suspends. Sharding by key hash would lift the single-lock ceiling.
//!
//! Eviction picks the entry with the oldest `cached_at` (insertion order
//! breaks ties), not the least recently read one. Reads do no bookkeeping,
//! at the cost of evicting hot entries that were cached long ago.

use crate::Cache;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use strata_config::MemoryConfig;
use strata_core::{
    CacheEntry, CacheError, CacheEvent, CacheKey, CacheMetadata, CacheResult, CacheStats,
    CacheValue, ClearPattern, EventAttributes, Lookup, NoopSink, SetOptions, SharedSink,
    SizeEstimator, StatsCollector,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// In-process adapter options.
#[derive(Debug, Clone)]
pub struct MemoryCacheOptions {
    /// Instance name for logs and metrics.
    pub name: String,
    /// Maximum live entries.
    pub max_entries: Option<usize>,
    /// Maximum estimated bytes.
    pub max_bytes: Option<usize>,
    /// TTL applied when a write carries none.
    pub default_ttl: Option<Duration>,
    /// Background expiry sweep interval.
    pub sweep_interval: Option<Duration>,
    /// When false, writes beyond capacity fail with `CapacityExceeded`.
    pub eviction_enabled: bool,
}

impl Default for MemoryCacheOptions {
    fn default() -> Self {
        Self::from_config("memory", &MemoryConfig::default())
    }
}

impl MemoryCacheOptions {
    pub fn from_config(name: impl Into<String>, config: &MemoryConfig) -> Self {
        Self {
            name: name.into(),
            max_entries: config.max_entries,
            max_bytes: config.max_bytes,
            default_ttl: config.default_ttl(),
            sweep_interval: config.sweep_interval(),
            eviction_enabled: config.eviction_enabled,
        }
    }

    /// Unbounded store with no default TTL and no sweeper.
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_entries: None,
            max_bytes: None,
            default_ttl: None,
            sweep_interval: None,
            eviction_enabled: true,
        }
    }

    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn without_eviction(mut self) -> Self {
        self.eviction_enabled = false;
        self
    }

    fn validate(&self) -> CacheResult<()> {
        if self.max_entries == Some(0) {
            return Err(CacheError::configuration("max_entries must be greater than zero"));
        }
        if self.max_bytes == Some(0) {
            return Err(CacheError::configuration("max_bytes must be greater than zero"));
        }
        if self.default_ttl == Some(Duration::ZERO) {
            return Err(CacheError::configuration("default_ttl must be positive"));
        }
        if self.sweep_interval == Some(Duration::ZERO) {
            return Err(CacheError::configuration("sweep_interval must be positive"));
        }
        Ok(())
    }
}

struct Slot<V> {
    entry: CacheEntry<V>,
    seq: u64,
    bytes: usize,
}

struct Store<V> {
    slots: HashMap<String, Slot<V>>,
    bytes: usize,
    next_seq: u64,
}

impl<V> Store<V> {
    fn remove(&mut self, key: &str) -> Option<Slot<V>> {
        let slot = self.slots.remove(key)?;
        self.bytes -= slot.bytes;
        Some(slot)
    }

    fn remove_expired(&mut self) -> u64 {
        let now = Utc::now();
        let before = self.slots.len();
        let mut freed = 0;
        self.slots.retain(|_, slot| {
            let keep = !slot.entry.metadata.is_expired_at(now);
            if !keep {
                freed += slot.bytes;
            }
            keep
        });
        self.bytes -= freed;
        (before - self.slots.len()) as u64
    }

    fn oldest_key(&self, excluding: &str) -> Option<String> {
        self.slots
            .iter()
            .filter(|(key, _)| key.as_str() != excluding)
            .min_by_key(|(_, slot)| (slot.entry.metadata.cached_at(), slot.seq))
            .map(|(key, _)| key.clone())
    }
}

struct Inner<V> {
    options: MemoryCacheOptions,
    store: Mutex<Store<V>>,
    stats: StatsCollector,
    estimator: SizeEstimator<V>,
    sink: SharedSink,
}

impl<V: CacheValue> Inner<V> {
    fn emit(&self, event: CacheEvent, count: u64) {
        if count > 0 {
            self.sink
                .emit(event, &EventAttributes::new(&self.options.name).count(count));
        }
    }

    fn purge_expired(&self) -> u64 {
        let removed = self.store.lock().remove_expired();
        if removed > 0 {
            self.stats.record_expirations(removed);
            self.emit(CacheEvent::Expire, removed);
        }
        removed
    }

    fn lookup(&self, store: &mut Store<V>, key: &str) -> Lookup<V> {
        match store.slots.get(key) {
            None => return Lookup::Miss,
            Some(slot) if !slot.entry.is_expired() => return Lookup::Hit(slot.entry.clone()),
            Some(_) => {}
        }
        store.remove(key);
        self.record_expired(1);
        Lookup::Miss
    }

    fn record_lookup(&self, lookup: &Lookup<V>) {
        if lookup.is_hit() {
            self.stats.record_hit();
            self.emit(CacheEvent::Hit, 1);
        } else {
            self.stats.record_miss();
            self.emit(CacheEvent::Miss, 1);
        }
    }

    fn insert(&self, key: &CacheKey, value: V, options: &SetOptions) -> CacheResult<()> {
        let mut metadata = CacheMetadata::from_options(options, self.options.default_ttl);
        let bytes = match self.options.max_bytes {
            Some(max_bytes) => {
                let bytes = self.estimator.estimate(&value);
                if bytes > max_bytes {
                    return Err(CacheError::CapacityExceeded {
                        limit: max_bytes as u64,
                        requested: bytes as u64,
                    });
                }
                metadata = metadata.with_size(bytes as u64);
                bytes
            }
            None => 0,
        };

        let key = key.as_str();
        let mut evicted = 0u64;
        let mut expired = 0u64;
        {
            let mut store = self.store.lock();

            if self.overflow(&store, key, bytes).is_some() {
                expired = store.remove_expired();
            }

            while let Some((limit, requested)) = self.overflow(&store, key, bytes) {
                if !self.options.eviction_enabled {
                    drop(store);
                    self.record_expired(expired);
                    return Err(CacheError::CapacityExceeded { limit, requested });
                }
                let Some(victim) = store.oldest_key(key) else {
                    break;
                };
                store.remove(&victim);
                evicted += 1;
            }

            let seq = store.next_seq;
            store.next_seq += 1;
            store.remove(key);
            store.bytes += bytes;
            store.slots.insert(
                key.to_string(),
                Slot {
                    entry: CacheEntry::new(value, metadata),
                    seq,
                    bytes,
                },
            );
        }

        self.record_expired(expired);
        if evicted > 0 {
            (0..evicted).for_each(|_| self.stats.record_eviction());
            self.emit(CacheEvent::Evict, evicted);
            debug!(cache = %self.options.name, evicted, "Evicted oldest entries to make room");
        }
        self.stats.record_set();
        self.emit(CacheEvent::Set, 1);
        Ok(())
    }

    fn record_expired(&self, expired: u64) {
        if expired > 0 {
            self.stats.record_expirations(expired);
            self.emit(CacheEvent::Expire, expired);
        }
    }

    /// Returns the violated `(limit, requested)` bound if writing `bytes`
    /// under `key` would exceed capacity.
    fn overflow(&self, store: &Store<V>, key: &str, bytes: usize) -> Option<(u64, u64)> {
        let existing = store.slots.get(key);
        let entries = store.slots.len() + usize::from(existing.is_none());
        if let Some(max_entries) = self.options.max_entries {
            if entries > max_entries {
                return Some((max_entries as u64, entries as u64));
            }
        }
        if let Some(max_bytes) = self.options.max_bytes {
            let total = store.bytes - existing.map_or(0, |slot| slot.bytes) + bytes;
            if total > max_bytes {
                return Some((max_bytes as u64, total as u64));
            }
        }
        None
    }
}

struct Sweeper {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Bounded in-process cache with TTL, oldest-first eviction and a
/// background expiry sweep.
pub struct InMemoryCache<V: CacheValue> {
    inner: Arc<Inner<V>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<V: CacheValue> InMemoryCache<V> {
    /// Creates a cache with the serialized-length size estimator and no sink.
    ///
    /// The sweeper is not started; see [`InMemoryCache::start_sweeper`].
    pub fn new(options: MemoryCacheOptions) -> CacheResult<Self> {
        Self::with_collaborators(options, SizeEstimator::default(), Arc::new(NoopSink))
    }

    /// Creates a cache with a caller-supplied size estimator and sink.
    pub fn with_collaborators(
        options: MemoryCacheOptions,
        estimator: SizeEstimator<V>,
        sink: SharedSink,
    ) -> CacheResult<Self> {
        options.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                options,
                store: Mutex::new(Store {
                    slots: HashMap::new(),
                    bytes: 0,
                    next_seq: 0,
                }),
                stats: StatsCollector::new(),
                estimator,
                sink,
            }),
            sweeper: Mutex::new(None),
        })
    }

    /// Starts the periodic expiry sweep on the current tokio runtime.
    ///
    /// No-op when no sweep interval is configured or the sweeper already runs.
    pub fn start_sweeper(&self) -> CacheResult<()> {
        let Some(period) = self.inner.options.sweep_interval else {
            return Ok(());
        };
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            CacheError::configuration(format!("sweeper requires a tokio runtime: {}", e))
        })?;

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let weak: Weak<Inner<V>> = Arc::downgrade(&self.inner);
        let name = self.inner.options.name.clone();

        let handle = runtime.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        let removed = inner.purge_expired();
                        if removed > 0 {
                            debug!(cache = %name, removed, "Swept expired entries");
                        }
                    }
                }
            }
            debug!(cache = %name, "Expiry sweeper stopped");
        });

        info!(cache = %self.inner.options.name, interval_ms = period.as_millis() as u64, "Expiry sweeper started");
        *sweeper = Some(Sweeper {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Returns true while the sweeper task is running.
    pub fn sweeper_running(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|sweeper| !sweeper.handle.is_finished())
    }

    /// Stops the sweeper and waits for it to finish.
    pub async fn stop_sweeper(&self) -> CacheResult<()> {
        let Some(sweeper) = self.sweeper.lock().take() else {
            return Ok(());
        };
        let _ = sweeper.shutdown_tx.send(());
        sweeper.handle.await.map_err(|e| {
            warn!(cache = %self.inner.options.name, error = %e, "Expiry sweeper did not stop cleanly");
            CacheError::internal(format!("sweeper task failed: {}", e))
        })
    }

    /// Removes every expired entry now. Returns how many were removed.
    pub fn purge_expired(&self) -> u64 {
        self.inner.purge_expired()
    }

    /// Live and not-yet-swept entries currently held.
    pub fn len(&self) -> usize {
        self.inner.store.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn options(&self) -> &MemoryCacheOptions {
        &self.inner.options
    }
}

impl<V: CacheValue> Drop for InMemoryCache<V> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.handle.abort();
        }
    }
}

#[async_trait]
impl<V: CacheValue> Cache<V> for InMemoryCache<V> {
    fn name(&self) -> &str {
        &self.inner.options.name
    }

    async fn get(&self, key: &CacheKey) -> CacheResult<Lookup<V>> {
        let lookup = {
            let mut store = self.inner.store.lock();
            self.inner.lookup(&mut store, key.as_str())
        };
        self.inner.record_lookup(&lookup);
        Ok(lookup)
    }

    async fn set(&self, key: &CacheKey, value: V, options: SetOptions) -> CacheResult<()> {
        self.inner.insert(key, value, &options).map_err(|e| {
            self.inner.stats.record_error();
            self.inner.sink.emit(
                CacheEvent::Error,
                &EventAttributes::new(&self.inner.options.name).error(e.kind()),
            );
            e
        })
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        let removed = self.inner.store.lock().remove(key.as_str());
        let existed = match removed {
            Some(slot) if slot.entry.is_expired() => {
                self.inner.record_expired(1);
                false
            }
            Some(_) => true,
            None => false,
        };
        if existed {
            self.inner.stats.record_delete();
            self.inner.emit(CacheEvent::Delete, 1);
        }
        Ok(existed)
    }

    async fn clear(&self, pattern: Option<&ClearPattern>) -> CacheResult<u64> {
        let removed = {
            let mut store = self.inner.store.lock();
            match pattern {
                None => {
                    let removed = store.slots.len() as u64;
                    store.slots.clear();
                    store.bytes = 0;
                    removed
                }
                Some(pattern) => {
                    let before = store.slots.len();
                    let mut freed = 0;
                    store.slots.retain(|key, slot| {
                        let keep = !pattern.matches(key, slot.entry.metadata.tags());
                        if !keep {
                            freed += slot.bytes;
                        }
                        keep
                    });
                    store.bytes -= freed;
                    (before - store.slots.len()) as u64
                }
            }
        };

        self.inner.stats.record_deletes(removed);
        self.inner.emit(CacheEvent::Delete, removed);
        debug!(
            cache = %self.inner.options.name,
            pattern = pattern.map_or("*", ClearPattern::as_str),
            removed,
            "Cleared entries"
        );
        Ok(removed)
    }

    async fn has(&self, key: &CacheKey) -> CacheResult<bool> {
        let mut store = self.inner.store.lock();
        Ok(self.inner.lookup(&mut store, key.as_str()).is_hit())
    }

    async fn get_many(&self, keys: &[CacheKey]) -> CacheResult<Vec<Lookup<V>>> {
        let lookups: Vec<Lookup<V>> = {
            let mut store = self.inner.store.lock();
            keys.iter()
                .map(|key| self.inner.lookup(&mut store, key.as_str()))
                .collect()
        };
        for lookup in &lookups {
            self.inner.record_lookup(lookup);
        }
        Ok(lookups)
    }

    fn stats(&self) -> CacheStats {
        let (entries, bytes) = {
            let store = self.inner.store.lock();
            (store.slots.len() as u64, store.bytes as u64)
        };
        let snapshot = self.inner.stats.snapshot().with_entries(entries);
        if self.inner.options.max_bytes.is_some() {
            snapshot.with_bytes(bytes)
        } else {
            snapshot
        }
    }

    async fn shutdown(&self) -> CacheResult<()> {
        self.stop_sweeper().await
    }
}

impl<V: CacheValue> std::fmt::Debug for InMemoryCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("options", &self.inner.options)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}
