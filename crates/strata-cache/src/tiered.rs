//! Two-tier composition: a fast tier in front of a slower, larger one.
//!
//! Reads try the fast tier first and optionally promote slow-tier hits.
//! Writes follow the configured [`WriteStrategy`]. Under write-behind a
//! single worker applies deferred slow-tier writes in the order they were
//! accepted. Deletes and clears hit both tiers concurrently and succeed when
//! either tier does.

use crate::{Cache, SharedCache};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_config::{TieredConfig, WriteStrategy};
use strata_core::{
    CacheEntry, CacheError, CacheEvent, CacheKey, CacheResult, CacheStats, CacheValue,
    ClearPattern, EventAttributes, Lookup, NoopSink, SetOptions, SharedSink, StatsCollector,
    TierStats,
};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const FAST: &str = "fast";
const SLOW: &str = "slow";

/// Multi-tier adapter options.
#[derive(Debug, Clone)]
pub struct TieredOptions {
    /// Instance name for logs and metrics.
    pub name: String,
    /// Copy slow-tier hits into the fast tier.
    pub promote_on_hit: bool,
    /// Upper bound on the TTL of anything written to the fast tier.
    pub fast_ttl: Option<Duration>,
    /// How writes reach the slow tier.
    pub write_strategy: WriteStrategy,
}

impl TieredOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(name, &TieredConfig::default())
    }

    pub fn from_config(name: impl Into<String>, config: &TieredConfig) -> Self {
        Self {
            name: name.into(),
            promote_on_hit: config.promote_on_hit,
            fast_ttl: config.fast_ttl(),
            write_strategy: config.write_strategy,
        }
    }

    #[must_use]
    pub fn with_promotion(mut self, promote_on_hit: bool) -> Self {
        self.promote_on_hit = promote_on_hit;
        self
    }

    #[must_use]
    pub fn with_fast_ttl(mut self, fast_ttl: Option<Duration>) -> Self {
        self.fast_ttl = fast_ttl;
        self
    }

    #[must_use]
    pub fn with_write_strategy(mut self, write_strategy: WriteStrategy) -> Self {
        self.write_strategy = write_strategy;
        self
    }
}

#[derive(Debug, Default)]
struct TierCounters {
    fast_hits: AtomicU64,
    slow_hits: AtomicU64,
    promotions: AtomicU64,
    promotion_failures: AtomicU64,
    full_misses: AtomicU64,
    propagated: AtomicU64,
    propagation_failures: AtomicU64,
    pending: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Caps `ttl` at `cap`. An absent TTL takes the cap.
fn capped(ttl: Option<Duration>, cap: Option<Duration>) -> Option<Duration> {
    match (ttl, cap) {
        (Some(ttl), Some(cap)) => Some(ttl.min(cap)),
        (ttl, cap) => ttl.or(cap),
    }
}

fn propagation_failed(name: &str, counters: &TierCounters, sink: &SharedSink, err: &CacheError) {
    bump(&counters.propagation_failures);
    sink.emit(
        CacheEvent::Error,
        &EventAttributes::new(name).tier(SLOW).error(err.kind()),
    );
    warn!(cache = %name, tier = SLOW, error = %err, "Deferred slow-tier write failed");
}

/// Marks one accepted write as settled, waking flushers once none remain.
fn settle(counters: &TierCounters, idle: &Notify) {
    if counters.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
        idle.notify_waiters();
    }
}

/// A slow-tier write accepted under write-behind.
struct Deferred<V> {
    key: CacheKey,
    value: V,
    options: SetOptions,
}

/// Queue and worker applying deferred writes one at a time.
///
/// Dropping it closes the queue; the worker drains what is already queued
/// and exits on its own.
struct Propagator<V> {
    queue: mpsc::UnboundedSender<Deferred<V>>,
    worker: JoinHandle<()>,
}

/// Wakes flushers when the worker exits, including by panic.
struct WorkerExit(Arc<Notify>);

impl Drop for WorkerExit {
    fn drop(&mut self) {
        self.0.notify_waiters();
    }
}

/// Fast tier in front of a slow tier.
pub struct TieredCache<V: CacheValue> {
    fast: SharedCache<V>,
    slow: SharedCache<V>,
    options: TieredOptions,
    counters: Arc<TierCounters>,
    stats: StatsCollector,
    sink: SharedSink,
    propagator: Mutex<Option<Propagator<V>>>,
    idle: Arc<Notify>,
}

impl<V: CacheValue> TieredCache<V> {
    /// Composes two caches. Neither tier's storage is owned here.
    pub fn new(fast: SharedCache<V>, slow: SharedCache<V>, options: TieredOptions) -> CacheResult<Self> {
        if options.fast_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(CacheError::configuration("fast_ttl must be positive"));
        }
        Ok(Self {
            fast,
            slow,
            options,
            counters: Arc::new(TierCounters::default()),
            stats: StatsCollector::new(),
            sink: Arc::new(NoopSink),
            propagator: Mutex::new(None),
            idle: Arc::new(Notify::new()),
        })
    }

    #[must_use]
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn fast(&self) -> &SharedCache<V> {
        &self.fast
    }

    pub fn slow(&self) -> &SharedCache<V> {
        &self.slow
    }

    pub fn options(&self) -> &TieredOptions {
        &self.options
    }

    /// Waits until every accepted slow-tier write has been applied or has
    /// failed.
    ///
    /// Queued writes belong to the worker, not to this future: dropping it
    /// early loses nothing.
    pub async fn flush(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.counters.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            if !self.worker_alive() {
                warn!(
                    cache = %self.options.name,
                    pending = self.counters.pending.load(Ordering::SeqCst),
                    "Write-behind worker exited with writes outstanding"
                );
                return;
            }
            notified.await;
        }
    }

    fn worker_alive(&self) -> bool {
        self.propagator
            .lock()
            .as_ref()
            .is_some_and(|propagator| !propagator.worker.is_finished())
    }

    /// Stops the write-behind worker after it drains its queue.
    async fn stop_propagator(&self) {
        let Some(Propagator { queue, worker }) = self.propagator.lock().take() else {
            return;
        };
        drop(queue);
        if let Err(e) = worker.await {
            warn!(cache = %self.options.name, error = %e, "Write-behind worker did not stop cleanly");
        }
    }

    fn emit(&self, event: CacheEvent, tier: &'static str) {
        self.sink
            .emit(event, &EventAttributes::new(&self.options.name).tier(tier));
    }

    fn fail(&self, tier: &'static str, err: CacheError) -> CacheError {
        self.stats.record_error();
        self.sink.emit(
            CacheEvent::Error,
            &EventAttributes::new(&self.options.name)
                .tier(tier)
                .error(err.kind()),
        );
        err
    }

    async fn promote(&self, key: &CacheKey, entry: &CacheEntry<V>) {
        let ttl = capped(entry.metadata.remaining_ttl(), self.options.fast_ttl);
        if ttl == Some(Duration::ZERO) {
            return;
        }

        match self
            .fast
            .set(key, entry.value.clone(), entry.metadata.to_options(ttl))
            .await
        {
            Ok(()) => {
                bump(&self.counters.promotions);
                self.emit(CacheEvent::Promote, FAST);
            }
            Err(e) => {
                bump(&self.counters.promotion_failures);
                warn!(cache = %self.options.name, tier = FAST, error = %e, "Promotion into fast tier failed");
            }
        }
    }

    fn fast_options(&self, options: &SetOptions) -> SetOptions {
        SetOptions {
            ttl: capped(options.ttl, self.options.fast_ttl),
            ..options.clone()
        }
    }

    fn spawn_propagator(&self) -> Propagator<V> {
        let (queue, mut deferred) = mpsc::unbounded_channel::<Deferred<V>>();
        let slow = Arc::clone(&self.slow);
        let counters = Arc::clone(&self.counters);
        let sink = Arc::clone(&self.sink);
        let idle = Arc::clone(&self.idle);
        let name = self.options.name.clone();

        let worker = tokio::spawn(async move {
            let _exit = WorkerExit(Arc::clone(&idle));
            while let Some(Deferred { key, value, options }) = deferred.recv().await {
                match slow.set(&key, value, options).await {
                    Ok(()) => bump(&counters.propagated),
                    Err(e) => propagation_failed(&name, &counters, &sink, &e),
                }
                settle(&counters, &idle);
            }
            debug!(cache = %name, "Write-behind worker stopped");
        });

        Propagator { queue, worker }
    }

    /// Queues exactly one slow-tier write behind every write accepted
    /// before it, so the last `set` of a key is the one the slow tier keeps.
    fn propagate(&self, key: CacheKey, value: V, options: SetOptions) {
        let mut propagator = self.propagator.lock();
        if propagator.as_ref().is_some_and(|running| running.queue.is_closed()) {
            *propagator = None;
        }
        let running = propagator.get_or_insert_with(|| self.spawn_propagator());
        self.counters.pending.fetch_add(1, Ordering::SeqCst);

        if running.queue.send(Deferred { key, value, options }).is_err() {
            let err = CacheError::internal("write-behind worker is gone");
            propagation_failed(&self.options.name, &self.counters, &self.sink, &err);
            settle(&self.counters, &self.idle);
        }
    }

    /// Deferred writes still queued would land after an invalidation and
    /// resurrect the entry in the slow tier.
    async fn settle_before_invalidation(&self) {
        if self.options.write_strategy.is_deferred() {
            self.flush().await;
        }
    }

    fn either<T>(
        &self,
        operation: &'static str,
        fast: CacheResult<T>,
        slow: CacheResult<T>,
        combine: impl FnOnce(T, T) -> T,
    ) -> CacheResult<T> {
        match (fast, slow) {
            (Ok(fast), Ok(slow)) => Ok(combine(fast, slow)),
            (Ok(value), Err(e)) => {
                warn!(cache = %self.options.name, tier = SLOW, operation, error = %e, "Partial failure; fast tier succeeded");
                Ok(value)
            }
            (Err(e), Ok(value)) => {
                warn!(cache = %self.options.name, tier = FAST, operation, error = %e, "Partial failure; slow tier succeeded");
                Ok(value)
            }
            (Err(fast), Err(slow)) => {
                warn!(cache = %self.options.name, operation, fast_error = %fast, "Both tiers failed");
                Err(self.fail(SLOW, slow))
            }
        }
    }
}

#[async_trait]
impl<V: CacheValue> Cache<V> for TieredCache<V> {
    fn name(&self) -> &str {
        &self.options.name
    }

    async fn get(&self, key: &CacheKey) -> CacheResult<Lookup<V>> {
        match self.fast.get(key).await {
            Ok(Lookup::Hit(entry)) => {
                bump(&self.counters.fast_hits);
                self.stats.record_hit();
                self.emit(CacheEvent::Hit, FAST);
                return Ok(Lookup::Hit(entry));
            }
            Ok(Lookup::Miss) => {}
            Err(e) => {
                warn!(cache = %self.options.name, tier = FAST, error = %e, "Fast tier read failed; trying slow tier");
            }
        }

        match self.slow.get(key).await.map_err(|e| self.fail(SLOW, e))? {
            Lookup::Hit(entry) => {
                bump(&self.counters.slow_hits);
                self.stats.record_hit();
                self.emit(CacheEvent::Hit, SLOW);
                if self.options.promote_on_hit {
                    self.promote(key, &entry).await;
                }
                Ok(Lookup::Hit(entry))
            }
            Lookup::Miss => {
                bump(&self.counters.full_misses);
                self.stats.record_miss();
                self.emit(CacheEvent::Miss, SLOW);
                Ok(Lookup::Miss)
            }
        }
    }

    async fn set(&self, key: &CacheKey, value: V, options: SetOptions) -> CacheResult<()> {
        let fast_options = self.fast_options(&options);

        match self.options.write_strategy {
            WriteStrategy::WriteThrough => {
                self.slow
                    .set(key, value.clone(), options)
                    .await
                    .map_err(|e| self.fail(SLOW, e))?;

                if let Err(e) = self.fast.set(key, value, fast_options).await {
                    // A stale fast copy would shadow the new slow entry.
                    warn!(cache = %self.options.name, tier = FAST, error = %e, "Fast tier write failed; dropping stale copy");
                    if let Err(e) = self.fast.delete(key).await {
                        warn!(cache = %self.options.name, tier = FAST, error = %e, "Could not drop stale fast-tier copy");
                    }
                }
            }
            WriteStrategy::WriteBehind => {
                self.fast
                    .set(key, value.clone(), fast_options)
                    .await
                    .map_err(|e| self.fail(FAST, e))?;
                self.propagate(key.clone(), value, options);
            }
        }

        self.stats.record_set();
        self.emit(CacheEvent::Set, FAST);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        self.settle_before_invalidation().await;
        let (fast, slow) = tokio::join!(self.fast.delete(key), self.slow.delete(key));
        let existed = self.either("delete", fast, slow, |fast, slow| fast || slow)?;
        if existed {
            self.stats.record_delete();
        }
        Ok(existed)
    }

    async fn clear(&self, pattern: Option<&ClearPattern>) -> CacheResult<u64> {
        self.settle_before_invalidation().await;
        let (fast, slow) = tokio::join!(self.fast.clear(pattern), self.slow.clear(pattern));
        // Tiers overlap; the larger count is the closest to distinct entries removed.
        let removed = self.either("clear", fast, slow, std::cmp::max)?;
        self.stats.record_deletes(removed);
        Ok(removed)
    }

    async fn has(&self, key: &CacheKey) -> CacheResult<bool> {
        match self.fast.has(key).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => {
                warn!(cache = %self.options.name, tier = FAST, error = %e, "Fast tier check failed; trying slow tier");
            }
        }
        self.slow.has(key).await.map_err(|e| self.fail(SLOW, e))
    }

    fn stats(&self) -> CacheStats {
        let counters = &self.counters;
        let tiers = TierStats {
            fast_hits: counters.fast_hits.load(Ordering::Relaxed),
            slow_hits: counters.slow_hits.load(Ordering::Relaxed),
            promotions: counters.promotions.load(Ordering::Relaxed),
            promotion_failures: counters.promotion_failures.load(Ordering::Relaxed),
            full_misses: counters.full_misses.load(Ordering::Relaxed),
            propagated: counters.propagated.load(Ordering::Relaxed),
            propagation_failures: counters.propagation_failures.load(Ordering::Relaxed),
            pending_propagations: counters.pending.load(Ordering::Relaxed),
            fast: Box::new(self.fast.stats()),
            slow: Box::new(self.slow.stats()),
        };
        self.stats.snapshot().with_tiers(tiers)
    }

    /// Flushes deferred writes, stops the worker, then shuts down both tiers.
    async fn shutdown(&self) -> CacheResult<()> {
        self.flush().await;
        self.stop_propagator().await;
        let (fast, slow) = tokio::join!(self.fast.shutdown(), self.slow.shutdown());
        debug!(cache = %self.options.name, "Tiered cache shut down");
        fast.and(slow)
    }
}

impl<V: CacheValue> std::fmt::Debug for TieredCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("options", &self.options)
            .field("fast", &self.fast.name())
            .field("slow", &self.slow.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::{DistributedCache, DistributedOptions, InMemoryCache, MemoryCacheOptions};
    use strata_core::KeyBuilder;

    fn keys() -> KeyBuilder {
        KeyBuilder::new("test").unwrap()
    }

    fn memory(name: &str) -> Arc<InMemoryCache<String>> {
        Arc::new(InMemoryCache::new(MemoryCacheOptions::unbounded(name)).unwrap())
    }

    fn offline_store() -> (Arc<MemoryStore>, SharedCache<String>) {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let cache: DistributedCache<String, _> =
            DistributedCache::new(store.clone(), DistributedOptions::new("redis", &keys())).unwrap();
        (store, Arc::new(cache))
    }

    fn tiered(
        fast: SharedCache<String>,
        slow: SharedCache<String>,
        options: TieredOptions,
    ) -> TieredCache<String> {
        TieredCache::new(fast, slow, options).unwrap()
    }

    #[test]
    fn test_capped() {
        let s = Duration::from_secs;
        assert_eq!(capped(Some(s(10)), Some(s(5))), Some(s(5)));
        assert_eq!(capped(Some(s(3)), Some(s(5))), Some(s(3)));
        assert_eq!(capped(None, Some(s(5))), Some(s(5)));
        assert_eq!(capped(Some(s(3)), None), Some(s(3)));
        assert_eq!(capped(None, None), None);
    }

    #[tokio::test]
    async fn test_slow_hit_is_promoted() {
        let (fast, slow) = (memory("fast"), memory("slow"));
        let cache = tiered(fast.clone(), slow.clone(), TieredOptions::new("tiered"));
        let key = keys().build("k");
        slow.set(&key, "v".to_string(), SetOptions::ttl(Duration::from_secs(600)))
            .await
            .unwrap();

        assert_eq!(cache.get(&key).await.unwrap().into_value(), Some("v".to_string()));

        let promoted = fast.get(&key).await.unwrap().into_entry().unwrap();
        assert_eq!(promoted.value, "v");
        // Fast copy carries the fast-tier cap, not the slow entry's 600s.
        let remaining = promoted.metadata.remaining_ttl().unwrap();
        assert!(remaining <= Duration::from_secs(60));

        let tiers = cache.stats().tiers.unwrap();
        assert_eq!((tiers.slow_hits, tiers.promotions), (1, 1));

        cache.get(&key).await.unwrap();
        assert_eq!(cache.stats().tiers.unwrap().fast_hits, 1);
    }

    #[tokio::test]
    async fn test_promotion_disabled() {
        let (fast, slow) = (memory("fast"), memory("slow"));
        let cache = tiered(
            fast.clone(),
            slow.clone(),
            TieredOptions::new("tiered").with_promotion(false),
        );
        let key = keys().build("k");
        slow.set(&key, "v".to_string(), SetOptions::default()).await.unwrap();

        assert!(cache.get(&key).await.unwrap().is_hit());
        assert!(!fast.has(&key).await.unwrap());
        assert_eq!(cache.stats().tiers.unwrap().slow_hits_without_promotion(), 1);
    }

    #[tokio::test]
    async fn test_fast_hit_skips_slow_tier() {
        let (fast, slow) = (memory("fast"), memory("slow"));
        let cache = tiered(fast.clone(), slow.clone(), TieredOptions::new("tiered"));
        let key = keys().build("k");
        fast.set(&key, "v".to_string(), SetOptions::default()).await.unwrap();

        assert!(cache.get(&key).await.unwrap().is_hit());
        let slow_stats = slow.stats();
        assert_eq!(slow_stats.hits + slow_stats.misses, 0);
    }

    #[tokio::test]
    async fn test_full_miss() {
        let cache = tiered(memory("fast"), memory("slow"), TieredOptions::new("tiered"));
        assert!(cache.get(&keys().build("absent")).await.unwrap().is_miss());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.tiers.unwrap().full_misses, 1);
    }

    #[tokio::test]
    async fn test_write_through_writes_both_tiers() {
        let (fast, slow) = (memory("fast"), memory("slow"));
        let cache = tiered(fast.clone(), slow.clone(), TieredOptions::new("tiered"));
        let key = keys().build("k");

        cache.set(&key, "v".to_string(), SetOptions::default()).await.unwrap();

        assert!(fast.has(&key).await.unwrap());
        assert!(slow.has(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_through_fails_when_slow_tier_fails() {
        let fast = memory("fast");
        let (_store, slow) = offline_store();
        let cache = tiered(fast.clone(), slow, TieredOptions::new("tiered"));
        let key = keys().build("k");

        let result = cache.set(&key, "v".to_string(), SetOptions::default()).await;
        assert!(matches!(result, Err(CacheError::BackendUnavailable { .. })));
        assert!(!fast.has(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_behind_propagates() {
        let (fast, slow) = (memory("fast"), memory("slow"));
        let cache = tiered(
            fast.clone(),
            slow.clone(),
            TieredOptions::new("tiered").with_write_strategy(WriteStrategy::WriteBehind),
        );
        let key = keys().build("k");

        cache.set(&key, "v".to_string(), SetOptions::default()).await.unwrap();
        assert!(fast.has(&key).await.unwrap());

        cache.flush().await;
        assert!(slow.has(&key).await.unwrap());

        let tiers = cache.stats().tiers.unwrap();
        assert_eq!(tiers.propagated, 1);
        assert_eq!(tiers.pending_propagations, 0);
    }

    #[tokio::test]
    async fn test_write_behind_failure_is_recorded() {
        let fast = memory("fast");
        let (_store, slow) = offline_store();
        let cache = tiered(
            fast,
            slow,
            TieredOptions::new("tiered").with_write_strategy(WriteStrategy::WriteBehind),
        );

        cache
            .set(&keys().build("k"), "v".to_string(), SetOptions::default())
            .await
            .unwrap();
        cache.shutdown().await.unwrap();

        let tiers = cache.stats().tiers.unwrap();
        assert_eq!(tiers.propagated, 0);
        assert_eq!(tiers.propagation_failures, 1);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_and_stops_tier_sweepers() {
        let fast = Arc::new(
            InMemoryCache::new(
                MemoryCacheOptions::unbounded("fast").with_sweep_interval(Duration::from_millis(10)),
            )
            .unwrap(),
        );
        fast.start_sweeper().unwrap();
        let slow = memory("slow");
        let cache = tiered(
            fast.clone(),
            slow.clone(),
            TieredOptions::new("tiered").with_write_strategy(WriteStrategy::WriteBehind),
        );
        let key = keys().build("k");

        cache.set(&key, "v".to_string(), SetOptions::default()).await.unwrap();
        cache.shutdown().await.unwrap();

        assert!(slow.has(&key).await.unwrap());
        assert!(!fast.sweeper_running());

        // A write after shutdown starts a fresh worker.
        cache.set(&key, "w".to_string(), SetOptions::default()).await.unwrap();
        cache.flush().await;
        assert_eq!(slow.get(&key).await.unwrap().into_value(), Some("w".to_string()));
    }

    #[tokio::test]
    async fn test_delete_succeeds_when_one_tier_fails() {
        let fast = memory("fast");
        let (_store, slow) = offline_store();
        let cache = tiered(fast.clone(), slow, TieredOptions::new("tiered"));
        let key = keys().build("k");
        fast.set(&key, "v".to_string(), SetOptions::default()).await.unwrap();

        assert!(cache.delete(&key).await.unwrap());
        assert!(!fast.has(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_fails_when_both_tiers_fail() {
        let (_a, fast) = offline_store();
        let (_b, slow) = offline_store();
        let cache = tiered(fast, slow, TieredOptions::new("tiered"));

        assert!(cache.delete(&keys().build("k")).await.is_err());
        assert_eq!(cache.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_clear_applies_to_both_tiers() {
        let (fast, slow) = (memory("fast"), memory("slow"));
        let cache = tiered(fast.clone(), slow.clone(), TieredOptions::new("tiered"));
        let builder = keys();

        cache.set(&builder.build("a"), "a".to_string(), SetOptions::default()).await.unwrap();
        slow.set(&builder.build("b"), "b".to_string(), SetOptions::default()).await.unwrap();

        assert_eq!(cache.clear(None).await.unwrap(), 2);
        assert!(fast.is_empty());
        assert!(slow.is_empty());
    }
}
