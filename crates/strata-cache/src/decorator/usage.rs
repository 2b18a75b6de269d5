//! Per-entry cost accounting.
//!
//! Each stored value is tallied with a caller-defined cost (bytes, tokens,
//! milliseconds of origin latency, whatever the caller pays to produce it).
//! Every hit then counts as that cost saved.

use crate::{Cache, SharedCache};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_config::UsageConfig;
use strata_core::{
    CacheError, CacheKey, CacheResult, CacheStats, CacheValue, ClearPattern, Lookup, SetOptions,
    SizeEstimator,
};

/// Cost of producing a value.
pub type CostFn<V> = Arc<dyn Fn(&V) -> u64 + Send + Sync>;

#[derive(Debug, Clone)]
struct UsageRecord {
    cost: u64,
    hits: u64,
    tags: BTreeSet<String>,
}

/// Usage of one tracked entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUsage {
    pub key: String,
    pub cost: u64,
    pub hits: u64,
    pub saved: u64,
}

/// Point-in-time usage snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    /// Entries currently tracked (bounded by the index capacity).
    pub tracked_entries: u64,
    /// Cost of every value ever stored through this cache.
    pub total_cost_stored: u64,
    /// Cost of every value ever served from this cache.
    pub total_cost_saved: u64,
    /// Hits on entries no longer (or never) tracked.
    pub untracked_hits: u64,
    /// Saved cost of tracked entries grouped by tag.
    pub saved_by_tag: BTreeMap<String, u64>,
    /// Tracked entries with the highest saved cost, most first.
    pub top_entries: Vec<EntryUsage>,
}

/// Decorator that tallies the cost stored in and saved by the wrapped cache.
pub struct UsageTrackingCache<V, C = SharedCache<V>> {
    inner: C,
    cost: CostFn<V>,
    records: Mutex<LruCache<String, UsageRecord>>,
    total_stored: AtomicU64,
    total_saved: AtomicU64,
    untracked_hits: AtomicU64,
    top: usize,
    _value: PhantomData<fn() -> V>,
}

impl<V, C> UsageTrackingCache<V, C>
where
    V: CacheValue,
    C: Cache<V>,
{
    /// Entries listed in [`UsageReport::top_entries`] by default.
    pub const DEFAULT_TOP: usize = 10;

    pub fn new(inner: C, capacity: usize, cost: CostFn<V>) -> CacheResult<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            CacheError::configuration("usage index capacity must be greater than zero")
        })?;
        Ok(Self {
            inner,
            cost,
            records: Mutex::new(LruCache::new(capacity)),
            total_stored: AtomicU64::new(0),
            total_saved: AtomicU64::new(0),
            untracked_hits: AtomicU64::new(0),
            top: Self::DEFAULT_TOP,
            _value: PhantomData,
        })
    }

    /// Tracks serialized size as the cost.
    pub fn from_config(inner: C, config: &UsageConfig) -> CacheResult<Self> {
        let estimator = SizeEstimator::<V>::serialized();
        Self::new(
            inner,
            config.index_capacity,
            Arc::new(move |value: &V| estimator.estimate(value) as u64),
        )
    }

    #[must_use]
    pub fn with_top(mut self, top: usize) -> Self {
        self.top = top;
        self
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn usage_report(&self) -> UsageReport {
        let records = self.records.lock();
        let mut saved_by_tag = BTreeMap::new();
        let mut entries: Vec<EntryUsage> = records
            .iter()
            .map(|(key, record)| {
                let saved = record.cost.saturating_mul(record.hits);
                for tag in &record.tags {
                    *saved_by_tag.entry(tag.clone()).or_insert(0u64) += saved;
                }
                EntryUsage {
                    key: key.clone(),
                    cost: record.cost,
                    hits: record.hits,
                    saved,
                }
            })
            .collect();
        entries.sort_by(|a, b| b.saved.cmp(&a.saved).then_with(|| a.key.cmp(&b.key)));
        entries.truncate(self.top);

        UsageReport {
            tracked_entries: records.len() as u64,
            total_cost_stored: self.total_stored.load(Ordering::Relaxed),
            total_cost_saved: self.total_saved.load(Ordering::Relaxed),
            untracked_hits: self.untracked_hits.load(Ordering::Relaxed),
            saved_by_tag,
            top_entries: entries,
        }
    }

    fn record_store(&self, key: &CacheKey, cost: u64, tags: BTreeSet<String>) {
        self.total_stored.fetch_add(cost, Ordering::Relaxed);
        self.records.lock().put(
            key.as_str().to_string(),
            UsageRecord {
                cost,
                hits: 0,
                tags,
            },
        );
    }

    fn record_lookup(&self, key: &CacheKey, lookup: &Lookup<V>) {
        if lookup.is_miss() {
            return;
        }
        let mut records = self.records.lock();
        match records.get_mut(key.as_str()) {
            Some(record) => {
                record.hits += 1;
                self.total_saved.fetch_add(record.cost, Ordering::Relaxed);
            }
            None => {
                self.untracked_hits.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn forget(&self, key: &CacheKey) {
        self.records.lock().pop(key.as_str());
    }
}

#[async_trait]
impl<V, C> Cache<V> for UsageTrackingCache<V, C>
where
    V: CacheValue,
    C: Cache<V>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &CacheKey) -> CacheResult<Lookup<V>> {
        let lookup = self.inner.get(key).await?;
        self.record_lookup(key, &lookup);
        Ok(lookup)
    }

    async fn set(&self, key: &CacheKey, value: V, options: SetOptions) -> CacheResult<()> {
        let cost = (self.cost)(&value);
        let tags = options.tags.clone();
        self.inner.set(key, value, options).await?;
        self.record_store(key, cost, tags);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        let existed = self.inner.delete(key).await?;
        self.forget(key);
        Ok(existed)
    }

    async fn clear(&self, pattern: Option<&ClearPattern>) -> CacheResult<u64> {
        let removed = self.inner.clear(pattern).await?;
        let mut records = self.records.lock();
        match pattern {
            None => records.clear(),
            Some(pattern) => {
                let doomed: Vec<String> = records
                    .iter()
                    .filter(|(key, record)| pattern.matches(key, &record.tags))
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in doomed {
                    records.pop(&key);
                }
            }
        }
        Ok(removed)
    }

    async fn has(&self, key: &CacheKey) -> CacheResult<bool> {
        self.inner.has(key).await
    }

    async fn get_many(&self, keys: &[CacheKey]) -> CacheResult<Vec<Lookup<V>>> {
        let lookups = self.inner.get_many(keys).await?;
        for (key, lookup) in keys.iter().zip(&lookups) {
            self.record_lookup(key, lookup);
        }
        Ok(lookups)
    }

    async fn set_many(&self, entries: Vec<(CacheKey, V, SetOptions)>) -> CacheResult<()> {
        let accounted: Vec<(CacheKey, u64, BTreeSet<String>)> = entries
            .iter()
            .map(|(key, value, options)| (key.clone(), (self.cost)(value), options.tags.clone()))
            .collect();
        self.inner.set_many(entries).await?;
        for (key, cost, tags) in accounted {
            self.record_store(&key, cost, tags);
        }
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    async fn shutdown(&self) -> CacheResult<()> {
        self.inner.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryCache, MemoryCacheOptions};
    use strata_core::KeyBuilder;

    fn usage(capacity: usize) -> UsageTrackingCache<String, Arc<InMemoryCache<String>>> {
        let inner = Arc::new(InMemoryCache::new(MemoryCacheOptions::unbounded("memory")).unwrap());
        UsageTrackingCache::new(inner, capacity, Arc::new(|value: &String| value.len() as u64)).unwrap()
    }

    #[tokio::test]
    async fn test_hits_accumulate_saved_cost() {
        let cache = usage(16);
        let builder = KeyBuilder::new("llm").unwrap();
        let key = builder.build("prompt:1");

        cache
            .set(&key, "x".repeat(100), SetOptions::default().with_tag("chat"))
            .await
            .unwrap();
        for _ in 0..3 {
            assert!(cache.get(&key).await.unwrap().is_hit());
        }
        assert!(cache.get(&builder.build("prompt:2")).await.unwrap().is_miss());

        let report = cache.usage_report();
        assert_eq!(report.total_cost_stored, 100);
        assert_eq!(report.total_cost_saved, 300);
        assert_eq!(report.saved_by_tag.get("chat"), Some(&300));
        assert_eq!(report.top_entries[0].hits, 3);
    }

    #[tokio::test]
    async fn test_index_is_bounded() {
        let cache = usage(2);
        let builder = KeyBuilder::new("llm").unwrap();

        for i in 0..5 {
            cache
                .set(&builder.build(&format!("p:{}", i)), "v".to_string(), SetOptions::default())
                .await
                .unwrap();
        }
        assert_eq!(cache.usage_report().tracked_entries, 2);

        // The wrapped cache still holds all five; hits on forgotten keys count as untracked.
        assert!(cache.get(&builder.build("p:0")).await.unwrap().is_hit());
        let report = cache.usage_report();
        assert_eq!(report.untracked_hits, 1);
        assert_eq!(report.total_cost_stored, 5);
    }

    #[tokio::test]
    async fn test_delete_and_clear_forget_records() {
        let cache = usage(16);
        let builder = KeyBuilder::new("llm").unwrap();

        cache.set(&builder.build("a"), "1".to_string(), SetOptions::default()).await.unwrap();
        cache
            .set(&builder.build("b"), "2".to_string(), SetOptions::default().with_tag("t"))
            .await
            .unwrap();
        cache.set(&builder.build("c"), "3".to_string(), SetOptions::default()).await.unwrap();

        assert!(cache.delete(&builder.build("a")).await.unwrap());
        assert_eq!(cache.clear(Some(&ClearPattern::tag("t").unwrap())).await.unwrap(), 1);

        let report = cache.usage_report();
        assert_eq!(report.tracked_entries, 1);
        assert_eq!(report.top_entries[0].key, "llm:c");
    }

    #[tokio::test]
    async fn test_top_entries_ordering() {
        let cache = usage(16).with_top(1);
        let builder = KeyBuilder::new("llm").unwrap();
        let (cheap, pricey) = (builder.build("cheap"), builder.build("pricey"));

        cache.set(&cheap, "a".to_string(), SetOptions::default()).await.unwrap();
        cache.set(&pricey, "a".repeat(50), SetOptions::default()).await.unwrap();
        cache.get(&cheap).await.unwrap();
        cache.get(&pricey).await.unwrap();

        let report = cache.usage_report();
        assert_eq!(report.top_entries.len(), 1);
        assert_eq!(report.top_entries[0].key, "llm:pricey");
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let inner = Arc::new(InMemoryCache::<String>::new(MemoryCacheOptions::unbounded("m")).unwrap());
        let result = UsageTrackingCache::new(inner, 0, Arc::new(|_: &String| 1u64));
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }
}
