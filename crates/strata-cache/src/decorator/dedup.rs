//! Collapses near-duplicate keys onto one underlying entry.
//!
//! A key normalizes to its alphanumeric runs, in order and with case kept, so
//! only separators and punctuation are forgiven. Two keys with the same
//! normalized form are the same entry. Otherwise the indexed key whose
//! adjacent-token pairs overlap most (Jaccard) wins, if it reaches the
//! threshold. A threshold of 1.0 accepts only the same normalized form.

use crate::{Cache, SharedCache};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_config::DedupConfig;
use strata_core::{
    CacheError, CacheKey, CacheResult, CacheStats, CacheValue, ClearPattern, Lookup, SetOptions,
};
use tracing::trace;

fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect()
}

fn fingerprint(tokens: &[&str]) -> String {
    tokens.join(" ")
}

/// Adjacent token pairs; a single token stands for itself.
fn shingles(tokens: &[&str]) -> BTreeSet<String> {
    if tokens.len() < 2 {
        return tokens.iter().map(|token| (*token).to_string()).collect();
    }
    tokens.windows(2).map(|pair| pair.join(" ")).collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

struct Indexed {
    key: CacheKey,
    shingles: BTreeSet<String>,
}

/// Bounded map from normalized keys to the canonical key that owns them.
///
/// Least recently used fingerprints are forgotten first. Forgetting one only
/// means a later near-duplicate gets its own entry.
pub struct SimilarityIndex {
    threshold: f64,
    entries: Mutex<LruCache<String, Indexed>>,
    evictions: AtomicU64,
}

impl SimilarityIndex {
    pub fn new(capacity: usize, threshold: f64) -> CacheResult<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            CacheError::configuration("similarity index capacity must be greater than zero")
        })?;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(CacheError::configuration(format!(
                "similarity threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        Ok(Self {
            threshold,
            entries: Mutex::new(LruCache::new(capacity)),
            evictions: AtomicU64::new(0),
        })
    }

    /// Finds the canonical key for `key`, if one is indexed.
    pub fn resolve(&self, key: &CacheKey) -> Option<CacheKey> {
        let tokens = tokenize(key.as_str());
        let exact = fingerprint(&tokens);
        let mut entries = self.entries.lock();

        if let Some(indexed) = entries.get(&exact) {
            return Some(indexed.key.clone());
        }
        if self.threshold >= 1.0 {
            return None;
        }

        let candidate = shingles(&tokens);
        let best = entries
            .iter()
            .map(|(print, indexed)| (print, jaccard(&candidate, &indexed.shingles)))
            .filter(|(_, score)| *score >= self.threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(print, _)| print.clone())?;

        entries.get(&best).map(|indexed| indexed.key.clone())
    }

    /// Resolves `key`, registering it as canonical when nothing matches.
    pub fn resolve_or_insert(&self, key: &CacheKey) -> CacheKey {
        if let Some(canonical) = self.resolve(key) {
            return canonical;
        }
        let tokens = tokenize(key.as_str());
        let print = fingerprint(&tokens);
        let displaced = self.entries.lock().push(
            print.clone(),
            Indexed {
                key: key.clone(),
                shingles: shingles(&tokens),
            },
        );
        if displaced.is_some_and(|(old, _)| old != print) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        key.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    /// Fingerprints dropped to stay within capacity.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl std::fmt::Debug for SimilarityIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityIndex")
            .field("threshold", &self.threshold)
            .field("len", &self.len())
            .finish()
    }
}

/// Dedup counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupStats {
    /// Reads answered from another key's entry.
    pub collapsed_reads: u64,
    /// Writes stored under another key's entry.
    pub collapsed_writes: u64,
    pub indexed_keys: u64,
    pub index_evictions: u64,
}

/// Decorator that maps near-duplicate keys onto one entry of the wrapped cache.
///
/// Only `get`, `set` and their batch forms consult the index; every other
/// operation reaches the wrapped cache with the key as given.
pub struct DedupCache<V, C = SharedCache<V>> {
    inner: C,
    index: SimilarityIndex,
    collapsed_reads: AtomicU64,
    collapsed_writes: AtomicU64,
    _value: PhantomData<fn() -> V>,
}

impl<V, C> DedupCache<V, C>
where
    V: CacheValue,
    C: Cache<V>,
{
    pub fn new(inner: C, index: SimilarityIndex) -> Self {
        Self {
            inner,
            index,
            collapsed_reads: AtomicU64::new(0),
            collapsed_writes: AtomicU64::new(0),
            _value: PhantomData,
        }
    }

    pub fn from_config(inner: C, config: &DedupConfig) -> CacheResult<Self> {
        let index = SimilarityIndex::new(config.index_capacity, config.similarity_threshold)?;
        Ok(Self::new(inner, index))
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    pub fn dedup_stats(&self) -> DedupStats {
        DedupStats {
            collapsed_reads: self.collapsed_reads.load(Ordering::Relaxed),
            collapsed_writes: self.collapsed_writes.load(Ordering::Relaxed),
            indexed_keys: self.index.len() as u64,
            index_evictions: self.index.evictions(),
        }
    }

    fn read_key(&self, key: &CacheKey) -> CacheKey {
        match self.index.resolve(key) {
            Some(canonical) if canonical != *key => {
                self.collapsed_reads.fetch_add(1, Ordering::Relaxed);
                trace!(cache = %self.inner.name(), "Read collapsed onto canonical key");
                canonical
            }
            _ => key.clone(),
        }
    }

    fn write_key(&self, key: &CacheKey) -> CacheKey {
        let canonical = self.index.resolve_or_insert(key);
        if canonical != *key {
            self.collapsed_writes.fetch_add(1, Ordering::Relaxed);
            trace!(cache = %self.inner.name(), "Write collapsed onto canonical key");
        }
        canonical
    }
}

#[async_trait]
impl<V, C> Cache<V> for DedupCache<V, C>
where
    V: CacheValue,
    C: Cache<V>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &CacheKey) -> CacheResult<Lookup<V>> {
        let key = self.read_key(key);
        self.inner.get(&key).await
    }

    async fn set(&self, key: &CacheKey, value: V, options: SetOptions) -> CacheResult<()> {
        let key = self.write_key(key);
        self.inner.set(&key, value, options).await
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        self.inner.delete(key).await
    }

    async fn clear(&self, pattern: Option<&ClearPattern>) -> CacheResult<u64> {
        self.inner.clear(pattern).await
    }

    async fn has(&self, key: &CacheKey) -> CacheResult<bool> {
        self.inner.has(key).await
    }

    async fn get_many(&self, keys: &[CacheKey]) -> CacheResult<Vec<Lookup<V>>> {
        let keys: Vec<CacheKey> = keys.iter().map(|key| self.read_key(key)).collect();
        self.inner.get_many(&keys).await
    }

    async fn set_many(&self, entries: Vec<(CacheKey, V, SetOptions)>) -> CacheResult<()> {
        let entries = entries
            .into_iter()
            .map(|(key, value, options)| (self.write_key(&key), value, options))
            .collect();
        self.inner.set_many(entries).await
    }

    fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    async fn shutdown(&self) -> CacheResult<()> {
        self.inner.shutdown().await
    }
}
