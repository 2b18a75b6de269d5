//! Per-instance hit/miss/eviction/error counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters owned by one cache instance.
#[derive(Debug, Default)]
pub struct StatsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    errors: AtomicU64,
}

impl StatsCollector {
    /// Creates a collector with every counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes an immutable point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            entries: None,
            bytes: None,
            tiers: None,
        }
    }
}

/// Point-in-time statistics. Never mutated after being returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub errors: u64,
    /// Live entries, when the adapter can count them cheaply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<u64>,
    /// Estimated live bytes, when the adapter tracks them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    /// Tier breakdown for multi-tier caches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiers: Option<TierStats>,
}

impl CacheStats {
    /// Total lookups counted in hit rate.
    #[must_use]
    pub const fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hits divided by lookups, or 0.0 before the first lookup.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }

    #[must_use]
    pub fn with_entries(mut self, entries: u64) -> Self {
        self.entries = Some(entries);
        self
    }

    #[must_use]
    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = Some(bytes);
        self
    }

    #[must_use]
    pub fn with_tiers(mut self, tiers: TierStats) -> Self {
        self.tiers = Some(tiers);
        self
    }
}

/// Where lookups were answered in a two-tier cache, plus write-behind health.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierStats {
    pub fast_hits: u64,
    pub slow_hits: u64,
    /// Slow-tier hits copied into the fast tier.
    pub promotions: u64,
    /// Promotion attempts that failed (the hit was still returned).
    pub promotion_failures: u64,
    pub full_misses: u64,
    /// Deferred slow-tier writes that succeeded.
    pub propagated: u64,
    /// Deferred slow-tier writes that failed.
    pub propagation_failures: u64,
    /// Deferred slow-tier writes still in flight.
    pub pending_propagations: u64,
    pub fast: Box<CacheStats>,
    pub slow: Box<CacheStats>,
}

impl TierStats {
    /// Slow-tier hits that were not promoted.
    #[must_use]
    pub const fn slow_hits_without_promotion(&self) -> u64 {
        self.slow_hits.saturating_sub(self.promotions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = StatsCollector::new();
        assert_eq!(stats.snapshot().hit_rate(), 0.0);

        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.lookups(), 4);
        assert!((snapshot.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let stats = StatsCollector::new();
        stats.record_set();
        let before = stats.snapshot();
        stats.record_set();

        assert_eq!(before.sets, 1);
        assert_eq!(stats.snapshot().sets, 2);
    }

    #[test]
    fn test_counters() {
        let stats = StatsCollector::new();
        stats.record_eviction();
        stats.record_expirations(3);
        stats.record_deletes(2);
        stats.record_delete();
        stats.record_error();

        let snapshot = stats.snapshot().with_entries(5).with_bytes(128);
        assert_eq!(snapshot.evictions, 1);
        assert_eq!(snapshot.expirations, 3);
        assert_eq!(snapshot.deletes, 3);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.entries, Some(5));
        assert_eq!(snapshot.bytes, Some(128));
    }

    #[test]
    fn test_slow_hits_without_promotion() {
        let tiers = TierStats {
            slow_hits: 5,
            promotions: 3,
            ..Default::default()
        };
        assert_eq!(tiers.slow_hits_without_promotion(), 2);
    }
}
