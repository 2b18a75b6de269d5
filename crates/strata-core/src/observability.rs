//! Observability sink for cache events.
//!
//! Adapters call [`ObservabilitySink::emit`] on every hit, miss, set, delete,
//! eviction, expiry and error. Attributes are cardinality-safe: cache name,
//! tier and error kind only, never raw keys.

use crate::FailureKind;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Metric names emitted by [`MetricsSink`].
pub mod names {
    /// Total hits.
    pub const HITS_TOTAL: &str = "strata_cache_hits_total";
    /// Total misses.
    pub const MISSES_TOTAL: &str = "strata_cache_misses_total";
    /// Total writes.
    pub const SETS_TOTAL: &str = "strata_cache_sets_total";
    /// Total deletions (single, pattern, or clear).
    pub const DELETES_TOTAL: &str = "strata_cache_deletes_total";
    /// Total capacity evictions.
    pub const EVICTIONS_TOTAL: &str = "strata_cache_evictions_total";
    /// Total TTL expirations.
    pub const EXPIRATIONS_TOTAL: &str = "strata_cache_expirations_total";
    /// Total promotions into a faster tier.
    pub const PROMOTIONS_TOTAL: &str = "strata_cache_promotions_total";
    /// Total failures.
    pub const ERRORS_TOTAL: &str = "strata_cache_errors_total";
    /// Backend call duration in seconds.
    pub const BACKEND_DURATION_SECONDS: &str = "strata_cache_backend_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::HITS_TOTAL, "Total number of cache hits");
    describe_counter!(names::MISSES_TOTAL, "Total number of cache misses");
    describe_counter!(names::SETS_TOTAL, "Total number of cache writes");
    describe_counter!(names::DELETES_TOTAL, "Total number of entries deleted");
    describe_counter!(names::EVICTIONS_TOTAL, "Total number of capacity evictions");
    describe_counter!(names::EXPIRATIONS_TOTAL, "Total number of expired entries removed");
    describe_counter!(names::PROMOTIONS_TOTAL, "Total number of slow-tier hits promoted");
    describe_counter!(names::ERRORS_TOTAL, "Total number of failed cache operations");
    describe_histogram!(
        names::BACKEND_DURATION_SECONDS,
        "Distributed backend call duration in seconds"
    );
}

/// Cache event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEvent {
    Hit,
    Miss,
    Set,
    Delete,
    Evict,
    Expire,
    Promote,
    Error,
}

impl CacheEvent {
    /// Event name as emitted.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Set => "set",
            Self::Delete => "delete",
            Self::Evict => "evict",
            Self::Expire => "expire",
            Self::Promote => "promote",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Low-cardinality attributes attached to an event.
#[derive(Debug, Clone, Copy)]
pub struct EventAttributes<'a> {
    /// Cache instance name.
    pub cache: &'a str,
    /// Tier label for multi-tier caches.
    pub tier: Option<&'static str>,
    /// Failure kind for error events.
    pub error: Option<FailureKind>,
    /// Number of entries the event covers.
    pub count: u64,
    /// Backend call duration.
    pub elapsed: Option<Duration>,
}

impl<'a> EventAttributes<'a> {
    /// Attributes for a single-entry event.
    #[must_use]
    pub const fn new(cache: &'a str) -> Self {
        Self {
            cache,
            tier: None,
            error: None,
            count: 1,
            elapsed: None,
        }
    }

    #[must_use]
    pub const fn tier(mut self, tier: &'static str) -> Self {
        self.tier = Some(tier);
        self
    }

    #[must_use]
    pub const fn error(mut self, kind: FailureKind) -> Self {
        self.error = Some(kind);
        self
    }

    #[must_use]
    pub const fn count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    #[must_use]
    pub const fn elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }
}

/// Receives cache events.
pub trait ObservabilitySink: Send + Sync {
    /// Records one event.
    fn emit(&self, event: CacheEvent, attributes: &EventAttributes<'_>);
}

/// Shared sink handle.
pub type SharedSink = Arc<dyn ObservabilitySink>;

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ObservabilitySink for NoopSink {
    fn emit(&self, _event: CacheEvent, _attributes: &EventAttributes<'_>) {}
}

/// Logs every event at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn emit(&self, event: CacheEvent, attributes: &EventAttributes<'_>) {
        debug!(
            event = %event,
            cache = %attributes.cache,
            tier = attributes.tier.unwrap_or("-"),
            error_kind = attributes.error.map_or("-", |kind| kind.as_str()),
            count = attributes.count,
            "cache event"
        );
    }
}

/// Forwards events to the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSink;

impl ObservabilitySink for MetricsSink {
    fn emit(&self, event: CacheEvent, attributes: &EventAttributes<'_>) {
        let cache = attributes.cache.to_string();
        let tier = attributes.tier.unwrap_or("single");

        let name = match event {
            CacheEvent::Hit => names::HITS_TOTAL,
            CacheEvent::Miss => names::MISSES_TOTAL,
            CacheEvent::Set => names::SETS_TOTAL,
            CacheEvent::Delete => names::DELETES_TOTAL,
            CacheEvent::Evict => names::EVICTIONS_TOTAL,
            CacheEvent::Expire => names::EXPIRATIONS_TOTAL,
            CacheEvent::Promote => names::PROMOTIONS_TOTAL,
            CacheEvent::Error => {
                let kind = attributes.error.map_or("unknown", |kind| kind.as_str());
                counter!(
                    names::ERRORS_TOTAL,
                    "cache" => cache,
                    "tier" => tier,
                    "error_kind" => kind
                )
                .increment(attributes.count);
                return;
            }
        };

        counter!(name, "cache" => cache.clone(), "tier" => tier).increment(attributes.count);

        if let Some(elapsed) = attributes.elapsed {
            histogram!(
                names::BACKEND_DURATION_SECONDS,
                "cache" => cache,
                "event" => event.as_str()
            )
            .record(elapsed.as_secs_f64());
        }
    }
}

/// Fans one event out to several sinks.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl FanoutSink {
    /// Creates an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    #[must_use]
    pub fn with(mut self, sink: SharedSink) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ObservabilitySink for FanoutSink {
    fn emit(&self, event: CacheEvent, attributes: &EventAttributes<'_>) {
        for sink in &self.sinks {
            sink.emit(event, attributes);
        }
    }
}

impl fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
