//! Configuration structures.

use crate::{Topology, WriteStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strata_core::TelemetryConfig;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    /// Which adapter stack to build.
    #[serde(default)]
    pub topology: Topology,

    /// Log output.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Key construction.
    #[serde(default)]
    pub keys: KeyConfig,

    /// In-process adapter.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Redis-backed distributed adapter.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Multi-tier composition.
    #[serde(default)]
    pub tiered: TieredConfig,

    /// Failure guards around backend calls.
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Near-duplicate key collapsing.
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Per-entry cost accounting.
    #[serde(default)]
    pub usage: UsageConfig,
}

/// Key builder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Prefix applied to every key.
    pub namespace: String,
    /// Separator between namespace and key body.
    pub separator: String,
    /// Keys longer than this are replaced by a hash.
    pub max_length: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            namespace: "strata".to_string(),
            separator: ":".to_string(),
            max_length: 250,
        }
    }
}

/// In-process adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum live entries (`None` = unbounded by count).
    pub max_entries: Option<usize>,
    /// Maximum estimated bytes (`None` = unbounded by size).
    pub max_bytes: Option<usize>,
    /// TTL applied when a write carries none (`None` = no expiry).
    pub default_ttl_secs: Option<u64>,
    /// Background expiry sweep interval in milliseconds (0 disables it).
    pub sweep_interval_ms: u64,
    /// When false, writes beyond capacity fail instead of evicting.
    pub eviction_enabled: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: Some(10_000),
            max_bytes: None,
            default_ttl_secs: Some(300),
            sweep_interval_ms: 1_000,
            eviction_enabled: true,
        }
    }
}

impl MemoryConfig {
    /// Returns the default TTL as a Duration.
    #[must_use]
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    /// Returns the sweep interval, or `None` when sweeping is disabled.
    #[must_use]
    pub const fn sweep_interval(&self) -> Option<Duration> {
        if self.sweep_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.sweep_interval_ms))
        }
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL.
    pub url: String,
    /// Connection pool size.
    pub pool_size: usize,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Upper bound on every backend call in milliseconds.
    pub operation_timeout_ms: u64,
    /// TTL applied when a write carries none (`None` = no expiry).
    pub default_ttl_secs: Option<u64>,
    /// `COUNT` hint for each `SCAN` round trip.
    pub scan_count: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            connect_timeout_secs: 5,
            operation_timeout_ms: 250,
            default_ttl_secs: Some(3_600),
            scan_count: 500,
        }
    }
}

impl RedisConfig {
    /// Returns the connect timeout as a Duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the per-operation timeout as a Duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Returns the default TTL as a Duration.
    #[must_use]
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }
}

/// Multi-tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TieredConfig {
    /// Copy slow-tier hits into the fast tier.
    pub promote_on_hit: bool,
    /// TTL cap for entries written to the fast tier.
    pub fast_ttl_secs: Option<u64>,
    /// Slow-tier write propagation.
    pub write_strategy: WriteStrategy,
}

impl Default for TieredConfig {
    fn default() -> Self {
        Self {
            promote_on_hit: true,
            fast_ttl_secs: Some(60),
            write_strategy: WriteStrategy::WriteThrough,
        }
    }
}

impl TieredConfig {
    /// Returns the fast-tier TTL cap as a Duration.
    #[must_use]
    pub fn fast_ttl(&self) -> Option<Duration> {
        self.fast_ttl_secs.map(Duration::from_secs)
    }
}

/// Failure guard configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    /// Consecutive failures before opening.
    pub failure_threshold: u64,
    /// Successes in half-open before closing.
    pub success_threshold: u64,
    /// Seconds to stay open before probing.
    pub open_timeout_secs: u64,
    /// Probe calls allowed while half-open.
    pub half_open_requests: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 3,
            open_timeout_secs: 30,
            half_open_requests: 3,
        }
    }
}

/// Retry settings. Disabled by default: retrying is the caller's choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 3,
            initial_delay_ms: 50,
            max_delay_ms: 1_000,
            multiplier: 2.0,
        }
    }
}

/// Backend call rate limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub requests_per_second: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 1_000,
        }
    }
}

/// Near-duplicate key collapsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub enabled: bool,
    /// Maximum keys remembered by the similarity index.
    pub index_capacity: usize,
    /// Minimum token similarity (0.0..=1.0) to treat two keys as one.
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            index_capacity: 10_000,
            similarity_threshold: 0.9,
        }
    }
}

/// Per-entry cost accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    pub enabled: bool,
    /// Maximum entries tracked by the usage index.
    pub index_capacity: usize,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            index_capacity: 10_000,
        }
    }
}
