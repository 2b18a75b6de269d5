//! Cache entries, their metadata, and lookup outcomes.

use crate::{CacheError, CacheResult, FailureKind};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Schema version recorded when the caller does not supply one.
pub const DEFAULT_VERSION: &str = "1";

/// Shortest TTL an entry can carry; keeps `expires_at` strictly after `cached_at`.
pub const MIN_TTL: Duration = Duration::from_millis(1);

/// Values storable in any adapter.
///
/// Every tier boundary copies or serializes the value, so it must be both
/// `Clone` and serde round-trippable.
pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Metadata stored alongside every value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    cached_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

impl CacheMetadata {
    /// Creates metadata for an entry cached at `cached_at`.
    ///
    /// TTLs shorter than [`MIN_TTL`] are raised to it. A TTL too large to be
    /// represented as a timestamp yields an entry without expiry.
    #[must_use]
    pub fn new(cached_at: DateTime<Utc>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.and_then(|ttl| {
            let ttl = ttl.max(MIN_TTL);
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|delta| cached_at.checked_add_signed(delta))
        });

        Self {
            cached_at,
            expires_at,
            version: default_version(),
            tags: BTreeSet::new(),
            size: None,
        }
    }

    /// Creates metadata for an entry cached now, applying the given options.
    #[must_use]
    pub fn from_options(options: &SetOptions, default_ttl: Option<Duration>) -> Self {
        let mut metadata = Self::new(Utc::now(), options.ttl.or(default_ttl));
        if let Some(version) = &options.version {
            metadata.version.clone_from(version);
        }
        metadata.tags.clone_from(&options.tags);
        metadata
    }

    /// Sets the estimated byte footprint.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Creation time.
    #[must_use]
    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    /// Expiry time, if any.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Schema version tag.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Tags used for bulk invalidation.
    #[must_use]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Estimated byte footprint, if known.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Returns true if the entry is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Returns true if the entry is expired now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Time left before expiry at `now`.
    ///
    /// `None` means the entry never expires; `Some(Duration::ZERO)` means it
    /// already has.
    #[must_use]
    pub fn remaining_ttl_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| (expires_at - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Time left before expiry, measured now.
    #[must_use]
    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.remaining_ttl_at(Utc::now())
    }

    /// Checks the `expires_at > cached_at` invariant.
    ///
    /// Used on metadata decoded from an external store, which this process did
    /// not construct.
    pub fn validate(&self) -> CacheResult<()> {
        match self.expires_at {
            Some(expires_at) if expires_at <= self.cached_at => Err(CacheError::serialization(
                "entry envelope has expiresAt not after cachedAt",
            )),
            _ => Ok(()),
        }
    }

    /// Builds options that reproduce this metadata's tags and version.
    ///
    /// Used when copying an entry into another tier.
    #[must_use]
    pub fn to_options(&self, ttl: Option<Duration>) -> SetOptions {
        SetOptions {
            ttl,
            tags: self.tags.clone(),
            version: Some(self.version.clone()),
        }
    }
}

/// A stored value plus its metadata.
///
/// Serialized as the flat envelope `{value, cachedAt, expiresAt, version, tags, size}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// The cached value.
    pub value: V,
    /// Entry metadata.
    #[serde(flatten)]
    pub metadata: CacheMetadata,
}

impl<V> CacheEntry<V> {
    /// Creates an entry.
    pub fn new(value: V, metadata: CacheMetadata) -> Self {
        Self { value, metadata }
    }

    /// Returns true if the entry is expired now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.metadata.is_expired()
    }
}

/// Per-call options for `set`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Time to live. `None` falls back to the adapter default.
    pub ttl: Option<Duration>,
    /// Tags for bulk invalidation.
    pub tags: BTreeSet<String>,
    /// Schema version tag.
    pub version: Option<String>,
}

impl SetOptions {
    /// Options with only a TTL.
    #[must_use]
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Default::default()
        }
    }

    /// Sets the TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Adds several tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    /// Live entry found.
    Hit(CacheEntry<V>),
    /// No live entry. Expected; not an error.
    Miss,
}

impl<V> Lookup<V> {
    /// Returns true on a hit.
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    /// Returns true on a miss.
    #[must_use]
    pub const fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }

    /// Borrows the value on a hit.
    #[must_use]
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Hit(entry) => Some(&entry.value),
            Self::Miss => None,
        }
    }

    /// Takes the value on a hit.
    pub fn into_value(self) -> Option<V> {
        match self {
            Self::Hit(entry) => Some(entry.value),
            Self::Miss => None,
        }
    }

    /// Takes the entry on a hit.
    pub fn into_entry(self) -> Option<CacheEntry<V>> {
        match self {
            Self::Hit(entry) => Some(entry),
            Self::Miss => None,
        }
    }
}

/// Flat tagged outcome of a `get`, for callers that prefer a single value
/// over `CacheResult<Lookup<V>>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<V> {
    /// Live entry found.
    Hit { value: V, metadata: CacheMetadata },
    /// No live entry.
    Miss,
    /// The adapter could not answer.
    Failure { kind: FailureKind, detail: String },
}

impl<V> Outcome<V> {
    /// Returns the value on a hit, treating failures like misses.
    pub fn ok(self) -> Option<V> {
        match self {
            Self::Hit { value, .. } => Some(value),
            Self::Miss | Self::Failure { .. } => None,
        }
    }
}

impl<V> From<CacheResult<Lookup<V>>> for Outcome<V> {
    fn from(result: CacheResult<Lookup<V>>) -> Self {
        match result {
            Ok(Lookup::Hit(entry)) => Self::Hit {
                value: entry.value,
                metadata: entry.metadata,
            },
            Ok(Lookup::Miss) => Self::Miss,
            Err(err) => Self::Failure {
                kind: err.kind(),
                detail: err.to_string(),
            },
        }
    }
}
