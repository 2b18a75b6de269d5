//! Adapter over a network key-value store.
//!
//! Entries cross the wire as the JSON envelope
//! `{value, cachedAt, expiresAt, version, tags, size}`. Every store call runs
//! under the configured timeout inside the injected [`FailureGuard`]; the
//! adapter itself never retries.

use crate::store::{StoreClient, StoreError, StoreResult};
use crate::Cache;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strata_config::RedisConfig;
use strata_core::{
    CacheEntry, CacheError, CacheEvent, CacheKey, CacheMetadata, CacheResult, CacheStats,
    CacheValue, ClearPattern, EventAttributes, FailureGuard, KeyBuilder, Lookup, NoopSink,
    SetOptions, SharedSink, StatsCollector,
};
use strata_resilience::{with_timeout, Passthrough};
use tracing::{debug, warn};

/// Distributed adapter options.
#[derive(Debug, Clone)]
pub struct DistributedOptions {
    /// Instance name for logs, metrics and error reports.
    pub name: String,
    /// Glob covering every key this instance writes; `clear` enumerates it.
    pub namespace_glob: String,
    /// Upper bound on each store call.
    pub operation_timeout: Duration,
    /// TTL applied when a write carries none.
    pub default_ttl: Option<Duration>,
    /// Keys per batch round trip.
    pub batch_size: usize,
}

impl DistributedOptions {
    pub fn new(name: impl Into<String>, keys: &KeyBuilder) -> Self {
        Self {
            name: name.into(),
            namespace_glob: keys.namespace_glob(),
            operation_timeout: Duration::from_millis(250),
            default_ttl: None,
            batch_size: 500,
        }
    }

    pub fn from_config(name: impl Into<String>, keys: &KeyBuilder, config: &RedisConfig) -> Self {
        Self {
            operation_timeout: config.operation_timeout(),
            default_ttl: config.default_ttl(),
            batch_size: config.scan_count.max(1),
            ..Self::new(name, keys)
        }
    }

    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    fn validate(&self) -> CacheResult<()> {
        if self.operation_timeout.is_zero() {
            return Err(CacheError::configuration("operation_timeout must be positive"));
        }
        if self.default_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(CacheError::configuration("default_ttl must be positive"));
        }
        if self.batch_size == 0 {
            return Err(CacheError::configuration("batch_size must be greater than zero"));
        }
        // `clear` deletes whatever this glob enumerates in a shared store.
        if self.namespace_glob.is_empty() || self.namespace_glob.starts_with(['*', '?', '[']) {
            return Err(CacheError::configuration(format!(
                "namespace_glob '{}' has no literal namespace prefix",
                self.namespace_glob
            )));
        }
        Ok(())
    }
}

/// Only the tags of an envelope, for tag-matching `clear` without decoding `V`.
#[derive(Deserialize)]
struct TagsEnvelope {
    #[serde(default)]
    tags: BTreeSet<String>,
}

fn store_failure(backend: &str, err: StoreError) -> CacheError {
    CacheError::backend(backend, err.to_string())
}

/// Cache backed by a [`StoreClient`], guarded by `G`.
pub struct DistributedCache<V, C, G = Passthrough> {
    client: C,
    guard: G,
    options: DistributedOptions,
    stats: StatsCollector,
    sink: SharedSink,
    _value: PhantomData<fn() -> V>,
}

impl<V, C> DistributedCache<V, C, Passthrough>
where
    V: CacheValue,
    C: StoreClient,
{
    /// Creates an unguarded adapter.
    pub fn new(client: C, options: DistributedOptions) -> CacheResult<Self> {
        Self::with_guard(client, Passthrough, options)
    }
}

impl<V, C, G> DistributedCache<V, C, G>
where
    V: CacheValue,
    C: StoreClient,
    G: FailureGuard,
{
    /// Creates an adapter whose store calls all run through `guard`.
    pub fn with_guard(client: C, guard: G, options: DistributedOptions) -> CacheResult<Self> {
        options.validate()?;
        Ok(Self {
            client,
            guard,
            options,
            stats: StatsCollector::new(),
            sink: Arc::new(NoopSink),
            _value: PhantomData,
        })
    }

    #[must_use]
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn guard(&self) -> &G {
        &self.guard
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn options(&self) -> &DistributedOptions {
        &self.options
    }

    /// Runs one store call under the timeout and guard.
    async fn call<T, F, Fut>(&self, operation: &'static str, f: F) -> CacheResult<T>
    where
        T: Send,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = StoreResult<T>> + Send,
    {
        let name = self.options.name.as_str();
        let timeout = self.options.operation_timeout;
        let f = &f;

        self.guard
            .execute(move || async move {
                with_timeout(name, timeout, || async move {
                    f().await.map_err(|e| store_failure(name, e))
                })
                .await
            })
            .await
            .map_err(|e| self.fail(operation, e))
    }

    /// Records and logs a failure, then hands it back.
    fn fail(&self, operation: &'static str, err: CacheError) -> CacheError {
        self.stats.record_error();
        self.sink.emit(
            CacheEvent::Error,
            &EventAttributes::new(&self.options.name).error(err.kind()),
        );
        warn!(cache = %self.options.name, operation, error = %err, "Distributed cache call failed");
        err
    }

    fn emit(&self, event: CacheEvent, count: u64, elapsed: Duration) {
        if count > 0 {
            self.sink.emit(
                event,
                &EventAttributes::new(&self.options.name)
                    .count(count)
                    .elapsed(elapsed),
            );
        }
    }

    fn encode(&self, value: V, options: &SetOptions) -> CacheResult<(Vec<u8>, Option<Duration>)> {
        let metadata = CacheMetadata::from_options(options, self.options.default_ttl);
        let ttl = metadata.remaining_ttl_at(metadata.cached_at());
        let payload = serde_json::to_vec(&CacheEntry::new(value, metadata))?;
        Ok((payload, ttl))
    }

    fn decode(&self, payload: Option<Vec<u8>>) -> CacheResult<Lookup<V>> {
        let Some(payload) = payload else {
            return Ok(Lookup::Miss);
        };
        let entry: CacheEntry<V> = serde_json::from_slice(&payload)?;
        entry.metadata.validate()?;

        // The store's own TTL normally removes these first; clocks may disagree.
        if entry.is_expired() {
            self.stats.record_expirations(1);
            return Ok(Lookup::Miss);
        }
        Ok(Lookup::Hit(entry))
    }

    fn record_lookups(&self, lookups: &[Lookup<V>], elapsed: Duration) {
        let hits = lookups.iter().filter(|lookup| lookup.is_hit()).count() as u64;
        let misses = lookups.len() as u64 - hits;
        (0..hits).for_each(|_| self.stats.record_hit());
        (0..misses).for_each(|_| self.stats.record_miss());
        self.emit(CacheEvent::Hit, hits, elapsed);
        self.emit(CacheEvent::Miss, misses, elapsed);
    }

    /// Picks the keys a pattern clear removes: key matches directly, the rest
    /// by the tags in their envelopes.
    async fn select_for_clear(
        &self,
        pattern: &ClearPattern,
        keys: Vec<String>,
    ) -> CacheResult<Vec<String>> {
        let (mut selected, rest): (Vec<String>, Vec<String>) = keys
            .into_iter()
            .partition(|key| pattern.key_glob().is_some() && pattern.matches_key(key));

        for chunk in rest.chunks(self.options.batch_size) {
            let payloads = self
                .call("batch_get", || self.client.batch_get(chunk))
                .await?;
            for (key, payload) in chunk.iter().zip(payloads) {
                let Some(payload) = payload else { continue };
                match serde_json::from_slice::<TagsEnvelope>(&payload) {
                    Ok(envelope) if pattern.matches_tags(&envelope.tags) => {
                        selected.push(key.clone());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(cache = %self.options.name, error = %e, "Skipping undecodable envelope during clear");
                    }
                }
            }
        }
        Ok(selected)
    }
}

#[async_trait]
impl<V, C, G> Cache<V> for DistributedCache<V, C, G>
where
    V: CacheValue,
    C: StoreClient,
    G: FailureGuard,
{
    fn name(&self) -> &str {
        &self.options.name
    }

    async fn get(&self, key: &CacheKey) -> CacheResult<Lookup<V>> {
        let started = Instant::now();
        let payload = self.call("get", || self.client.get(key.as_str())).await?;
        let lookup = self.decode(payload).map_err(|e| self.fail("get", e))?;
        self.record_lookups(std::slice::from_ref(&lookup), started.elapsed());
        Ok(lookup)
    }

    async fn set(&self, key: &CacheKey, value: V, options: SetOptions) -> CacheResult<()> {
        let started = Instant::now();
        let (payload, ttl) = self
            .encode(value, &options)
            .map_err(|e| self.fail("set", e))?;
        self.call("set", || self.client.set(key.as_str(), payload.clone(), ttl))
            .await?;
        self.stats.record_set();
        self.emit(CacheEvent::Set, 1, started.elapsed());
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        let started = Instant::now();
        let keys = [key.as_str().to_string()];
        let deleted = self.call("delete", || self.client.delete(&keys)).await?;
        if deleted > 0 {
            self.stats.record_delete();
            self.emit(CacheEvent::Delete, 1, started.elapsed());
        }
        Ok(deleted > 0)
    }

    async fn clear(&self, pattern: Option<&ClearPattern>) -> CacheResult<u64> {
        let started = Instant::now();
        let glob = self.options.namespace_glob.as_str();
        let keys = self.call("scan", || self.client.scan(glob)).await?;

        let selected = match pattern {
            None => keys,
            Some(pattern) => self.select_for_clear(pattern, keys).await?,
        };

        let mut removed = 0u64;
        for chunk in selected.chunks(self.options.batch_size) {
            removed += self.call("delete", || self.client.delete(chunk)).await?;
        }

        self.stats.record_deletes(removed);
        self.emit(CacheEvent::Delete, removed, started.elapsed());
        debug!(
            cache = %self.options.name,
            pattern = pattern.map_or("*", ClearPattern::as_str),
            removed,
            "Cleared entries"
        );
        Ok(removed)
    }

    async fn has(&self, key: &CacheKey) -> CacheResult<bool> {
        self.call("exists", || self.client.exists(key.as_str())).await
    }

    async fn get_many(&self, keys: &[CacheKey]) -> CacheResult<Vec<Lookup<V>>> {
        let started = Instant::now();
        let keys: Vec<String> = keys.iter().map(|key| key.as_str().to_string()).collect();
        let mut lookups = Vec::with_capacity(keys.len());

        for chunk in keys.chunks(self.options.batch_size) {
            let payloads = self
                .call("batch_get", || self.client.batch_get(chunk))
                .await?;
            for payload in payloads {
                lookups.push(self.decode(payload).map_err(|e| self.fail("get_many", e))?);
            }
        }

        self.record_lookups(&lookups, started.elapsed());
        Ok(lookups)
    }

    async fn set_many(&self, entries: Vec<(CacheKey, V, SetOptions)>) -> CacheResult<()> {
        let started = Instant::now();
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value, options) in entries {
            let (payload, ttl) = self
                .encode(value, &options)
                .map_err(|e| self.fail("set_many", e))?;
            encoded.push((key.into_string(), payload, ttl));
        }

        let count = encoded.len() as u64;
        for chunk in encoded.chunks(self.options.batch_size) {
            self.call("batch_set", || self.client.batch_set(chunk.to_vec()))
                .await?;
        }

        (0..count).for_each(|_| self.stats.record_set());
        self.emit(CacheEvent::Set, count, started.elapsed());
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}

impl<V, C, G> std::fmt::Debug for DistributedCache<V, C, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedCache")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
