//! Loopback store client for local development and tests.

use super::{StoreClient, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use strata_core::ClearPattern;

struct StoredPayload {
    payload: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredPayload {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

/// Process-local key-value store with native TTL.
///
/// Behaves like a remote store from the adapter's point of view: payloads
/// are opaque bytes and expired keys vanish on their own. Outages and
/// latency can be injected to exercise failure paths.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, StoredPayload>>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fixed delay before every call.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// Simulates an outage: every call fails with a connection error.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Relaxed);
    }

    /// Calls received so far, including failed ones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Live keys currently held.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data
            .lock()
            .values()
            .filter(|stored| stored.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Connection("loopback store is offline".to_string()));
        }
        Ok(())
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut data = self.data.lock();
        match data.get(key) {
            Some(stored) if stored.is_live(now) => Some(stored.payload.clone()),
            Some(_) => {
                data.remove(key);
                None
            }
            None => None,
        }
    }

    fn write(&self, key: String, payload: Vec<u8>, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.data
            .lock()
            .insert(key, StoredPayload { payload, expires_at });
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.enter().await?;
        Ok(self.read(key))
    }

    async fn set(&self, key: &str, payload: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        self.enter().await?;
        self.write(key.to_string(), payload, ttl);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.enter().await?;
        let now = Instant::now();
        let mut data = self.data.lock();
        let deleted = keys
            .iter()
            .filter_map(|key| data.remove(key))
            .filter(|stored| stored.is_live(now))
            .count();
        Ok(deleted as u64)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.enter().await?;
        Ok(self.read(key).is_some())
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.enter().await?;
        let glob = ClearPattern::glob(pattern)
            .map_err(|e| StoreError::Command(e.to_string()))?;
        let now = Instant::now();
        let data = self.data.lock();
        let mut keys: Vec<String> = data
            .iter()
            .filter(|(key, stored)| stored.is_live(now) && glob.matches_key(key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }

    async fn batch_get(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.enter().await?;
        Ok(keys.iter().map(|key| self.read(key)).collect())
    }

    async fn batch_set(&self, entries: Vec<(String, Vec<u8>, Option<Duration>)>) -> StoreResult<()> {
        self.enter().await?;
        for (key, payload, ttl) in entries {
            self.write(key, payload, ttl);
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.data.lock().len())
            .field("available", &!self.unavailable.load(Ordering::Relaxed))
            .finish()
    }
}
