//! Redis store client backed by a `deadpool-redis` pool.

use super::{StoreClient, StoreError, StoreResult};
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, PoolError, Runtime};
use redis::{ErrorKind, RedisError};
use std::time::Duration;
use strata_config::RedisConfig;
use strata_core::{CacheError, CacheResult};
use tracing::{debug, info};

/// Keys per `DEL` round trip.
const DELETE_CHUNK: usize = 500;

/// Redis store client.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    scan_count: usize,
}

impl RedisStore {
    /// Creates the connection pool and verifies it with a `PING`.
    pub async fn connect(config: &RedisConfig) -> CacheResult<Self> {
        info!("Creating Redis connection pool for cache store...");

        let pool = Config::from_url(&config.url)
            .builder()
            .map_err(|e| CacheError::configuration(format!("Invalid Redis config: {}", e)))?
            .max_size(config.pool_size)
            .wait_timeout(Some(config.connect_timeout()))
            .create_timeout(Some(config.connect_timeout()))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| CacheError::configuration(format!("Failed to create pool: {}", e)))?;

        let store = Self::from_pool(pool, config.scan_count);
        store
            .ping()
            .await
            .map_err(|e| CacheError::backend("redis", e.to_string()))?;

        info!("Redis connection pool created successfully");
        Ok(store)
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: Pool, scan_count: usize) -> Self {
        Self {
            pool,
            scan_count: scan_count.max(1),
        }
    }

    /// Round-trips a `PING`.
    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut *conn).await?;
        Ok(())
    }

    async fn conn(&self) -> StoreResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }

    fn set_cmd(key: &str, payload: &[u8], ttl: Option<Duration>) -> redis::Cmd {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(payload);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        cmd
    }
}

/// Redis rejects `PX 0`; sub-millisecond TTLs round up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl StoreClient for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let payload = redis::cmd("GET")
            .arg(key)
            .query_async::<Option<Vec<u8>>>(&mut *conn)
            .await?;
        Ok(payload)
    }

    async fn set(&self, key: &str, payload: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        Self::set_cmd(key, &payload, ttl)
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn().await?;
        let mut deleted = 0u64;
        for chunk in keys.chunks(DELETE_CHUNK) {
            deleted += redis::cmd("DEL")
                .arg(chunk)
                .query_async::<u64>(&mut *conn)
                .await?;
        }
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let exists = redis::cmd("EXISTS")
            .arg(key)
            .query_async::<bool>(&mut *conn)
            .await?;
        Ok(exists)
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut keys = Vec::new();
        let mut cursor = 0u64;

        loop {
            let (next, batch) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(self.scan_count)
                .query_async::<(u64, Vec<String>)>(&mut *conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once across iterations.
        keys.sort_unstable();
        keys.dedup();
        debug!(pattern = %pattern, count = keys.len(), "Scanned keys");
        Ok(keys)
    }

    async fn batch_get(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn().await?;
        let payloads = redis::cmd("MGET")
            .arg(keys)
            .query_async::<Vec<Option<Vec<u8>>>>(&mut *conn)
            .await?;
        Ok(payloads)
    }

    async fn batch_set(&self, entries: Vec<(String, Vec<u8>, Option<Duration>)>) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        for (key, payload, ttl) in &entries {
            pipe.add_command(Self::set_cmd(key, payload, *ttl)).ignore();
        }
        pipe.query_async::<()>(&mut *conn).await?;
        Ok(())
    }
}

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else if err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.kind() == ErrorKind::IoError
        {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

impl From<PoolError> for StoreError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Timeout(_) => StoreError::Timeout,
            other => StoreError::Connection(format!("Failed to get Redis connection: {}", other)),
        }
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("pool", &self.pool.status())
            .field("scan_count", &self.scan_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_rounds_up_to_one_millisecond() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2_000);
    }

    #[test]
    fn test_set_command_carries_px() {
        let cmd = RedisStore::set_cmd("k", b"v", Some(Duration::from_millis(1500)));
        let args: Vec<Vec<u8>> = cmd
            .args_iter()
            .map(|arg| match arg {
                redis::Arg::Simple(bytes) => bytes.to_vec(),
                redis::Arg::Cursor => Vec::new(),
            })
            .collect();
        assert_eq!(args, vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec(), b"PX".to_vec(), b"1500".to_vec()]);
    }

    #[test]
    fn test_redis_error_translation() {
        let io = RedisError::from((ErrorKind::IoError, "broken pipe"));
        assert!(matches!(StoreError::from(io), StoreError::Connection(_)));

        let typed = RedisError::from((ErrorKind::TypeError, "wrong type"));
        assert!(matches!(StoreError::from(typed), StoreError::Command(_)));

        let timeout = RedisError::from(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert_eq!(StoreError::from(timeout), StoreError::Timeout);
    }

    #[tokio::test]
    async fn test_connect_unreachable_is_backend_unavailable() {
        let config = RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            connect_timeout_secs: 1,
            ..Default::default()
        };

        let err = RedisStore::connect(&config).await.unwrap_err();
        assert!(err.is_retriable(), "unexpected error: {}", err);
    }
}
