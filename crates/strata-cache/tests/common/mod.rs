//! Redis container fixture for store integration tests.

use strata_cache::store::RedisStore;
use strata_config::RedisConfig;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::redis::Redis;

/// Manages a Redis testcontainer and a pooled store connected to it.
pub struct TestRedis {
    _container: ContainerAsync<Redis>,
    store: RedisStore,
}

impl TestRedis {
    /// Starts a fresh Redis container and connects to it.
    pub async fn new() -> Self {
        let container = Redis::default()
            .start()
            .await
            .expect("Failed to start Redis container");

        let port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");

        let config = RedisConfig {
            url: format!("redis://127.0.0.1:{}", port),
            pool_size: 4,
            ..RedisConfig::default()
        };

        let store = RedisStore::connect(&config)
            .await
            .expect("Failed to connect to Redis");

        Self {
            _container: container,
            store,
        }
    }

    pub fn store(&self) -> RedisStore {
        self.store.clone()
    }
}
