//! Config-driven construction of the adapter stack.

use crate::decorator::{DedupCache, UsageTrackingCache};
use crate::store::{RedisStore, StoreClient};
use crate::{
    DistributedCache, DistributedOptions, InMemoryCache, MemoryCacheOptions, SharedCache,
    TieredCache, TieredOptions,
};
use std::sync::Arc;
use strata_config::{format_validation_errors, ConfigValidator, StrataConfig, Topology};
use strata_core::{CacheError, CacheResult, CacheValue, KeyBuilder, SharedSink, SizeEstimator, TracingSink};
use strata_resilience::guard_from_config;
use tracing::info;

/// Shared handle to a store client.
pub type SharedStore = Arc<dyn StoreClient>;

/// Builds caches from a validated [`StrataConfig`].
///
/// Instance names are fixed per role (`memory`, `redis`, `tiered`) so metric
/// labels stay stable across deployments.
#[derive(Clone)]
pub struct CacheFactory {
    config: StrataConfig,
    keys: KeyBuilder,
    sink: SharedSink,
}

impl CacheFactory {
    pub const MEMORY_NAME: &'static str = "memory";
    pub const DISTRIBUTED_NAME: &'static str = "redis";
    pub const TIERED_NAME: &'static str = "tiered";

    /// Validates `config` and prepares the key builder.
    pub fn new(config: StrataConfig) -> CacheResult<Self> {
        ConfigValidator::validate(&config)
            .map_err(|errors| CacheError::configuration(format_validation_errors(&errors)))?;

        let keys = KeyBuilder::with_options(
            config.keys.namespace.clone(),
            config.keys.separator.clone(),
            config.keys.max_length,
        )?;

        Ok(Self {
            config,
            keys,
            sink: Arc::new(TracingSink),
        })
    }

    #[must_use]
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    /// Key builder for the configured namespace.
    pub fn key_builder(&self) -> &KeyBuilder {
        &self.keys
    }

    /// In-process adapter. Starts the expiry sweeper when called inside a
    /// tokio runtime.
    pub fn memory<V: CacheValue>(&self) -> CacheResult<InMemoryCache<V>> {
        let cache = InMemoryCache::with_collaborators(
            MemoryCacheOptions::from_config(Self::MEMORY_NAME, &self.config.memory),
            SizeEstimator::default(),
            Arc::clone(&self.sink),
        )?;
        if tokio::runtime::Handle::try_current().is_ok() {
            cache.start_sweeper()?;
        }
        Ok(cache)
    }

    /// Distributed adapter over `store`, guarded by the configured chain.
    pub fn distributed<V: CacheValue>(&self, store: SharedStore) -> CacheResult<SharedCache<V>> {
        let guard = guard_from_config(Self::DISTRIBUTED_NAME, &self.config.resilience);
        let options =
            DistributedOptions::from_config(Self::DISTRIBUTED_NAME, &self.keys, &self.config.redis);
        let cache = DistributedCache::with_guard(store, guard, options)?
            .with_sink(Arc::clone(&self.sink));
        Ok(Arc::new(cache))
    }

    /// Opens the configured Redis pool.
    pub async fn connect_redis(&self) -> CacheResult<SharedStore> {
        let store = RedisStore::connect(&self.config.redis).await?;
        Ok(Arc::new(store))
    }

    /// Builds the configured topology, connecting to Redis when needed.
    pub async fn build<V: CacheValue>(&self) -> CacheResult<SharedCache<V>> {
        if self.config.topology.needs_store() {
            let store = self.connect_redis().await?;
            self.build_with_store(Some(store))
        } else {
            self.build_with_store(None)
        }
    }

    /// Builds the configured topology over an already-connected store.
    ///
    /// `store` is required by the distributed and tiered topologies and
    /// ignored by the memory topology.
    pub fn build_with_store<V: CacheValue>(
        &self,
        store: Option<SharedStore>,
    ) -> CacheResult<SharedCache<V>> {
        let topology = self.config.topology;
        let base: SharedCache<V> = match (topology, store) {
            (Topology::Memory, _) => Arc::new(self.memory::<V>()?),
            (Topology::Distributed, Some(store)) => self.distributed(store)?,
            (Topology::Tiered, Some(store)) => {
                let fast: SharedCache<V> = Arc::new(self.memory::<V>()?);
                let slow = self.distributed(store)?;
                let options = TieredOptions::from_config(Self::TIERED_NAME, &self.config.tiered);
                Arc::new(TieredCache::new(fast, slow, options)?.with_sink(Arc::clone(&self.sink)))
            }
            (_, None) => {
                return Err(CacheError::configuration(format!(
                    "topology '{}' requires a store client",
                    topology
                )))
            }
        };

        let cache = self.decorate(base)?;
        info!(
            topology = %topology,
            namespace = %self.keys.namespace(),
            dedup = self.config.dedup.enabled,
            usage = self.config.usage.enabled,
            "Cache built"
        );
        Ok(cache)
    }

    /// Wraps `cache` with the enabled decorators. Dedup sits outermost so
    /// usage is recorded against canonical keys.
    pub fn decorate<V: CacheValue>(&self, cache: SharedCache<V>) -> CacheResult<SharedCache<V>> {
        let mut cache = cache;
        if self.config.usage.enabled {
            cache = Arc::new(UsageTrackingCache::from_config(cache, &self.config.usage)?);
        }
        if self.config.dedup.enabled {
            cache = Arc::new(DedupCache::from_config(cache, &self.config.dedup)?);
        }
        Ok(cache)
    }
}

impl std::fmt::Debug for CacheFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheFactory")
            .field("topology", &self.config.topology)
            .field("namespace", &self.keys.namespace())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::Cache;
    use strata_config::WriteStrategy;
    use strata_core::SetOptions;

    fn config(topology: Topology) -> StrataConfig {
        let mut config = StrataConfig::default();
        config.topology = topology;
        config.keys.namespace = "app".to_string();
        config
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config(Topology::Memory);
        config.memory.max_entries = Some(0);

        match CacheFactory::new(config) {
            Err(CacheError::Configuration(message)) => assert!(message.contains("max_entries")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_key_builder_uses_namespace() {
        let factory = CacheFactory::new(config(Topology::Memory)).unwrap();
        assert_eq!(factory.key_builder().build("user:1").as_str(), "app:user:1");
    }

    #[tokio::test]
    async fn test_memory_topology() {
        let factory = CacheFactory::new(config(Topology::Memory)).unwrap();
        let cache = factory.build::<String>().await.unwrap();
        let key = factory.key_builder().build("k");

        cache.set(&key, "v".to_string(), SetOptions::default()).await.unwrap();
        assert!(cache.get(&key).await.unwrap().is_hit());
        assert_eq!(cache.name(), CacheFactory::MEMORY_NAME);
    }

    #[tokio::test]
    async fn test_memory_starts_sweeper() {
        let factory = CacheFactory::new(config(Topology::Memory)).unwrap();
        let cache = factory.memory::<String>().unwrap();
        assert!(cache.sweeper_running());
        cache.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_distributed_requires_store() {
        let factory = CacheFactory::new(config(Topology::Distributed)).unwrap();
        let result = factory.build_with_store::<String>(None);
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_tiered_topology_over_loopback_store() {
        let mut config = config(Topology::Tiered);
        config.tiered.write_strategy = WriteStrategy::WriteThrough;
        let factory = CacheFactory::new(config).unwrap();
        let store = Arc::new(MemoryStore::new());

        let cache = factory
            .build_with_store::<String>(Some(store.clone()))
            .unwrap();
        let key = factory.key_builder().build("k");
        cache.set(&key, "v".to_string(), SetOptions::default()).await.unwrap();

        assert_eq!(cache.name(), CacheFactory::TIERED_NAME);
        assert_eq!(store.len(), 1);
        assert!(cache.stats().tiers.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_flushes_write_behind_stack() {
        let mut config = config(Topology::Tiered);
        config.tiered.write_strategy = WriteStrategy::WriteBehind;
        config.usage.enabled = true;
        let factory = CacheFactory::new(config).unwrap();
        let store = Arc::new(MemoryStore::new().with_latency(std::time::Duration::from_millis(20)));

        let cache = factory
            .build_with_store::<String>(Some(store.clone()))
            .unwrap();
        for i in 0..5 {
            let key = factory.key_builder().build(&format!("k:{}", i));
            cache.set(&key, "v".to_string(), SetOptions::default()).await.unwrap();
        }

        cache.shutdown().await.unwrap();

        assert_eq!(store.len(), 5);
        let tiers = cache.stats().tiers.unwrap();
        assert_eq!(tiers.propagated, 5);
        assert_eq!(tiers.pending_propagations, 0);
    }

    #[tokio::test]
    async fn test_decorators_wrap_when_enabled() {
        let mut config = config(Topology::Memory);
        config.dedup.enabled = true;
        config.dedup.similarity_threshold = 0.8;
        config.usage.enabled = true;
        let factory = CacheFactory::new(config).unwrap();
        let cache = factory.build::<String>().await.unwrap();
        let keys = factory.key_builder();

        cache
            .set(&keys.build("what is the capital of france today"), "Paris".to_string(), SetOptions::default())
            .await
            .unwrap();
        let lookup = cache
            .get(&keys.build("what is the capital of france today?"))
            .await
            .unwrap();
        assert_eq!(lookup.value().map(String::as_str), Some("Paris"));
    }
}
