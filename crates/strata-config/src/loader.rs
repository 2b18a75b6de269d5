//! Configuration loader with layered sources.

use crate::{format_validation_errors, ConfigValidator, StrataConfig};
use config::{Config, ConfigError, Environment, File};
use std::path::Path;
use std::sync::Arc;
use strata_core::CacheError;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<StrataConfig>>,
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `{config_dir}/default.toml` - Default values
    /// 2. `{config_dir}/{environment}.toml` - Environment-specific overrides
    /// 3. `{config_dir}/local.toml` - Uncommitted local overrides
    /// 4. Environment variables with `STRATA_` prefix (`STRATA_MEMORY__MAX_ENTRIES`)
    ///
    /// Every file is optional. The merged result must pass [`ConfigValidator`].
    pub fn new(config_dir: impl Into<String>) -> Result<Self, CacheError> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, CacheError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> StrataConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    ///
    /// On failure the previous configuration stays in effect.
    pub async fn reload(&self) -> Result<(), CacheError> {
        let new_config = Self::load_config(&self.config_dir)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    fn load_config(config_dir: &str) -> Result<StrataConfig, CacheError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var("STRATA_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        info!(environment = %environment, config_dir = %config_dir, "Loading cache configuration");

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = format!("{}/{}.toml", config_dir, name);
            if Path::new(&path).exists() {
                debug!("Loading config from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("STRATA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error_to_cache_error)?;

        let strata_config: StrataConfig = config
            .try_deserialize()
            .map_err(config_error_to_cache_error)?;

        ConfigValidator::validate(&strata_config)
            .map_err(|errors| CacheError::configuration(format_validation_errors(&errors)))?;

        Ok(strata_config)
    }

    /// Gets a specific configuration value by dotted key path.
    pub async fn get_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let config = self.config.read().await;
        let json = serde_json::to_value(&*config).ok()?;

        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }

        serde_json::from_value(current.clone()).ok()
    }
}

fn config_error_to_cache_error(err: ConfigError) -> CacheError {
    CacheError::configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Topology;
    use std::fs;

    #[tokio::test]
    async fn test_missing_directory_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path().to_string_lossy()).unwrap();

        let config = loader.get().await;
        assert_eq!(config.topology, Topology::Memory);
        assert_eq!(config.keys.namespace, "strata");
    }

    #[tokio::test]
    async fn test_layered_files_and_get_value() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "topology = \"tiered\"\n[memory]\nmax_entries = 100\n",
        )
        .unwrap();
        fs::write(dir.path().join("local.toml"), "[memory]\nmax_entries = 50\n").unwrap();

        let loader = ConfigLoader::new(dir.path().to_string_lossy()).unwrap();
        let config = loader.get().await;

        assert_eq!(config.topology, Topology::Tiered);
        assert_eq!(config.memory.max_entries, Some(50));
        assert_eq!(loader.get_value::<usize>("memory.max_entries").await, Some(50));
        assert_eq!(loader.get_value::<String>("redis.nope").await, None);
    }

    #[tokio::test]
    async fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("default.toml"), "[memory]\nmax_entries = 0\n").unwrap();

        let err = ConfigLoader::new(dir.path().to_string_lossy()).err().unwrap();
        assert!(matches!(err, CacheError::Configuration(_)));
        assert!(err.to_string().contains("memory.max_entries"));
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.toml");
        fs::write(&path, "[keys]\nnamespace = \"one\"\n").unwrap();

        let loader = ConfigLoader::new(dir.path().to_string_lossy()).unwrap();
        assert_eq!(loader.get().await.keys.namespace, "one");

        fs::write(&path, "[keys]\nnamespace = \"two\"\n").unwrap();
        loader.reload().await.unwrap();
        assert_eq!(loader.get().await.keys.namespace, "two");

        fs::write(&path, "[keys]\nseparator = \"\"\n").unwrap();
        assert!(loader.reload().await.is_err());
        assert_eq!(loader.get().await.keys.namespace, "two");
    }
}
