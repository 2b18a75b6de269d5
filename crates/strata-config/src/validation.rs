//! Configuration validation module.
//!
//! Collects every problem in one pass so a bad deployment fails at startup
//! with the full list instead of one error per restart.

use crate::StrataConfig;
use std::fmt;
use strata_core::KeyBuilder;
use url::Url;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// Key namespace, separator, or max length cannot build valid keys.
    InvalidKeys { message: String },
    /// A shared store topology without a key namespace.
    MissingNamespace { topology: String },
    /// A capacity bound is zero.
    ZeroCapacity { name: String },
    /// A duration that must be positive is zero.
    NonPositiveTimeout { name: String, value: u64 },
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
    /// Pool size is zero or exceeds the maximum allowed.
    InvalidPoolSize { value: usize, maximum: usize },
    /// A threshold is outside its valid range.
    OutOfRange { name: String, value: f64, minimum: f64, maximum: f64 },
    /// Fast-tier TTL is longer than the slow tier's default TTL.
    FastTtlExceedsSlow { fast_secs: u64, slow_secs: u64 },
    /// Log level is invalid.
    InvalidLogLevel { value: String },
    /// Log format is invalid.
    InvalidLogFormat { value: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKeys { message } => write!(f, "Invalid key configuration: {}", message),
            Self::MissingNamespace { topology } => write!(
                f,
                "Topology '{}' shares its store and requires a non-empty key namespace",
                topology
            ),
            Self::ZeroCapacity { name } => write!(f, "Capacity '{}' must be greater than zero", name),
            Self::NonPositiveTimeout { name, value } => {
                write!(f, "Timeout '{}' must be positive, got {}", name, value)
            }
            Self::InvalidUrl { url_type, message } => {
                write!(f, "Invalid {} URL: {}", url_type, message)
            }
            Self::InvalidPoolSize { value, maximum } => {
                write!(f, "Invalid pool size {} (must be 1-{})", value, maximum)
            }
            Self::OutOfRange {
                name,
                value,
                minimum,
                maximum,
            } => write!(
                f,
                "Invalid {}: {} (must be between {} and {})",
                name, value, minimum, maximum
            ),
            Self::FastTtlExceedsSlow {
                fast_secs,
                slow_secs,
            } => write!(
                f,
                "Fast-tier TTL ({}s) cannot exceed the slow tier default TTL ({}s)",
                fast_secs, slow_secs
            ),
            Self::InvalidLogLevel { value } => write!(
                f,
                "Invalid log level: '{}' (valid: trace, debug, info, warn, error)",
                value
            ),
            Self::InvalidLogFormat { value } => {
                write!(f, "Invalid log format: '{}' (valid: pretty, json)", value)
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Maximum connection pool size.
    const MAX_POOL_SIZE: usize = 1000;
    /// Valid log levels.
    const VALID_LOG_LEVELS: &'static [&'static str] = &["trace", "debug", "info", "warn", "error"];
    /// Valid log formats.
    const VALID_LOG_FORMATS: &'static [&'static str] = &["pretty", "json"];

    /// Validates the entire configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    /// Sections for components the topology does not build are skipped.
    pub fn validate(config: &StrataConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_telemetry(&config.telemetry, &mut errors);
        Self::validate_keys(&config.keys, &mut errors);
        if config.topology.has_memory() {
            Self::validate_memory(&config.memory, &mut errors);
        }
        if config.topology.needs_store() {
            if config.keys.namespace.trim().is_empty() {
                errors.push(ConfigValidationError::MissingNamespace {
                    topology: config.topology.to_string(),
                });
            }
            Self::validate_redis(&config.redis, &mut errors);
        }
        if config.topology == crate::Topology::Tiered {
            Self::validate_tiered(config, &mut errors);
        }
        Self::validate_resilience(&config.resilience, &mut errors);
        Self::validate_decorators(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_telemetry(config: &strata_core::TelemetryConfig, errors: &mut Vec<ConfigValidationError>) {
        let level = config.log_level.to_lowercase();
        if !Self::VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(ConfigValidationError::InvalidLogLevel {
                value: config.log_level.clone(),
            });
        }
        if !Self::VALID_LOG_FORMATS.contains(&config.log_format.as_str()) {
            errors.push(ConfigValidationError::InvalidLogFormat {
                value: config.log_format.clone(),
            });
        }
    }

    fn validate_keys(config: &crate::KeyConfig, errors: &mut Vec<ConfigValidationError>) {
        if let Err(e) = KeyBuilder::with_options(
            config.namespace.clone(),
            config.separator.clone(),
            config.max_length,
        ) {
            errors.push(ConfigValidationError::InvalidKeys {
                message: e.to_string(),
            });
        }
    }

    fn validate_memory(config: &crate::MemoryConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.max_entries == Some(0) {
            errors.push(ConfigValidationError::ZeroCapacity {
                name: "memory.max_entries".to_string(),
            });
        }
        if config.max_bytes == Some(0) {
            errors.push(ConfigValidationError::ZeroCapacity {
                name: "memory.max_bytes".to_string(),
            });
        }
        if config.default_ttl_secs == Some(0) {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "memory.default_ttl_secs".to_string(),
                value: 0,
            });
        }
    }

    fn validate_redis(config: &crate::RedisConfig, errors: &mut Vec<ConfigValidationError>) {
        if !config.url.starts_with("redis://") && !config.url.starts_with("rediss://") {
            errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: "URL must start with redis:// or rediss://".to_string(),
            });
        } else if let Err(e) = Url::parse(&config.url) {
            errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: e.to_string(),
            });
        }

        if config.pool_size == 0 || config.pool_size > Self::MAX_POOL_SIZE {
            errors.push(ConfigValidationError::InvalidPoolSize {
                value: config.pool_size,
                maximum: Self::MAX_POOL_SIZE,
            });
        }

        if config.operation_timeout_ms == 0 {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "redis.operation_timeout_ms".to_string(),
                value: 0,
            });
        }
        if config.connect_timeout_secs == 0 {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "redis.connect_timeout_secs".to_string(),
                value: 0,
            });
        }
        if config.default_ttl_secs == Some(0) {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "redis.default_ttl_secs".to_string(),
                value: 0,
            });
        }
        if config.scan_count == 0 {
            errors.push(ConfigValidationError::ZeroCapacity {
                name: "redis.scan_count".to_string(),
            });
        }
    }

    fn validate_tiered(config: &StrataConfig, errors: &mut Vec<ConfigValidationError>) {
        match (config.tiered.fast_ttl_secs, config.redis.default_ttl_secs) {
            (Some(0), _) => errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "tiered.fast_ttl_secs".to_string(),
                value: 0,
            }),
            (Some(fast), Some(slow)) if fast > slow => {
                errors.push(ConfigValidationError::FastTtlExceedsSlow {
                    fast_secs: fast,
                    slow_secs: slow,
                });
            }
            _ => {}
        }
    }

    fn validate_resilience(config: &crate::ResilienceConfig, errors: &mut Vec<ConfigValidationError>) {
        let breaker = &config.circuit_breaker;
        if breaker.enabled {
            if breaker.failure_threshold == 0 {
                errors.push(ConfigValidationError::ZeroCapacity {
                    name: "resilience.circuit_breaker.failure_threshold".to_string(),
                });
            }
            if breaker.success_threshold == 0 {
                errors.push(ConfigValidationError::ZeroCapacity {
                    name: "resilience.circuit_breaker.success_threshold".to_string(),
                });
            }
            if breaker.half_open_requests == 0 {
                errors.push(ConfigValidationError::ZeroCapacity {
                    name: "resilience.circuit_breaker.half_open_requests".to_string(),
                });
            }
            if breaker.open_timeout_secs == 0 {
                errors.push(ConfigValidationError::NonPositiveTimeout {
                    name: "resilience.circuit_breaker.open_timeout_secs".to_string(),
                    value: 0,
                });
            }
        }

        let retry = &config.retry;
        if retry.enabled {
            if retry.max_attempts == 0 {
                errors.push(ConfigValidationError::ZeroCapacity {
                    name: "resilience.retry.max_attempts".to_string(),
                });
            }
            if retry.multiplier < 1.0 {
                errors.push(ConfigValidationError::OutOfRange {
                    name: "resilience.retry.multiplier".to_string(),
                    value: retry.multiplier,
                    minimum: 1.0,
                    maximum: f64::MAX,
                });
            }
        }

        if config.rate_limit.enabled && config.rate_limit.requests_per_second == 0 {
            errors.push(ConfigValidationError::ZeroCapacity {
                name: "resilience.rate_limit.requests_per_second".to_string(),
            });
        }
    }

    fn validate_decorators(config: &StrataConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.dedup.enabled {
            if config.dedup.index_capacity == 0 {
                errors.push(ConfigValidationError::ZeroCapacity {
                    name: "dedup.index_capacity".to_string(),
                });
            }
            let threshold = config.dedup.similarity_threshold;
            if !(threshold > 0.0 && threshold <= 1.0) {
                errors.push(ConfigValidationError::OutOfRange {
                    name: "dedup.similarity_threshold".to_string(),
                    value: threshold,
                    minimum: 0.0,
                    maximum: 1.0,
                });
            }
        }

        if config.usage.enabled && config.usage.index_capacity == 0 {
            errors.push(ConfigValidationError::ZeroCapacity {
                name: "usage.index_capacity".to_string(),
            });
        }
    }
}

/// Formats validation errors for display.
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    let mut output = String::from("Configuration validation failed:\n");
    for (i, error) in errors.iter().enumerate() {
        output.push_str(&format!("  {}. {}\n", i + 1, error));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Topology;

    fn tiered_config() -> StrataConfig {
        StrataConfig {
            topology: Topology::Tiered,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_passes() {
        assert!(ConfigValidator::validate(&StrataConfig::default()).is_ok());
        assert!(ConfigValidator::validate(&tiered_config()).is_ok());
    }

    #[test]
    fn test_zero_max_entries() {
        let mut config = StrataConfig::default();
        config.memory.max_entries = Some(0);

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            ConfigValidationError::ZeroCapacity { name } if name == "memory.max_entries"
        )));
    }

    #[test]
    fn test_redis_skipped_for_memory_topology() {
        let mut config = StrataConfig::default();
        config.redis.url = "http://localhost:6379".to_string();
        assert!(ConfigValidator::validate(&config).is_ok());

        config.topology = Topology::Distributed;
        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            ConfigValidationError::InvalidUrl { url_type, .. } if url_type == "redis"
        )));
    }

    #[test]
    fn test_fast_ttl_exceeds_slow() {
        let mut config = tiered_config();
        config.tiered.fast_ttl_secs = Some(7_200);
        config.redis.default_ttl_secs = Some(3_600);

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigValidationError::FastTtlExceedsSlow { .. })));
    }

    #[test]
    fn test_invalid_keys() {
        let mut config = StrataConfig::default();
        config.keys.max_length = 16;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigValidationError::InvalidKeys { .. })));
    }

    #[test]
    fn test_store_topologies_require_namespace() {
        let mut config = tiered_config();
        config.keys.namespace = "  ".to_string();

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigValidationError::MissingNamespace { .. })));

        config.topology = Topology::Memory;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_similarity_threshold_range() {
        let mut config = StrataConfig::default();
        config.dedup.enabled = true;
        config.dedup.similarity_threshold = 1.5;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigValidationError::OutOfRange { .. })));
    }

    #[test]
    fn test_multiple_errors() {
        let mut config = tiered_config();
        config.telemetry.log_level = "loud".to_string();
        config.redis.pool_size = 0;
        config.redis.operation_timeout_ms = 0;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(errors.len() >= 3);
    }

    #[test]
    fn test_format_validation_errors() {
        let errors = vec![
            ConfigValidationError::ZeroCapacity {
                name: "memory.max_entries".to_string(),
            },
            ConfigValidationError::InvalidLogFormat {
                value: "xml".to_string(),
            },
        ];

        let output = format_validation_errors(&errors);
        assert!(output.contains("1. Capacity 'memory.max_entries'"));
        assert!(output.contains("Invalid log format"));
    }
}
