//! Unified error taxonomy for every cache adapter.
//!
//! A cache miss is never an error: it is reported as [`crate::Lookup::Miss`].
//! The variants below cover the unexpected conditions an adapter reports
//! faithfully and leaves the fallback policy to the caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Unified error type for cache operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Network or store failure, including timeouts and open circuits.
    #[error("Backend unavailable: {backend} - {message}")]
    BackendUnavailable { backend: String, message: String },

    /// Invalid adapter setup. Only ever produced at construction time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Hard capacity exhausted while eviction is disabled.
    #[error("Capacity exceeded: {requested} requested, limit {limit}")]
    CapacityExceeded { limit: u64, requested: u64 },

    /// Internal invariant violation (e.g. a background task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`CacheError`], safe to use as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// See [`CacheError::Serialization`].
    Serialization,
    /// See [`CacheError::BackendUnavailable`].
    BackendUnavailable,
    /// See [`CacheError::Configuration`].
    Configuration,
    /// See [`CacheError::CapacityExceeded`].
    CapacityExceeded,
    /// See [`CacheError::Internal`].
    Internal,
}

impl FailureKind {
    /// Returns the label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Serialization => "serialization",
            Self::BackendUnavailable => "backend_unavailable",
            Self::Configuration => "configuration",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CacheError {
    /// Returns the failure kind of this error.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Serialization(_) => FailureKind::Serialization,
            Self::BackendUnavailable { .. } => FailureKind::BackendUnavailable,
            Self::Configuration(_) => FailureKind::Configuration,
            Self::CapacityExceeded { .. } => FailureKind::CapacityExceeded,
            Self::Internal(_) => FailureKind::Internal,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a backend-unavailable error.
    #[must_use]
    pub fn backend<B: Into<String>, M: Into<String>>(backend: B, message: M) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization<T: Into<String>>(message: T) -> Self {
        Self::Serialization(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Checks if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }

    /// Checks if this error should count against a circuit breaker.
    ///
    /// Decoding failures are a payload problem, not a backend health signal.
    #[must_use]
    pub const fn should_trip_circuit_breaker(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON serialization error: {}", err))
    }
}
