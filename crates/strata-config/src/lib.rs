//! # Strata Config
//!
//! Configuration management for the Strata caching engine.
//! Supports layered configuration from files and environment variables,
//! fail-fast validation, and runtime refresh.

mod app_config;
mod loader;
mod topology;
mod validation;

pub use app_config::*;
pub use loader::*;
pub use topology::*;
pub use validation::*;
