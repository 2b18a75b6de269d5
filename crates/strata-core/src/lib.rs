//! # Strata Core
//!
//! Core types, traits, and error definitions for the Strata caching engine.
//! Every adapter, decorator and collaborator builds on the abstractions here:
//! the error taxonomy, entry metadata, the key builder, clear patterns,
//! statistics, and the observability sink.

pub mod entry;
pub mod error;
pub mod key;
pub mod observability;
pub mod pattern;
pub mod result;
pub mod size;
pub mod stats;
pub mod telemetry;
pub mod traits;

pub use entry::*;
pub use error::*;
pub use key::*;
pub use observability::{
    register_metrics, CacheEvent, EventAttributes, FanoutSink, MetricsSink, NoopSink,
    ObservabilitySink, SharedSink, TracingSink,
};
pub use pattern::*;
pub use result::*;
pub use size::*;
pub use stats::*;
pub use telemetry::*;
pub use traits::*;
