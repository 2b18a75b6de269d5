//! Decorators that wrap any [`crate::Cache`] and add behavior on top of it.

mod dedup;
mod usage;

pub use dedup::{DedupCache, DedupStats, SimilarityIndex};
pub use usage::{CostFn, EntryUsage, UsageReport, UsageTrackingCache};
