//! # Strata Cache
//!
//! One cache contract, several storage strategies:
//!
//! - [`InMemoryCache`]: bounded in-process store with TTL; when full it evicts
//!   the entry cached earliest, without per-read bookkeeping
//! - [`DistributedCache`]: delegates to a network key-value store through a
//!   [`store::StoreClient`], every call wrapped by a failure guard
//! - [`TieredCache`]: fast tier in front of a slow tier with promotion and
//!   write-through or write-behind propagation
//!
//! Decorators ([`DedupCache`], [`UsageTrackingCache`]) wrap any adapter,
//! [`ReadThrough`] adds stampede-protected origin loading, and
//! [`CacheFactory`] assembles the whole stack from configuration.

mod contract;
pub mod decorator;
mod distributed;
mod factory;
mod memory;
mod read_through;
pub mod store;
mod tiered;

pub use contract::*;
pub use decorator::*;
pub use distributed::{DistributedCache, DistributedOptions};
pub use factory::{CacheFactory, SharedStore};
pub use memory::{InMemoryCache, MemoryCacheOptions};
pub use read_through::ReadThrough;
pub use tiered::{TieredCache, TieredOptions};
