//! # Strata Resilience
//!
//! Failure guards wrapped around distributed cache backend calls
//! (circuit breaker, retry, rate limit, timeout) and single-flight
//! coalescing for read-through loads.

pub mod circuit_breaker;
pub mod coalesce;
pub mod guard;
pub mod rate_limiter;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::*;
pub use coalesce::*;
pub use guard::*;
pub use rate_limiter::*;
pub use retry::*;
pub use timeout::*;
