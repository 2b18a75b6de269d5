//! Byte-footprint estimation for capacity-bounded adapters.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Estimates the byte footprint of a value.
///
/// The default uses the length of the value's JSON serialization. Callers
/// with cheaper or more accurate knowledge can supply their own function.
pub struct SizeEstimator<V> {
    estimate: Arc<dyn Fn(&V) -> usize + Send + Sync>,
}

impl<V> SizeEstimator<V> {
    /// Wraps a caller-supplied estimator. It must be pure.
    pub fn new<F>(estimate: F) -> Self
    where
        F: Fn(&V) -> usize + Send + Sync + 'static,
    {
        Self {
            estimate: Arc::new(estimate),
        }
    }

    /// Estimates the footprint of `value`.
    pub fn estimate(&self, value: &V) -> usize {
        (self.estimate)(value)
    }
}

impl<V: Serialize + 'static> SizeEstimator<V> {
    /// Serialized-length estimator.
    #[must_use]
    pub fn serialized() -> Self {
        Self::new(|value: &V| {
            serde_json::to_vec(value).map_or(std::mem::size_of::<V>(), |bytes| bytes.len())
        })
    }
}

impl<V: Serialize + 'static> Default for SizeEstimator<V> {
    fn default() -> Self {
        Self::serialized()
    }
}

impl<V> Clone for SizeEstimator<V> {
    fn clone(&self) -> Self {
        Self {
            estimate: Arc::clone(&self.estimate),
        }
    }
}

impl<V> fmt::Debug for SizeEstimator<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizeEstimator").finish_non_exhaustive()
    }
}
