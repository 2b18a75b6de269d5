//! Cache topology and write strategy selection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which adapter stack the factory builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Bounded in-process store only.
    #[default]
    Memory,
    /// Network key-value store only.
    Distributed,
    /// In-process fast tier in front of a distributed slow tier.
    Tiered,
}

impl Topology {
    /// Returns true if this topology needs a distributed store.
    #[must_use]
    pub const fn needs_store(&self) -> bool {
        matches!(self, Self::Distributed | Self::Tiered)
    }

    /// Returns true if this topology has an in-process store.
    #[must_use]
    pub const fn has_memory(&self) -> bool {
        matches!(self, Self::Memory | Self::Tiered)
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Distributed => write!(f, "distributed"),
            Self::Tiered => write!(f, "tiered"),
        }
    }
}

/// How a multi-tier cache propagates writes to its slow tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WriteStrategy {
    /// Write both tiers before returning.
    #[default]
    WriteThrough,
    /// Write the fast tier, then propagate to the slow tier in the background.
    WriteBehind,
}

impl WriteStrategy {
    /// Returns true if the slow-tier write is deferred.
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::WriteBehind)
    }
}

impl fmt::Display for WriteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteThrough => write!(f, "write-through"),
            Self::WriteBehind => write!(f, "write-behind"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_flags() {
        assert!(Topology::Tiered.needs_store());
        assert!(Topology::Tiered.has_memory());
        assert!(!Topology::Memory.needs_store());
        assert!(!Topology::Distributed.has_memory());
    }

    #[test]
    fn test_serde_names() {
        let strategy: WriteStrategy = serde_json::from_str("\"write-behind\"").unwrap();
        assert_eq!(strategy, WriteStrategy::WriteBehind);
        assert!(strategy.is_deferred());

        let topology: Topology = serde_json::from_str("\"tiered\"").unwrap();
        assert_eq!(topology, Topology::Tiered);
        assert_eq!(topology.to_string(), "tiered");
    }
}
