//! Cache Tier Definitions
//!
//! Defines the three-tier caching hierarchy and the size thresholds used
//! for automatic placement.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Size Thresholds
// =============================================================================

/// Values larger than this are placed in L2 when placement is automatic: 1 MB
pub const L2_PLACEMENT_THRESHOLD_BYTES: u64 = 1024 * 1024;

/// Values larger than this are placed in L3 when placement is automatic: 10 MB
pub const L3_PLACEMENT_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

// =============================================================================
// Cache Tier
// =============================================================================

/// Cache tier representing the storage hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum CacheTier {
    /// L1: In-process memory (fastest, smallest)
    #[default]
    L1,
    /// L2: Shared remote key-value store
    L2,
    /// L3: Persistent store (slowest, largest)
    L3,
}

impl CacheTier {
    /// Determine the tier forced by value size alone, if any
    ///
    /// Small values return `None`; their placement is decided by access
    /// patterns instead.
    pub fn for_size(size_bytes: u64) -> Option<Self> {
        if size_bytes > L3_PLACEMENT_THRESHOLD_BYTES {
            Some(CacheTier::L3)
        } else if size_bytes > L2_PLACEMENT_THRESHOLD_BYTES {
            Some(CacheTier::L2)
        } else {
            None
        }
    }

    /// Get the demotion target tier (where entries go when migrated down)
    pub fn demotion_target(&self) -> Option<CacheTier> {
        match self {
            CacheTier::L1 => Some(CacheTier::L2),
            CacheTier::L2 => Some(CacheTier::L3),
            CacheTier::L3 => None,
        }
    }

    /// Get the promotion target tier
    pub fn promotion_target(&self) -> Option<CacheTier> {
        match self {
            CacheTier::L1 => None,
            CacheTier::L2 => Some(CacheTier::L1),
            CacheTier::L3 => Some(CacheTier::L2),
        }
    }

    /// Tiers that an automatic write to this tier also populates
    ///
    /// L1 writes through to the shared L2 tier and L2 writes through to
    /// L3. L3 is terminal.
    pub fn write_through_tiers(&self) -> &'static [CacheTier] {
        match self {
            CacheTier::L1 => &[CacheTier::L1, CacheTier::L2],
            CacheTier::L2 => &[CacheTier::L2, CacheTier::L3],
            CacheTier::L3 => &[CacheTier::L3],
        }
    }

    /// Short label used in analytics and stats ("L1", "L2", "L3")
    pub fn label(&self) -> &'static str {
        match self {
            CacheTier::L1 => "L1",
            CacheTier::L2 => "L2",
            CacheTier::L3 => "L3",
        }
    }

    /// Get all tiers in lookup order (L1 -> L2 -> L3)
    pub fn lookup_order() -> &'static [CacheTier] {
        &[CacheTier::L1, CacheTier::L2, CacheTier::L3]
    }
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CacheTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "L1" => Ok(CacheTier::L1),
            "L2" => Ok(CacheTier::L2),
            "L3" => Ok(CacheTier::L3),
            other => Err(Error::Configuration(format!("Unknown cache tier: {}", other))),
        }
    }
}

// =============================================================================
// Tier Placement
// =============================================================================

/// Where a `set` should place a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierPlacement {
    /// Let the cache decide from size and access patterns
    #[default]
    Auto,
    /// Write only to the given tier
    Explicit(CacheTier),
}

impl FromStr for TierPlacement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(TierPlacement::Auto)
        } else {
            s.parse().map(TierPlacement::Explicit)
        }
    }
}

impl From<CacheTier> for TierPlacement {
    fn from(tier: CacheTier) -> Self {
        TierPlacement::Explicit(tier)
    }
}
