//! Cache Events
//!
//! Events emitted by the cache for monitoring and observability.
//! Subscribers receive them over a broadcast channel; a cache with no
//! subscribers drops them silently.

use crate::cache::tier::CacheTier;
use serde::{Deserialize, Serialize};

/// Events emitted by the cache system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheEvent {
    /// Value was written to a tier
    Put {
        key: String,
        tier: CacheTier,
        size_bytes: u64,
        ttl_seconds: u64,
    },

    /// Lookup answered by a tier
    Hit {
        key: String,
        tier: CacheTier,
    },

    /// Lookup missed every tier
    Miss {
        key: String,
    },

    /// Key was deleted from all tiers
    Delete {
        key: String,
    },

    /// Entry was removed from L1
    Evict {
        key: String,
        tier: CacheTier,
        size_bytes: u64,
        reason: EvictionReason,
    },

    /// Value was copied into a faster tier
    Promote {
        key: String,
        from_tier: CacheTier,
        to_tier: CacheTier,
    },

    /// Value was moved into a slower tier
    Demote {
        key: String,
        from_tier: CacheTier,
        to_tier: CacheTier,
        size_bytes: u64,
    },

    /// Keys matching a pattern were cleared
    PatternCleared {
        pattern: String,
        l1_removed: usize,
        l2_removed: Option<u64>,
    },

    /// Warming pass completed
    Warmed {
        keys_requested: usize,
        keys_cached: usize,
    },

    /// Tier store call failed
    TierError {
        tier: CacheTier,
        operation: String,
        error: String,
    },
}

/// Reason for eviction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionReason {
    /// L1 capacity threshold reached
    Capacity,
    /// Entry outlived its TTL
    Expired,
    /// Removed by pattern, tag or clear request
    Manual,
    /// Demoted to a slower tier
    Migrated,
}

impl std::fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionReason::Capacity => write!(f, "capacity"),
            EvictionReason::Expired => write!(f, "expired"),
            EvictionReason::Manual => write!(f, "manual"),
            EvictionReason::Migrated => write!(f, "migrated"),
        }
    }
}

impl CacheEvent {
    /// Create a Put event
    pub fn put(key: &str, tier: CacheTier, size_bytes: u64, ttl_seconds: u64) -> Self {
        CacheEvent::Put {
            key: key.to_string(),
            tier,
            size_bytes,
            ttl_seconds,
        }
    }

    /// Create a Hit event
    pub fn hit(key: &str, tier: CacheTier) -> Self {
        CacheEvent::Hit {
            key: key.to_string(),
            tier,
        }
    }

    /// Create a Miss event
    pub fn miss(key: &str) -> Self {
        CacheEvent::Miss { key: key.to_string() }
    }

    /// Create an Evict event
    pub fn evict(key: &str, tier: CacheTier, size_bytes: u64, reason: EvictionReason) -> Self {
        CacheEvent::Evict {
            key: key.to_string(),
            tier,
            size_bytes,
            reason,
        }
    }

    /// Create a Promote event
    pub fn promote(key: &str, from_tier: CacheTier, to_tier: CacheTier) -> Self {
        CacheEvent::Promote {
            key: key.to_string(),
            from_tier,
            to_tier,
        }
    }

    /// Create a Demote event
    pub fn demote(key: &str, from_tier: CacheTier, to_tier: CacheTier, size_bytes: u64) -> Self {
        CacheEvent::Demote {
            key: key.to_string(),
            from_tier,
            to_tier,
            size_bytes,
        }
    }

    /// Create a TierError event
    pub fn tier_error(tier: CacheTier, operation: &str, error: impl std::fmt::Display) -> Self {
        CacheEvent::TierError {
            tier,
            operation: operation.to_string(),
            error: error.to_string(),
        }
    }

    /// Get the key associated with this event (if any)
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::Put { key, .. } => Some(key),
            CacheEvent::Hit { key, .. } => Some(key),
            CacheEvent::Miss { key } => Some(key),
            CacheEvent::Delete { key } => Some(key),
            CacheEvent::Evict { key, .. } => Some(key),
            CacheEvent::Promote { key, .. } => Some(key),
            CacheEvent::Demote { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Get the tier associated with this event (if any)
    pub fn tier(&self) -> Option<CacheTier> {
        match self {
            CacheEvent::Put { tier, .. } => Some(*tier),
            CacheEvent::Hit { tier, .. } => Some(*tier),
            CacheEvent::Evict { tier, .. } => Some(*tier),
            CacheEvent::Promote { to_tier, .. } => Some(*to_tier),
            CacheEvent::Demote { to_tier, .. } => Some(*to_tier),
            CacheEvent::TierError { tier, .. } => Some(*tier),
            _ => None,
        }
    }

    /// Check if this is an error event
    pub fn is_error(&self) -> bool {
        matches!(self, CacheEvent::TierError { .. })
    }
}
