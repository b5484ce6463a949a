//! Multi-Tier Intelligent Cache
//!
//! A three-tier cache whose placement, TTLs and warming are driven by
//! access analytics:
//! - **L1 Memory**: in-process map with score-based eviction
//! - **L2 Shared**: remote key-value store (optional)
//! - **L3 Persistent**: persistent store (placeholder by default)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Intelligent Cache                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────────────┐   │
//! │  │  L1 Memory   │  │  L2 Shared   │  │      L3 Persistent           │   │
//! │  │  (HashMap)   │  │  (TierStore) │  │      (TierStore)             │   │
//! │  │  <=1MB       │  │  <=10MB      │  │      >10MB                   │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────────────────┘   │
//! │         │                  │                       │                     │
//! │         └──────────────────┼───────────────────────┘                     │
//! │                            │                                             │
//! │                    ┌───────┴────────┐                                    │
//! │                    │ Cache Analytics│                                    │
//! │                    │ (key patterns) │                                    │
//! │                    └────────────────┘                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  • Semantic keys from context    • Frequency/priority/recency eviction  │
//! │  • Promotion on slower-tier hits • Analytics-recommended TTLs           │
//! │  • Background warming & pruning  • Per-tier cache-line aligned stats    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use intelligent_cache::cache::{IntelligentCache, IntelligentCacheConfig, SetOptions};
//! use serde_json::json;
//!
//! let cache = IntelligentCache::new(IntelligentCacheConfig::default())?;
//!
//! // Store (placement chosen from size and access history)
//! cache.set("user:42:profile", json!({"name": "Ada"}), SetOptions::new().ttl(600)).await;
//!
//! // Retrieve (searches L1 -> L2 -> L3)
//! match cache.get("user:42:profile", None, None).await {
//!     CacheLookup::Hit { value, tier } => println!("Found in {}: {}", tier, value),
//!     CacheLookup::Miss => println!("Not in cache"),
//! }
//!
//! cache.start_background_processing();
//! let stats = cache.get_cache_statistics();
//! println!("Hit rate: {:.2}%", stats.overall_hit_rate * 100.0);
//! ```

pub mod analytics;
pub mod background;
pub mod entry;
pub mod events;
pub mod manager;
pub mod sink;
pub mod stats;
pub mod storage;
pub mod tier;
pub mod warming;

// Re-export main types
pub use analytics::{
    generalize_key_pattern, AccessPattern, AccessRecord, AnalyticsConfig, CacheAnalytics,
    PatternSummary, Recommendation, RecommendationKind, RecommendationPriority, TierAction,
};
pub use background::{BackgroundConfig, OptimizationReport};
pub use entry::{derive_cache_key, CacheContext, CacheEntry};
pub use events::{CacheEvent, EvictionReason};
pub use manager::{
    CacheCollaborators, CacheStatistics, HealthReport, IntelligentCache, IntelligentCacheConfig,
    SetOptions,
};
pub use sink::{CacheAccessEvent, CacheEventType, MetricsSink, PrometheusSink};
pub use stats::{CacheStats, TierStats, TierStatsSnapshot};
pub use storage::{HealthCheck, MemoryStore, NullStore, TierStore, TierStoreRef};
pub use tier::{CacheTier, TierPlacement, L2_PLACEMENT_THRESHOLD_BYTES, L3_PLACEMENT_THRESHOLD_BYTES};
pub use warming::{WarmingCandidate, WarmingConfig, WarmingQueue, WarmingReason};

use serde_json::Value;
use std::sync::Arc;

// =============================================================================
// Cache Lookup Result
// =============================================================================

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Cache hit with value and the tier that answered
    Hit {
        /// The cached value
        value: Arc<Value>,
        /// Tier where the value was found
        tier: CacheTier,
    },
    /// Not found in any tier
    Miss,
}

impl CacheLookup {
    /// Check if this is a cache hit
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit { .. })
    }

    /// Check if this is a cache miss
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheLookup::Miss)
    }

    /// Get the value if this is a hit
    pub fn value(&self) -> Option<&Value> {
        match self {
            CacheLookup::Hit { value, .. } => Some(value.as_ref()),
            CacheLookup::Miss => None,
        }
    }

    /// Get the tier if this is a hit
    pub fn tier(&self) -> Option<CacheTier> {
        match self {
            CacheLookup::Hit { tier, .. } => Some(*tier),
            CacheLookup::Miss => None,
        }
    }

    /// Split into `(value, hit)`
    pub fn into_parts(self) -> (Option<Arc<Value>>, bool) {
        match self {
            CacheLookup::Hit { value, .. } => (Some(value), true),
            CacheLookup::Miss => (None, false),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_accessors() {
        let hit = CacheLookup::Hit {
            value: Arc::new(json!("test")),
            tier: CacheTier::L1,
        };
        assert!(hit.is_hit());
        assert!(!hit.is_miss());
        assert_eq!(hit.value(), Some(&json!("test")));
        assert_eq!(hit.tier(), Some(CacheTier::L1));
        assert_eq!(hit.into_parts().1, true);

        let miss = CacheLookup::Miss;
        assert!(miss.is_miss());
        assert_eq!(miss.value(), None);
        assert_eq!(miss.tier(), None);
        assert_eq!(miss.into_parts(), (None, false));
    }
}
