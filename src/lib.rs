//! Intelligent Cache
//!
//! A multi-tier cache (in-process L1, shared L2, persistent L3) whose
//! placement, TTLs and warming are driven by access analytics.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              REST API (axum)                                 │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                           IntelligentCache                                   │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │    L1 Memory    │  │    L2 Shared    │  │        L3 Persistent        │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────────┘  │
//! │           │                    │                         │                   │
//! │           └────────────────────┼─────────────────────────┘                   │
//! │                                │                                             │
//! │                    ┌───────────┴───────────┐                                │
//! │                    │    CacheAnalytics     │                                │
//! │                    │ (patterns, temporal)  │                                │
//! │                    └───────────────────────┘                                │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │       Background optimization, pruning and warming (tokio tasks)             │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: Tiers, analytics, warming and background processing
//! - [`api`]: HTTP surface of the cache service
//! - [`error`]: Error types and handling

pub mod api;
pub mod cache;
pub mod error;

// Re-export commonly used types
pub use api::{ApiServer, ApiServerConfig, RestRouter};

pub use cache::{
    CacheAnalytics, CacheCollaborators, CacheContext, CacheEvent, CacheLookup, CacheStatistics,
    CacheTier, HealthReport, IntelligentCache, IntelligentCacheConfig, MemoryStore, MetricsSink,
    NullStore, PrometheusSink, Recommendation, SetOptions, TierPlacement, TierStore,
};

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
