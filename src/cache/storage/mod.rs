//! Remote Tier Stores
//!
//! The L2 and L3 tiers are pluggable key-value stores reached through
//! [`TierStore`]. Values cross this boundary as serialized JSON bytes; the
//! cache engine owns (de)serialization.

mod memory;
mod persistent;

pub use memory::MemoryStore;
pub use persistent::NullStore;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

// =============================================================================
// TierStore Trait
// =============================================================================

/// Key-value store backing a remote cache tier
///
/// Implementations must be safe to call concurrently. Any `Err` is treated
/// by the cache as a miss (reads) or a failed write; it never propagates
/// to cache callers.
#[async_trait]
pub trait TierStore: Send + Sync {
    /// Human-readable backend name for logs
    fn name(&self) -> &str;

    /// Get the serialized value for a key
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store a serialized value with a TTL in seconds
    ///
    /// Returns false when the store declined the write.
    async fn setex(&self, key: &str, ttl_seconds: u64, value: Bytes) -> Result<bool>;

    /// Delete a key
    ///
    /// Returns true if the key existed. The cache treats any `Ok` as success.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete every key containing `pattern` as a substring
    ///
    /// `Ok(None)` means the store does not support pattern deletes.
    async fn delete_matching(&self, _pattern: &str) -> Result<Option<u64>> {
        Ok(None)
    }

    /// Optional health check capability
    fn health(&self) -> Option<&dyn HealthCheck> {
        None
    }
}

/// Health check for stores that support one
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Check if the store is reachable and answering
    async fn health_check(&self) -> Result<bool>;
}

/// Shared handle to a tier store
pub type TierStoreRef = Arc<dyn TierStore>;
