//! Persistent Tier Placeholder
//!
//! Stand-in for a persistent L3 backend. Reads always miss; writes are
//! acknowledged and discarded so that write-through to L3 succeeds.

use crate::cache::storage::TierStore;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// Persistent tier that stores nothing
#[derive(Debug, Clone)]
pub struct NullStore {
    name: String,
}

impl NullStore {
    /// Create a new placeholder store
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new("l3-null")
    }
}

#[async_trait]
impl TierStore for NullStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, _key: &str) -> Result<Option<Bytes>> {
        Ok(None)
    }

    async fn setex(&self, key: &str, ttl_seconds: u64, value: Bytes) -> Result<bool> {
        debug!(
            store = %self.name,
            key = %key,
            ttl_seconds,
            size_bytes = value.len(),
            "Discarding write to placeholder persistent tier"
        );
        Ok(true)
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }
}
