//! In-Process Tier Store
//!
//! DashMap-backed key-value store with per-key expiry. Serves as the L2
//! backend for single-node deployments and as the test double for remote
//! tiers; `set_available(false)` makes every call fail like an unreachable
//! server would.

use crate::cache::storage::{HealthCheck, TierStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct StoredValue {
    data: Bytes,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-process tier store
pub struct MemoryStore {
    name: String,
    entries: DashMap<String, StoredValue>,
    size_bytes: AtomicU64,
    available: AtomicBool,
}

impl MemoryStore {
    /// Create a new store
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            size_bytes: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle availability (unavailable stores fail every call)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Check availability
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Number of stored keys (including not yet reaped expired ones)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total stored bytes
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }

    /// Check if a live key exists
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .map(|v| !v.is_expired(now))
            .unwrap_or(false)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(Error::TierUnavailable {
                tier: self.name.clone(),
            })
        }
    }

    fn remove_entry(&self, key: &str) -> bool {
        if let Some((_, value)) = self.entries.remove(key) {
            self.size_bytes
                .fetch_sub(value.data.len() as u64, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl TierStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.ensure_available()?;
        let now = Instant::now();

        let expired = match self.entries.get(key) {
            Some(value) if !value.is_expired(now) => return Ok(Some(value.data.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.remove_entry(key);
        }
        Ok(None)
    }

    async fn setex(&self, key: &str, ttl_seconds: u64, value: Bytes) -> Result<bool> {
        self.ensure_available()?;
        let new_size = value.len() as u64;
        let stored = StoredValue {
            data: value,
            expires_at: Some(Instant::now() + Duration::from_secs(ttl_seconds)),
        };

        match self.entries.insert(key.to_string(), stored) {
            Some(old) => {
                let old_size = old.data.len() as u64;
                if new_size > old_size {
                    self.size_bytes.fetch_add(new_size - old_size, Ordering::Relaxed);
                } else {
                    self.size_bytes.fetch_sub(old_size - new_size, Ordering::Relaxed);
                }
            }
            None => {
                self.size_bytes.fetch_add(new_size, Ordering::Relaxed);
            }
        }
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.remove_entry(key))
    }

    async fn delete_matching(&self, pattern: &str) -> Result<Option<u64>> {
        self.ensure_available()?;
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|r| r.key().contains(pattern))
            .map(|r| r.key().clone())
            .collect();

        let removed = matching.iter().filter(|k| self.remove_entry(k)).count();
        Ok(Some(removed as u64))
    }

    fn health(&self) -> Option<&dyn HealthCheck> {
        Some(self)
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn health_check(&self) -> Result<bool> {
        Ok(self.is_available())
    }
}

// =============================================================================
// Tests
// =============================================================================
