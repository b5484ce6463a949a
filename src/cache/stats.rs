//! Cache Statistics
//!
//! Cache-line aligned per-tier counters plus point-in-time snapshots.
//! Each tier owns its own counters; they are never shared across tiers.

use crate::cache::tier::CacheTier;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Cache line size for alignment (64 bytes on most modern CPUs)
pub const CACHE_LINE_SIZE: usize = 64;

// =============================================================================
// Per-Tier Stats (Cache-Line Aligned)
// =============================================================================

/// Rolling counters for a single cache tier, aligned to prevent false sharing
#[repr(C, align(64))]
#[derive(Debug)]
pub struct TierStats {
    /// Number of lookups answered by this tier
    pub hits: AtomicU64,
    /// Number of times this tier was consulted without finding the key
    ///
    /// One `get` that misses everywhere records a miss on every configured
    /// tier it consulted, so summing misses across tiers overcounts lookups.
    /// Use `CacheStats::full_misses` for whole-lookup misses.
    pub misses: AtomicU64,
    /// Entries removed under capacity pressure or expiry
    pub evictions: AtomicU64,
    /// Successful writes into this tier
    pub writes: AtomicU64,
    /// Entries currently stored (tracked for L1 only)
    pub entry_count: AtomicU64,
    /// Bytes currently stored (tracked for L1 only)
    pub size_bytes: AtomicU64,
    /// Values promoted into this tier from a slower one
    pub promotions: AtomicU64,
    /// Values migrated out of this tier into a slower one
    pub demotions: AtomicU64,
    /// Accumulated lookup time in microseconds
    pub access_time_total_us: AtomicU64,
    /// Last update timestamp (Unix millis)
    pub last_update_ms: AtomicU64,
}

impl Default for TierStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TierStats {
    /// Create new zeroed stats
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            entry_count: AtomicU64::new(0),
            size_bytes: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            demotions: AtomicU64::new(0),
            access_time_total_us: AtomicU64::new(0),
            last_update_ms: AtomicU64::new(0),
        }
    }

    /// Record a hit and its lookup latency
    #[inline]
    pub fn record_hit(&self, elapsed: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.record_access_time(elapsed);
    }

    /// Record a miss and its lookup latency
    #[inline]
    pub fn record_miss(&self, elapsed: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.record_access_time(elapsed);
    }

    /// Record a successful write
    #[inline]
    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record an entry being inserted into a tracked tier
    #[inline]
    pub fn record_insert(&self, size_bytes: u64) {
        self.entry_count.fetch_add(1, Ordering::Relaxed);
        self.size_bytes.fetch_add(size_bytes, Ordering::Relaxed);
        self.record_write();
    }

    /// Record an entry being replaced in place
    #[inline]
    pub fn record_replace(&self, old_size: u64, new_size: u64) {
        if new_size > old_size {
            self.size_bytes.fetch_add(new_size - old_size, Ordering::Relaxed);
        } else {
            self.size_bytes.fetch_sub(old_size - new_size, Ordering::Relaxed);
        }
        self.record_write();
    }

    /// Record an entry being removed from a tracked tier
    #[inline]
    pub fn record_remove(&self, size_bytes: u64) {
        self.entry_count.fetch_sub(1, Ordering::Relaxed);
        self.size_bytes.fetch_sub(size_bytes, Ordering::Relaxed);
        self.touch();
    }

    /// Record an eviction
    #[inline]
    pub fn record_eviction(&self, size_bytes: u64) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.record_remove(size_bytes);
    }

    /// Record a promotion into this tier
    #[inline]
    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record a demotion out of this tier
    #[inline]
    pub fn record_demotion(&self) {
        self.demotions.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Reset storage counters (entry_count and size_bytes) to zero
    #[inline]
    pub fn reset_storage(&self) {
        self.entry_count.store(0, Ordering::Relaxed);
        self.size_bytes.store(0, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    fn record_access_time(&self, elapsed: Duration) {
        self.access_time_total_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    fn touch(&self) {
        self.last_update_ms
            .store(Utc::now().timestamp_millis() as u64, Ordering::Release);
    }

    /// Get total lookups against this tier (hits + misses)
    #[inline]
    pub fn total_requests(&self) -> u64 {
        self.hits.load(Ordering::Relaxed) + self.misses.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits.load(Ordering::Relaxed) as f64 / total as f64
        }
    }

    /// Get current entry count
    #[inline]
    pub fn get_entry_count(&self) -> u64 {
        self.entry_count.load(Ordering::Relaxed)
    }

    /// Create a snapshot of the current counters
    pub fn snapshot(&self, tier: CacheTier) -> TierStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let access_us = self.access_time_total_us.load(Ordering::Relaxed);
        let last_ms = self.last_update_ms.load(Ordering::Acquire);

        TierStatsSnapshot {
            tier,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            entry_count: self.entry_count.load(Ordering::Relaxed),
            size_bytes: self.size_bytes.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            demotions: self.demotions.load(Ordering::Relaxed),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            avg_access_time_ms: if total == 0 {
                0.0
            } else {
                access_us as f64 / total as f64 / 1000.0
            },
            last_updated: if last_ms == 0 {
                None
            } else {
                Utc.timestamp_millis_opt(last_ms as i64).single()
            },
        }
    }
}

// =============================================================================
// Snapshots
// =============================================================================

/// Point-in-time snapshot of one tier's counters
#[derive(Debug, Clone, Serialize)]
pub struct TierStatsSnapshot {
    pub tier: CacheTier,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub writes: u64,
    pub entry_count: u64,
    pub size_bytes: u64,
    pub promotions: u64,
    pub demotions: u64,
    pub hit_rate: f64,
    pub avg_access_time_ms: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

// =============================================================================
// Cache-wide Stats
// =============================================================================

/// Stats for all three tiers plus whole-lookup counters
///
/// Per-tier `misses` count tier consultations, `full_misses` counts `get` calls.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub l1: TierStats,
    pub l2: TierStats,
    pub l3: TierStats,
    /// Total `get` calls
    pub lookups: AtomicU64,
    /// `get` calls that missed every tier; counted once per call
    pub full_misses: AtomicU64,
}

impl CacheStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Get stats for a specific tier
    pub fn tier(&self, tier: CacheTier) -> &TierStats {
        match tier {
            CacheTier::L1 => &self.l1,
            CacheTier::L2 => &self.l2,
            CacheTier::L3 => &self.l3,
        }
    }

    /// Record the outcome of a whole lookup
    pub fn record_lookup(&self, hit: bool) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if !hit {
            self.full_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Fraction of lookups answered by any tier
    pub fn overall_hit_rate(&self) -> f64 {
        let lookups = self.lookups.load(Ordering::Relaxed);
        if lookups == 0 {
            0.0
        } else {
            let misses = self.full_misses.load(Ordering::Relaxed);
            lookups.saturating_sub(misses) as f64 / lookups as f64
        }
    }

    /// Snapshot all three tiers in lookup order
    pub fn tier_snapshots(&self) -> Vec<TierStatsSnapshot> {
        CacheTier::lookup_order()
            .iter()
            .map(|tier| self.tier(*tier).snapshot(*tier))
            .collect()
    }
}
