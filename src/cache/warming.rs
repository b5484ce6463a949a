//! Cache Warming Queue
//!
//! Priority queue of keys to pull into L1 ahead of demand. Candidates come
//! from analytics (frequent and seasonal patterns) or from callers via
//! `queue_warming`; the background warming pass drains it in batches.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

// =============================================================================
// Warming Configuration
// =============================================================================

/// Configuration for cache warming
#[derive(Debug, Clone)]
pub struct WarmingConfig {
    /// Maximum queued candidates
    pub max_queue_size: usize,
    /// Keys processed per warming pass
    pub batch_size: usize,
    /// Whether warming is enabled
    pub enabled: bool,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            batch_size: 100,
            enabled: true,
        }
    }
}

// =============================================================================
// Warming Candidate
// =============================================================================

/// Why a key was queued for warming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmingReason {
    /// Requested by a caller
    Requested,
    /// Pattern is accessed frequently and served well
    Frequent,
    /// Pattern peaks at the current or next hour
    Seasonal,
}

/// A key waiting to be warmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmingCandidate {
    /// Storage key
    pub key: String,
    /// Priority (higher = more urgent)
    pub priority: u8,
    /// Why the key was queued
    pub reason: WarmingReason,
}

impl WarmingCandidate {
    /// Create a caller-requested candidate
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            priority: 0,
            reason: WarmingReason::Requested,
        }
    }

    /// Set priority
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Set reason
    pub fn with_reason(mut self, reason: WarmingReason) -> Self {
        self.reason = reason;
        self
    }
}

// =============================================================================
// Warming Stats
// =============================================================================

/// Statistics for warming operations
#[derive(Debug, Default)]
pub struct WarmingStats {
    /// Enqueue calls
    pub requests: AtomicU64,
    /// Candidates accepted into the queue
    pub keys_queued: AtomicU64,
    /// Keys copied into L1 by a warming pass or `warm_cache`
    pub keys_warmed: AtomicU64,
    /// Keys already in L1 (no-op)
    pub keys_cached: AtomicU64,
    /// Keys no tier or loader could provide
    pub keys_missed: AtomicU64,
}

impl WarmingStats {
    /// Create a snapshot of current stats
    pub fn snapshot(&self) -> WarmingStatsSnapshot {
        WarmingStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            keys_queued: self.keys_queued.load(Ordering::Relaxed),
            keys_warmed: self.keys_warmed.load(Ordering::Relaxed),
            keys_cached: self.keys_cached.load(Ordering::Relaxed),
            keys_missed: self.keys_missed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of warming statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmingStatsSnapshot {
    pub requests: u64,
    pub keys_queued: u64,
    pub keys_warmed: u64,
    pub keys_cached: u64,
    pub keys_missed: u64,
}


// =============================================================================
// Warming Queue
// =============================================================================

/// Priority-ordered, de-duplicated warming queue
pub struct WarmingQueue {
    config: WarmingConfig,
    queue: Mutex<VecDeque<WarmingCandidate>>,
    stats: WarmingStats,
}

impl WarmingQueue {
    /// Create a queue with default config
    pub fn new() -> Self {
        Self::with_config(WarmingConfig::default())
    }

    /// Create with custom config
    pub fn with_config(config: WarmingConfig) -> Self {
        Self {
            config,
            queue: Mutex::new(VecDeque::new()),
            stats: WarmingStats::default(),
        }
    }

    /// Enqueue candidates, returning how many were accepted
    ///
    /// A key already queued keeps the higher of the two priorities. When
    /// the queue is full the lowest priority candidates are dropped.
    pub async fn enqueue(&self, candidates: Vec<WarmingCandidate>) -> usize {
        if !self.config.enabled || candidates.is_empty() {
            return 0;
        }
        self.stats.requests.fetch_add(1, Ordering::Relaxed);

        let mut queue = self.queue.lock().await;
        let mut accepted = 0;

        for candidate in candidates {
            if let Some(pos) = queue.iter().position(|c| c.key == candidate.key) {
                if queue[pos].priority >= candidate.priority {
                    continue;
                }
                queue.remove(pos);
            } else {
                accepted += 1;
            }

            // Higher priority = closer to front, FIFO within a priority
            let pos = queue
                .iter()
                .position(|c| c.priority < candidate.priority)
                .unwrap_or(queue.len());
            queue.insert(pos, candidate);
        }

        while queue.len() > self.config.max_queue_size {
            if let Some(dropped) = queue.pop_back() {
                debug!(key = %dropped.key, "Warming queue full, dropped candidate");
            }
        }

        self.stats
            .keys_queued
            .fetch_add(accepted as u64, Ordering::Relaxed);
        accepted
    }

    /// Take up to `batch_size` candidates from the front
    pub async fn next_batch(&self) -> Vec<WarmingCandidate> {
        let mut queue = self.queue.lock().await;
        let n = self.config.batch_size.min(queue.len());
        queue.drain(..n).collect()
    }

    /// Record a key copied into L1
    pub fn record_warmed(&self) {
        self.stats.keys_warmed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a key already present in L1
    pub fn record_cached(&self) {
        self.stats.keys_cached.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a key nobody could provide
    pub fn record_missed(&self) {
        self.stats.keys_missed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current queue length
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Check if the queue is empty
    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    /// Get statistics
    pub fn stats(&self) -> WarmingStatsSnapshot {
        self.stats.snapshot()
    }

    /// Get configuration
    pub fn config(&self) -> &WarmingConfig {
        &self.config
    }
}

impl Default for WarmingQueue {
    fn default() -> Self {
        Self::new()
    }
}
