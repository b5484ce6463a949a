//! Cache Entry Types
//!
//! Defines cache entries, semantic key derivation and the eviction score
//! used by the L1 tier.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

// =============================================================================
// Eviction Score Constants
// =============================================================================

/// Weight of the access count in the eviction score
pub const ACCESS_COUNT_WEIGHT: f64 = 0.3;

/// Weight of the manual priority in the eviction score
pub const PRIORITY_WEIGHT: f64 = 0.2;

/// Window over which entry age decays the score (24 hours)
pub const AGE_DECAY_SECONDS: f64 = 86_400.0;

/// Window over which idle time decays the score (1 hour)
pub const IDLE_DECAY_SECONDS: f64 = 3_600.0;

/// Floor applied to each decay factor
pub const MIN_DECAY_FACTOR: f64 = 0.1;

/// Entries larger than this take a size penalty: 100 KB
pub const LARGE_ENTRY_BYTES: u64 = 100 * 1024;

/// Multiplier applied to large entries
pub const LARGE_ENTRY_PENALTY: f64 = 0.8;

// =============================================================================
// Semantic Keys
// =============================================================================

/// Context mapping used to derive semantic cache keys
///
/// A `BTreeMap` keeps the keys sorted, so structurally equal contexts
/// serialize identically.
pub type CacheContext = BTreeMap<String, Value>;

/// Hex-encoded SHA-256 digest truncated to `len` characters
pub fn short_digest(input: &[u8], len: usize) -> String {
    let digest = hex::encode(Sha256::digest(input));
    digest[..len.min(digest.len())].to_string()
}

/// 8-character fingerprint of a context mapping
pub fn context_fingerprint(context: &CacheContext) -> String {
    let canonical = serde_json::to_string(context).unwrap_or_default();
    short_digest(canonical.as_bytes(), 8)
}

/// Derive the storage key for a logical key and optional context
///
/// Without context the key is used as-is; with context it becomes
/// `key:<8 hex digest>`.
pub fn derive_cache_key(key: &str, context: Option<&CacheContext>) -> String {
    match context {
        Some(ctx) if !ctx.is_empty() => format!("{}:{}", key, context_fingerprint(ctx)),
        _ => key.to_string(),
    }
}

/// Estimate the serialized size of a value in bytes
///
/// Serialization failures are not fatal; the value is treated as size 0.
pub fn estimate_size(key: &str, value: &Value) -> u64 {
    match serde_json::to_vec(value) {
        Ok(bytes) => bytes.len() as u64,
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to estimate cached value size");
            0
        }
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// A cached value with lifecycle metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Storage key (already derived from context)
    pub key: String,
    /// The cached payload
    pub value: Arc<Value>,
    /// Time when the entry was inserted
    pub created_at: Instant,
    /// Time of the last successful read
    pub last_accessed: Instant,
    /// Number of successful reads
    pub access_count: u64,
    /// Serialized size estimate, fixed at insertion
    pub size_bytes: u64,
    /// Time-to-live in seconds (None = never expires), fixed at insertion
    pub ttl_seconds: Option<u64>,
    /// Grouping tags
    pub tags: BTreeSet<String>,
    /// Fingerprint of the context the key was derived from
    pub semantic_hash: Option<String>,
    /// Manual weight for eviction scoring
    pub priority_score: f64,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        let size_bytes = estimate_size(&key, &value);
        Self::from_shared(key, Arc::new(value), size_bytes)
    }

    /// Create an entry around an already shared value of known size
    pub fn from_shared(key: impl Into<String>, value: Arc<Value>, size_bytes: u64) -> Self {
        let now = Instant::now();
        Self {
            key: key.into(),
            value,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            size_bytes,
            ttl_seconds: None,
            tags: BTreeSet::new(),
            semantic_hash: None,
            priority_score: 1.0,
        }
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl_seconds: Option<u64>) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Set the tags
    pub fn with_tags(mut self, tags: BTreeSet<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the semantic hash
    pub fn with_semantic_hash(mut self, semantic_hash: Option<String>) -> Self {
        self.semantic_hash = semantic_hash;
        self
    }

    /// Set the priority score
    pub fn with_priority(mut self, priority_score: f64) -> Self {
        self.priority_score = priority_score;
        self
    }

    /// Record a successful read
    pub fn record_access(&mut self, now: Instant) {
        self.last_accessed = now;
        self.access_count += 1;
    }

    /// Check if the entry has outlived its TTL
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.ttl_seconds {
            Some(ttl) => now.saturating_duration_since(self.created_at) > Duration::from_secs(ttl),
            None => false,
        }
    }

    /// Age in seconds since insertion
    pub fn age_seconds(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.created_at).as_secs_f64()
    }

    /// Seconds since the last successful read (or insertion)
    pub fn idle_seconds(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.last_accessed).as_secs_f64()
    }

    /// Check if the entry carries a tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Composite retention score (lower = evicted first)
    ///
    /// Frequency and priority form the base, which decays with age over
    /// 24 hours and with idle time over 1 hour. Large entries take a
    /// penalty.
    pub fn eviction_score(&self, now: Instant) -> f64 {
        let mut score =
            self.access_count as f64 * ACCESS_COUNT_WEIGHT + self.priority_score * PRIORITY_WEIGHT;

        score *= (1.0 - self.age_seconds(now) / AGE_DECAY_SECONDS).max(MIN_DECAY_FACTOR);
        score *= (1.0 - self.idle_seconds(now) / IDLE_DECAY_SECONDS).max(MIN_DECAY_FACTOR);

        if self.size_bytes > LARGE_ENTRY_BYTES {
            score *= LARGE_ENTRY_PENALTY;
        }

        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_derive_key_without_context() {
        assert_eq!(derive_cache_key("user:42", None), "user:42");
        assert_eq!(derive_cache_key("user:42", Some(&CacheContext::new())), "user:42");
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let mut ctx1 = CacheContext::new();
        ctx1.insert("model".into(), json!("gpt"));
        ctx1.insert("lang".into(), json!("en"));

        // Insertion order does not matter
        let mut ctx2 = CacheContext::new();
        ctx2.insert("lang".into(), json!("en"));
        ctx2.insert("model".into(), json!("gpt"));

        let k1 = derive_cache_key("q", Some(&ctx1));
        let k2 = derive_cache_key("q", Some(&ctx2));
        assert_eq!(k1, k2);
        assert!(k1.starts_with("q:"));
        assert_eq!(k1.len(), "q:".len() + 8);

        let mut ctx3 = CacheContext::new();
        ctx3.insert("lang".into(), json!("fr"));
        ctx3.insert("model".into(), json!("gpt"));
        assert_ne!(k1, derive_cache_key("q", Some(&ctx3)));
    }

    #[test]
    fn test_short_digest() {
        let d = short_digest(b"alice", 16);
        assert_eq!(d.len(), 16);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(d, short_digest(b"alice", 16));
        assert_ne!(d, short_digest(b"bob", 16));
    }

    #[test]
    fn test_estimate_size() {
        assert_eq!(estimate_size("k", &json!("v1")), 4); // "v1" with quotes
        assert_eq!(estimate_size("k", &json!(null)), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expiry() {
        let entry = CacheEntry::new("k", json!("v")).with_ttl(Some(60));
        let start = entry.created_at;

        assert!(!entry.is_expired(start + Duration::from_secs(59)));
        assert!(!entry.is_expired(start + Duration::from_secs(60)));
        assert!(entry.is_expired(start + Duration::from_secs(61)));

        let forever = CacheEntry::new("k", json!("v"));
        assert!(!forever.is_expired(start + Duration::from_secs(10 * 86_400)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_score_prefers_frequent_entries() {
        let now = Instant::now();
        let mut hot = CacheEntry::new("hot", json!("v"));
        let cold = CacheEntry::new("cold", json!("v"));
        for _ in 0..5 {
            hot.record_access(now);
        }

        assert!(hot.eviction_score(now) > cold.eviction_score(now));
        // Fresh entry: 0 accesses, priority 1.0
        assert!((cold.eviction_score(now) - 0.2).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_score_decay_and_penalty() {
        let entry = CacheEntry::new("k", json!("v"));
        let start = entry.created_at;

        // After 2 hours idle the idle factor hits its floor
        let later = start + Duration::from_secs(7_200);
        let expected = 0.2 * (1.0 - 7_200.0 / 86_400.0) * 0.1;
        assert!((entry.eviction_score(later) - expected).abs() < 1e-9);

        let mut large = CacheEntry::new("big", json!("x".repeat(200 * 1024)));
        large.priority_score = 1.0;
        assert!(large.size_bytes > LARGE_ENTRY_BYTES);
        assert!((large.eviction_score(start) - 0.2 * LARGE_ENTRY_PENALTY).abs() < 1e-9);
    }
}
