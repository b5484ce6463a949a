//! Cache Analytics
//!
//! Records every cache access, folds concrete keys into generalized
//! patterns (UUIDs, timestamps, numeric ids and hashes replaced by
//! placeholders) and derives TTL, tier and warming recommendations from the
//! per-pattern history.
//!
//! The pattern map is bounded twice: each pattern keeps a capped list of
//! access times, and the map itself evicts its least recently touched
//! pattern once `max_patterns` is reached.

use crate::cache::entry::{context_fingerprint, short_digest, CacheContext};
use crate::cache::tier::CacheTier;
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::OnceLock;
use tracing::debug;

// =============================================================================
// Constants
// =============================================================================

/// Default TTL recommended for a newly seen pattern (1 hour)
pub const DEFAULT_RECOMMENDED_TTL: u64 = 3_600;

/// Upper bound for recommended TTLs (24 hours)
pub const MAX_RECOMMENDED_TTL: u64 = 86_400;

/// Accesses per hour above which a pattern counts as high-frequency
pub const HIGH_FREQUENCY_PER_HOUR: f64 = 10.0;

/// Effectiveness below which a high-frequency pattern needs a longer TTL
pub const LOW_EFFECTIVENESS: f64 = 0.5;

/// Distinct users above which a pattern should live in a shared tier
pub const SHARED_TIER_USERS: usize = 10;

/// Distinct users at which the shared tier recommendation moves to L3
pub const L3_SHARED_TIER_USERS: usize = 50;

const HIT_REWARD: f64 = 0.1;
const MISS_PENALTY: f64 = 0.05;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for cache analytics
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Access times kept per pattern before trimming
    pub max_access_times: usize,
    /// Access times retained after a trim
    pub trim_to: usize,
    /// Maximum number of patterns tracked
    pub max_patterns: usize,
    /// Access history older than this is pruned
    pub retention: ChronoDuration,
    /// Concrete keys remembered per pattern for warming
    pub max_recent_keys: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            max_access_times: 1_000,
            trim_to: 500,
            max_patterns: 10_000,
            retention: ChronoDuration::hours(24),
            max_recent_keys: 20,
        }
    }
}

// =============================================================================
// Key Generalization
// =============================================================================

fn uuid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .expect("uuid regex is valid")
    })
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?")
            .expect("timestamp regex is valid")
    })
}

fn numeric_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":\d+:").expect("numeric id regex is valid"))
}

fn hash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9a-fA-F]{16,}").expect("hash regex is valid"))
}

/// Replace the variable segments of a key with placeholders
///
/// Order matters: timestamps are replaced before numeric ids so their
/// `:mm:` parts are not mistaken for ids.
pub fn generalize_key_pattern(key: &str) -> String {
    let pattern = uuid_re().replace_all(key, "<UUID>");
    let pattern = timestamp_re().replace_all(&pattern, "<TIMESTAMP>");
    let pattern = numeric_id_re().replace_all(&pattern, ":<ID>:");
    let pattern = hash_re().replace_all(&pattern, "<HASH>");
    pattern.into_owned()
}

/// One-way hash of a user identifier (first 16 hex chars of SHA-256)
pub fn hash_user_id(user_id: &str) -> String {
    short_digest(user_id.as_bytes(), 16)
}

// =============================================================================
// Access Pattern
// =============================================================================

/// Aggregate behavior of one generalized key pattern
#[derive(Debug, Clone)]
pub struct AccessPattern {
    /// Generalized key pattern
    pub key_pattern: String,
    /// Recent access timestamps (bounded)
    pub access_times: Vec<DateTime<Utc>>,
    /// Accesses per hour over the recorded span
    pub access_frequency: f64,
    /// Hour of day ("0".."23") -> access count
    pub seasonal_pattern: BTreeMap<String, u64>,
    /// Hashed user id -> access count
    pub user_distribution: HashMap<String, u64>,
    /// Hit-driven score in [0, 1]
    pub effectiveness_score: f64,
    /// Recommended TTL in seconds
    pub recommended_ttl: u64,
    /// Last recommended tier
    pub cache_tier: CacheTier,
    /// Concrete keys recently seen for this pattern (bounded, newest last)
    pub recent_keys: VecDeque<String>,
    /// Total hits recorded
    pub hits: u64,
    /// Total misses recorded
    pub misses: u64,
    /// Analytics clock value of the latest access
    pub last_touched: u64,
}

impl AccessPattern {
    /// Create an empty pattern with default recommendations
    pub fn new(key_pattern: impl Into<String>) -> Self {
        Self {
            key_pattern: key_pattern.into(),
            access_times: Vec::new(),
            access_frequency: 0.0,
            seasonal_pattern: BTreeMap::new(),
            user_distribution: HashMap::new(),
            effectiveness_score: 0.0,
            recommended_ttl: DEFAULT_RECOMMENDED_TTL,
            cache_tier: CacheTier::L1,
            recent_keys: VecDeque::new(),
            hits: 0,
            misses: 0,
            last_touched: 0,
        }
    }

    /// Apply the hit/miss reward, clamped to [0, 1]
    pub fn update_effectiveness(&mut self, hit: bool) {
        self.effectiveness_score = if hit {
            (self.effectiveness_score + HIT_REWARD).min(1.0)
        } else {
            (self.effectiveness_score - MISS_PENALTY).max(0.0)
        };
    }

    /// Recompute accesses per hour from the first/last recorded access
    pub fn recompute_frequency(&mut self) {
        let (Some(first), Some(last)) = (self.access_times.first(), self.access_times.last()) else {
            self.access_frequency = 0.0;
            return;
        };
        let span_hours = (*last - *first).num_milliseconds() as f64 / 3_600_000.0;
        self.access_frequency = self.access_times.len() as f64 / span_hours.max(1.0);
    }

    fn hourly_counts(&self) -> Vec<u64> {
        self.seasonal_pattern.values().copied().filter(|c| *c > 0).collect()
    }

    /// Busiest hour exceeds 3x the quietest, over at least 3 distinct hours
    pub fn has_strong_seasonal_pattern(&self) -> bool {
        let counts = self.hourly_counts();
        if counts.len() < 3 {
            return false;
        }
        let max = counts.iter().copied().max().unwrap_or(0);
        let min = counts.iter().copied().min().unwrap_or(0);
        max as f64 > 3.0 * min as f64
    }

    /// Hours whose count exceeds 1.5x the mean hourly count
    pub fn peak_hours(&self) -> Vec<u32> {
        let counts = self.hourly_counts();
        if counts.is_empty() {
            return Vec::new();
        }
        let mean = counts.iter().sum::<u64>() as f64 / counts.len() as f64;
        let mut hours: Vec<u32> = self
            .seasonal_pattern
            .iter()
            .filter(|(_, count)| **count as f64 > 1.5 * mean)
            .filter_map(|(hour, _)| hour.parse().ok())
            .collect();
        hours.sort_unstable();
        hours
    }

    /// Coefficient of variation of hourly counts, halved and capped at 1
    pub fn seasonal_strength(&self) -> f64 {
        let counts = self.hourly_counts();
        if counts.len() < 2 {
            return 0.0;
        }
        let n = counts.len() as f64;
        let mean = counts.iter().sum::<u64>() as f64 / n;
        if mean == 0.0 {
            return 0.0;
        }
        let variance = counts
            .iter()
            .map(|c| {
                let d = *c as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        (variance.sqrt() / mean / 2.0).min(1.0)
    }

    /// Number of distinct (hashed) users
    pub fn distinct_users(&self) -> usize {
        self.user_distribution.len()
    }

    fn remember_key(&mut self, key: &str, limit: usize) {
        if let Some(pos) = self.recent_keys.iter().position(|k| k == key) {
            self.recent_keys.remove(pos);
        }
        self.recent_keys.push_back(key.to_string());
        while self.recent_keys.len() > limit {
            self.recent_keys.pop_front();
        }
    }

    fn summary(&self) -> PatternSummary {
        PatternSummary {
            key_pattern: self.key_pattern.clone(),
            access_frequency: self.access_frequency,
            effectiveness_score: self.effectiveness_score,
            recommended_ttl: self.recommended_ttl,
            cache_tier: self.cache_tier,
            recorded_accesses: self.access_times.len(),
            distinct_users: self.distinct_users(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

/// Serializable view of a pattern for stats output
#[derive(Debug, Clone, Serialize)]
pub struct PatternSummary {
    pub key_pattern: String,
    pub access_frequency: f64,
    pub effectiveness_score: f64,
    pub recommended_ttl: u64,
    pub cache_tier: CacheTier,
    pub recorded_accesses: usize,
    pub distinct_users: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Read-only view the cache uses for placement and TTL decisions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternProfile {
    pub access_frequency: f64,
    pub distinct_users: usize,
    pub recommended_ttl: u64,
    pub cache_tier: CacheTier,
}

// =============================================================================
// Access Records
// =============================================================================

/// One cache access, as reported by the cache engine
#[derive(Debug, Clone, Copy)]
pub struct AccessRecord<'a> {
    /// Storage key that was accessed
    pub key: &'a str,
    /// Whether any tier answered
    pub hit: bool,
    /// Lookup latency in milliseconds
    pub access_time_ms: f64,
    /// Tier that answered (None = miss)
    pub tier: Option<CacheTier>,
    /// Raw user id; only its hash is stored
    pub user_id: Option<&'a str>,
    /// Context used to derive the key
    pub context: Option<&'a CacheContext>,
}

impl<'a> AccessRecord<'a> {
    /// Create a record for a key and outcome
    pub fn new(key: &'a str, hit: bool, access_time_ms: f64) -> Self {
        Self {
            key,
            hit,
            access_time_ms,
            tier: None,
            user_id: None,
            context: None,
        }
    }

    /// Set the tier that answered
    pub fn tier(mut self, tier: Option<CacheTier>) -> Self {
        self.tier = tier;
        self
    }

    /// Set the user id
    pub fn user(mut self, user_id: Option<&'a str>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Set the context
    pub fn context(mut self, context: Option<&'a CacheContext>) -> Self {
        self.context = context;
        self
    }
}

/// Raw entry of the temporal access log
#[derive(Debug, Clone)]
pub struct TemporalAccess {
    pub timestamp: DateTime<Utc>,
    pub key_pattern: String,
    pub hit: bool,
    pub access_time_ms: f64,
    pub tier: Option<CacheTier>,
    pub context_fingerprint: Option<String>,
}

// =============================================================================
// Recommendations
// =============================================================================

/// Recommendation priority (declaration order = sort order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationPriority {
    High,
    Medium,
    Low,
}

/// What a recommendation proposes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecommendationKind {
    /// Frequently requested but rarely served from cache
    IncreaseTtl { suggested_ttl: u64 },
    /// Access volume clusters around specific hours
    CacheWarming { peak_hours: Vec<u32>, seasonal_strength: f64 },
    /// Many distinct users share the pattern
    TierPromotion { suggested_tier: CacheTier, distinct_users: usize },
}

/// An optimization recommendation for one pattern
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub key_pattern: String,
    pub priority: RecommendationPriority,
    pub description: String,
    #[serde(flatten)]
    pub kind: RecommendationKind,
}

/// A tier migration the cache engine should carry out
#[derive(Debug, Clone, PartialEq)]
pub enum TierAction {
    /// Warm the pattern's recent keys into L1
    PromoteFrequent { key_pattern: String, keys: Vec<String> },
    /// Double the pattern's recommended TTL
    RaiseTtl { key_pattern: String, ttl: u64 },
    /// Warm the pattern's recent keys ahead of a peak hour
    SeasonalWarming {
        key_pattern: String,
        keys: Vec<String>,
        peak_hours: Vec<u32>,
    },
    /// Replicate the pattern's L1 entries into a shared tier
    SharedTier { key_pattern: String, tier: CacheTier },
}

/// Outcome of a pruning pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub access_times_removed: usize,
    pub patterns_removed: usize,
}

// =============================================================================
// Cache Analytics
// =============================================================================

#[derive(Debug, Default)]
struct AnalyticsState {
    /// Tracked patterns; recency lives in `AccessPattern::last_touched`
    patterns: IndexMap<String, AccessPattern>,
    /// Logical clock advanced on every access
    touch_clock: u64,
    /// Raw access log (bounded)
    temporal: Vec<TemporalAccess>,
}

/// Access analytics shared by a cache instance
#[derive(Debug)]
pub struct CacheAnalytics {
    config: AnalyticsConfig,
    state: RwLock<AnalyticsState>,
}

impl Default for CacheAnalytics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheAnalytics {
    /// Create analytics with default configuration
    pub fn new() -> Self {
        Self::with_config(AnalyticsConfig::default())
    }

    /// Create analytics with custom configuration
    pub fn with_config(config: AnalyticsConfig) -> Self {
        Self {
            config,
            state: RwLock::new(AnalyticsState::default()),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Record one access at the current time
    pub fn record_access(&self, record: AccessRecord<'_>) {
        self.record_access_at(record, Utc::now());
    }

    /// Record one access at an explicit time
    pub fn record_access_at(&self, record: AccessRecord<'_>, now: DateTime<Utc>) {
        let key_pattern = generalize_key_pattern(record.key);
        let hashed_user = record.user_id.map(hash_user_id);
        let hour = now.hour().to_string();
        let max_times = self.config.max_access_times;
        let trim_to = self.config.trim_to.min(max_times);

        let mut state = self.state.write();

        state.touch_clock += 1;
        let touched = state.touch_clock;

        if !state.patterns.contains_key(&key_pattern) {
            while state.patterns.len() >= self.config.max_patterns.max(1) {
                // Linear scan only when a new pattern arrives at capacity
                let oldest = state
                    .patterns
                    .values()
                    .enumerate()
                    .min_by_key(|(_, p)| p.last_touched)
                    .map(|(index, _)| index);
                match oldest.and_then(|index| state.patterns.swap_remove_index(index)) {
                    Some((evicted, _)) => {
                        debug!(pattern = %evicted, "Evicted least recently used access pattern")
                    }
                    None => break,
                }
            }
            state
                .patterns
                .insert(key_pattern.clone(), AccessPattern::new(key_pattern.clone()));
        }

        if let Some(pattern) = state.patterns.get_mut(&key_pattern) {
            pattern.last_touched = touched;
            pattern.access_times.push(now);
            if pattern.access_times.len() > max_times {
                let excess = pattern.access_times.len() - trim_to;
                pattern.access_times.drain(..excess);
            }

            if let Some(user) = &hashed_user {
                *pattern.user_distribution.entry(user.clone()).or_insert(0) += 1;
            }
            *pattern.seasonal_pattern.entry(hour).or_insert(0) += 1;

            pattern.update_effectiveness(record.hit);
            if record.hit {
                pattern.hits += 1;
            } else {
                pattern.misses += 1;
            }
            pattern.recompute_frequency();
            pattern.remember_key(record.key, self.config.max_recent_keys);
        }

        state.temporal.push(TemporalAccess {
            timestamp: now,
            key_pattern,
            hit: record.hit,
            access_time_ms: record.access_time_ms,
            tier: record.tier,
            context_fingerprint: record.context.map(context_fingerprint),
        });
        if state.temporal.len() > max_times {
            let excess = state.temporal.len() - trim_to;
            state.temporal.drain(..excess);
        }
    }

    /// Number of tracked patterns
    pub fn pattern_count(&self) -> usize {
        self.state.read().patterns.len()
    }

    /// Number of entries in the raw temporal log
    pub fn temporal_log_len(&self) -> usize {
        self.state.read().temporal.len()
    }

    /// Clone of a tracked pattern
    pub fn pattern(&self, key_pattern: &str) -> Option<AccessPattern> {
        self.state.read().patterns.get(key_pattern).cloned()
    }

    /// Placement/TTL profile for the pattern a key generalizes to
    pub fn profile_for_key(&self, key: &str) -> Option<PatternProfile> {
        let key_pattern = generalize_key_pattern(key);
        self.state.read().patterns.get(&key_pattern).map(|p| PatternProfile {
            access_frequency: p.access_frequency,
            distinct_users: p.distinct_users(),
            recommended_ttl: p.recommended_ttl,
            cache_tier: p.cache_tier,
        })
    }

    /// Whether a tracked pattern has a strong hour-of-day cycle
    pub fn has_strong_seasonal_pattern(&self, key_pattern: &str) -> bool {
        self.state
            .read()
            .patterns
            .get(key_pattern)
            .map(AccessPattern::has_strong_seasonal_pattern)
            .unwrap_or(false)
    }

    /// Peak hours of a tracked pattern
    pub fn get_peak_hours(&self, key_pattern: &str) -> Vec<u32> {
        self.state
            .read()
            .patterns
            .get(key_pattern)
            .map(AccessPattern::peak_hours)
            .unwrap_or_default()
    }

    /// Update the recommended TTL of a pattern (capped at 24 hours)
    pub fn update_recommended_ttl(&self, key_pattern: &str, ttl: u64) -> bool {
        let mut state = self.state.write();
        match state.patterns.get_mut(key_pattern) {
            Some(pattern) => {
                pattern.recommended_ttl = ttl.min(MAX_RECOMMENDED_TTL);
                true
            }
            None => false,
        }
    }

    /// Record the tier last recommended for a pattern
    pub fn set_recommended_tier(&self, key_pattern: &str, tier: CacheTier) -> bool {
        let mut state = self.state.write();
        match state.patterns.get_mut(key_pattern) {
            Some(pattern) => {
                pattern.cache_tier = tier;
                true
            }
            None => false,
        }
    }

    /// Optimization recommendations, high priority first
    pub fn get_optimization_recommendations(&self) -> Vec<Recommendation> {
        let state = self.state.read();
        let mut recommendations = Vec::new();

        for pattern in state.patterns.values() {
            if pattern.access_frequency > HIGH_FREQUENCY_PER_HOUR
                && pattern.effectiveness_score < LOW_EFFECTIVENESS
            {
                let suggested_ttl = (pattern.recommended_ttl * 2).min(MAX_RECOMMENDED_TTL);
                recommendations.push(Recommendation {
                    key_pattern: pattern.key_pattern.clone(),
                    priority: RecommendationPriority::High,
                    description: format!(
                        "{:.1} accesses/hour at effectiveness {:.2}; raise TTL or enable predictive caching",
                        pattern.access_frequency, pattern.effectiveness_score
                    ),
                    kind: RecommendationKind::IncreaseTtl { suggested_ttl },
                });
            }

            if pattern.has_strong_seasonal_pattern() {
                let peak_hours = pattern.peak_hours();
                recommendations.push(Recommendation {
                    key_pattern: pattern.key_pattern.clone(),
                    priority: RecommendationPriority::Medium,
                    description: format!("Warm cache ahead of peak hours {:?}", peak_hours),
                    kind: RecommendationKind::CacheWarming {
                        peak_hours,
                        seasonal_strength: pattern.seasonal_strength(),
                    },
                });
            }

            let distinct_users = pattern.distinct_users();
            if distinct_users > SHARED_TIER_USERS {
                let suggested_tier = if distinct_users < L3_SHARED_TIER_USERS {
                    CacheTier::L2
                } else {
                    CacheTier::L3
                };
                recommendations.push(Recommendation {
                    key_pattern: pattern.key_pattern.clone(),
                    priority: RecommendationPriority::Low,
                    description: format!(
                        "{} distinct users share this pattern; promote to shared tier {}",
                        distinct_users, suggested_tier
                    ),
                    kind: RecommendationKind::TierPromotion {
                        suggested_tier,
                        distinct_users,
                    },
                });
            }
        }

        recommendations.sort_by_key(|r| r.priority);
        recommendations
    }

    /// Tier migrations to apply for the given hour of day
    ///
    /// Seasonal warming fires when the current or the next hour is a peak.
    pub fn plan_tier_actions(&self, current_hour: u32) -> Vec<TierAction> {
        let state = self.state.read();
        let next_hour = (current_hour + 1) % 24;
        let mut actions = Vec::new();

        for pattern in state.patterns.values() {
            let recent: Vec<String> = pattern.recent_keys.iter().cloned().collect();

            if pattern.access_frequency > HIGH_FREQUENCY_PER_HOUR {
                if pattern.effectiveness_score >= LOW_EFFECTIVENESS {
                    if !recent.is_empty() {
                        actions.push(TierAction::PromoteFrequent {
                            key_pattern: pattern.key_pattern.clone(),
                            keys: recent.clone(),
                        });
                    }
                } else if pattern.recommended_ttl < MAX_RECOMMENDED_TTL {
                    actions.push(TierAction::RaiseTtl {
                        key_pattern: pattern.key_pattern.clone(),
                        ttl: (pattern.recommended_ttl * 2).min(MAX_RECOMMENDED_TTL),
                    });
                }
            }

            if pattern.has_strong_seasonal_pattern() && !recent.is_empty() {
                let peak_hours = pattern.peak_hours();
                if peak_hours.contains(&current_hour) || peak_hours.contains(&next_hour) {
                    actions.push(TierAction::SeasonalWarming {
                        key_pattern: pattern.key_pattern.clone(),
                        keys: recent.clone(),
                        peak_hours,
                    });
                }
            }

            let distinct_users = pattern.distinct_users();
            if distinct_users > SHARED_TIER_USERS {
                let tier = if distinct_users < L3_SHARED_TIER_USERS {
                    CacheTier::L2
                } else {
                    CacheTier::L3
                };
                actions.push(TierAction::SharedTier {
                    key_pattern: pattern.key_pattern.clone(),
                    tier,
                });
            }
        }

        actions
    }

    /// Top patterns by access frequency
    pub fn top_patterns(&self, limit: usize) -> Vec<PatternSummary> {
        let state = self.state.read();
        let mut summaries: Vec<PatternSummary> =
            state.patterns.values().map(AccessPattern::summary).collect();
        summaries.sort_by(|a, b| b.access_frequency.total_cmp(&a.access_frequency));
        summaries.truncate(limit);
        summaries
    }

    /// Drop access history older than the retention window
    ///
    /// Patterns left without any access history are removed.
    pub fn prune_stale(&self, now: DateTime<Utc>) -> PruneReport {
        let cutoff = now - self.config.retention;
        let mut report = PruneReport::default();
        let mut state = self.state.write();

        for pattern in state.patterns.values_mut() {
            let before = pattern.access_times.len();
            pattern.access_times.retain(|t| *t >= cutoff);
            let removed = before - pattern.access_times.len();
            if removed > 0 {
                report.access_times_removed += removed;
                pattern.recompute_frequency();
            }
        }

        let before = state.patterns.len();
        state.patterns.retain(|_, p| !p.access_times.is_empty());
        report.patterns_removed = before - state.patterns.len();

        state.temporal.retain(|t| t.timestamp >= cutoff);

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_generalize_uuid() {
        let pattern = generalize_key_pattern("user:123e4567-e89b-12d3-a456-426614174000:session");
        assert_eq!(pattern, "user:<UUID>:session");
        assert!(!pattern.contains("123e4567"));

        let other = generalize_key_pattern("user:9f1c2d3e-0000-4abc-8def-aabbccddeeff:session");
        assert_eq!(pattern, other);
    }

    #[test]
    fn test_generalize_other_segments() {
        assert_eq!(
            generalize_key_pattern("report:2026-03-14T09:30:00Z:summary"),
            "report:<TIMESTAMP>:summary"
        );
        assert_eq!(generalize_key_pattern("case:12345:notes"), "case:<ID>:notes");
        assert_eq!(
            generalize_key_pattern("blob:deadbeefcafebabe0123:meta"),
            "blob:<HASH>:meta"
        );
        assert_eq!(generalize_key_pattern("plain-key"), "plain-key");
    }

    #[test]
    fn test_user_ids_are_hashed() {
        let analytics = CacheAnalytics::new();
        analytics.record_access(AccessRecord::new("case:1:notes", true, 1.0).user(Some("alice@example.com")));

        let pattern = analytics.pattern("case:<ID>:notes").unwrap();
        assert_eq!(pattern.user_distribution.len(), 1);
        let (hashed, count) = pattern.user_distribution.iter().next().unwrap();
        assert_eq!(*count, 1);
        assert_eq!(hashed.len(), 16);
        assert!(!hashed.contains("alice"));
        assert_eq!(*hashed, hash_user_id("alice@example.com"));
    }

    #[test]
    fn test_effectiveness_stays_bounded() {
        let analytics = CacheAnalytics::new();
        let outcomes = [true; 15]
            .iter()
            .chain([false; 30].iter())
            .chain([true, false, true].iter())
            .copied()
            .collect::<Vec<_>>();

        for hit in outcomes {
            analytics.record_access(AccessRecord::new("k", hit, 0.5));
            let score = analytics.pattern("k").unwrap().effectiveness_score;
            assert!((0.0..=1.0).contains(&score), "score {} out of bounds", score);
        }
    }

    #[test]
    fn test_new_pattern_defaults() {
        let analytics = CacheAnalytics::new();
        analytics.record_access(AccessRecord::new("k", true, 0.5));
        let pattern = analytics.pattern("k").unwrap();
        assert_eq!(pattern.recommended_ttl, DEFAULT_RECOMMENDED_TTL);
        assert_eq!(pattern.cache_tier, CacheTier::L1);
        assert!((pattern.effectiveness_score - 0.1).abs() < 1e-9);
        // Single access: span clamps to one hour
        assert!((pattern.access_frequency - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_frequency_over_span() {
        let analytics = CacheAnalytics::new();
        for i in 0..6 {
            analytics.record_access_at(AccessRecord::new("k", true, 1.0), at(10, 0) + ChronoDuration::minutes(i * 30));
        }
        // 6 accesses over 2.5 hours
        let pattern = analytics.pattern("k").unwrap();
        assert!((pattern.access_frequency - 6.0 / 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_access_times_capped() {
        let analytics = CacheAnalytics::new();
        let start = at(8, 0);
        for i in 0..1001 {
            analytics.record_access_at(AccessRecord::new("k", true, 1.0), start + ChronoDuration::seconds(i));
        }
        let pattern = analytics.pattern("k").unwrap();
        assert_eq!(pattern.access_times.len(), 500);
        assert_eq!(*pattern.access_times.last().unwrap(), start + ChronoDuration::seconds(1000));
        assert_eq!(analytics.temporal_log_len(), 500);
    }

    #[test]
    fn test_pattern_map_is_bounded() {
        let analytics = CacheAnalytics::with_config(AnalyticsConfig {
            max_patterns: 2,
            ..Default::default()
        });
        analytics.record_access(AccessRecord::new("a", true, 1.0));
        analytics.record_access(AccessRecord::new("b", true, 1.0));
        // Touch "a" so "b" becomes least recently used
        analytics.record_access(AccessRecord::new("a", true, 1.0));
        analytics.record_access(AccessRecord::new("c", true, 1.0));

        assert_eq!(analytics.pattern_count(), 2);
        assert!(analytics.pattern("a").is_some());
        assert!(analytics.pattern("b").is_none());
        assert!(analytics.pattern("c").is_some());
    }

    #[test]
    fn test_pattern_eviction_follows_recency() {
        let analytics = CacheAnalytics::with_config(AnalyticsConfig {
            max_patterns: 3,
            ..Default::default()
        });
        for key in ["a", "b", "c"] {
            analytics.record_access(AccessRecord::new(key, true, 1.0));
        }
        // Repeated touches of "a" must not disturb the order of the others
        for _ in 0..5 {
            analytics.record_access(AccessRecord::new("a", true, 1.0));
        }
        analytics.record_access(AccessRecord::new("c", false, 1.0));

        analytics.record_access(AccessRecord::new("d", true, 1.0));
        assert!(analytics.pattern("b").is_none());

        analytics.record_access(AccessRecord::new("e", true, 1.0));
        assert!(analytics.pattern("a").is_none());
        assert_eq!(analytics.pattern_count(), 3);

        let c = analytics.pattern("c").unwrap();
        let e = analytics.pattern("e").unwrap();
        assert!(c.last_touched < e.last_touched);
        assert_eq!(c.hits, 1);
        assert_eq!(c.misses, 1);
    }

    #[test]
    fn test_seasonal_detection() {
        let mut pattern = AccessPattern::new("p");
        pattern.seasonal_pattern.insert("9".into(), 20);
        pattern.seasonal_pattern.insert("10".into(), 4);
        pattern.seasonal_pattern.insert("11".into(), 3);

        assert!(pattern.has_strong_seasonal_pattern());
        assert_eq!(pattern.peak_hours(), vec![9]);
        assert!(pattern.seasonal_strength() > 0.0);
        assert!(pattern.seasonal_strength() <= 1.0);

        let mut flat = AccessPattern::new("flat");
        flat.seasonal_pattern.insert("1".into(), 5);
        flat.seasonal_pattern.insert("2".into(), 5);
        assert!(!flat.has_strong_seasonal_pattern());
        assert_eq!(flat.seasonal_strength(), 0.0);
        assert!(flat.peak_hours().is_empty());

        let mut single = AccessPattern::new("single");
        single.seasonal_pattern.insert("3".into(), 50);
        assert_eq!(single.seasonal_strength(), 0.0);
    }

    #[test]
    fn test_recommendations_sorted_by_priority() {
        let analytics = CacheAnalytics::new();
        let start = at(9, 0);

        // 12 distinct users on one pattern -> low priority tier promotion
        for u in 0..12 {
            analytics.record_access_at(
                AccessRecord::new("shared:1:doc", true, 1.0).user(Some(&format!("user-{}", u))),
                start + ChronoDuration::hours(u as i64 * 2),
            );
        }

        // 30 misses inside one hour -> high priority TTL raise
        for i in 0..30 {
            analytics.record_access_at(AccessRecord::new("hot", false, 1.0), start + ChronoDuration::minutes(i));
        }

        let recs = analytics.get_optimization_recommendations();
        assert!(recs.len() >= 2);
        assert_eq!(recs[0].priority, RecommendationPriority::High);
        assert_eq!(recs[0].key_pattern, "hot");
        assert_eq!(recs[0].kind, RecommendationKind::IncreaseTtl { suggested_ttl: 7_200 });
        assert!(recs.windows(2).all(|w| w[0].priority <= w[1].priority));

        let promotion = recs
            .iter()
            .find(|r| r.key_pattern == "shared:<ID>:doc")
            .unwrap();
        assert_eq!(
            promotion.kind,
            RecommendationKind::TierPromotion {
                suggested_tier: CacheTier::L2,
                distinct_users: 12
            }
        );
    }

    #[test]
    fn test_plan_tier_actions() {
        let analytics = CacheAnalytics::new();
        let start = at(9, 0);
        for i in 0..20 {
            analytics.record_access_at(
                AccessRecord::new(&format!("item:{}:view", i % 3), true, 1.0),
                start + ChronoDuration::minutes(i),
            );
        }

        let actions = analytics.plan_tier_actions(9);
        let promote = actions
            .iter()
            .find_map(|a| match a {
                TierAction::PromoteFrequent { key_pattern, keys } => Some((key_pattern, keys)),
                _ => None,
            })
            .unwrap();
        assert_eq!(promote.0, "item:<ID>:view");
        assert_eq!(promote.1.len(), 3);
    }

    #[test]
    fn test_update_recommendations() {
        let analytics = CacheAnalytics::new();
        analytics.record_access(AccessRecord::new("k", true, 1.0));

        assert!(analytics.update_recommended_ttl("k", 200_000));
        assert!(analytics.set_recommended_tier("k", CacheTier::L2));
        let profile = analytics.profile_for_key("k").unwrap();
        assert_eq!(profile.recommended_ttl, MAX_RECOMMENDED_TTL);
        assert_eq!(profile.cache_tier, CacheTier::L2);

        assert!(!analytics.update_recommended_ttl("missing", 10));
    }

    #[test]
    fn test_prune_stale() {
        let analytics = CacheAnalytics::new();
        let now = at(12, 0);
        analytics.record_access_at(AccessRecord::new("old", true, 1.0), now - ChronoDuration::hours(30));
        analytics.record_access_at(AccessRecord::new("mixed", true, 1.0), now - ChronoDuration::hours(26));
        analytics.record_access_at(AccessRecord::new("mixed", true, 1.0), now - ChronoDuration::hours(1));

        let report = analytics.prune_stale(now);
        assert_eq!(report.access_times_removed, 2);
        assert_eq!(report.patterns_removed, 1);
        assert!(analytics.pattern("old").is_none());
        assert_eq!(analytics.pattern("mixed").unwrap().access_times.len(), 1);
        assert_eq!(analytics.temporal_log_len(), 1);
    }
}
