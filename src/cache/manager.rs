//! Intelligent Cache Manager
//!
//! Coordinates the in-process L1 map with the remote L2/L3 stores, feeds
//! every lookup into analytics and applies analytics-driven TTL and
//! placement decisions on writes.

use crate::cache::analytics::{
    generalize_key_pattern, AccessRecord, AnalyticsConfig, CacheAnalytics, PatternProfile,
    PatternSummary, Recommendation,
};
use crate::cache::background::{BackgroundConfig, BackgroundTasks};
use crate::cache::entry::{
    context_fingerprint, derive_cache_key, estimate_size, CacheContext, CacheEntry,
    LARGE_ENTRY_BYTES,
};
use crate::cache::events::{CacheEvent, EvictionReason};
use crate::cache::sink::{CacheAccessEvent, MetricsSink};
use crate::cache::stats::{CacheStats, TierStatsSnapshot};
use crate::cache::storage::{NullStore, TierStore, TierStoreRef};
use crate::cache::tier::{CacheTier, TierPlacement};
use crate::cache::warming::{WarmingCandidate, WarmingConfig, WarmingQueue, WarmingStatsSnapshot};
use crate::cache::CacheLookup;
use crate::error::{Error, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Accesses per hour above which a pattern is placed in L1
const L1_FREQUENCY_PER_HOUR: f64 = 10.0;

/// Distinct users above which a pattern is placed in L2
const L2_DISTINCT_USERS: usize = 5;

/// Accesses per hour below which a pattern is placed in L3
const L3_FREQUENCY_PER_HOUR: f64 = 1.0;

/// Idle time after which large L1 entries are demoted (1 hour)
pub const DEMOTION_IDLE_SECONDS: f64 = 3_600.0;

/// Number of recommendations and patterns included in statistics
const STATS_TOP_N: usize = 10;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the intelligent cache
#[derive(Debug, Clone)]
pub struct IntelligentCacheConfig {
    /// Maximum number of L1 entries
    pub l1_max_size: usize,
    /// Default L1 TTL in seconds
    pub l1_ttl_seconds: u64,
    /// Default L2 TTL in seconds
    pub l2_ttl_seconds: u64,
    /// Default L3 TTL in seconds
    pub l3_ttl_seconds: u64,
    /// Whether lookups are recorded in analytics
    pub enable_analytics: bool,
    /// Timeout applied to every L2/L3 call
    pub remote_timeout: Duration,
    /// Service name reported to the metrics sink
    pub service_name: String,
    /// Analytics configuration
    pub analytics: AnalyticsConfig,
    /// Warming queue configuration
    pub warming: WarmingConfig,
    /// Background task intervals
    pub background: BackgroundConfig,
    /// Event channel capacity
    pub event_channel_capacity: usize,
}

impl Default for IntelligentCacheConfig {
    fn default() -> Self {
        Self {
            l1_max_size: 1000,
            l1_ttl_seconds: 300,
            l2_ttl_seconds: 3_600,
            l3_ttl_seconds: 86_400,
            enable_analytics: true,
            remote_timeout: Duration::from_millis(500),
            service_name: "intelligent-cache".to_string(),
            analytics: AnalyticsConfig::default(),
            warming: WarmingConfig::default(),
            background: BackgroundConfig::default(),
            event_channel_capacity: 1024,
        }
    }
}

impl IntelligentCacheConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.l1_max_size == 0 {
            return Err(Error::Configuration("l1_max_size must be > 0".into()));
        }
        for (name, ttl) in [
            ("l1_ttl_seconds", self.l1_ttl_seconds),
            ("l2_ttl_seconds", self.l2_ttl_seconds),
            ("l3_ttl_seconds", self.l3_ttl_seconds),
        ] {
            if ttl == 0 {
                return Err(Error::Configuration(format!("{} must be > 0", name)));
            }
        }
        if self.remote_timeout.is_zero() {
            return Err(Error::Configuration("remote_timeout must be > 0".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::Configuration("event_channel_capacity must be > 0".into()));
        }
        if self.analytics.max_patterns == 0 || self.analytics.max_access_times == 0 {
            return Err(Error::Configuration(
                "analytics limits must be > 0".into(),
            ));
        }
        if self.analytics.trim_to > self.analytics.max_access_times {
            return Err(Error::Configuration(format!(
                "analytics trim_to ({}) exceeds max_access_times ({})",
                self.analytics.trim_to, self.analytics.max_access_times
            )));
        }
        if self.warming.batch_size == 0 {
            return Err(Error::Configuration("warming batch_size must be > 0".into()));
        }
        self.background.validate()
    }

    /// Default TTL for a tier
    pub fn default_ttl(&self, tier: CacheTier) -> u64 {
        match tier {
            CacheTier::L1 => self.l1_ttl_seconds,
            CacheTier::L2 => self.l2_ttl_seconds,
            CacheTier::L3 => self.l3_ttl_seconds,
        }
    }
}

// =============================================================================
// Collaborators
// =============================================================================

/// External collaborators handed to the cache at construction
#[derive(Clone)]
pub struct CacheCollaborators {
    /// Shared remote store (L2)
    pub l2: Option<TierStoreRef>,
    /// Persistent store (L3)
    pub l3: Option<TierStoreRef>,
    /// Receiver of one event per lookup
    pub metrics_sink: Option<Arc<dyn MetricsSink>>,
    /// Shared analytics instance (created from config when absent)
    pub analytics: Option<Arc<CacheAnalytics>>,
}

impl Default for CacheCollaborators {
    fn default() -> Self {
        Self {
            l2: None,
            l3: Some(Arc::new(NullStore::default())),
            metrics_sink: None,
            analytics: None,
        }
    }
}

impl CacheCollaborators {
    /// Default collaborators: no L2, placeholder L3, no sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the L2 store
    pub fn with_l2(mut self, store: TierStoreRef) -> Self {
        self.l2 = Some(store);
        self
    }

    /// Set the L3 store
    pub fn with_l3(mut self, store: TierStoreRef) -> Self {
        self.l3 = Some(store);
        self
    }

    /// Remove the L3 store
    pub fn without_l3(mut self) -> Self {
        self.l3 = None;
        self
    }

    /// Set the metrics sink
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_sink = Some(sink);
        self
    }

    /// Share an analytics instance
    pub fn with_analytics(mut self, analytics: Arc<CacheAnalytics>) -> Self {
        self.analytics = Some(analytics);
        self
    }
}

// =============================================================================
// Set Options
// =============================================================================

/// Options for `IntelligentCache::set`
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Explicit TTL for every tier written
    pub ttl_seconds: Option<u64>,
    /// Context used to derive the storage key
    pub context: Option<CacheContext>,
    /// Placement
    pub tier: TierPlacement,
    /// Tags attached to the L1 entry
    pub tags: BTreeSet<String>,
    /// Manual eviction weight for the L1 entry
    pub priority_score: Option<f64>,
}

impl SetOptions {
    /// Create default options (automatic placement)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an explicit TTL
    pub fn ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }

    /// Set the key derivation context
    pub fn context(mut self, context: CacheContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the placement
    pub fn tier(mut self, tier: impl Into<TierPlacement>) -> Self {
        self.tier = tier.into();
        self
    }

    /// Add a tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Set the eviction priority
    pub fn priority(mut self, priority_score: f64) -> Self {
        self.priority_score = Some(priority_score);
        self
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Health of the cache and its stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub l1: bool,
    /// None when L2 is absent or has no health check
    pub l2: Option<bool>,
    /// None when L3 is absent or has no health check
    pub l3: Option<bool>,
    pub background_running: bool,
}

/// Point-in-time view of the whole cache
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatistics {
    pub service: String,
    pub tiers: Vec<TierStatsSnapshot>,
    pub lookups: u64,
    pub overall_hit_rate: f64,
    pub l1_entries: usize,
    pub l1_max_size: usize,
    pub l2_configured: bool,
    pub l3_configured: bool,
    pub analytics_enabled: bool,
    pub tracked_patterns: usize,
    pub recommendations: Vec<Recommendation>,
    pub top_patterns: Vec<PatternSummary>,
    pub warming: WarmingStatsSnapshot,
    pub background_running: bool,
}

// =============================================================================
// Intelligent Cache
// =============================================================================

/// Three-tier cache with analytics-driven placement
pub struct IntelligentCache {
    /// L1 in-process entries
    l1: Mutex<HashMap<String, CacheEntry>>,
    /// L2 shared store
    l2: Option<TierStoreRef>,
    /// L3 persistent store
    l3: Option<TierStoreRef>,
    /// Per-tier counters
    stats: CacheStats,
    /// Access analytics
    analytics: Option<Arc<CacheAnalytics>>,
    /// Optional metrics sink
    metrics_sink: Option<Arc<dyn MetricsSink>>,
    /// Warming candidates
    warming: WarmingQueue,
    /// Configuration
    pub(crate) config: IntelligentCacheConfig,
    /// Running background tasks
    pub(crate) background: Mutex<Option<BackgroundTasks>>,
    /// Event broadcaster
    event_tx: broadcast::Sender<CacheEvent>,
}

impl IntelligentCache {
    /// Create a cache with default collaborators (no L2, placeholder L3)
    pub fn new(config: IntelligentCacheConfig) -> Result<Arc<Self>> {
        Self::with_collaborators(config, CacheCollaborators::default())
    }

    /// Create a cache with explicit collaborators
    pub fn with_collaborators(
        config: IntelligentCacheConfig,
        collaborators: CacheCollaborators,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let analytics = if config.enable_analytics {
            Some(collaborators.analytics.unwrap_or_else(|| {
                Arc::new(CacheAnalytics::with_config(config.analytics.clone()))
            }))
        } else {
            None
        };

        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);

        info!(
            service = %config.service_name,
            l1_max_size = config.l1_max_size,
            l2 = collaborators.l2.as_ref().map(|s| s.name()).unwrap_or("none"),
            l3 = collaborators.l3.as_ref().map(|s| s.name()).unwrap_or("none"),
            analytics = analytics.is_some(),
            "Intelligent cache initialized"
        );

        Ok(Arc::new(Self {
            l1: Mutex::new(HashMap::with_capacity(config.l1_max_size)),
            l2: collaborators.l2,
            l3: collaborators.l3,
            stats: CacheStats::new(),
            analytics,
            metrics_sink: collaborators.metrics_sink,
            warming: WarmingQueue::with_config(config.warming.clone()),
            config,
            background: Mutex::new(None),
            event_tx,
        }))
    }

    /// Subscribe to cache events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.event_tx.subscribe()
    }

    fn emit_event(&self, event: CacheEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Get configuration
    pub fn config(&self) -> &IntelligentCacheConfig {
        &self.config
    }

    /// Get the analytics instance (None when disabled)
    pub fn analytics(&self) -> Option<&Arc<CacheAnalytics>> {
        self.analytics.as_ref()
    }

    /// Get the per-tier counters
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get the warming queue
    pub fn warming(&self) -> &WarmingQueue {
        &self.warming
    }

    /// Number of L1 entries (expired entries included until read)
    pub fn l1_len(&self) -> usize {
        self.l1.lock().len()
    }

    /// Copy of an L1 entry without touching its access metadata
    pub fn peek_l1(&self, cache_key: &str) -> Option<CacheEntry> {
        self.l1.lock().get(cache_key).cloned()
    }

    fn store(&self, tier: CacheTier) -> Option<&TierStoreRef> {
        match tier {
            CacheTier::L1 => None,
            CacheTier::L2 => self.l2.as_ref(),
            CacheTier::L3 => self.l3.as_ref(),
        }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Look up a key, probing L1 -> L2 -> L3
    ///
    /// Hits in a slower tier are promoted into the faster ones. Remote
    /// failures and timeouts count as misses. Every call records exactly
    /// one analytics access.
    pub async fn get(
        &self,
        key: &str,
        context: Option<&CacheContext>,
        user_id: Option<&str>,
    ) -> CacheLookup {
        let started = Instant::now();
        let cache_key = derive_cache_key(key, context);

        let found = match self.lookup_l1(&cache_key, started) {
            Some(value) => Some((value, CacheTier::L1)),
            None => self.lookup_remote(&cache_key, started).await,
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let tier = found.as_ref().map(|(_, tier)| *tier);
        self.stats.record_lookup(found.is_some());

        if let Some(analytics) = &self.analytics {
            analytics.record_access(
                AccessRecord::new(&cache_key, found.is_some(), elapsed_ms)
                    .tier(tier)
                    .user(user_id)
                    .context(context),
            );
        }

        if let Some(sink) = &self.metrics_sink {
            sink.record_cache_event(
                CacheAccessEvent::new(&self.config.service_name, &cache_key, tier, elapsed_ms)
                    .with_metadata("pattern", generalize_key_pattern(&cache_key)),
            );
        }

        match found {
            Some((value, tier)) => {
                debug!(key = %cache_key, tier = %tier, elapsed_ms, "Cache hit");
                self.emit_event(CacheEvent::hit(&cache_key, tier));
                CacheLookup::Hit { value, tier }
            }
            None => {
                debug!(key = %cache_key, elapsed_ms, "Cache miss");
                self.emit_event(CacheEvent::miss(&cache_key));
                CacheLookup::Miss
            }
        }
    }

    fn lookup_l1(&self, cache_key: &str, started: Instant) -> Option<Arc<Value>> {
        let now = Instant::now();
        let mut expired_size = None;

        let value = {
            let mut l1 = self.l1.lock();
            match l1.get(cache_key).map(|entry| entry.is_expired(now)) {
                Some(true) => {
                    expired_size = l1.remove(cache_key).map(|entry| {
                        self.stats.l1.record_eviction(entry.size_bytes);
                        entry.size_bytes
                    });
                    None
                }
                Some(false) => l1.get_mut(cache_key).map(|entry| {
                    entry.record_access(now);
                    entry.value.clone()
                }),
                None => None,
            }
        };

        if let Some(size) = expired_size {
            self.emit_event(CacheEvent::evict(cache_key, CacheTier::L1, size, EvictionReason::Expired));
        }

        match &value {
            Some(_) => self.stats.l1.record_hit(started.elapsed()),
            None => self.stats.l1.record_miss(started.elapsed()),
        }
        value
    }

    async fn lookup_remote(&self, cache_key: &str, started: Instant) -> Option<(Arc<Value>, CacheTier)> {
        if let Some(l2) = &self.l2 {
            match self.fetch_remote(CacheTier::L2, l2.as_ref(), cache_key).await {
                Some(value) => {
                    self.stats.l2.record_hit(started.elapsed());
                    self.promote_to_l1(cache_key, value.clone(), CacheTier::L2);
                    return Some((value, CacheTier::L2));
                }
                None => self.stats.l2.record_miss(started.elapsed()),
            }
        }

        if let Some(l3) = &self.l3 {
            match self.fetch_remote(CacheTier::L3, l3.as_ref(), cache_key).await {
                Some(value) => {
                    self.stats.l3.record_hit(started.elapsed());
                    if let Some(shared) = CacheTier::L3
                        .promotion_target()
                        .filter(|tier| self.store(*tier).is_some())
                    {
                        let ttl = self.config.default_ttl(shared);
                        if self.write_remote(shared, cache_key, &value, ttl).await {
                            self.stats.tier(shared).record_promotion();
                            self.emit_event(CacheEvent::promote(cache_key, CacheTier::L3, shared));
                        }
                    }
                    self.promote_to_l1(cache_key, value.clone(), CacheTier::L3);
                    return Some((value, CacheTier::L3));
                }
                None => self.stats.l3.record_miss(started.elapsed()),
            }
        }

        None
    }

    /// Run a remote store call under the configured timeout
    async fn call_remote<T>(
        &self,
        tier: CacheTier,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::TierTimeout {
                tier: tier.to_string(),
                operation: operation.to_string(),
                timeout_ms: self.config.remote_timeout.as_millis() as u64,
            }),
        }
    }

    fn report_remote_error(&self, tier: CacheTier, operation: &'static str, key: &str, error: &Error) {
        warn!(
            tier = %tier,
            operation,
            key = %key,
            error = %error,
            transient = error.is_transient(),
            "Remote tier call failed"
        );
        self.emit_event(CacheEvent::tier_error(tier, operation, error));
    }

    async fn fetch_remote(&self, tier: CacheTier, store: &dyn TierStore, cache_key: &str) -> Option<Arc<Value>> {
        match self.call_remote(tier, "get", store.get(cache_key)).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => Some(Arc::new(value)),
                Err(e) => {
                    let error = Error::Serialization {
                        key: cache_key.to_string(),
                        reason: e.to_string(),
                    };
                    self.report_remote_error(tier, "get", cache_key, &error);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.report_remote_error(tier, "get", cache_key, &e);
                None
            }
        }
    }

    fn encode(cache_key: &str, value: &Value) -> Option<Bytes> {
        match serde_json::to_vec(value) {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(e) => {
                warn!(key = %cache_key, error = %e, "Failed to serialize value for remote tier");
                None
            }
        }
    }

    async fn write_remote(&self, tier: CacheTier, cache_key: &str, value: &Value, ttl_seconds: u64) -> bool {
        match Self::encode(cache_key, value) {
            Some(payload) => self.write_remote_bytes(tier, cache_key, payload, ttl_seconds).await,
            None => false,
        }
    }

    async fn write_remote_bytes(&self, tier: CacheTier, cache_key: &str, payload: Bytes, ttl_seconds: u64) -> bool {
        let Some(store) = self.store(tier) else {
            return false;
        };
        let size_bytes = payload.len() as u64;
        match self
            .call_remote(tier, "setex", store.setex(cache_key, ttl_seconds, payload))
            .await
        {
            Ok(true) => {
                self.stats.tier(tier).record_write();
                self.emit_event(CacheEvent::put(cache_key, tier, size_bytes, ttl_seconds));
                true
            }
            Ok(false) => {
                debug!(tier = %tier, key = %cache_key, "Remote tier declined write");
                false
            }
            Err(e) => {
                self.report_remote_error(tier, "setex", cache_key, &e);
                false
            }
        }
    }

    fn promote_to_l1(&self, cache_key: &str, value: Arc<Value>, from_tier: CacheTier) {
        let size_bytes = estimate_size(cache_key, &value);
        let entry = CacheEntry::from_shared(cache_key, value, size_bytes)
            .with_ttl(Some(self.config.l1_ttl_seconds));
        self.insert_l1(entry);
        self.stats.l1.record_promotion();
        self.emit_event(CacheEvent::promote(cache_key, from_tier, CacheTier::L1));
        debug!(key = %cache_key, from = %from_tier, "Promoted value into L1");
    }

    // =========================================================================
    // L1 Maintenance
    // =========================================================================

    /// Insert into L1, evicting first when a new key would cross 80% of capacity
    fn insert_l1(&self, entry: CacheEntry) {
        let now = Instant::now();
        let key = entry.key.clone();
        let size_bytes = entry.size_bytes;
        let ttl_seconds = entry.ttl_seconds.unwrap_or(0);

        let evicted = {
            let mut l1 = self.l1.lock();
            let evicted = if l1.contains_key(&key) {
                Vec::new()
            } else {
                self.evict_from_l1(&mut l1, now)
            };
            match l1.insert(key.clone(), entry) {
                Some(old) => self.stats.l1.record_replace(old.size_bytes, size_bytes),
                None => self.stats.l1.record_insert(size_bytes),
            }
            evicted
        };

        for (evicted_key, evicted_size) in evicted {
            self.emit_event(CacheEvent::evict(
                &evicted_key,
                CacheTier::L1,
                evicted_size,
                EvictionReason::Capacity,
            ));
        }
        self.emit_event(CacheEvent::put(&key, CacheTier::L1, size_bytes, ttl_seconds));
    }

    /// Evict the lowest-scoring quarter of L1 (at least one entry)
    fn evict_from_l1(&self, l1: &mut HashMap<String, CacheEntry>, now: Instant) -> Vec<(String, u64)> {
        let len = l1.len();
        let max = self.config.l1_max_size;
        if len == 0 || len.saturating_mul(5) < max.saturating_mul(4) {
            return Vec::new();
        }

        let count = (len / 4).max(1);
        let mut scored: Vec<(f64, &String)> = l1
            .iter()
            .map(|(key, entry)| (entry.eviction_score(now), key))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        let victims: Vec<String> = scored
            .into_iter()
            .take(count)
            .map(|(_, key)| key.clone())
            .collect();

        let mut evicted = Vec::with_capacity(victims.len());
        for key in victims {
            match l1.remove(&key) {
                Some(entry) => {
                    self.stats.l1.record_eviction(entry.size_bytes);
                    evicted.push((key, entry.size_bytes));
                }
                None => warn!(key = %key, "Eviction candidate vanished from L1"),
            }
        }

        debug!(evicted = evicted.len(), remaining = l1.len(), "Evicted entries from L1");
        evicted
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Choose a tier from value size, then from the pattern's access profile
    pub fn determine_optimal_tier(&self, size_bytes: u64, profile: Option<&PatternProfile>) -> CacheTier {
        if let Some(tier) = CacheTier::for_size(size_bytes) {
            return tier;
        }
        match profile {
            Some(p) if p.access_frequency > L1_FREQUENCY_PER_HOUR => CacheTier::L1,
            Some(p) if p.distinct_users > L2_DISTINCT_USERS => CacheTier::L2,
            Some(p) if p.access_frequency < L3_FREQUENCY_PER_HOUR => CacheTier::L3,
            _ => CacheTier::L1,
        }
    }

    fn resolve_ttl(&self, tier: CacheTier, explicit: Option<u64>, profile: Option<&PatternProfile>) -> u64 {
        explicit
            .or_else(|| profile.map(|p| p.recommended_ttl))
            .unwrap_or_else(|| self.config.default_ttl(tier))
    }

    /// Store a value
    ///
    /// Automatic placement writes to the chosen tier and its write-through
    /// tiers; explicit placement writes one tier. Returns true if any tier
    /// accepted the write.
    pub async fn set(&self, key: &str, value: Value, options: SetOptions) -> bool {
        let cache_key = derive_cache_key(key, options.context.as_ref());
        let size_bytes = estimate_size(&cache_key, &value);
        let profile = self
            .analytics
            .as_ref()
            .and_then(|a| a.profile_for_key(&cache_key));

        let tiers: Vec<CacheTier> = match options.tier {
            TierPlacement::Explicit(tier) => vec![tier],
            TierPlacement::Auto => self
                .determine_optimal_tier(size_bytes, profile.as_ref())
                .write_through_tiers()
                .to_vec(),
        };

        let value = Arc::new(value);
        let mut payload: Option<Option<Bytes>> = None;
        let mut stored = false;

        for tier in tiers {
            let ttl = self.resolve_ttl(tier, options.ttl_seconds, profile.as_ref());
            match tier {
                CacheTier::L1 => {
                    let entry = CacheEntry::from_shared(cache_key.clone(), value.clone(), size_bytes)
                        .with_ttl(Some(ttl))
                        .with_tags(options.tags.clone())
                        .with_semantic_hash(options.context.as_ref().map(context_fingerprint))
                        .with_priority(options.priority_score.unwrap_or(1.0));
                    self.insert_l1(entry);
                    stored = true;
                }
                CacheTier::L2 | CacheTier::L3 => {
                    if self.store(tier).is_none() {
                        continue;
                    }
                    let bytes = payload.get_or_insert_with(|| Self::encode(&cache_key, &value));
                    if let Some(bytes) = bytes.clone() {
                        stored |= self.write_remote_bytes(tier, &cache_key, bytes, ttl).await;
                    }
                }
            }
        }

        debug!(key = %cache_key, size_bytes, stored, "Cache set");
        stored
    }

    /// Delete a key from every tier
    ///
    /// Returns true iff no tier reported a failure; absent keys count as
    /// deleted.
    pub async fn delete(&self, key: &str, context: Option<&CacheContext>) -> bool {
        let cache_key = derive_cache_key(key, context);

        {
            let mut l1 = self.l1.lock();
            if let Some(entry) = l1.remove(&cache_key) {
                self.stats.l1.record_remove(entry.size_bytes);
            }
        }

        let mut success = true;
        for tier in [CacheTier::L2, CacheTier::L3] {
            let Some(store) = self.store(tier) else {
                continue;
            };
            if let Err(e) = self.call_remote(tier, "delete", store.delete(&cache_key)).await {
                self.report_remote_error(tier, "delete", &cache_key, &e);
                success = false;
            }
        }

        self.emit_event(CacheEvent::Delete { key: cache_key });
        success
    }

    /// Remove every L1 entry whose key contains `pattern`
    ///
    /// L2 is asked to do the same when it supports pattern deletes.
    /// Returns the number of L1 entries removed.
    pub async fn clear_by_pattern(&self, pattern: &str) -> usize {
        let removed = self.remove_l1_where(|key, _| key.contains(pattern));

        let l2_removed = match &self.l2 {
            Some(l2) => match self
                .call_remote(CacheTier::L2, "delete_matching", l2.delete_matching(pattern))
                .await
            {
                Ok(count) => count,
                Err(e) => {
                    self.report_remote_error(CacheTier::L2, "delete_matching", pattern, &e);
                    None
                }
            },
            None => None,
        };

        info!(pattern = %pattern, l1_removed = removed, l2_removed = ?l2_removed, "Cleared cache entries by pattern");
        self.emit_event(CacheEvent::PatternCleared {
            pattern: pattern.to_string(),
            l1_removed: removed,
            l2_removed,
        });
        removed
    }

    /// Remove every L1 entry carrying `tag`
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let removed = self.remove_l1_where(|_, entry| entry.has_tag(tag));
        debug!(tag = %tag, removed, "Invalidated cache entries by tag");
        removed
    }

    /// Empty L1
    pub fn clear_all(&self) -> usize {
        let removed = {
            let mut l1 = self.l1.lock();
            let n = l1.len();
            l1.clear();
            self.stats.l1.reset_storage();
            n
        };
        info!(removed, "Cleared L1 cache");
        removed
    }

    fn remove_l1_where(&self, predicate: impl Fn(&str, &CacheEntry) -> bool) -> usize {
        let removed: Vec<(String, u64)> = {
            let mut l1 = self.l1.lock();
            let keys: Vec<String> = l1
                .iter()
                .filter(|(key, entry)| predicate(key.as_str(), entry))
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| l1.remove(&key).map(|entry| (key, entry.size_bytes)))
                .inspect(|(_, size)| self.stats.l1.record_eviction(*size))
                .collect()
        };

        for (key, size) in &removed {
            self.emit_event(CacheEvent::evict(key, CacheTier::L1, *size, EvictionReason::Manual));
        }
        removed.len()
    }

    // =========================================================================
    // Warming
    // =========================================================================

    fn l1_has_live(&self, cache_key: &str) -> bool {
        let now = Instant::now();
        self.l1
            .lock()
            .get(cache_key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    /// Load and store every key not already live in L1
    ///
    /// Returns the number of keys stored.
    pub async fn warm_cache<F, Fut>(&self, keys: Vec<String>, loader: F) -> usize
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Option<Value>>,
    {
        let requested = keys.len();
        let mut warmed = 0;

        for key in keys {
            if self.l1_has_live(&key) {
                self.warming.record_cached();
                continue;
            }
            match loader(key.clone()).await {
                Some(value) => {
                    if self.set(&key, value, SetOptions::new()).await {
                        self.warming.record_warmed();
                        warmed += 1;
                    } else {
                        self.warming.record_missed();
                    }
                }
                None => self.warming.record_missed(),
            }
        }

        info!(requested, warmed, "Cache warming completed");
        self.emit_event(CacheEvent::Warmed {
            keys_requested: requested,
            keys_cached: warmed,
        });
        warmed
    }

    /// Queue keys for the next background warming pass
    pub async fn queue_warming(&self, keys: Vec<String>) -> usize {
        let candidates = keys.into_iter().map(WarmingCandidate::new).collect();
        self.warming.enqueue(candidates).await
    }

    pub(crate) async fn queue_warming_candidates(&self, candidates: Vec<WarmingCandidate>) -> usize {
        self.warming.enqueue(candidates).await
    }

    /// Promote one batch of queued keys from L2/L3 into L1
    ///
    /// Warming reads are not recorded as analytics accesses.
    pub async fn run_warming_pass(&self) -> usize {
        let batch = self.warming.next_batch().await;
        if batch.is_empty() {
            return 0;
        }
        let requested = batch.len();
        let mut warmed = 0;

        for candidate in batch {
            if self.l1_has_live(&candidate.key) {
                self.warming.record_cached();
                continue;
            }

            let mut found = None;
            for tier in [CacheTier::L2, CacheTier::L3] {
                if let Some(store) = self.store(tier) {
                    if let Some(value) = self.fetch_remote(tier, store.as_ref(), &candidate.key).await {
                        found = Some((value, tier));
                        break;
                    }
                }
            }

            match found {
                Some((value, tier)) => {
                    self.promote_to_l1(&candidate.key, value, tier);
                    self.warming.record_warmed();
                    warmed += 1;
                }
                None => self.warming.record_missed(),
            }
        }

        debug!(requested, warmed, "Warming pass completed");
        self.emit_event(CacheEvent::Warmed {
            keys_requested: requested,
            keys_cached: warmed,
        });
        warmed
    }

    // =========================================================================
    // Migrations
    // =========================================================================

    /// Copy every L1 entry of a generalized pattern into a shared tier
    pub(crate) async fn replicate_pattern(&self, key_pattern: &str, tier: CacheTier) -> usize {
        if self.store(tier).is_none() {
            return 0;
        }
        let entries: Vec<(String, Arc<Value>)> = {
            let l1 = self.l1.lock();
            l1.iter()
                .filter(|(key, _)| generalize_key_pattern(key) == key_pattern)
                .map(|(key, entry)| (key.clone(), entry.value.clone()))
                .collect()
        };

        let ttl = self.config.default_ttl(tier);
        let mut copied = 0;
        for (key, value) in entries {
            if self.write_remote(tier, &key, &value, ttl).await {
                copied += 1;
            }
        }
        copied
    }

    /// Move large L1 entries idle for over an hour into the next slower tier
    pub(crate) async fn demote_idle_large_entries(&self) -> usize {
        let mut target = CacheTier::L1.demotion_target();
        while let Some(tier) = target.filter(|tier| self.store(*tier).is_none()) {
            target = tier.demotion_target();
        }
        let Some(target) = target else {
            return 0;
        };

        let now = Instant::now();
        let candidates: Vec<(String, Arc<Value>, u64, Instant)> = {
            let l1 = self.l1.lock();
            l1.values()
                .filter(|entry| {
                    entry.size_bytes > LARGE_ENTRY_BYTES
                        && entry.idle_seconds(now) > DEMOTION_IDLE_SECONDS
                        && !entry.is_expired(now)
                })
                .map(|entry| (entry.key.clone(), entry.value.clone(), entry.size_bytes, entry.created_at))
                .collect()
        };

        let ttl = self.config.default_ttl(target);
        let mut demoted = 0;
        for (key, value, size_bytes, created_at) in candidates {
            if !self.write_remote(target, &key, &value, ttl).await {
                continue;
            }
            // Skip keys rewritten while the remote write was in flight
            let removed = {
                let mut l1 = self.l1.lock();
                let unchanged = l1.get(&key).is_some_and(|entry| entry.created_at == created_at);
                let removed = if unchanged { l1.remove(&key) } else { None };
                if let Some(entry) = &removed {
                    self.stats.l1.record_remove(entry.size_bytes);
                }
                removed
            };
            if removed.is_some() {
                self.stats.l1.record_demotion();
                self.emit_event(CacheEvent::demote(&key, CacheTier::L1, target, size_bytes));
                demoted += 1;
            }
        }
        demoted
    }

    // =========================================================================
    // Health & Statistics
    // =========================================================================

    async fn check_store(&self, tier: CacheTier) -> Option<bool> {
        let store = self.store(tier)?;
        let checker = store.health()?;
        match self.call_remote(tier, "health_check", checker.health_check()).await {
            Ok(healthy) => Some(healthy),
            Err(e) => {
                warn!(tier = %tier, error = %e, "Tier health check failed");
                Some(false)
            }
        }
    }

    /// Check the health of the cache and of stores that expose one
    pub async fn health_check(&self) -> HealthReport {
        let l2 = self.check_store(CacheTier::L2).await;
        let l3 = self.check_store(CacheTier::L3).await;
        HealthReport {
            healthy: l2 != Some(false) && l3 != Some(false),
            l1: true,
            l2,
            l3,
            background_running: self.is_background_running(),
        }
    }

    /// Snapshot of counters, recommendations and top patterns
    pub fn get_cache_statistics(&self) -> CacheStatistics {
        let l1_entries = self.l1_len();
        let (recommendations, top_patterns, tracked_patterns) = match &self.analytics {
            Some(analytics) => {
                let mut recommendations = analytics.get_optimization_recommendations();
                recommendations.truncate(STATS_TOP_N);
                (
                    recommendations,
                    analytics.top_patterns(STATS_TOP_N),
                    analytics.pattern_count(),
                )
            }
            None => (Vec::new(), Vec::new(), 0),
        };

        CacheStatistics {
            service: self.config.service_name.clone(),
            tiers: self.stats.tier_snapshots(),
            lookups: self.stats.lookups.load(std::sync::atomic::Ordering::Relaxed),
            overall_hit_rate: self.stats.overall_hit_rate(),
            l1_entries,
            l1_max_size: self.config.l1_max_size,
            l2_configured: self.l2.is_some(),
            l3_configured: self.l3.is_some(),
            analytics_enabled: self.analytics.is_some(),
            tracked_patterns,
            recommendations,
            top_patterns,
            warming: self.warming.stats(),
            background_running: self.is_background_running(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::MemoryStore;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn small_config(l1_max_size: usize) -> IntelligentCacheConfig {
        IntelligentCacheConfig {
            l1_max_size,
            ..Default::default()
        }
    }

    fn cache_with_l2(config: IntelligentCacheConfig) -> (Arc<IntelligentCache>, Arc<MemoryStore>) {
        let l2 = Arc::new(MemoryStore::new("l2"));
        let cache = IntelligentCache::with_collaborators(
            config,
            CacheCollaborators::new().with_l2(l2.clone()),
        )
        .unwrap();
        (cache, l2)
    }

    #[derive(Default)]
    struct RecordingSink {
        events: parking_lot::Mutex<Vec<CacheAccessEvent>>,
    }

    impl MetricsSink for RecordingSink {
        fn record_cache_event(&self, event: CacheAccessEvent) {
            self.events.lock().push(event);
        }
    }

    struct SlowStore;

    #[async_trait]
    impl TierStore for SlowStore {
        fn name(&self) -> &str {
            "slow"
        }

        async fn get(&self, _key: &str) -> Result<Option<Bytes>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Some(Bytes::from_static(b"\"late\"")))
        }

        async fn setex(&self, _key: &str, _ttl: u64, _value: Bytes) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(true)
        }

        async fn delete(&self, _key: &str) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(IntelligentCacheConfig::default().validate().is_ok());
        assert_matches!(small_config(0).validate(), Err(Error::Configuration(_)));

        let mut config = IntelligentCacheConfig::default();
        config.analytics.trim_to = config.analytics.max_access_times + 1;
        assert_matches!(config.validate(), Err(Error::Configuration(_)));

        assert!(IntelligentCache::new(small_config(0)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_basic_warm_path_and_ttl() {
        let cache = IntelligentCache::new(IntelligentCacheConfig::default()).unwrap();

        assert!(cache.set("k1", json!("v1"), SetOptions::new().ttl(60)).await);
        let (value, hit) = cache.get("k1", None, None).await.into_parts();
        assert!(hit);
        assert_eq!(value.as_deref(), Some(&json!("v1")));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("k1", None, None).await.is_hit());

        tokio::time::advance(Duration::from_secs(2)).await;
        let (value, hit) = cache.get("k1", None, None).await.into_parts();
        assert!(!hit);
        assert!(value.is_none());
        assert!(cache.peek_l1("k1").is_none());
        assert_eq!(cache.stats().l1.evictions.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_hit_rate_arithmetic() {
        let cache = IntelligentCache::new(IntelligentCacheConfig::default()).unwrap();
        cache.set("a", json!(1), SetOptions::new()).await;

        for _ in 0..3 {
            assert!(cache.get("a", None, None).await.is_hit());
        }
        assert!(cache.get("missing", None, None).await.is_miss());

        assert!((cache.stats().l1.hit_rate() - 0.75).abs() < 1e-9);
        assert!((cache.stats().overall_hit_rate() - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_l1_never_exceeds_capacity() {
        let cache = IntelligentCache::new(small_config(10)).unwrap();
        for i in 0..50 {
            cache
                .set(&format!("key-{}", i), json!(i), SetOptions::new().tier(CacheTier::L1))
                .await;
            assert!(cache.l1_len() <= 10);
        }
        assert!(cache.stats().l1.evictions.load(Ordering::Relaxed) > 0);
        assert_eq!(cache.stats().l1.get_entry_count() as usize, cache.l1_len());
    }

    #[tokio::test]
    async fn test_single_slot_capacity() {
        let cache = IntelligentCache::new(small_config(1)).unwrap();
        cache.set("a", json!(1), SetOptions::new()).await;
        cache.set("b", json!(2), SetOptions::new()).await;
        assert_eq!(cache.l1_len(), 1);
        assert!(cache.peek_l1("b").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_prefers_low_access_count() {
        let cache = IntelligentCache::new(small_config(2)).unwrap();
        cache.set("frequent", json!("a"), SetOptions::new()).await;
        cache.set("rare", json!("b"), SetOptions::new()).await;

        for _ in 0..3 {
            assert!(cache.get("frequent", None, None).await.is_hit());
        }

        cache.set("new", json!("c"), SetOptions::new()).await;
        assert!(cache.peek_l1("frequent").is_some());
        assert!(cache.peek_l1("rare").is_none());
        assert!(cache.peek_l1("new").is_some());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (cache, _l2) = cache_with_l2(IntelligentCacheConfig::default());
        assert!(cache.delete("never-set", None).await);

        cache.set("k", json!("v"), SetOptions::new()).await;
        assert!(cache.delete("k", None).await);
        assert!(cache.get("k", None, None).await.is_miss());
        assert!(cache.delete("k", None).await);
    }

    #[tokio::test]
    async fn test_delete_reports_remote_failure() {
        let (cache, l2) = cache_with_l2(IntelligentCacheConfig::default());
        cache.set("k", json!("v"), SetOptions::new()).await;
        l2.set_available(false);

        assert!(!cache.delete("k", None).await);
        assert!(cache.peek_l1("k").is_none());
    }

    #[tokio::test]
    async fn test_context_derives_distinct_keys() {
        let cache = IntelligentCache::new(IntelligentCacheConfig::default()).unwrap();
        let mut en = CacheContext::new();
        en.insert("lang".into(), json!("en"));
        let mut fr = CacheContext::new();
        fr.insert("lang".into(), json!("fr"));

        cache
            .set("greeting", json!("hello"), SetOptions::new().context(en.clone()))
            .await;

        assert!(cache.get("greeting", Some(&en), None).await.is_hit());
        assert!(cache.get("greeting", Some(&fr), None).await.is_miss());
        assert!(cache.get("greeting", None, None).await.is_miss());

        let entry = cache.peek_l1(&derive_cache_key("greeting", Some(&en))).unwrap();
        assert_eq!(entry.semantic_hash, Some(context_fingerprint(&en)));
    }

    #[tokio::test]
    async fn test_l2_hit_promotes_to_l1() {
        let (cache, l2) = cache_with_l2(IntelligentCacheConfig::default());
        l2.setex("k2", 600, Bytes::from_static(b"\"v2\"")).await.unwrap();

        let lookup = cache.get("k2", None, None).await;
        assert_matches!(&lookup, CacheLookup::Hit { tier: CacheTier::L2, .. });
        assert_eq!(lookup.value(), Some(&json!("v2")));

        let lookup = cache.get("k2", None, None).await;
        assert_matches!(lookup, CacheLookup::Hit { tier: CacheTier::L1, .. });

        let promoted = cache.peek_l1("k2").unwrap();
        assert_eq!(promoted.ttl_seconds, Some(cache.config().l1_ttl_seconds));
        assert_eq!(cache.stats().l1.promotions.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().l1.misses.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().l2.hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_l3_hit_promotes_to_l2_and_l1() {
        let l2 = Arc::new(MemoryStore::new("l2"));
        let l3 = Arc::new(MemoryStore::new("l3"));
        let cache = IntelligentCache::with_collaborators(
            IntelligentCacheConfig::default(),
            CacheCollaborators::new().with_l2(l2.clone()).with_l3(l3.clone()),
        )
        .unwrap();
        l3.setex("cold", 600, Bytes::from_static(b"{\"n\":1}")).await.unwrap();

        let lookup = cache.get("cold", None, None).await;
        assert_eq!(lookup.tier(), Some(CacheTier::L3));
        assert!(l2.contains("cold"));
        assert!(cache.peek_l1("cold").is_some());
    }

    #[tokio::test]
    async fn test_l3_hit_without_l2_promotes_to_l1_only() {
        let l3 = Arc::new(MemoryStore::new("l3"));
        let cache = IntelligentCache::with_collaborators(
            IntelligentCacheConfig::default(),
            CacheCollaborators::new().with_l3(l3.clone()),
        )
        .unwrap();
        l3.setex("cold", 600, Bytes::from_static(b"7")).await.unwrap();

        assert_eq!(cache.get("cold", None, None).await.tier(), Some(CacheTier::L3));
        assert!(cache.peek_l1("cold").is_some());
        assert_eq!(cache.stats().l2.promotions.load(Ordering::Relaxed), 0);
        assert_eq!(cache.stats().l1.promotions.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_full_miss_counts_once_per_lookup() {
        let l3 = Arc::new(MemoryStore::new("l3"));
        let cache = IntelligentCache::with_collaborators(
            IntelligentCacheConfig::default(),
            CacheCollaborators::new()
                .with_l2(Arc::new(MemoryStore::new("l2")))
                .with_l3(l3),
        )
        .unwrap();

        assert!(cache.get("nowhere", None, None).await.is_miss());

        let stats = cache.stats();
        for tier in CacheTier::lookup_order() {
            assert_eq!(stats.tier(*tier).misses.load(Ordering::Relaxed), 1);
        }
        assert_eq!(stats.full_misses.load(Ordering::Relaxed), 1);
        assert_eq!(stats.lookups.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_l1_counters_match_contents_under_contention() {
        let cache = IntelligentCache::new(small_config(64)).unwrap();

        let mut handles = Vec::new();
        for worker in 0..4 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..200 {
                    let key = format!("k{}", (worker * 7 + i) % 32);
                    match i % 5 {
                        0 => {
                            cache.delete(&key, None).await;
                        }
                        1 if worker == 0 => {
                            cache.clear_all();
                        }
                        2 => {
                            cache.clear_by_pattern("k1").await;
                        }
                        _ => {
                            cache
                                .set(&key, json!(i), SetOptions::new().tier(CacheTier::L1))
                                .await;
                        }
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let l1 = &cache.stats().l1;
        assert_eq!(l1.get_entry_count() as usize, cache.l1_len());
        // A wrapped counter would be close to u64::MAX
        assert!(l1.get_entry_count() <= 64);
        assert!(l1.size_bytes.load(Ordering::Relaxed) < u64::MAX / 2);

        cache.clear_all();
        assert_eq!(l1.get_entry_count(), 0);
        assert_eq!(l1.size_bytes.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_large_value_goes_to_l3_only() {
        let l2 = Arc::new(MemoryStore::new("l2"));
        let l3 = Arc::new(MemoryStore::new("l3"));
        let cache = IntelligentCache::with_collaborators(
            IntelligentCacheConfig::default(),
            CacheCollaborators::new().with_l2(l2.clone()).with_l3(l3.clone()),
        )
        .unwrap();

        let payload = json!("x".repeat(11 * 1024 * 1024));
        assert!(cache.set("big", payload, SetOptions::new()).await);

        assert!(cache.peek_l1("big").is_none());
        assert!(!l2.contains("big"));
        assert!(l3.contains("big"));
    }

    #[tokio::test]
    async fn test_large_value_with_placeholder_l3() {
        let cache = IntelligentCache::new(IntelligentCacheConfig::default()).unwrap();
        let payload = json!("x".repeat(11 * 1024 * 1024));
        assert!(cache.set("big", payload, SetOptions::new()).await);
        assert!(cache.peek_l1("big").is_none());
        assert!(cache.get("big", None, None).await.is_miss());
    }

    #[tokio::test]
    async fn test_auto_placement_writes_through_to_l2() {
        let (cache, l2) = cache_with_l2(IntelligentCacheConfig::default());
        assert!(cache.set("k", json!({"a": 1}), SetOptions::new()).await);
        assert!(cache.peek_l1("k").is_some());
        assert!(l2.contains("k"));

        assert!(cache.set("only-l2", json!(1), SetOptions::new().tier(CacheTier::L2)).await);
        assert!(cache.peek_l1("only-l2").is_none());
        assert!(l2.contains("only-l2"));
    }

    #[tokio::test]
    async fn test_remote_failure_degrades_to_miss() {
        let (cache, l2) = cache_with_l2(IntelligentCacheConfig::default());
        l2.setex("k", 600, Bytes::from_static(b"\"v\"")).await.unwrap();
        l2.set_available(false);

        let mut events = cache.subscribe();
        assert!(cache.get("k", None, None).await.is_miss());
        assert_matches!(events.try_recv(), Ok(CacheEvent::TierError { tier: CacheTier::L2, .. }));

        // L1 write still succeeds
        assert!(cache.set("fresh", json!(1), SetOptions::new()).await);
        assert!(!cache.set("l2-only", json!(1), SetOptions::new().tier(CacheTier::L2)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_timeout_is_a_miss() {
        let config = IntelligentCacheConfig {
            remote_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let cache = IntelligentCache::with_collaborators(
            config,
            CacheCollaborators::new().with_l2(Arc::new(SlowStore)).without_l3(),
        )
        .unwrap();

        assert!(cache.get("k", None, None).await.is_miss());
        assert!(!cache.set("k", json!(1), SetOptions::new().tier(CacheTier::L2)).await);
    }

    #[tokio::test]
    async fn test_one_analytics_record_per_get() {
        let (cache, l2) = cache_with_l2(IntelligentCacheConfig::default());
        l2.setex("item:7:data", 600, Bytes::from_static(b"1")).await.unwrap();

        cache.get("item:7:data", None, Some("alice")).await; // L2 hit
        cache.get("item:7:data", None, Some("bob")).await; // L1 hit
        cache.get("item:8:data", None, None).await; // miss

        let pattern = cache
            .analytics()
            .unwrap()
            .pattern("item:<ID>:data")
            .unwrap();
        assert_eq!(pattern.access_times.len(), 3);
        assert_eq!(pattern.hits, 2);
        assert_eq!(pattern.misses, 1);
        assert_eq!(pattern.distinct_users(), 2);
    }

    #[tokio::test]
    async fn test_disabled_analytics_records_nothing() {
        let config = IntelligentCacheConfig {
            enable_analytics: false,
            ..Default::default()
        };
        let cache = IntelligentCache::new(config).unwrap();
        cache.get("k", None, None).await;
        assert!(cache.analytics().is_none());
        assert!(cache.get_cache_statistics().recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_ttl_follows_analytics_recommendation() {
        let cache = IntelligentCache::new(IntelligentCacheConfig::default()).unwrap();
        cache.get("report:42:daily", None, None).await;
        cache
            .analytics()
            .unwrap()
            .update_recommended_ttl("report:<ID>:daily", 7_200);

        cache.set("report:43:daily", json!(1), SetOptions::new()).await;
        assert_eq!(cache.peek_l1("report:43:daily").unwrap().ttl_seconds, Some(7_200));

        cache.set("report:44:daily", json!(1), SetOptions::new().ttl(30)).await;
        assert_eq!(cache.peek_l1("report:44:daily").unwrap().ttl_seconds, Some(30));

        cache.set("unseen", json!(1), SetOptions::new()).await;
        assert_eq!(cache.peek_l1("unseen").unwrap().ttl_seconds, Some(300));
    }

    #[tokio::test]
    async fn test_optimal_tier_heuristic() {
        let cache = IntelligentCache::new(IntelligentCacheConfig::default()).unwrap();
        let profile = |access_frequency, distinct_users| PatternProfile {
            access_frequency,
            distinct_users,
            recommended_ttl: 3_600,
            cache_tier: CacheTier::L1,
        };

        assert_eq!(cache.determine_optimal_tier(2 * 1024 * 1024, None), CacheTier::L2);
        assert_eq!(cache.determine_optimal_tier(100, None), CacheTier::L1);
        assert_eq!(cache.determine_optimal_tier(100, Some(&profile(20.0, 50))), CacheTier::L1);
        assert_eq!(cache.determine_optimal_tier(100, Some(&profile(5.0, 6))), CacheTier::L2);
        assert_eq!(cache.determine_optimal_tier(100, Some(&profile(0.5, 1))), CacheTier::L3);
        assert_eq!(cache.determine_optimal_tier(100, Some(&profile(3.0, 1))), CacheTier::L1);
    }

    #[tokio::test]
    async fn test_clear_by_pattern_and_tags() {
        let (cache, l2) = cache_with_l2(IntelligentCacheConfig::default());
        for key in ["user:1:profile", "user:2:profile", "order:9"] {
            cache.set(key, json!(key), SetOptions::new().tag("batch")).await;
        }
        cache.set("untagged", json!(0), SetOptions::new()).await;

        assert_eq!(cache.clear_by_pattern("user:").await, 2);
        assert!(!l2.contains("user:1:profile"));
        assert!(l2.contains("order:9"));

        assert_eq!(cache.invalidate_by_tag("batch"), 1);
        assert!(cache.peek_l1("order:9").is_none());
        assert!(cache.peek_l1("untagged").is_some());

        assert_eq!(cache.clear_all(), 1);
        assert_eq!(cache.l1_len(), 0);
        assert_eq!(cache.stats().l1.get_entry_count(), 0);
    }

    #[tokio::test]
    async fn test_warm_cache_with_loader() {
        let cache = IntelligentCache::new(IntelligentCacheConfig::default()).unwrap();
        cache.set("present", json!(0), SetOptions::new()).await;

        let keys = vec!["present".to_string(), "a".to_string(), "gone".to_string()];
        let warmed = cache
            .warm_cache(keys, |key| async move {
                (key != "gone").then(|| json!(format!("loaded-{}", key)))
            })
            .await;

        assert_eq!(warmed, 1);
        assert_eq!(*cache.peek_l1("a").unwrap().value, json!("loaded-a"));
        let stats = cache.warming().stats();
        assert_eq!(stats.keys_warmed, 1);
        assert_eq!(stats.keys_cached, 1);
        assert_eq!(stats.keys_missed, 1);
    }

    #[tokio::test]
    async fn test_warming_pass_promotes_from_l2() {
        let (cache, l2) = cache_with_l2(IntelligentCacheConfig::default());
        l2.setex("queued", 600, Bytes::from_static(b"42")).await.unwrap();

        assert_eq!(
            cache
                .queue_warming(vec!["queued".to_string(), "absent".to_string()])
                .await,
            2
        );
        assert_eq!(cache.run_warming_pass().await, 1);
        assert_eq!(*cache.peek_l1("queued").unwrap().value, json!(42));
        // Warming is not an access
        assert_eq!(cache.analytics().unwrap().pattern_count(), 0);
        assert_eq!(cache.run_warming_pass().await, 0);
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let cache = IntelligentCache::new(IntelligentCacheConfig::default()).unwrap();
        let mut events = cache.subscribe();

        cache.set("k", json!("v"), SetOptions::new()).await;
        cache.get("k", None, None).await;

        assert_matches!(events.recv().await, Ok(CacheEvent::Put { tier: CacheTier::L1, .. }));
        assert_matches!(events.recv().await, Ok(CacheEvent::Hit { tier: CacheTier::L1, .. }));
    }

    #[tokio::test]
    async fn test_metrics_sink_receives_every_lookup() {
        let sink = Arc::new(RecordingSink::default());
        let cache = IntelligentCache::with_collaborators(
            IntelligentCacheConfig::default(),
            CacheCollaborators::new().with_metrics_sink(sink.clone()),
        )
        .unwrap();

        cache.set("k", json!(1), SetOptions::new()).await;
        cache.get("k", None, None).await;
        cache.get("other", None, None).await;

        let events = sink.events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].service, "intelligent-cache");
        assert_eq!(events[0].metadata.get("tier").map(String::as_str), Some("L1"));
        assert_eq!(events[1].event_type, crate::cache::sink::CacheEventType::Miss);
    }

    #[tokio::test]
    async fn test_health_check() {
        let cache = IntelligentCache::new(IntelligentCacheConfig::default()).unwrap();
        let report = cache.health_check().await;
        assert!(report.healthy);
        assert_eq!(report.l2, None);
        assert_eq!(report.l3, None);

        let (cache, l2) = cache_with_l2(IntelligentCacheConfig::default());
        assert_eq!(cache.health_check().await.l2, Some(true));
        l2.set_available(false);
        let report = cache.health_check().await;
        assert!(!report.healthy);
        assert_eq!(report.l2, Some(false));
    }

    #[tokio::test]
    async fn test_statistics_snapshot() {
        let cache = IntelligentCache::new(IntelligentCacheConfig::default()).unwrap();
        cache.set("k", json!(1), SetOptions::new()).await;
        cache.get("k", None, None).await;
        cache.get("nope", None, None).await;

        let stats = cache.get_cache_statistics();
        assert_eq!(stats.tiers.len(), 3);
        assert_eq!(stats.lookups, 2);
        assert!((stats.overall_hit_rate - 0.5).abs() < 1e-9);
        assert_eq!(stats.l1_entries, 1);
        assert_eq!(stats.tracked_patterns, 2);
        assert!(!stats.l2_configured);
        assert!(stats.l3_configured);
        assert!(stats.top_patterns.len() <= 10);
    }
}
