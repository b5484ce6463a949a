//! Metrics Sink
//!
//! Optional collaborator that receives one event per cache lookup. The cache
//! works the same with or without a sink; recording must not fail.

use crate::cache::entry::short_digest;
use crate::cache::tier::CacheTier;
use crate::error::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use serde::Serialize;
use std::collections::BTreeMap;

/// Outcome of a cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheEventType {
    Hit,
    Miss,
}

impl CacheEventType {
    /// Lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheEventType::Hit => "hit",
            CacheEventType::Miss => "miss",
        }
    }
}

/// One lookup as reported to a metrics sink
#[derive(Debug, Clone, Serialize)]
pub struct CacheAccessEvent {
    /// Reporting service name
    pub service: String,
    /// First 16 hex chars of the SHA-256 of the storage key
    pub cache_key_hash: String,
    pub event_type: CacheEventType,
    pub retrieval_time_ms: f64,
    /// Extra labels (`tier`, `pattern`)
    pub metadata: BTreeMap<String, String>,
}

impl CacheAccessEvent {
    /// Build an event for a lookup
    pub fn new(service: &str, key: &str, tier: Option<CacheTier>, retrieval_time_ms: f64) -> Self {
        let mut metadata = BTreeMap::new();
        if let Some(tier) = tier {
            metadata.insert("tier".to_string(), tier.label().to_string());
        }
        Self {
            service: service.to_string(),
            cache_key_hash: short_digest(key.as_bytes(), 16),
            event_type: if tier.is_some() {
                CacheEventType::Hit
            } else {
                CacheEventType::Miss
            },
            retrieval_time_ms,
            metadata,
        }
    }

    /// Attach a metadata label
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Receiver of cache access events
pub trait MetricsSink: Send + Sync {
    /// Record one access; implementations must not panic or block
    fn record_cache_event(&self, event: CacheAccessEvent);
}

// =============================================================================
// Prometheus Sink
// =============================================================================

/// Metrics sink exporting to a Prometheus registry
#[derive(Clone)]
pub struct PrometheusSink {
    accesses: IntCounterVec,
    retrieval_seconds: HistogramVec,
}

impl PrometheusSink {
    /// Create the sink and register its collectors
    pub fn new(registry: &Registry) -> Result<Self> {
        let accesses = IntCounterVec::new(
            Opts::new("cache_access_total", "Cache lookups by outcome"),
            &["service", "event_type", "tier"],
        )?;
        let retrieval_seconds = HistogramVec::new(
            HistogramOpts::new("cache_retrieval_seconds", "Cache lookup latency in seconds")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["service", "event_type"],
        )?;

        registry.register(Box::new(accesses.clone()))?;
        registry.register(Box::new(retrieval_seconds.clone()))?;

        Ok(Self {
            accesses,
            retrieval_seconds,
        })
    }
}

impl MetricsSink for PrometheusSink {
    fn record_cache_event(&self, event: CacheAccessEvent) {
        let tier = event.metadata.get("tier").map(String::as_str).unwrap_or("none");
        let event_type = event.event_type.as_str();
        self.accesses
            .with_label_values(&[&event.service, event_type, tier])
            .inc();
        self.retrieval_seconds
            .with_label_values(&[&event.service, event_type])
            .observe(event.retrieval_time_ms / 1000.0);
    }
}
