//! Background Processing
//!
//! Three independent periodic tasks per cache instance:
//! - optimization: apply analytics-driven tier actions, demote idle large entries
//! - warming: drain one batch of the warming queue
//! - pruning: drop analytics history older than the retention window
//!
//! Tasks hold only a weak reference to the cache, so dropping the last
//! handle ends them even if `stop_background_processing` is never called.

use crate::cache::analytics::{PruneReport, TierAction};
use crate::cache::manager::IntelligentCache;
use crate::cache::tier::CacheTier;
use crate::cache::warming::{WarmingCandidate, WarmingReason};
use crate::error::{Error, Result};
use chrono::{Timelike, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Warming priority for keys of frequently used patterns
const FREQUENT_WARMING_PRIORITY: u8 = 100;

/// Warming priority for keys of patterns about to peak
const SEASONAL_WARMING_PRIORITY: u8 = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Intervals of the background tasks
#[derive(Debug, Clone)]
pub struct BackgroundConfig {
    /// Tier optimization interval
    pub optimization_interval: Duration,
    /// Warming pass interval
    pub warming_interval: Duration,
    /// Analytics pruning interval
    pub pruning_interval: Duration,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            optimization_interval: Duration::from_secs(300),
            warming_interval: Duration::from_secs(600),
            pruning_interval: Duration::from_secs(60),
        }
    }
}

impl BackgroundConfig {
    /// Validate the intervals
    pub fn validate(&self) -> Result<()> {
        if self.optimization_interval.is_zero()
            || self.warming_interval.is_zero()
            || self.pruning_interval.is_zero()
        {
            return Err(Error::Configuration(
                "background intervals must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Handles of running background tasks
pub(crate) struct BackgroundTasks {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Outcome of one optimization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OptimizationReport {
    /// Patterns whose recent keys were queued for L1
    pub promoted_patterns: usize,
    /// Patterns whose recommended TTL was raised
    pub ttl_raised: usize,
    /// Keys accepted into the warming queue
    pub warming_queued: usize,
    /// L1 entries copied into a shared tier
    pub replicated: usize,
    /// Large idle entries moved out of L1
    pub demoted: usize,
}

// =============================================================================
// Task Control
// =============================================================================

fn spawn_periodic<F, Fut>(
    cache: Weak<IntelligentCache>,
    name: &'static str,
    period: Duration,
    token: CancellationToken,
    task: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<IntelligentCache>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    let Some(cache) = cache.upgrade() else { break };
                    task(cache).await;
                }
            }
        }
        debug!(task = name, "Background task stopped");
    })
}

impl IntelligentCache {
    /// Start the background tasks
    ///
    /// Returns false if they were already running.
    pub fn start_background_processing(self: &Arc<Self>) -> bool {
        let mut background = self.background.lock();
        if background.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let config = &self.config.background;
        let weak = Arc::downgrade(self);

        let handles = vec![
            spawn_periodic(
                weak.clone(),
                "optimization",
                config.optimization_interval,
                token.clone(),
                |cache| async move {
                    let report = cache.run_optimization_pass().await;
                    debug!(?report, "Optimization pass completed");
                },
            ),
            spawn_periodic(
                weak.clone(),
                "warming",
                config.warming_interval,
                token.clone(),
                |cache| async move {
                    cache.run_warming_pass().await;
                },
            ),
            spawn_periodic(
                weak,
                "pruning",
                config.pruning_interval,
                token.clone(),
                |cache| async move {
                    cache.run_pruning_pass();
                },
            ),
        ];

        *background = Some(BackgroundTasks { token, handles });
        info!(
            optimization_secs = config.optimization_interval.as_secs(),
            warming_secs = config.warming_interval.as_secs(),
            pruning_secs = config.pruning_interval.as_secs(),
            "Background processing started"
        );
        true
    }

    /// Cancel the background tasks and wait for them to finish
    ///
    /// Safe to call when they were never started.
    pub async fn stop_background_processing(&self) {
        let Some(tasks) = self.background.lock().take() else {
            return;
        };

        tasks.token.cancel();
        for result in join_all(tasks.handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Background processing stopped");
    }

    /// Check whether background tasks are running
    pub fn is_background_running(&self) -> bool {
        self.background.lock().is_some()
    }

    /// Apply analytics-driven tier actions, then demote idle large entries
    pub async fn run_optimization_pass(&self) -> OptimizationReport {
        let mut report = OptimizationReport::default();

        if let Some(analytics) = self.analytics().cloned() {
            let actions = analytics.plan_tier_actions(Utc::now().hour());
            for action in actions {
                match action {
                    TierAction::PromoteFrequent { key_pattern, keys } => {
                        analytics.set_recommended_tier(&key_pattern, CacheTier::L1);
                        let candidates = keys
                            .into_iter()
                            .map(|key| {
                                WarmingCandidate::new(key)
                                    .with_priority(FREQUENT_WARMING_PRIORITY)
                                    .with_reason(WarmingReason::Frequent)
                            })
                            .collect();
                        report.warming_queued += self.queue_warming_candidates(candidates).await;
                        report.promoted_patterns += 1;
                    }
                    TierAction::RaiseTtl { key_pattern, ttl } => {
                        if analytics.update_recommended_ttl(&key_pattern, ttl) {
                            debug!(pattern = %key_pattern, ttl, "Raised recommended TTL");
                            report.ttl_raised += 1;
                        }
                    }
                    TierAction::SeasonalWarming {
                        key_pattern,
                        keys,
                        peak_hours,
                    } => {
                        debug!(pattern = %key_pattern, ?peak_hours, "Queueing seasonal warming");
                        let candidates = keys
                            .into_iter()
                            .map(|key| {
                                WarmingCandidate::new(key)
                                    .with_priority(SEASONAL_WARMING_PRIORITY)
                                    .with_reason(WarmingReason::Seasonal)
                            })
                            .collect();
                        report.warming_queued += self.queue_warming_candidates(candidates).await;
                    }
                    TierAction::SharedTier { key_pattern, tier } => {
                        analytics.set_recommended_tier(&key_pattern, tier);
                        report.replicated += self.replicate_pattern(&key_pattern, tier).await;
                    }
                }
            }
        }

        report.demoted = self.demote_idle_large_entries().await;
        report
    }

    /// Drop analytics history older than the retention window
    pub fn run_pruning_pass(&self) -> PruneReport {
        match self.analytics() {
            Some(analytics) => {
                let report = analytics.prune_stale(Utc::now());
                if report.patterns_removed > 0 || report.access_times_removed > 0 {
                    debug!(
                        access_times_removed = report.access_times_removed,
                        patterns_removed = report.patterns_removed,
                        "Pruned stale analytics"
                    );
                }
                report
            }
            None => PruneReport::default(),
        }
    }
}

impl Drop for IntelligentCache {
    fn drop(&mut self) {
        if let Some(tasks) = self.background.get_mut().take() {
            tasks.token.cancel();
        }
    }
}
