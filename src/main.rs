//! Intelligent Cache Service
//!
//! Runs a multi-tier cache behind a REST API, with background
//! optimization driven by access analytics.

use clap::Parser;
use prometheus::Registry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

use intelligent_cache::cache::AnalyticsConfig;
use intelligent_cache::{
    ApiServer, ApiServerConfig, CacheCollaborators, Error, IntelligentCache,
    IntelligentCacheConfig, MemoryStore, PrometheusSink, Result,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Intelligent Cache - multi-tier cache with access analytics
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Maximum number of L1 entries
    #[arg(long, env = "L1_MAX_SIZE", default_value = "1000")]
    l1_max_size: usize,

    /// Default L1 TTL in seconds
    #[arg(long, env = "L1_TTL", default_value = "300")]
    l1_ttl: u64,

    /// Default L2 TTL in seconds
    #[arg(long, env = "L2_TTL", default_value = "3600")]
    l2_ttl: u64,

    /// Default L3 TTL in seconds
    #[arg(long, env = "L3_TTL", default_value = "86400")]
    l3_ttl: u64,

    /// L2 backend (memory, none)
    #[arg(long, env = "L2_BACKEND", default_value = "memory")]
    l2_backend: String,

    /// Timeout for L2/L3 calls in milliseconds
    #[arg(long, env = "REMOTE_TIMEOUT_MS", default_value = "500")]
    remote_timeout_ms: u64,

    /// Disable access analytics
    #[arg(long, env = "DISABLE_ANALYTICS")]
    disable_analytics: bool,

    /// Maximum number of tracked key patterns
    #[arg(long, env = "MAX_PATTERNS", default_value = "10000")]
    max_patterns: usize,

    /// Service name reported in metrics
    #[arg(long, env = "SERVICE_NAME", default_value = "intelligent-cache")]
    service_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn cache_config(&self) -> IntelligentCacheConfig {
        IntelligentCacheConfig {
            l1_max_size: self.l1_max_size,
            l1_ttl_seconds: self.l1_ttl,
            l2_ttl_seconds: self.l2_ttl,
            l3_ttl_seconds: self.l3_ttl,
            enable_analytics: !self.disable_analytics,
            remote_timeout: Duration::from_millis(self.remote_timeout_ms),
            service_name: self.service_name.clone(),
            analytics: AnalyticsConfig {
                max_patterns: self.max_patterns,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Intelligent Cache");
    info!("  Version: {}", intelligent_cache::VERSION);
    info!("  REST API: {}", args.api_addr);
    info!("  L2 backend: {}", args.l2_backend);
    info!("  Analytics: {}", !args.disable_analytics);

    let registry = Registry::new();
    let sink = Arc::new(PrometheusSink::new(&registry)?);

    let mut collaborators = CacheCollaborators::new().with_metrics_sink(sink);
    match args.l2_backend.to_lowercase().as_str() {
        "memory" => collaborators = collaborators.with_l2(Arc::new(MemoryStore::new("l2-memory"))),
        "none" => {}
        other => {
            return Err(Error::Configuration(format!(
                "Unknown L2 backend: {}. Use 'memory' or 'none'",
                other
            )))
        }
    }

    let cache = IntelligentCache::with_collaborators(args.cache_config(), collaborators)?;
    cache.start_background_processing();

    let api_config = ApiServerConfig {
        rest_addr: args
            .api_addr
            .parse()
            .map_err(|e| Error::Configuration(format!("Invalid REST API address: {}", e)))?,
    };
    let api_server = Arc::new(ApiServer::new(api_config, cache.clone(), registry));

    let mut server = {
        let api_server = api_server.clone();
        tokio::spawn(async move { api_server.run().await })
    };

    let server_exited = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            false
        }
        result = &mut server => {
            report_server_exit(result);
            true
        }
    };

    cache.stop_background_processing().await;
    if !server_exited {
        api_server.shutdown();
        report_server_exit(server.await);
    }

    info!("Intelligent Cache shutdown complete");
    Ok(())
}

fn report_server_exit(result: std::result::Result<Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "REST server error"),
        Err(e) => error!(error = %e, "REST server task failed"),
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = ["hyper=warn", "tower=warn", "axum=info"]
        .iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(
            EnvFilter::from_default_env().add_directive(level.into()),
            |filter, directive| filter.add_directive(directive),
        );

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
