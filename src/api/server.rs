//! API Server
//!
//! Serves the REST router until shutdown is requested.

use crate::cache::IntelligentCache;
use crate::error::{Error, Result};
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use super::rest::RestRouter;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// HTTP server in front of an [`IntelligentCache`]
pub struct ApiServer {
    config: ApiServerConfig,
    cache: Arc<IntelligentCache>,
    registry: Registry,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, cache: Arc<IntelligentCache>, registry: Registry) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            cache,
            registry,
            shutdown_tx,
        }
    }

    /// Run until [`ApiServer::shutdown`] is called
    pub async fn run(&self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.rest_addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind REST server: {}", e)))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: tokio::net::TcpListener) -> Result<()> {
        let app = RestRouter::new(self.cache.clone(), self.registry.clone()).build();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!(addr = ?listener.local_addr().ok(), "REST API listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("REST server shutting down");
            })
            .await
            .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

        Ok(())
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
