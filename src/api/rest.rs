//! REST API Handlers
//!
//! Exposes cache lookups, writes, invalidation, statistics and the
//! Prometheus exposition over HTTP.

use crate::cache::{CacheContext, CacheLookup, IntelligentCache, SetOptions, TierPlacement};
use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters accepted by lookups and deletes
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyQuery {
    /// Caller identity, hashed before analytics sees it
    #[serde(default)]
    pub user: Option<String>,
    /// JSON object the storage key is derived from, as given on the write
    #[serde(default)]
    pub context: Option<String>,
}

impl KeyQuery {
    /// Decode the `context` parameter
    fn cache_context(&self) -> Result<Option<CacheContext>, serde_json::Error> {
        self.context
            .as_deref()
            .map(serde_json::from_str::<CacheContext>)
            .transpose()
    }
}

fn invalid_context(e: serde_json::Error) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        ApiErrorResponse::new("invalid_context", format!("context must be a JSON object: {}", e)),
    )
        .into_response()
}

/// Body of `PUT /v1/cache/:key`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutEntryRequest {
    /// Value to store
    pub value: Value,
    /// TTL in seconds
    #[serde(default)]
    pub ttl: Option<u64>,
    /// Tier: auto, L1, L2, L3
    #[serde(default)]
    pub tier: Option<String>,
    /// Grouping tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Eviction priority
    #[serde(default)]
    pub priority: Option<f64>,
    /// Context the storage key is derived from
    #[serde(default)]
    pub context: Option<CacheContext>,
}

/// Body of `POST /v1/clear`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearRequest {
    /// Substring to match against storage keys
    pub pattern: String,
}

/// Lookup response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    pub key: String,
    pub tier: String,
    pub value: Value,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiErrorResponse {
    fn new(error: &str, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            error: error.into(),
            message: message.into(),
            details: None,
        })
    }
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    cache: Arc<IntelligentCache>,
    registry: Registry,
}

impl RestRouter {
    /// Create a new REST router
    ///
    /// `registry` is the one the cache's metrics sink registered into.
    pub fn new(cache: Arc<IntelligentCache>, registry: Registry) -> Self {
        Self { cache, registry }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            cache: self.cache,
            registry: self.registry,
        };

        Router::new()
            // Cache endpoints
            .route(
                "/v1/cache/:key",
                get(get_entry).put(put_entry).delete(delete_entry),
            )
            .route("/v1/clear", post(clear_entries))
            // Insight endpoints
            .route("/v1/stats", get(get_stats))
            .route("/v1/recommendations", get(get_recommendations))
            // Operational endpoints
            .route("/health", get(health_check))
            .route("/metrics", get(metrics))
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    cache: Arc<IntelligentCache>,
    registry: Registry,
}

// =============================================================================
// Handlers
// =============================================================================

/// Look up a key
async fn get_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<KeyQuery>,
) -> impl IntoResponse {
    let context = match query.cache_context() {
        Ok(context) => context,
        Err(e) => return invalid_context(e),
    };
    match state
        .cache
        .get(&key, context.as_ref(), query.user.as_deref())
        .await
    {
        CacheLookup::Hit { value, tier } => (
            StatusCode::OK,
            Json(LookupResponse {
                key,
                tier: tier.to_string(),
                value: value.as_ref().clone(),
            }),
        )
            .into_response(),
        CacheLookup::Miss => (
            StatusCode::NOT_FOUND,
            ApiErrorResponse::new("not_found", format!("Key {} not cached", key)),
        )
            .into_response(),
    }
}

/// Store a value
async fn put_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<PutEntryRequest>,
) -> impl IntoResponse {
    let placement = match request.tier.as_deref().map(str::parse::<TierPlacement>) {
        None => TierPlacement::Auto,
        Some(Ok(placement)) => placement,
        Some(Err(e)) => {
            return (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("invalid_tier", e.to_string()),
            )
                .into_response();
        }
    };

    let mut options = SetOptions::new().tier(placement);
    if let Some(ttl) = request.ttl {
        options = options.ttl(ttl);
    }
    if let Some(priority) = request.priority {
        options = options.priority(priority);
    }
    if let Some(context) = request.context {
        options = options.context(context);
    }
    for tag in request.tags {
        options = options.tag(tag);
    }

    debug!(key = %key, "Storing cache entry via REST");
    if state.cache.set(&key, request.value, options).await {
        (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "stored", "key": key })),
        )
            .into_response()
    } else {
        error!(key = %key, "Cache write failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorResponse::new("store_failed", format!("Failed to store {}", key)),
        )
            .into_response()
    }
}

/// Delete a key from every tier
async fn delete_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<KeyQuery>,
) -> impl IntoResponse {
    let context = match query.cache_context() {
        Ok(context) => context,
        Err(e) => return invalid_context(e),
    };
    let deleted = state.cache.delete(&key, context.as_ref()).await;
    (
        StatusCode::OK,
        Json(serde_json::json!({ "key": key, "deleted": deleted })),
    )
        .into_response()
}

/// Remove every key containing a pattern
async fn clear_entries(
    State(state): State<AppState>,
    Json(request): Json<ClearRequest>,
) -> impl IntoResponse {
    if request.pattern.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            ApiErrorResponse::new("invalid_pattern", "Pattern must not be empty"),
        )
            .into_response();
    }

    let removed = state.cache.clear_by_pattern(&request.pattern).await;
    info!(pattern = %request.pattern, removed, "Cleared cache entries via REST");
    (
        StatusCode::OK,
        Json(serde_json::json!({ "pattern": request.pattern, "removed": removed })),
    )
        .into_response()
}

/// Cache statistics
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.cache.get_cache_statistics())
}

/// Optimization recommendations
async fn get_recommendations(State(state): State<AppState>) -> impl IntoResponse {
    let recommendations = state
        .cache
        .analytics()
        .map(|analytics| analytics.get_optimization_recommendations())
        .unwrap_or_default();
    Json(recommendations)
}

/// Health check
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.cache.health_check().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

/// Prometheus text exposition
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&state.registry.gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorResponse::new("metrics_failed", e.to_string()),
            )
                .into_response()
        }
    }
}
