//! HTTP handlers for the reseller monitor

mod health;
mod reports;

pub use health::*;
pub use reports::*;

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics::{metrics_router, MetricsState};
use crate::monitoring::{AffiliatePoller, CursorStore, LogBuffer, StatsAggregator};

/// Shared read-only state for the reporting surface
pub struct AppState {
    /// Application start time
    pub started_at: DateTime<Utc>,
    pub monitor_enabled: bool,
    pub log: Arc<LogBuffer>,
    pub aggregator: Arc<StatsAggregator>,
    pub cursors: Arc<dyn CursorStore>,
    pub pollers: Vec<Arc<AffiliatePoller>>,
    pub credentials: CredentialFlags,
}

/// Build the full HTTP router
pub fn api_router(state: Arc<AppState>, metrics: Arc<MetricsState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/logs", get(list_logs))
        .route("/resellers", get(list_resellers))
        .route("/cursors", get(list_cursors))
        .with_state(state);

    // Simple health check for load balancers
    let root_routes = Router::new().route("/health", get(health_simple));

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(root_routes)
        .merge(metrics_router().with_state(metrics))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
