//! Health check endpoint

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use super::AppState;
use crate::monitoring::{CursorStore, PollerStatus};

/// Consecutive failed cycles before a poller counts as degraded
const DEGRADED_FAILURE_THRESHOLD: u32 = 3;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall system status
    pub status: HealthStatus,
    /// Uptime in seconds
    pub uptime_seconds: i64,
    /// Whether affiliate polling is running
    pub monitor_enabled: bool,
    /// Entries in the transaction log buffer
    pub log_entries: usize,
    pub log_capacity: usize,
    /// Cursor store status
    pub cursor_store: ComponentHealth,
    /// Per-affiliate poller status
    pub pollers: Vec<PollerStatus>,
    /// Which credentials are configured; never their values
    pub credentials: CredentialFlags,
}

/// Health status enum
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Some pollers failing but reports still served
    Degraded,
    /// Cursor store unreachable
    Unhealthy,
}

/// Component health status
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CredentialFlags {
    pub explorer_jwt: bool,
    pub telegram_bot_token: bool,
}

/// Health check handler
///
/// GET /api/v1/health
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let uptime = (Utc::now() - state.started_at).num_seconds();

    let cursor_store = check_cursor_store(state.cursors.as_ref()).await;
    let pollers: Vec<PollerStatus> = state.pollers.iter().map(|p| p.status()).collect();

    let overall_status = if cursor_store.status == HealthStatus::Unhealthy {
        HealthStatus::Unhealthy
    } else if pollers
        .iter()
        .any(|p| p.consecutive_failures >= DEGRADED_FAILURE_THRESHOLD)
    {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let status_code = match overall_status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK, // Still return 200 for degraded
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    let response = HealthResponse {
        status: overall_status,
        uptime_seconds: uptime,
        monitor_enabled: state.monitor_enabled,
        log_entries: state.log.len(),
        log_capacity: state.log.capacity(),
        cursor_store,
        pollers,
        credentials: state.credentials,
    };

    (status_code, Json(response))
}

/// Simple health check (for load balancers)
///
/// GET /health
pub async fn health_simple() -> &'static str {
    "OK"
}

async fn check_cursor_store(store: &dyn CursorStore) -> ComponentHealth {
    match store.all().await {
        Ok(_) => ComponentHealth {
            status: HealthStatus::Healthy,
            message: None,
        },
        Err(e) => {
            tracing::error!(error = %e, "Cursor store health check failed");
            ComponentHealth {
                status: HealthStatus::Unhealthy,
                message: Some(e.to_string()),
            }
        }
    }
}
