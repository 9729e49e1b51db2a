//! Reporting endpoints over live stats, the transaction log and cursors

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::monitoring::report::{log_rows, reseller_report, LogRow, ResellerReport};
use crate::monitoring::LogFilter;

/// Query parameters for the log listing
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    /// Free text matched against reseller, addresses, token and chain labels
    /// and transaction hashes
    pub q: Option<String>,
    /// Reseller name or id
    pub reseller: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub count: usize,
    pub query: String,
    pub reseller: String,
    pub monitor_active: bool,
    pub entries: Vec<LogRow>,
}

/// Transaction log, newest first
///
/// GET /api/v1/logs?q=&reseller=&limit=
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogsQuery>,
) -> AppResult<Json<LogsResponse>> {
    if params.limit == Some(0) {
        return Err(AppError::Validation("limit must be at least 1".to_string()));
    }

    let filter = LogFilter::new(params.q.as_deref(), params.reseller.as_deref());
    let entries = log_rows(&state.log, &filter, params.limit);

    Ok(Json(LogsResponse {
        count: entries.len(),
        query: params.q.unwrap_or_default().trim().to_string(),
        reseller: params.reseller.unwrap_or_default(),
        monitor_active: state.monitor_enabled,
        entries,
    }))
}

/// Per-reseller totals and the grand total
///
/// GET /api/v1/resellers
pub async fn list_resellers(State(state): State<Arc<AppState>>) -> Json<ResellerReport> {
    Json(reseller_report(&state.aggregator))
}

#[derive(Debug, Serialize)]
pub struct CursorView {
    pub affiliate: String,
    pub last_deposit_address: String,
    pub last_deposit_memo: String,
}

/// Committed pagination cursors
///
/// GET /api/v1/cursors
pub async fn list_cursors(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<CursorView>>> {
    let cursors = state.cursors.all().await?;
    Ok(Json(
        cursors
            .into_iter()
            .map(|(affiliate, cursor)| CursorView {
                affiliate,
                last_deposit_address: cursor.deposit_address,
                last_deposit_memo: cursor.deposit_memo,
            })
            .collect(),
    ))
}
