//! Prometheus metrics for the reseller monitor
//!
//! Exposes metrics endpoint for monitoring:
//! - Poll cycles by affiliate and outcome
//! - Transactions ingested by affiliate
//! - Upstream fetch latency
//! - Cursor advance and notification failures
//! - Log buffer length

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metrics state
pub struct MetricsState {
    /// Prometheus registry
    registry: Registry,
    /// Poll cycles, labelled by affiliate and outcome
    pub poll_cycles: IntCounterVec,
    /// Transactions aggregated, labelled by affiliate
    pub transactions_ingested: IntCounterVec,
    /// Upstream page fetch latency (in milliseconds)
    pub fetch_latency: Histogram,
    /// Failed cursor commits
    pub cursor_advance_failures: IntCounter,
    /// Failed notification calls
    pub notification_failures: IntCounter,
    /// Entries currently held by the log buffer
    pub log_buffer_len: IntGauge,
}

impl MetricsState {
    /// Create a new metrics state with all metrics registered
    pub fn new() -> Self {
        let registry = Registry::new();

        let poll_cycles = IntCounterVec::new(
            Opts::new(
                "reseller_poll_cycles_total",
                "Poll cycles run per affiliate, by outcome",
            ),
            &["affiliate", "outcome"],
        )
        .expect("Failed to create poll_cycles counter");
        registry
            .register(Box::new(poll_cycles.clone()))
            .expect("Failed to register poll_cycles");

        let transactions_ingested = IntCounterVec::new(
            Opts::new(
                "reseller_transactions_ingested_total",
                "Transactions recorded into live stats per affiliate",
            ),
            &["affiliate"],
        )
        .expect("Failed to create transactions_ingested counter");
        registry
            .register(Box::new(transactions_ingested.clone()))
            .expect("Failed to register transactions_ingested");

        let fetch_latency = Histogram::with_opts(
            HistogramOpts::new(
                "reseller_fetch_latency_ms",
                "Upstream transaction page fetch latency in milliseconds",
            )
            .buckets(vec![
                50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
            ]),
        )
        .expect("Failed to create fetch_latency histogram");
        registry
            .register(Box::new(fetch_latency.clone()))
            .expect("Failed to register fetch_latency");

        let cursor_advance_failures = IntCounter::with_opts(Opts::new(
            "reseller_cursor_advance_failures_total",
            "Cursor commits that failed; the page is re-fetched next cycle",
        ))
        .expect("Failed to create cursor_advance_failures counter");
        registry
            .register(Box::new(cursor_advance_failures.clone()))
            .expect("Failed to register cursor_advance_failures");

        let notification_failures = IntCounter::with_opts(Opts::new(
            "reseller_notification_failures_total",
            "Notification calls that failed and were dropped",
        ))
        .expect("Failed to create notification_failures counter");
        registry
            .register(Box::new(notification_failures.clone()))
            .expect("Failed to register notification_failures");

        let log_buffer_len = IntGauge::with_opts(Opts::new(
            "reseller_log_buffer_entries",
            "Entries currently held in the transaction log buffer",
        ))
        .expect("Failed to create log_buffer_len gauge");
        registry
            .register(Box::new(log_buffer_len.clone()))
            .expect("Failed to register log_buffer_len");

        Self {
            registry,
            poll_cycles,
            transactions_ingested,
            fetch_latency,
            cursor_advance_failures,
            notification_failures,
            log_buffer_len,
        }
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Count a finished poll cycle
    pub fn record_cycle(&self, affiliate_id: &str, outcome: &str) {
        self.poll_cycles
            .with_label_values(&[affiliate_id, outcome])
            .inc();
    }
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics handler - returns Prometheus metrics in text format
///
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<MetricsState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.registry().gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("Content-Type", "text/plain; version=0.0.4")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        buffer,
    )
}

/// Create metrics router
pub fn metrics_router() -> Router<Arc<MetricsState>> {
    Router::new().route("/metrics", get(metrics_handler))
}
