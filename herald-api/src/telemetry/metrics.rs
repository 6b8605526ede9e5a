//! Prometheus Metrics Definitions
//!
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_int_counter, register_int_gauge, CounterVec, Encoder,
    IntCounter, IntGauge, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// Global metrics instance - initialized once on first use.
pub static METRICS: Lazy<ApiResult<HeraldMetrics>> = Lazy::new(HeraldMetrics::new);

/// Container for all Herald metrics.
#[derive(Clone)]
pub struct HeraldMetrics {
    /// Snapshot cache lookups - labels: result (hit/miss)
    pub cache_lookups_total: CounterVec,

    /// Change events published - labels: event_type
    pub change_events_total: CounterVec,

    /// Cache invalidations that failed after a successful store write
    pub cache_invalidation_failures_total: IntCounter,

    /// Currently attached broadcast sessions
    pub connected_sessions: IntGauge,
}

impl HeraldMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            cache_lookups_total: register_counter_vec!(
                "herald_cache_lookups_total",
                "Snapshot cache lookups by result",
                &["result"]
            )
            .map_err(|e| {
                ApiError::internal_error(format!("Failed to register cache_lookups_total: {}", e))
            })?,

            change_events_total: register_counter_vec!(
                "herald_change_events_total",
                "Change events published on the broadcast channel",
                &["event_type"]
            )
            .map_err(|e| {
                ApiError::internal_error(format!("Failed to register change_events_total: {}", e))
            })?,

            cache_invalidation_failures_total: register_int_counter!(
                "herald_cache_invalidation_failures_total",
                "Cache invalidations that failed after a durable write"
            )
            .map_err(|e| {
                ApiError::internal_error(format!(
                    "Failed to register cache_invalidation_failures_total: {}",
                    e
                ))
            })?,

            connected_sessions: register_int_gauge!(
                "herald_connected_sessions",
                "Currently attached broadcast sessions"
            )
            .map_err(|e| {
                ApiError::internal_error(format!("Failed to register connected_sessions: {}", e))
            })?,
        })
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total.with_label_values(&[result]).inc();
    }

    pub fn record_change_event(&self, event_type: &str) {
        self.change_events_total
            .with_label_values(&[event_type])
            .inc();
    }

    pub fn record_invalidation_failure(&self) {
        self.cache_invalidation_failures_total.inc();
    }

    pub fn session_attached(&self) {
        self.connected_sessions.inc();
    }

    pub fn session_detached(&self) {
        self.connected_sessions.dec();
    }
}

/// Run `f` against the global metrics if they registered successfully.
pub fn with_metrics<F: FnOnce(&HeraldMetrics)>(f: F) {
    match METRICS.as_ref() {
        Ok(metrics) => f(metrics),
        Err(e) => tracing::trace!(error = %e, "metrics unavailable"),
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    // Register on first scrape even if nothing recorded yet.
    with_metrics(|_| {});

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
