//! Prometheus Metrics Definitions
//!
//! Defines all Larder metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once on first use
pub static METRICS: Lazy<ApiResult<LarderMetrics>> = Lazy::new(LarderMetrics::new);

/// Registered metrics, or `None` if registration failed.
///
/// Recording is best effort; a registry failure is logged once at startup.
pub fn metrics() -> Option<&'static LarderMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all Larder metrics.
#[derive(Clone)]
pub struct LarderMetrics {
    /// HTTP request counter - labels: method, path (route template), status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path (route template)
    pub http_request_duration_seconds: HistogramVec,

    /// Cache lookups - labels: layer (guard/response), outcome (hit/miss/error)
    pub cache_lookups_total: CounterVec,

    /// Admission decisions - labels: outcome (allowed/rejected/error)
    pub rate_limit_decisions_total: CounterVec,

    /// Credential checks - labels: outcome (authorized/missing/invalid/error)
    pub credential_checks_total: CounterVec,

    /// Background store writes - labels: task (audit_log/response_cache), status
    pub background_writes_total: CounterVec,
}

impl LarderMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "larder_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "larder_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            cache_lookups_total: register_counter_vec!(
                "larder_cache_lookups_total",
                "Cache lookups by layer and outcome",
                &["layer", "outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_lookups_total: {}", e)))?,

            rate_limit_decisions_total: register_counter_vec!(
                "larder_rate_limit_decisions_total",
                "Admission control decisions",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register rate_limit_decisions_total: {}", e)))?,

            credential_checks_total: register_counter_vec!(
                "larder_credential_checks_total",
                "Credential checks by outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register credential_checks_total: {}", e)))?,

            background_writes_total: register_counter_vec!(
                "larder_background_writes_total",
                "Detached store writes by task and status",
                &["task", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register background_writes_total: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a cache lookup.
    pub fn record_cache_lookup(&self, layer: &str, outcome: &str) {
        self.cache_lookups_total
            .with_label_values(&[layer, outcome])
            .inc();
    }

    /// Record an admission decision.
    pub fn record_rate_limit(&self, outcome: &str) {
        self.rate_limit_decisions_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a credential check.
    pub fn record_credential_check(&self, outcome: &str) {
        self.credential_checks_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a detached write.
    pub fn record_background_write(&self, task: &str, success: bool) {
        let status = if success { "success" } else { "failure" };
        self.background_writes_total
            .with_label_values(&[task, status])
            .inc();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
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
