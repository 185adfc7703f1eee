//! Larder Telemetry - Observability Infrastructure
//!
//! Provides structured logging and Prometheus metrics for the API layer.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics, metrics_handler, LarderMetrics, METRICS};
pub use middleware::{observability_middleware, route_label, UNMATCHED_ROUTE};
pub use tracer::{init_tracer, LogFormat, TelemetryConfig};
