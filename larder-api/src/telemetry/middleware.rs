//! Axum Middleware for HTTP Request Tracing and Metrics
//!
//! Provides automatic instrumentation of all HTTP requests with:
//! - A tracing span per request carrying a correlation id
//! - Prometheus metrics collection

use axum::{
    extract::{MatchedPath, Request},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::metrics::metrics;
use crate::constants::REQUEST_ID_HEADER;

/// Route label for requests that matched no route.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Route template of a request, used as the metrics/span label.
///
/// Labelling by template rather than the raw path keeps the series count
/// bounded by the number of routes.
pub fn route_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string())
}

/// Observability middleware for Axum.
///
/// This middleware wraps every request with:
/// 1. A tracing span with a fresh request id (also echoed as `x-request-id`)
/// 2. Prometheus metrics recording
/// 3. Request/response logging
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = route_label(&request);
    let request_id = Uuid::now_v7();

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %path,
        http.route = %route,
        request_id = %request_id,
    );

    let mut response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    let status = response.status();

    if let Some(metrics) = metrics() {
        metrics.record_http_request(
            method.as_str(),
            &route,
            status.as_u16(),
            duration.as_secs_f64(),
        );
    }

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    tracing::info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        request_id = %request_id,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    async fn label_of(uri: &str) -> String {
        let app = Router::new()
            .route("/product/:id", get(|| async { "ok" }))
            .route("/products", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(
                |request: Request, next: Next| async move {
                    let label = route_label(&request);
                    let mut response = next.run(request).await;
                    if let Ok(value) = HeaderValue::from_str(&label) {
                        response.headers_mut().insert("x-route", value);
                    }
                    response
                },
            ));
        let request = axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        response
            .headers()
            .get("x-route")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn test_route_label_uses_template() {
        assert_eq!(label_of("/product/12345").await, "/product/:id");
        assert_eq!(label_of("/product/abc").await, "/product/:id");
        assert_eq!(label_of("/products").await, "/products");
    }

    #[tokio::test]
    async fn test_route_label_buckets_unknown_paths() {
        assert_eq!(label_of("/junk-1").await, UNMATCHED_ROUTE);
        assert_eq!(label_of("/junk-2").await, UNMATCHED_ROUTE);
    }
}
