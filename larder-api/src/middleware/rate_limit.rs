//! Admission control.
//!
//! A fixed window per client identity, kept entirely in the shared store: the
//! first request of a window creates `rate:<identity>` and arms its expiry,
//! later requests only increment it. Once the count passes the quota the
//! request is rejected with 429 until the key expires.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use larder_core::{rate_key, RateQuota, StoreResult};
use larder_storage::SharedStore;

use crate::constants::{RATE_LIMIT_HEADER, UNKNOWN_CLIENT};
use crate::error::ApiError;
use crate::telemetry::metrics;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted; `count` is this request's position in the window.
    Allowed { count: u64 },
    /// Over quota.
    Rejected { retry_after_secs: u64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// Counter-based rate limiter over the shared store.
#[derive(Clone)]
pub struct AdmissionController {
    store: SharedStore,
}

impl AdmissionController {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Count one request for `identity` against `quota`.
    ///
    /// A failed increment is returned to the caller. A failed expire on the
    /// first request of a window is only logged: the counter then lives until
    /// something else removes it.
    pub async fn admit(&self, identity: &str, quota: RateQuota) -> StoreResult<Admission> {
        let key = rate_key(identity);
        let count = self.store.incr(&key).await?;

        if count == 1 {
            match self.store.expire(&key, quota.window_secs()).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(key = %key, "Rate counter vanished before its expiry was armed");
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to arm rate counter expiry");
                }
            }
        }

        let count = count.max(0) as u64;
        if count > quota.limit {
            Ok(Admission::Rejected {
                retry_after_secs: quota.window_secs(),
            })
        } else {
            Ok(Admission::Allowed { count })
        }
    }
}

/// Per-route state for [`rate_limit_middleware`].
#[derive(Clone)]
pub struct RateLimitState {
    pub controller: AdmissionController,
    pub quota: RateQuota,
    pub trust_forwarded_headers: bool,
}

impl RateLimitState {
    pub fn new(controller: AdmissionController, quota: RateQuota) -> Self {
        Self {
            controller,
            quota,
            trust_forwarded_headers: false,
        }
    }

    pub fn trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }
}

/// Derive the identity a request is counted under.
///
/// Forwarding headers are only consulted when `trust_forwarded` is set, and
/// only a value that parses as an IP address is accepted from them.
pub fn extract_client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded: bool,
) -> String {
    if trust_forwarded {
        // X-Forwarded-For can contain multiple IPs, take the first one
        if let Some(ip) = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok())
        {
            return ip.to_string();
        }

        if let Some(ip) = headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
        {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Rate limiting middleware.
///
/// Rejected requests get 429 with a `Retry-After` header; admitted responses
/// carry `X-RateLimit-Limit`. A store failure fails the request with 503.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = extract_client_identity(
        request.headers(),
        connect_info.map(|ConnectInfo(addr)| addr),
        state.trust_forwarded_headers,
    );

    let admission = match state.controller.admit(&identity, state.quota).await {
        Ok(admission) => admission,
        Err(e) => {
            if let Some(m) = metrics() {
                m.record_rate_limit("error");
            }
            return Err(e.into());
        }
    };

    match admission {
        Admission::Allowed { count } => {
            if let Some(m) = metrics() {
                m.record_rate_limit("allowed");
            }
            tracing::trace!(identity = %identity, count, limit = state.quota.limit, "Request admitted");

            let mut response = next.run(request).await;
            if let Ok(value) = HeaderValue::from_str(&state.quota.limit.to_string()) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(RATE_LIMIT_HEADER), value);
            }
            Ok(response)
        }
        Admission::Rejected { retry_after_secs } => {
            if let Some(m) = metrics() {
                m.record_rate_limit("rejected");
            }
            tracing::info!(identity = %identity, limit = state.quota.limit, "Rate limit exceeded");
            Err(ApiError::too_many_requests(retry_after_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use larder_storage::{InMemoryStore, KeyExpiry, KeyValueStore};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt; // for `oneshot`

    fn controller(store: &InMemoryStore) -> AdmissionController {
        AdmissionController::new(Arc::new(store.clone()))
    }

    fn test_app(store: &InMemoryStore, quota: RateQuota) -> Router {
        let state = RateLimitState::new(controller(store), quota);
        Router::new()
            .route("/", get(|| async { "Server is running" }))
            .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_opens_on_first_request() -> Result<(), String> {
        let store = InMemoryStore::new();
        let limiter = controller(&store);
        let quota = RateQuota::per_minute(5);

        for expected in 1..=5 {
            let admission = limiter.admit("10.0.0.1", quota).await.map_err(|e| e.to_string())?;
            assert_eq!(admission, Admission::Allowed { count: expected });
        }
        let sixth = limiter.admit("10.0.0.1", quota).await.map_err(|e| e.to_string())?;
        assert_eq!(sixth, Admission::Rejected { retry_after_secs: 60 });

        tokio::time::advance(Duration::from_secs(60)).await;
        let next = limiter.admit("10.0.0.1", quota).await.map_err(|e| e.to_string())?;
        assert_eq!(next, Admission::Allowed { count: 1 });
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_not_rearmed_within_window() -> Result<(), String> {
        let store = InMemoryStore::new();
        let limiter = controller(&store);
        let quota = RateQuota::per_minute(100);

        limiter.admit("a", quota).await.map_err(|e| e.to_string())?;
        tokio::time::advance(Duration::from_secs(45)).await;
        limiter.admit("a", quota).await.map_err(|e| e.to_string())?;

        let ttl = store.ttl("rate:a").await.map_err(|e| e.to_string())?;
        assert_eq!(ttl, KeyExpiry::ExpiresIn(15));
        Ok(())
    }

    #[tokio::test]
    async fn test_identities_are_independent() -> Result<(), String> {
        let store = InMemoryStore::new();
        let limiter = controller(&store);
        let quota = RateQuota::per_minute(1);

        assert!(limiter.admit("a", quota).await.map_err(|e| e.to_string())?.is_allowed());
        assert!(limiter.admit("b", quota).await.map_err(|e| e.to_string())?.is_allowed());
        assert!(!limiter.admit("a", quota).await.map_err(|e| e.to_string())?.is_allowed());
        Ok(())
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = InMemoryStore::new();
        store.set_available(false);
        let result = controller(&store).admit("a", RateQuota::per_minute(5)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_middleware_rejects_sixth_request() -> Result<(), String> {
        let store = InMemoryStore::new();
        let app = test_app(&store, RateQuota::per_minute(5));

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(axum::http::Request::builder().uri("/").body(Body::empty()).map_err(|e| e.to_string())?)
                .await
                .map_err(|e| format!("Request failed: {:?}", e))?;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers().get(RATE_LIMIT_HEADER),
                Some(&HeaderValue::from_static("5"))
            );
        }

        let response = app
            .oneshot(axum::http::Request::builder().uri("/").body(Body::empty()).map_err(|e| e.to_string())?)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from_static("60"))
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| format!("Failed to read body: {:?}", e))?;
        let json: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| e.to_string())?;
        assert_eq!(json["error"], "Too many requests");
        assert_eq!(json["retryAfter"], 60);
        Ok(())
    }

    #[tokio::test]
    async fn test_middleware_fails_closed() -> Result<(), String> {
        let store = InMemoryStore::new();
        store.set_available(false);
        let app = test_app(&store, RateQuota::per_minute(5));

        let response = app
            .oneshot(axum::http::Request::builder().uri("/").body(Body::empty()).map_err(|e| e.to_string())?)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        Ok(())
    }

    #[test]
    fn test_identity_from_peer() {
        let peer: SocketAddr = "192.168.1.9:51000".parse().unwrap();
        let headers = HeaderMap::new();
        assert_eq!(extract_client_identity(&headers, Some(peer), false), "192.168.1.9");
        assert_eq!(extract_client_identity(&headers, None, false), "unknown");
    }

    #[test]
    fn test_forwarded_headers_ignored_unless_trusted() {
        let peer: SocketAddr = "10.0.0.1:1234".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));

        assert_eq!(extract_client_identity(&headers, Some(peer), false), "10.0.0.1");
        assert_eq!(extract_client_identity(&headers, Some(peer), true), "203.0.113.7");
    }

    #[test]
    fn test_forwarded_garbage_falls_back() {
        let peer: SocketAddr = "10.0.0.1:1234".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("rate:*"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(extract_client_identity(&headers, Some(peer), true), "198.51.100.4");
    }
}
