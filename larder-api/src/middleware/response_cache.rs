//! Response memoization.
//!
//! A generalized cache-aside stage keyed on `response:<METHOD>:<path-and-query>`.
//! Successful UTF-8 bodies are captured transparently and replayed verbatim
//! until their TTL runs out.

use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use larder_core::{CacheKey, CacheTtl};
use larder_storage::SharedStore;

use crate::constants::{CACHE_STATUS_HEADER, DEFAULT_RESPONSE_CACHE_MAX_BODY_BYTES};
use crate::error::ApiError;
use crate::telemetry::metrics;

/// Memoizer state, one per mounted route group.
#[derive(Clone)]
pub struct ResponseMemoizer {
    store: SharedStore,
    ttl: CacheTtl,
    max_body_bytes: usize,
}

impl ResponseMemoizer {
    pub fn new(store: SharedStore, ttl: CacheTtl) -> Self {
        Self {
            store,
            ttl,
            max_body_bytes: DEFAULT_RESPONSE_CACHE_MAX_BODY_BYTES,
        }
    }

    /// Bodies larger than this pass through uncached.
    pub fn max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    async fn lookup(&self, key: &CacheKey) -> Option<String> {
        match self.store.get(key.as_str()).await {
            Ok(found) => found,
            Err(e) => {
                if let Some(m) = metrics() {
                    m.record_cache_lookup("response", "error");
                }
                tracing::warn!(key = %key, error = %e, "Response cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Store `body` under `key` on a detached task.
    fn remember(&self, key: CacheKey, body: String) {
        let store = self.store.clone();
        let ttl = self.ttl.as_secs();
        tokio::spawn(async move {
            let result = store.set_ex(key.as_str(), &body, ttl).await;
            if let Some(m) = metrics() {
                m.record_background_write("response_cache", result.is_ok());
            }
            if let Err(e) = result {
                tracing::warn!(key = %key, error = %e, "Failed to memoize response");
            }
        });
    }
}

fn cache_status(value: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(CACHE_STATUS_HEADER),
        HeaderValue::from_static(value),
    )
}

/// Rebuild a response from a memoized body.
fn replay(body: String) -> Response {
    let content_type = if serde_json::from_str::<serde::de::IgnoredAny>(&body).is_ok() {
        "application/json"
    } else {
        "text/plain; charset=utf-8"
    };

    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    let (name, value) = cache_status("HIT");
    headers.insert(name, value);
    response
}

/// Memoizing middleware.
pub async fn response_cache_middleware(
    State(memo): State<ResponseMemoizer>,
    request: Request,
    next: Next,
) -> Response {
    let uri = request.uri();
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let key = CacheKey::response(request.method().as_str(), path_and_query);

    if let Some(body) = memo.lookup(&key).await {
        if let Some(m) = metrics() {
            m.record_cache_lookup("response", "hit");
        }
        tracing::debug!(key = %key, "Replaying memoized response");
        return replay(body);
    }
    if let Some(m) = metrics() {
        m.record_cache_lookup("response", "miss");
    }

    let response = next.run(request).await;
    let (mut parts, body) = response.into_parts();
    let (name, value) = cache_status("MISS");
    parts.headers.insert(name, value);

    if !parts.status.is_success() {
        return Response::from_parts(parts, body);
    }

    // Streaming or oversized bodies are never buffered.
    match HttpBody::size_hint(&body).exact() {
        Some(len) if len <= memo.max_body_bytes as u64 => {}
        _ => {
            tracing::debug!(key = %key, "Response body not memoizable");
            return Response::from_parts(parts, body);
        }
    }

    let bytes = match axum::body::to_bytes(body, memo.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Failed to buffer response body");
            return ApiError::internal_error("Failed to read response body").into_response();
        }
    };

    match std::str::from_utf8(&bytes) {
        Ok(text) => memo.remember(key, text.to_owned()),
        Err(_) => tracing::debug!(key = %key, "Skipping non UTF-8 response body"),
    }

    Response::from_parts(parts, Body::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::StatusCode,
        middleware,
        routing::get,
        Router,
    };
    use larder_storage::{InMemoryStore, KeyValueStore};
    use larder_test_utils::eventually;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    fn counting_app(
        memo: ResponseMemoizer,
        calls: Arc<AtomicUsize>,
        status: StatusCode,
    ) -> Router {
        Router::new()
            .route(
                "/stats",
                get(move || {
                    let calls = calls.clone();
                    async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        (status, axum::Json(serde_json::json!({ "call": n })))
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(memo, response_cache_middleware))
    }

    async fn get_body(app: &Router, uri: &str) -> Result<(Option<String>, String), String> {
        let response = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .map_err(|e| e.to_string())?,
            )
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        let cache = response
            .headers()
            .get(CACHE_STATUS_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| format!("Failed to read body: {:?}", e))?;
        Ok((cache, String::from_utf8_lossy(&body).into_owned()))
    }

    #[tokio::test]
    async fn test_second_request_replays_body() -> Result<(), String> {
        let store = InMemoryStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = ResponseMemoizer::new(Arc::new(store.clone()), CacheTtl::from_secs(5));
        let app = counting_app(memo, calls.clone(), StatusCode::OK);

        let (first_status, first) = get_body(&app, "/stats").await?;
        assert_eq!(first_status.as_deref(), Some("MISS"));

        let written = eventually(|| {
            let store = store.clone();
            async move { matches!(store.get("response:GET:/stats").await, Ok(Some(_))) }
        })
        .await;
        assert!(written, "memoized body was never written");

        let (second_status, second) = get_body(&app, "/stats").await?;
        assert_eq!(second_status.as_deref(), Some("HIT"));
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_query_string_is_part_of_key() -> Result<(), String> {
        let store = InMemoryStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = ResponseMemoizer::new(Arc::new(store.clone()), CacheTtl::from_secs(5));
        let app = counting_app(memo, calls.clone(), StatusCode::OK);

        get_body(&app, "/stats?a=1").await?;
        assert!(
            eventually(|| {
                let store = store.clone();
                async move { matches!(store.get("response:GET:/stats?a=1").await, Ok(Some(_))) }
            })
            .await
        );

        let (status, _) = get_body(&app, "/stats?a=2").await?;
        assert_eq!(status.as_deref(), Some("MISS"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_error_responses_not_memoized() -> Result<(), String> {
        let store = InMemoryStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = ResponseMemoizer::new(Arc::new(store.clone()), CacheTtl::from_secs(5));
        let app = counting_app(memo, calls.clone(), StatusCode::INTERNAL_SERVER_ERROR);

        get_body(&app, "/stats").await?;
        get_body(&app, "/stats").await?;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.get("response:GET:/stats").await, Ok(None));
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_body_passes_through() -> Result<(), String> {
        let store = InMemoryStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let memo =
            ResponseMemoizer::new(Arc::new(store.clone()), CacheTtl::from_secs(5)).max_body_bytes(4);
        let app = counting_app(memo, calls.clone(), StatusCode::OK);

        let (_, body) = get_body(&app, "/stats").await?;
        assert_eq!(body, r#"{"call":1}"#);
        get_body(&app, "/stats").await?;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_store_outage_degrades_to_origin() -> Result<(), String> {
        let store = InMemoryStore::new();
        store.set_available(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = ResponseMemoizer::new(Arc::new(store.clone()), CacheTtl::from_secs(5));
        let app = counting_app(memo, calls.clone(), StatusCode::OK);

        let (_, body) = get_body(&app, "/stats").await?;
        assert_eq!(body, r#"{"call":1}"#);
        Ok(())
    }

    #[test]
    fn test_replay_content_type() {
        let json = replay(r#"{"ok":true}"#.to_string());
        assert_eq!(
            json.headers().get(header::CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );

        let text = replay("Server is running".to_string());
        assert_eq!(
            text.headers().get(header::CONTENT_TYPE),
            Some(&HeaderValue::from_static("text/plain; charset=utf-8"))
        );
        assert_eq!(
            text.headers().get(CACHE_STATUS_HEADER),
            Some(&HeaderValue::from_static("HIT"))
        );
    }
}
