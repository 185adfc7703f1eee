//! Cache-aside guard.
//!
//! Sits in front of an expensive handler. On a hit the stored value is served
//! as `{"<namespace>": <value>}` and the handler never runs; on a miss the
//! request continues and the handler writes the fresh value back with
//! [`CacheAsideGuard::fill`]. The guard itself never writes.

use std::collections::HashMap;

use axum::{
    extract::{Path, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use larder_core::{CacheKey, CacheTtl, LarderResult};
use larder_storage::SharedStore;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::constants::CACHE_STATUS_HEADER;
use crate::telemetry::metrics;

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(Value),
    Miss,
}

/// Reads and fills cache-aside entries.
#[derive(Clone)]
pub struct CacheAsideGuard {
    store: SharedStore,
}

impl CacheAsideGuard {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Look up `key`.
    ///
    /// Store errors and values that are not valid JSON count as a miss.
    pub async fn lookup(&self, key: &CacheKey) -> CacheLookup {
        match self.store.get(key.as_str()).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => CacheLookup::Hit(value),
                Err(e) => {
                    record_lookup_error();
                    tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    CacheLookup::Miss
                }
            },
            Ok(None) => CacheLookup::Miss,
            Err(e) => {
                record_lookup_error();
                tracing::warn!(key = %key, error = %e, "Cache lookup failed, treating as miss");
                CacheLookup::Miss
            }
        }
    }

    /// Write `value` under `key` with an expiry.
    pub async fn fill<T: Serialize + ?Sized>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: CacheTtl,
    ) -> LarderResult<()> {
        let encoded = serde_json::to_string(value)?;
        self.store
            .set_ex(key.as_str(), &encoded, ttl.as_secs())
            .await?;
        Ok(())
    }
}

fn record_lookup_error() {
    if let Some(m) = metrics() {
        m.record_cache_lookup("guard", "error");
    }
}

/// Wrap a cached value under its key's namespace.
pub fn envelope(key: &CacheKey, value: Value) -> Value {
    let mut body = Map::with_capacity(1);
    body.insert(key.namespace().to_string(), value);
    Value::Object(body)
}

/// State for [`cache_guard_middleware`].
#[derive(Clone)]
pub struct CacheGuardState {
    pub guard: CacheAsideGuard,
    /// Literal key; when absent the key comes from the request's [`CacheKey`]
    /// extension.
    pub fixed_key: Option<CacheKey>,
}

impl CacheGuardState {
    /// Guard a route under a literal key.
    pub fn fixed(guard: CacheAsideGuard, key: impl Into<String>) -> Self {
        Self {
            guard,
            fixed_key: Some(CacheKey::new(key)),
        }
    }

    /// Guard a route under the key assigned by [`assign_cache_key`].
    pub fn per_request(guard: CacheAsideGuard) -> Self {
        Self {
            guard,
            fixed_key: None,
        }
    }
}

/// Cache-aside middleware. Requests without a key pass straight through.
pub async fn cache_guard_middleware(
    State(state): State<CacheGuardState>,
    request: Request,
    next: Next,
) -> Response {
    let key = state
        .fixed_key
        .clone()
        .or_else(|| request.extensions().get::<CacheKey>().cloned());

    let Some(key) = key else {
        return next.run(request).await;
    };

    match state.guard.lookup(&key).await {
        CacheLookup::Hit(value) => {
            if let Some(m) = metrics() {
                m.record_cache_lookup("guard", "hit");
            }
            tracing::debug!(key = %key, "Served from cache");
            let mut response = Json(envelope(&key, value)).into_response();
            response.headers_mut().insert(
                HeaderName::from_static(CACHE_STATUS_HEADER),
                HeaderValue::from_static("HIT"),
            );
            response
        }
        CacheLookup::Miss => {
            if let Some(m) = metrics() {
                m.record_cache_lookup("guard", "miss");
            }
            next.run(request).await
        }
    }
}

/// Which path parameter names a route's cache entry.
#[derive(Debug, Clone, Copy)]
pub struct KeyAssignment {
    pub namespace: &'static str,
    pub param: &'static str,
}

impl KeyAssignment {
    pub const fn new(namespace: &'static str, param: &'static str) -> Self {
        Self { namespace, param }
    }
}

/// Attach `<namespace>:<param>` as the request's [`CacheKey`].
///
/// Must run inside the route (`route_layer`) so path parameters are known.
pub async fn assign_cache_key(
    State(assignment): State<KeyAssignment>,
    params: Option<Path<HashMap<String, String>>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(id) = params
        .as_ref()
        .and_then(|Path(params)| params.get(assignment.param))
    {
        let key = CacheKey::entity(assignment.namespace, id);
        request.extensions_mut().insert(key);
    }
    next.run(request).await
}
