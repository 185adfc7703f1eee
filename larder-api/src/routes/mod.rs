//! REST API Routes Module
//!
//! Route handlers grouped by concern:
//! - `products`: index, product collection and product detail (cached)
//! - `orders`: order placement (cached)
//! - `admin`: store statistics, bulk clear and audit log access
//! - `api_key`: credential issuance
//! - `health`: store liveness
//!
//! Every route sits behind the audit log, observability, tracing and CORS
//! layers applied in [`create_api_router`].

pub mod admin;
pub mod api_key;
pub mod health;
pub mod orders;
pub mod products;

use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use larder_core::{CacheKey, CacheTtl};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::constants::{
    API_KEY_HEADER, CACHE_STATUS_HEADER, RATE_LIMIT_HEADER, REQUEST_ID_HEADER,
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::{request_log_middleware, CacheAsideGuard};
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete API router.
///
/// # Middleware Order (outer to inner)
/// 1. CORS (outermost) - handles preflight requests
/// 2. TraceLayer - tower-http request spans
/// 3. Observability - request id, metrics
/// 4. Audit log - one entry per completed request
/// 5. Per-route stages (rate limit, cache) attached by each route group
pub fn create_api_router(state: AppState) -> ApiResult<Router> {
    let cors = build_cors_layer(&state.config)?;
    let audit = state.audit();

    Ok(Router::new()
        .merge(products::create_router(&state))
        .merge(orders::create_router(&state))
        .merge(admin::create_router(&state))
        .merge(api_key::create_router(&state))
        .merge(health::create_router(&state))
        .route("/metrics", get(metrics_handler))
        .layer(from_fn_with_state(audit, request_log_middleware))
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors))
}

/// Write a freshly computed value back to the cache.
///
/// A failed write is logged; the caller still answers with the value.
pub(crate) async fn write_back<T: Serialize + ?Sized>(
    guard: &CacheAsideGuard,
    key: &CacheKey,
    value: &T,
    ttl: CacheTtl,
) {
    if let Err(e) = guard.fill(key, value, ttl).await {
        tracing::warn!(key = %key, error = %e, "Failed to write cache entry");
    }
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins; an origin that is not
/// a valid header value is a configuration error.
fn build_cors_layer(config: &ApiConfig) -> ApiResult<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static(RATE_LIMIT_HEADER),
            HeaderName::from_static(CACHE_STATUS_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
            header::RETRY_AFTER,
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if !config.is_production() {
        tracing::info!("CORS: Development mode - allowing all origins");
        return Ok(cors.allow_origin(Any));
    }

    tracing::info!(
        "CORS: Production mode - allowing origins: {:?}",
        config.cors_origins
    );
    let origins = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|_| ApiError::invalid_format("LARDER_CORS_ORIGINS", "a valid origin"))
        })
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(cors.allow_origin(origins))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_dev_mode() {
        assert!(build_cors_layer(&ApiConfig::default()).is_ok());
    }

    #[test]
    fn test_cors_rejects_bad_origin() {
        let config = ApiConfig {
            cors_origins: vec!["https://shop.example".to_string(), "bad\norigin".to_string()],
            ..Default::default()
        };
        assert!(build_cors_layer(&config).is_err());
    }
}
