//! Operational routes: store statistics, bulk cache clear and audit log
//! access.

use std::time::Instant;

use axum::{
    extract::{Query, State},
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use larder_core::{LogEntry, CACHE_NAMESPACES};
use larder_storage::SharedStore;
use serde::{Deserialize, Serialize};

use crate::constants::ADMIN_LOGS_LAST_INDEX;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{
    api_key_middleware, response_cache_middleware, RequestAuditLog, ResponseMemoizer,
};
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_keys: usize,
    pub memory_info: String,
    pub stats: String,
    /// Process uptime in seconds.
    pub uptime: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsQuery {
    pub date: Option<String>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /stats
pub async fn stats(
    State(store): State<SharedStore>,
    State(start_time): State<Instant>,
) -> ApiResult<Json<StatsResponse>> {
    let keys = store.keys("*").await?;
    let memory_info = store.info("memory").await?;
    let stats = store.info("stats").await?;

    Ok(Json(StatsResponse {
        total_keys: keys.len(),
        memory_info,
        stats,
        uptime: start_time.elapsed().as_secs_f64(),
    }))
}

/// GET /clear
///
/// Removes every key in the cache namespaces. Rate counters, audit logs and
/// issued credentials are kept.
pub async fn clear(State(store): State<SharedStore>) -> ApiResult<&'static str> {
    let mut keys = Vec::new();
    for pattern in CACHE_NAMESPACES {
        keys.extend(store.keys(pattern).await?);
    }
    keys.sort();
    keys.dedup();

    let removed = if keys.is_empty() {
        0
    } else {
        store.del(&keys).await?
    };
    tracing::info!(removed, "Cache cleared");

    Ok("All cache cleared")
}

/// GET /admin/logs?date=YYYY-MM-DD
pub async fn logs(
    State(audit_log): State<RequestAuditLog>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    let day = parse_day(query.date.as_deref())?;
    let entries = audit_log.read(day, ADMIN_LOGS_LAST_INDEX).await?;
    Ok(Json(entries))
}

/// The requested day, or today (UTC) when absent.
fn parse_day(raw: Option<&str>) -> ApiResult<NaiveDate> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Utc::now().date_naive()),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| {
                ApiError::invalid_format("date", "YYYY-MM-DD")
                    .with_details(serde_json::json!({ "date": raw }))
            }),
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(state: &AppState) -> Router {
    let memoizer = ResponseMemoizer::new(state.store.clone(), state.config.stats_cache_ttl)
        .max_body_bytes(state.config.response_cache_max_body_bytes);

    let stats_routes = Router::new()
        .route("/stats", get(stats))
        .route_layer(from_fn_with_state(memoizer, response_cache_middleware));

    let log_routes = Router::new()
        .route("/admin/logs", get(logs))
        .route_layer(from_fn_with_state(
            state.credentials.clone(),
            api_key_middleware,
        ));

    Router::new()
        .route("/clear", get(clear))
        .merge(stats_routes)
        .merge(log_routes)
        .with_state(state.clone())
}
