//! Health Check Endpoint
//!
//! `GET /health` always answers 200; the store's state is reported in the
//! body. No authentication required.

use axum::{extract::State, routing::get, Json, Router};
use chrono::{SecondsFormat, Utc};
use larder_core::{HealthCheck, HealthStatus};
use larder_storage::SharedStore;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// The process itself is up whenever it can answer.
    pub status: String,
    pub redis: HealthStatus,
    pub timestamp: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health
pub async fn health(State(store): State<SharedStore>) -> Json<HealthResponse> {
    let check = check_store(&store).await;
    if let Some(message) = &check.message {
        tracing::warn!(backend = %check.component, error = %message, "Store health check failed");
    }

    Json(HealthResponse {
        status: "ok".to_string(),
        redis: check.status,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

async fn check_store(store: &SharedStore) -> HealthCheck {
    let start = std::time::Instant::now();
    match store.ping().await {
        Ok(()) => HealthCheck::healthy(store.backend_name())
            .with_response_time(u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)),
        Err(e) => HealthCheck::unhealthy(store.backend_name(), e.to_string()),
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router (no auth required)
pub fn create_router(state: &AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state.clone())
}
