//! Credential issuance.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::middleware::CredentialGate;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyResponse {
    pub api_key: String,
}

/// POST /api-key
pub async fn issue_api_key(State(gate): State<CredentialGate>) -> ApiResult<Json<ApiKeyResponse>> {
    let api_key = gate.issue().await?;
    Ok(Json(ApiKeyResponse { api_key }))
}

pub fn create_router(state: &AppState) -> Router {
    Router::new()
        .route("/api-key", post(issue_api_key))
        .with_state(state.clone())
}
