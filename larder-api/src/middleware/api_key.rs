//! API key credential gate.
//!
//! Keys are opaque random strings; membership in the issued set is the only
//! thing checked. A missing header is rejected before touching the store.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use larder_core::{StoreResult, API_KEY_SET};
use larder_storage::SharedStore;
use rand::RngCore;

use crate::constants::API_KEY_HEADER;
use crate::error::ApiError;
use crate::telemetry::metrics;

/// Raw bytes of entropy per issued key.
pub const API_KEY_BYTES: usize = 32;

/// Why a credential was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialRejection {
    Missing,
    Invalid,
}

impl CredentialRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialRejection::Missing => "missing",
            CredentialRejection::Invalid => "invalid",
        }
    }
}

impl From<CredentialRejection> for ApiError {
    fn from(rejection: CredentialRejection) -> Self {
        match rejection {
            CredentialRejection::Missing => ApiError::credential_missing(),
            CredentialRejection::Invalid => ApiError::credential_invalid(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Rejected(CredentialRejection),
}

/// Issues and checks API keys.
#[derive(Clone)]
pub struct CredentialGate {
    store: SharedStore,
}

impl CredentialGate {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Generate a fresh key and add it to the issued set.
    pub async fn issue(&self) -> StoreResult<String> {
        let mut bytes = [0u8; API_KEY_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let key = hex::encode(bytes);

        self.store.sadd(API_KEY_SET, &key).await?;
        tracing::info!("Issued API key");
        Ok(key)
    }

    /// Check a presented credential. An empty value counts as missing.
    pub async fn authorize(&self, credential: Option<&str>) -> StoreResult<Authorization> {
        let Some(credential) = credential.filter(|c| !c.is_empty()) else {
            return Ok(Authorization::Rejected(CredentialRejection::Missing));
        };

        if self.store.sismember(API_KEY_SET, credential).await? {
            Ok(Authorization::Authorized)
        } else {
            Ok(Authorization::Rejected(CredentialRejection::Invalid))
        }
    }
}

/// Gate a route on a valid `X-API-Key` header.
pub async fn api_key_middleware(
    State(gate): State<CredentialGate>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // A header that is present but not visible ASCII can never be an issued
    // key; it is invalid rather than missing.
    let checked = match request.headers().get(API_KEY_HEADER).map(|v| v.to_str()) {
        Some(Err(_)) => Ok(Authorization::Rejected(CredentialRejection::Invalid)),
        Some(Ok(credential)) => gate.authorize(Some(credential)).await,
        None => gate.authorize(None).await,
    };

    let authorization = match checked {
        Ok(authorization) => authorization,
        Err(e) => {
            if let Some(m) = metrics() {
                m.record_credential_check("error");
            }
            return Err(e.into());
        }
    };

    match authorization {
        Authorization::Authorized => {
            if let Some(m) = metrics() {
                m.record_credential_check("authorized");
            }
            Ok(next.run(request).await)
        }
        Authorization::Rejected(rejection) => {
            if let Some(m) = metrics() {
                m.record_credential_check(rejection.as_str());
            }
            tracing::info!(
                path = %request.uri().path(),
                reason = rejection.as_str(),
                "Credential rejected"
            );
            Err(rejection.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use larder_storage::{InMemoryStore, KeyValueStore};
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    fn gated(store: &InMemoryStore) -> Router {
        Router::new()
            .route("/admin/logs", get(|| async { "[]" }))
            .layer(middleware::from_fn_with_state(
                CredentialGate::new(Arc::new(store.clone())),
                api_key_middleware,
            ))
    }

    async fn call(app: Router, key: Option<&str>) -> Result<(StatusCode, serde_json::Value), String> {
        let mut builder = axum::http::Request::builder().uri("/admin/logs");
        if let Some(key) = key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).map_err(|e| e.to_string())?)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| format!("Failed to read body: {:?}", e))?;
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        Ok((status, json))
    }

    #[tokio::test]
    async fn test_issued_key_format() {
        let store = InMemoryStore::new();
        let gate = CredentialGate::new(Arc::new(store.clone()));
        let key = gate.issue().await.unwrap();

        assert_eq!(key.len(), API_KEY_BYTES * 2);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(store.sismember(API_KEY_SET, &key).await, Ok(true));
        assert_ne!(gate.issue().await.unwrap(), key);
    }

    #[tokio::test]
    async fn test_authorize_outcomes() {
        let store = InMemoryStore::new();
        let gate = CredentialGate::new(Arc::new(store.clone()));
        let key = gate.issue().await.unwrap();

        assert_eq!(gate.authorize(Some(&key)).await, Ok(Authorization::Authorized));
        assert_eq!(
            gate.authorize(Some("deadbeef")).await,
            Ok(Authorization::Rejected(CredentialRejection::Invalid))
        );
        assert_eq!(
            gate.authorize(Some("")).await,
            Ok(Authorization::Rejected(CredentialRejection::Missing))
        );
    }

    #[tokio::test]
    async fn test_missing_key_never_touches_store() {
        let store = InMemoryStore::new();
        store.set_available(false);
        let gate = CredentialGate::new(Arc::new(store.clone()));

        assert_eq!(
            gate.authorize(None).await,
            Ok(Authorization::Rejected(CredentialRejection::Missing))
        );
        assert_eq!(store.command_count(), 0);
    }

    #[tokio::test]
    async fn test_middleware_status_codes() -> Result<(), String> {
        let store = InMemoryStore::new();
        let key = CredentialGate::new(Arc::new(store.clone()))
            .issue()
            .await
            .map_err(|e| e.to_string())?;

        let (status, body) = call(gated(&store), None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["reason"], "missing");
        assert_eq!(body["error"], "API key required");

        let (status, body) = call(gated(&store), Some("not-a-key")).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["reason"], "invalid");

        let (status, _) = call(gated(&store), Some(&key)).await?;
        assert_eq!(status, StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn test_non_ascii_key_is_invalid() -> Result<(), String> {
        let store = InMemoryStore::new();
        let value = axum::http::HeaderValue::from_bytes(b"cl\xc3\xa9")
            .map_err(|e| e.to_string())?;
        let request = axum::http::Request::builder()
            .uri("/admin/logs")
            .header(API_KEY_HEADER, value)
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let response = gated(&store)
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| format!("Failed to read body: {:?}", e))?;
        let json: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| e.to_string())?;
        assert_eq!(json["reason"], "invalid");
        assert_eq!(store.command_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_store_outage_fails_closed() -> Result<(), String> {
        let store = InMemoryStore::new();
        store.set_available(false);

        let (status, body) = call(gated(&store), Some("anything")).await?;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
        Ok(())
    }
}
