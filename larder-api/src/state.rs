//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use larder_core::RateQuota;
use larder_storage::SharedStore;

use crate::config::ApiConfig;
use crate::middleware::{
    AdmissionController, AuditLogState, CacheAsideGuard, CredentialGate, RateLimitState,
    RequestAuditLog,
};
use crate::origin::ProductCatalog;

/// Shared handle to the origin.
pub type SharedCatalog = Arc<dyn ProductCatalog>;

/// Application-wide state shared across all routes.
///
/// Every component is a cheap handle around the one [`SharedStore`].
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub catalog: SharedCatalog,
    pub config: Arc<ApiConfig>,
    pub guard: CacheAsideGuard,
    pub admission: AdmissionController,
    pub credentials: CredentialGate,
    pub audit_log: RequestAuditLog,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: SharedStore, catalog: SharedCatalog, config: ApiConfig) -> Self {
        Self {
            guard: CacheAsideGuard::new(store.clone()),
            admission: AdmissionController::new(store.clone()),
            credentials: CredentialGate::new(store.clone()),
            audit_log: RequestAuditLog::new(store.clone()),
            store,
            catalog,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Rate limiter state for one route.
    pub fn rate_limit(&self, quota: RateQuota) -> RateLimitState {
        RateLimitState::new(self.admission.clone(), quota)
            .trust_forwarded_headers(self.config.trust_forwarded_headers)
    }

    pub fn audit(&self) -> AuditLogState {
        AuditLogState::new(self.audit_log.clone(), self.config.trust_forwarded_headers)
    }
}

// Use macro to reduce boilerplate for FromRef implementations
crate::impl_from_ref!(SharedStore, store);
crate::impl_from_ref!(SharedCatalog, catalog);
crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(CacheAsideGuard, guard);
crate::impl_from_ref!(CredentialGate, credentials);
crate::impl_from_ref!(RequestAuditLog, audit_log);
crate::impl_from_ref!(Instant, start_time);
