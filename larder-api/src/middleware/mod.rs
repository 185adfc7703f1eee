//! Middleware modules for Larder API
//!
//! Each pipeline stage is an Axum `from_fn_with_state` middleware:
//!
//! - `request_log`: per-day audit log written after the body completes
//! - `rate_limit`: fixed-window admission control per client
//! - `cache_guard`: cache-aside short circuit for keyed routes
//! - `response_cache`: transparent memoization of whole responses
//! - `api_key`: credential gate for privileged routes
//!
//! # Middleware Order
//!
//! Layers added later run earlier on the request. For a cached route:
//!
//! ```ignore
//! Router::new()
//!     .route("/product/:id", get(handler))
//!     // Innermost: serve from cache or fall through to the handler
//!     .route_layer(middleware::from_fn_with_state(guard_state, cache_guard_middleware))
//!     // Derive `product:<id>` from the path
//!     .route_layer(middleware::from_fn_with_state(assignment, assign_cache_key))
//!     // Admission runs before any cache work
//!     .route_layer(middleware::from_fn_with_state(rate_limit_state, rate_limit_middleware))
//!     // Outermost, on the whole router
//!     .layer(middleware::from_fn_with_state(audit_state, request_log_middleware))
//! ```

pub mod api_key;
pub mod cache_guard;
pub mod rate_limit;
pub mod request_log;
pub mod response_cache;

pub use api_key::{
    api_key_middleware, Authorization, CredentialGate, CredentialRejection, API_KEY_BYTES,
};
pub use cache_guard::{
    assign_cache_key, cache_guard_middleware, envelope, CacheAsideGuard, CacheGuardState,
    CacheLookup, KeyAssignment,
};
pub use rate_limit::{
    extract_client_identity, rate_limit_middleware, Admission, AdmissionController,
    RateLimitState,
};
pub use request_log::{request_log_middleware, AuditLogState, RequestAuditLog};
pub use response_cache::{response_cache_middleware, ResponseMemoizer};
