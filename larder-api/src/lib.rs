//! Larder API - Cached Request Pipeline
//!
//! An Axum application that puts a slow origin behind a shared key-value
//! store. Requests pass through an audit log, per-route admission control and
//! a cache-aside guard before reaching the origin; diagnostics are memoized
//! and audit log reads are gated on an issued API key.

pub mod config;
pub mod constants;
pub mod error;
pub mod macros;
pub mod middleware;
pub mod origin;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::{ApiConfig, StoreBackend};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{
    AdmissionController, CacheAsideGuard, CredentialGate, RequestAuditLog, ResponseMemoizer,
};
pub use origin::{Order, Product, ProductCatalog, ProductDetail, SimulatedCatalog};
pub use routes::create_api_router;
pub use state::{AppState, SharedCatalog};
