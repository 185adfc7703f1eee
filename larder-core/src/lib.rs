//! Larder Core - Pipeline Data Types
//!
//! Pure data structures shared by the storage and API layers: the error
//! taxonomy, key namespaces, audit log entries and the admission/retention
//! policies. This crate performs no I/O.

pub mod config;
pub mod error;
pub mod health;
pub mod keys;
pub mod log_entry;

pub use config::{CacheTtl, LogRetention, RateQuota};
pub use error::{ConfigError, LarderError, LarderResult, StoreError, StoreResult};
pub use health::{HealthCheck, HealthStatus};
pub use keys::{
    log_key, log_key_for, rate_key, CacheKey, API_KEY_SET, CACHE_NAMESPACES, LOG_KEY_PREFIX,
    NAMESPACE_SEPARATOR, RATE_KEY_PREFIX, RESPONSE_NAMESPACE,
};
pub use log_entry::{LogEntry, UNKNOWN_USER_AGENT};

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
