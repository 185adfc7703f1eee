//! Constants for Larder API
//!
//! This module contains the constant values used throughout the API:
//! route quotas, cache lifetimes and configuration defaults.

use larder_core::{CacheTtl, RateQuota};

// ============================================================================
// ADMISSION QUOTAS
// ============================================================================

/// Quota for `GET /`.
pub const INDEX_QUOTA: RateQuota = RateQuota::per_minute(5);

/// Quota for `GET /products`.
pub const PRODUCTS_QUOTA: RateQuota = RateQuota::per_minute(10);

/// Quota for `GET /product/:id`.
pub const PRODUCT_DETAIL_QUOTA: RateQuota = RateQuota::per_minute(20);

/// Quota for `GET /order/:productId`.
pub const ORDER_QUOTA: RateQuota = RateQuota::per_minute(5);

// ============================================================================
// CACHE KEYS AND LIFETIMES
// ============================================================================

/// Literal key of the product collection.
pub const PRODUCTS_KEY: &str = "products";

/// Namespace of product detail entries.
pub const PRODUCT_NAMESPACE: &str = "product";

/// Namespace of order entries.
pub const ORDER_NAMESPACE: &str = "order";

pub const PRODUCTS_TTL: CacheTtl = CacheTtl::from_secs(30);

pub const PRODUCT_DETAIL_TTL: CacheTtl = CacheTtl::from_secs(30);

pub const ORDER_TTL: CacheTtl = CacheTtl::from_secs(300);

// ============================================================================
// HEADERS
// ============================================================================

/// Header carrying the caller's credential.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Cache outcome header set by the cache layers (`HIT` / `MISS`).
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Quota header added to admitted responses.
pub const RATE_LIMIT_HEADER: &str = "x-ratelimit-limit";

/// Correlation id header echoed on every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// ============================================================================
// CONFIGURATION DEFAULTS
// ============================================================================

pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 3000;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Simulated origin latency in milliseconds.
pub const DEFAULT_ORIGIN_LATENCY_MS: u64 = 4000;

/// Lifetime of memoized `/stats` responses.
pub const DEFAULT_STATS_CACHE_TTL_SECS: u64 = 5;

/// Largest response body the memoizer will buffer (1MB).
pub const DEFAULT_RESPONSE_CACHE_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

/// Newest audit entries returned by `/admin/logs` (inclusive end index).
pub const ADMIN_LOGS_LAST_INDEX: isize = 100;

/// Identity used when no client address is known.
pub const UNKNOWN_CLIENT: &str = "unknown";
