//! API Configuration Module
//!
//! Server, store, origin and CORS settings. Configuration is loaded from
//! environment variables with sensible defaults for development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use larder_core::{CacheTtl, ConfigError};
use secrecy::SecretString;

use crate::constants::{
    DEFAULT_BIND_HOST, DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_ORIGIN_LATENCY_MS, DEFAULT_PORT,
    DEFAULT_REDIS_URL, DEFAULT_RESPONSE_CACHE_MAX_BODY_BYTES, DEFAULT_STATS_CACHE_TTL_SECS,
};

// ============================================================================
// STORE BACKEND
// ============================================================================

/// Which [`larder_storage::KeyValueStore`] the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "LARDER_STORE".to_string(),
                value: other.to_string(),
                reason: "expected 'redis' or 'memory'".to_string(),
            }),
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // Server
    // ========================================================================
    pub bind_host: String,
    pub port: u16,

    // ========================================================================
    // Store
    // ========================================================================
    pub store_backend: StoreBackend,

    /// Connection URL; may embed a password, so it is never logged.
    pub redis_url: SecretString,

    // ========================================================================
    // Pipeline
    // ========================================================================
    /// Artificial delay of every origin lookup.
    pub origin_latency: Duration,

    /// Honour `X-Forwarded-For` / `X-Real-IP` when deriving client identity.
    /// Only enable behind a proxy that overwrites these headers.
    pub trust_forwarded_headers: bool,

    /// Lifetime of memoized `/stats` responses.
    pub stats_cache_ttl: CacheTtl,

    /// Bodies larger than this are never memoized.
    pub response_cache_max_body_bytes: usize,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            store_backend: StoreBackend::Redis,
            redis_url: SecretString::new(DEFAULT_REDIS_URL.into()),
            origin_latency: Duration::from_millis(DEFAULT_ORIGIN_LATENCY_MS),
            trust_forwarded_headers: false,
            stats_cache_ttl: CacheTtl::from_secs(DEFAULT_STATS_CACHE_TTL_SECS),
            response_cache_max_body_bytes: DEFAULT_RESPONSE_CACHE_MAX_BODY_BYTES,
            cors_origins: Vec::new(),
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `LARDER_API_BIND`: Bind host (default: 0.0.0.0)
    /// - `PORT` / `LARDER_API_PORT`: Listen port (default: 3000)
    /// - `LARDER_STORE`: `redis` or `memory` (default: redis)
    /// - `LARDER_REDIS_URL`: Redis URL (default: redis://127.0.0.1:6379)
    /// - `LARDER_ORIGIN_LATENCY_MS`: Simulated origin latency (default: 4000)
    /// - `LARDER_TRUST_FORWARDED_HEADERS`: "true" or "false" (default: false)
    /// - `LARDER_STATS_CACHE_TTL_SECS`: `/stats` memoization lifetime (default: 5)
    /// - `LARDER_RESPONSE_CACHE_MAX_BODY_BYTES`: Memoizer body cap (default: 1MB)
    /// - `LARDER_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `LARDER_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_host = std::env::var("LARDER_API_BIND").unwrap_or(defaults.bind_host);

        let port = match std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("LARDER_API_PORT").ok())
        {
            Some(raw) => parse_value("PORT", &raw)?,
            None => defaults.port,
        };

        let store_backend = match std::env::var("LARDER_STORE") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.store_backend,
        };

        let redis_url = std::env::var("LARDER_REDIS_URL")
            .map(|url| SecretString::new(url.into()))
            .unwrap_or(defaults.redis_url);

        let origin_latency = env_parsed::<u64>("LARDER_ORIGIN_LATENCY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.origin_latency);

        let trust_forwarded_headers = std::env::var("LARDER_TRUST_FORWARDED_HEADERS")
            .ok()
            .map(|s| matches!(s.to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(defaults.trust_forwarded_headers);

        let stats_cache_ttl = env_parsed::<u64>("LARDER_STATS_CACHE_TTL_SECS")?
            .map(CacheTtl::from_secs)
            .unwrap_or(defaults.stats_cache_ttl);

        let response_cache_max_body_bytes =
            env_parsed::<usize>("LARDER_RESPONSE_CACHE_MAX_BODY_BYTES")?
                .unwrap_or(defaults.response_cache_max_body_bytes);

        let cors_origins = std::env::var("LARDER_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_max_age_secs = std::env::var("LARDER_CORS_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        Ok(Self {
            bind_host,
            port,
            store_backend,
            redis_url,
            origin_latency,
            trust_forwarded_headers,
            stats_cache_ttl,
            response_cache_max_body_bytes,
            cors_origins,
            cors_max_age_secs,
        })
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        parse_value("LARDER_API_BIND", &addr)
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }
}

fn parse_value<T>(field: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

fn env_parsed<T>(field: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(field)
        .ok()
        .map(|raw| parse_value(field, &raw))
        .transpose()
}
