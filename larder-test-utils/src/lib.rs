//! Larder Test Utilities
//!
//! Centralized test infrastructure for the Larder workspace:
//! - Proptest generators for keys, identities, quotas and log entries
//! - Store fixtures
//! - Custom assertions for store results
//! - [`eventually`] for waiting on detached background writes

// Re-export store types from their source crate
pub use larder_storage::{InMemoryStore, KeyExpiry, KeyValueStore, SharedStore};

// Re-export core types for convenience
pub use larder_core::{
    CacheKey, CacheTtl, LogEntry, LogRetention, RateQuota, StoreError, StoreResult, Timestamp,
};

use std::future::Future;
use std::time::Duration;

// ============================================================================
// BACKGROUND WORK
// ============================================================================

/// Polling attempts made by [`eventually`].
pub const EVENTUALLY_ATTEMPTS: usize = 200;

/// Poll `check` until it returns `true`, giving spawned tasks a chance to run
/// in between. Returns `false` if the condition never held.
///
/// Works under `start_paused` runtimes: the sleeps auto-advance the clock.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..EVENTUALLY_ATTEMPTS {
        if check().await {
            return true;
        }
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Larder values.

    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use proptest::prelude::*;

    /// Generate an IPv4 client identity.
    pub fn arb_ipv4_identity() -> impl Strategy<Value = String> {
        any::<[u8; 4]>().prop_map(|[a, b, c, d]| format!("{}.{}.{}.{}", a, b, c, d))
    }

    /// Generate any client identity the rate limiter may see.
    pub fn arb_identity() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => arb_ipv4_identity(),
            1 => Just("unknown".to_string()),
            1 => Just("::1".to_string()),
        ]
    }

    /// Generate one of the cache namespaces used by the routes.
    pub fn arb_cache_namespace() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("product"), Just("order")]
    }

    /// Generate a path identifier as it may appear in a URL segment.
    pub fn arb_path_id() -> impl Strategy<Value = String> {
        prop_oneof![
            3 => (0u32..100_000).prop_map(|n| n.to_string()),
            1 => "[a-z][a-z0-9-]{0,15}",
        ]
    }

    /// Generate an entity cache key.
    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        (arb_cache_namespace(), arb_path_id()).prop_map(|(ns, id)| CacheKey::entity(ns, id))
    }

    /// Generate a small quota, so rejection paths are reached quickly.
    pub fn arb_rate_quota() -> impl Strategy<Value = RateQuota> {
        (1u64..=20, 1u64..=120)
            .prop_map(|(limit, secs)| RateQuota::new(limit, Duration::from_secs(secs)))
    }

    /// Generate a calendar day.
    pub fn arb_day() -> impl Strategy<Value = NaiveDate> {
        (2000i32..2100, 1u32..=12, 1u32..=28)
            .prop_filter_map("valid date", |(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
    }

    /// Generate an HTTP method as recorded in the audit log.
    pub fn arb_method() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("GET"), Just("POST"), Just("OPTIONS")]
    }

    /// Generate a completed-request log entry.
    pub fn arb_log_entry() -> impl Strategy<Value = LogEntry> {
        (
            arb_method(),
            "/[a-z]{0,10}",
            prop_oneof![Just(200u16), Just(401), Just(403), Just(404), Just(429), Just(503)],
            0u64..10_000,
            arb_identity(),
            proptest::option::of("[a-zA-Z/0-9. ]{1,24}"),
            0i64..4_000_000_000,
        )
            .prop_map(|(method, path, status, duration, ip, ua, secs)| {
                let at = Utc
                    .timestamp_opt(secs, 0)
                    .single()
                    .unwrap_or_else(Utc::now);
                LogEntry::at(at, method, path, status, duration, ip, ua)
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use std::sync::Arc;

    /// A fresh in-memory store plus a shared handle to the same data.
    pub fn memory_store() -> (InMemoryStore, SharedStore) {
        let store = InMemoryStore::new();
        let shared: SharedStore = Arc::new(store.clone());
        (store, shared)
    }

    /// A store that fails every command.
    pub fn unavailable_store() -> (InMemoryStore, SharedStore) {
        let (store, shared) = memory_store();
        store.set_available(false);
        (store, shared)
    }

    /// A log entry for `GET /` from localhost.
    pub fn index_log_entry(status: u16) -> LogEntry {
        LogEntry::new("GET", "/", status, 1, "127.0.0.1", Some("larder-test".to_string()))
    }

    /// Retention small enough to exercise trimming.
    pub fn tight_retention(max_entries: usize) -> LogRetention {
        LogRetention {
            max_entries,
            ttl: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for store-backed state.

    use super::*;

    /// Assert that a StoreResult is Ok.
    #[track_caller]
    pub fn assert_store_ok<T: std::fmt::Debug>(result: &StoreResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a StoreResult failed because the store is down.
    #[track_caller]
    pub fn assert_unavailable<T: std::fmt::Debug>(result: &StoreResult<T>) {
        match result {
            Err(StoreError::Unavailable) | Err(StoreError::Connection { .. }) => {}
            other => panic!("Expected store outage, got: {:?}", other),
        }
    }

    /// Assert that a key is absent.
    pub async fn assert_missing(store: &dyn KeyValueStore, key: &str) {
        let value = store.get(key).await;
        assert!(
            matches!(value, Ok(None)),
            "Expected {} to be missing, got: {:?}",
            key,
            value
        );
    }

    /// Assert that a key exists and expires within `max_secs`.
    pub async fn assert_expires_within(store: &dyn KeyValueStore, key: &str, max_secs: u64) {
        match store.ttl(key).await {
            Ok(KeyExpiry::ExpiresIn(secs)) => assert!(
                secs <= max_secs,
                "Expected {} to expire within {}s, got {}s",
                key,
                max_secs,
                secs
            ),
            other => panic!("Expected {} to carry an expiry, got: {:?}", key, other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
