//! Policy types: admission quotas, cache lifetimes and log retention.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Admission quota for one bucket of requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuota {
    /// Requests admitted per window; request `limit + 1` is the first rejected.
    pub limit: u64,
    /// Window length. The window opens at the first request, not on a
    /// calendar boundary.
    pub window: Duration,
}

impl RateQuota {
    pub const fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }

    /// `limit` requests per 60-second window.
    pub const fn per_minute(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Window length in whole seconds, never less than one.
    pub fn window_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}

/// Lifetime of a cache entry.
///
/// Always at least one second: a cache entry is never written without an
/// expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheTtl(u64);

impl CacheTtl {
    pub const fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            Self(1)
        } else {
            Self(secs)
        }
    }

    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    pub const fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

/// Retention policy for the per-day audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRetention {
    /// Entries kept per day, newest first.
    pub max_entries: usize,
    /// Lifetime of a day's list, re-armed on every push.
    pub ttl: Duration,
}

impl LogRetention {
    pub const DEFAULT_MAX_ENTRIES: usize = 1000;
    pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400 * 7);

    /// Inclusive end index for an `LTRIM 0 <end>`.
    pub fn trim_end(&self) -> isize {
        self.max_entries.saturating_sub(1) as isize
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}

impl Default for LogRetention {
    fn default() -> Self {
        Self {
            max_entries: Self::DEFAULT_MAX_ENTRIES,
            ttl: Self::DEFAULT_TTL,
        }
    }
}
