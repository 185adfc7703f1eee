//! Key namespaces for everything the pipeline persists.
//!
//! All keys share one flat store, so each concern owns a prefix:
//!
//! | Concern | Key |
//! |---|---|
//! | Cache-aside entries | `<namespace>:<identifier>` or a bare literal |
//! | Memoized responses | `response:<METHOD>:<path-and-query>` |
//! | Rate counters | `rate:<identity>` |
//! | Audit log | `logs:<YYYY-MM-DD>` |
//! | Credentials | `valid_api_keys` |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Timestamp;

/// Separator between a key's namespace and its identifier.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Namespace used by the response memoizer.
pub const RESPONSE_NAMESPACE: &str = "response";

/// Prefix for admission-control counters.
pub const RATE_KEY_PREFIX: &str = "rate";

/// Prefix for per-day audit log lists.
pub const LOG_KEY_PREFIX: &str = "logs";

/// Set holding every issued credential.
pub const API_KEY_SET: &str = "valid_api_keys";

/// Key patterns removed by a bulk cache clear.
///
/// Rate counters, audit logs and the credential set are deliberately absent.
pub const CACHE_NAMESPACES: &[&str] = &["products", "product:*", "order:*", "response:*"];

/// A cache key, namespaced as `<namespace>:<identifier>`.
///
/// Keys without a separator (such as `products`) are their own namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap a literal key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build `<namespace>:<identifier>`.
    pub fn entity(namespace: &str, identifier: impl fmt::Display) -> Self {
        Self(format!("{}{}{}", namespace, NAMESPACE_SEPARATOR, identifier))
    }

    /// Build the memoizer key for a method and full request path (query included).
    pub fn response(method: &str, path_and_query: &str) -> Self {
        Self(format!(
            "{}{sep}{}{sep}{}",
            RESPONSE_NAMESPACE,
            method,
            path_and_query,
            sep = NAMESPACE_SEPARATOR
        ))
    }

    /// Portion of the key before the first separator.
    ///
    /// This is the field name of the envelope a cache hit is served under.
    pub fn namespace(&self) -> &str {
        self.0
            .split_once(NAMESPACE_SEPARATOR)
            .map(|(ns, _)| ns)
            .unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Counter key for an identity.
pub fn rate_key(identity: &str) -> String {
    format!("{}{}{}", RATE_KEY_PREFIX, NAMESPACE_SEPARATOR, identity)
}

/// Audit log key for a calendar day.
pub fn log_key(date: NaiveDate) -> String {
    format!(
        "{}{}{}",
        LOG_KEY_PREFIX,
        NAMESPACE_SEPARATOR,
        date.format("%Y-%m-%d")
    )
}

/// Audit log key for the UTC day containing `at`.
pub fn log_key_for(at: Timestamp) -> String {
    log_key(at.date_naive())
}
