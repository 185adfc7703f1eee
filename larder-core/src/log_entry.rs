//! Audit log entry written once per completed request.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// User agent recorded when the request carried none.
pub const UNKNOWN_USER_AGENT: &str = "unknown";

/// One completed request.
///
/// Serialized with camelCase field names; the JSON form is what lands in the
/// per-day log list and what `/admin/logs` returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub method: String,
    /// Request path without the query string.
    pub path: String,
    pub status: u16,
    /// Wall-clock time from pipeline entry to completion, in milliseconds.
    pub duration: u64,
    pub ip: String,
    /// RFC 3339, UTC, millisecond precision.
    pub timestamp: String,
    pub user_agent: String,
}

impl LogEntry {
    /// Build an entry stamped with the current time.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        duration_ms: u64,
        ip: impl Into<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self::at(Utc::now(), method, path, status, duration_ms, ip, user_agent)
    }

    /// Build an entry stamped with `at`.
    pub fn at(
        at: Timestamp,
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        duration_ms: u64,
        ip: impl Into<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            status,
            duration: duration_ms,
            ip: ip.into(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            user_agent: user_agent
                .filter(|ua| !ua.is_empty())
                .unwrap_or_else(|| UNKNOWN_USER_AGENT.to_string()),
        }
    }
}
