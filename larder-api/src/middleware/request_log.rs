//! Request audit log.
//!
//! Every request that enters the pipeline gets a completion observer. The
//! observer rides along with the response body and, once the server drops
//! that body, schedules exactly one detached write into the day's log list.
//! Write failures stay on the server side: they are logged and counted.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::header::USER_AGENT,
    middleware::Next,
    response::Response,
};
use chrono::{NaiveDate, Utc};
use http_body_util::BodyExt;
use larder_core::{log_key, LarderResult, LogEntry, LogRetention, StoreResult};
use larder_storage::SharedStore;

use crate::middleware::rate_limit::extract_client_identity;
use crate::telemetry::metrics;

/// Per-day request log in the shared store.
#[derive(Clone)]
pub struct RequestAuditLog {
    store: SharedStore,
    retention: LogRetention,
}

impl RequestAuditLog {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            retention: LogRetention::default(),
        }
    }

    pub fn with_retention(mut self, retention: LogRetention) -> Self {
        self.retention = retention;
        self
    }

    /// Push `entry` to the head of `day`'s list, trim it and re-arm its expiry.
    pub async fn record(&self, day: NaiveDate, entry: &LogEntry) -> LarderResult<()> {
        let key = log_key(day);
        let encoded = serde_json::to_string(entry)?;

        self.store.lpush(&key, &encoded).await?;
        self.store.ltrim(&key, 0, self.retention.trim_end()).await?;
        self.store.expire(&key, self.retention.ttl_secs()).await?;
        Ok(())
    }

    /// Newest-first entries of `day`, up to and including `last_index`.
    ///
    /// Entries that no longer decode are skipped.
    pub async fn read(&self, day: NaiveDate, last_index: isize) -> StoreResult<Vec<LogEntry>> {
        let key = log_key(day);
        let raw = self.store.lrange(&key, 0, last_index).await?;

        Ok(raw
            .into_iter()
            .filter_map(|line| match serde_json::from_str::<LogEntry>(&line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping undecodable log entry");
                    None
                }
            })
            .collect())
    }
}

/// State for [`request_log_middleware`].
#[derive(Clone)]
pub struct AuditLogState {
    pub log: RequestAuditLog,
    pub trust_forwarded_headers: bool,
}

impl AuditLogState {
    pub fn new(log: RequestAuditLog, trust_forwarded_headers: bool) -> Self {
        Self {
            log,
            trust_forwarded_headers,
        }
    }
}

/// Fires the log write when the response body is dropped.
struct CompletionObserver {
    log: RequestAuditLog,
    method: String,
    path: String,
    status: u16,
    ip: String,
    user_agent: Option<String>,
    started: Instant,
}

impl Drop for CompletionObserver {
    fn drop(&mut self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(path = %self.path, "No runtime to record request log entry");
            return;
        };

        let now = Utc::now();
        let duration_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let entry = LogEntry::at(
            now,
            std::mem::take(&mut self.method),
            std::mem::take(&mut self.path),
            self.status,
            duration_ms,
            std::mem::take(&mut self.ip),
            self.user_agent.take(),
        );
        let log = self.log.clone();

        handle.spawn(async move {
            let result = log.record(now.date_naive(), &entry).await;
            if let Some(m) = metrics() {
                m.record_background_write("audit_log", result.is_ok());
            }
            if let Err(e) = result {
                tracing::warn!(
                    method = %entry.method,
                    path = %entry.path,
                    error = %e,
                    "Failed to record request log entry"
                );
            }
        });
    }
}

/// Outermost pipeline stage: attach a completion observer to every response.
pub async fn request_log_middleware(
    State(state): State<AuditLogState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let ip = extract_client_identity(
        request.headers(),
        connect_info.map(|ConnectInfo(addr)| addr),
        state.trust_forwarded_headers,
    );
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let response = next.run(request).await;

    let observer = CompletionObserver {
        log: state.log,
        method,
        path,
        status: response.status().as_u16(),
        ip,
        user_agent,
        started,
    };

    let (parts, body) = response.into_parts();
    let body = body.map_frame(move |frame| {
        let _observer = &observer;
        frame
    });
    Response::from_parts(parts, Body::new(body))
}
