//! Store trait consumed by every pipeline component.

use std::sync::Arc;

use async_trait::async_trait;
use larder_core::StoreResult;

/// Shared handle to the process-wide store.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExpiry {
    /// Key does not exist.
    Missing,
    /// Key exists without an expiry.
    Persistent,
    /// Key expires in this many seconds.
    ExpiresIn(u64),
}

/// Key-value store operations used by the pipeline.
///
/// Semantics follow Redis: list indexes are inclusive and may be negative,
/// `incr` on a missing key starts from zero and keeps any existing expiry,
/// and an emptied list or set disappears. Implementations must be safe to
/// share across tasks; atomicity of `incr`, `lpush` and `sadd` is the only
/// cross-request coordination the pipeline relies on.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a string value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a string value with an expiry, replacing whatever was there.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()>;

    /// Atomically increment an integer value, returning the new value.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Arm an expiry on an existing key. Returns `false` if the key is missing.
    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool>;

    /// Remaining lifetime of a key.
    async fn ttl(&self, key: &str) -> StoreResult<KeyExpiry>;

    /// Push to the head of a list, returning the new length.
    async fn lpush(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Keep only the inclusive range `start..=stop` of a list.
    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()>;

    /// Read the inclusive range `start..=stop` of a list.
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>>;

    /// Add a member to a set. Returns `true` if it was not already present.
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Set membership test.
    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Enumerate keys matching a glob pattern.
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Delete keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> StoreResult<u64>;

    /// Liveness check.
    async fn ping(&self) -> StoreResult<()>;

    /// Diagnostic text for an INFO section (`memory`, `stats`, ...).
    async fn info(&self, section: &str) -> StoreResult<String>;

    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;
}
