//! In-memory store with Redis semantics.
//!
//! Values live in a [`DashMap`] so per-key operations are atomic without a
//! global lock. Expiry is lazy: an expired key is evicted the next time any
//! command touches it, and `keys`/`info` sweep the whole map. Time comes from
//! [`tokio::time::Instant`], so tests can pause and advance the clock.
//!
//! The store can be switched offline to simulate an outage: every command then
//! fails with [`StoreError::Unavailable`].

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use larder_core::{StoreError, StoreResult};
use tokio::time::Instant;

use crate::traits::{KeyExpiry, KeyValueStore};

#[derive(Debug, Clone)]
enum StoredValue {
    Str(String),
    List(VecDeque<String>),
    Set(HashSet<String>),
}

impl StoredValue {
    fn approx_bytes(&self) -> usize {
        match self {
            StoredValue::Str(s) => s.len(),
            StoredValue::List(items) => items.iter().map(String::len).sum(),
            StoredValue::Set(members) => members.iter().map(String::len).sum(),
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: StoredValue) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct Inner {
    entries: DashMap<String, Slot>,
    available: AtomicBool,
    commands: AtomicU64,
    expired_keys: AtomicU64,
}

/// In-memory [`KeyValueStore`].
///
/// Cloning is cheap and clones share the same data.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                available: AtomicBool::new(true),
                commands: AtomicU64::new(0),
                expired_keys: AtomicU64::new(0),
            }),
        }
    }

    /// Take the store online or offline.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Whether commands currently succeed.
    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Number of commands received, including rejected ones.
    pub fn command_count(&self) -> u64 {
        self.inner.commands.load(Ordering::SeqCst)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.sweep_expired(Instant::now());
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every key.
    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    fn begin(&self) -> StoreResult<Instant> {
        self.inner.commands.fetch_add(1, Ordering::SeqCst);
        if !self.is_available() {
            return Err(StoreError::Unavailable);
        }
        Ok(Instant::now())
    }

    fn evict_if_expired(&self, key: &str, now: Instant) {
        let expired = self
            .inner
            .entries
            .get(key)
            .is_some_and(|slot| slot.is_expired(now));
        if expired
            && self
                .inner
                .entries
                .remove_if(key, |_, slot| slot.is_expired(now))
                .is_some()
        {
            self.inner.expired_keys.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn sweep_expired(&self, now: Instant) {
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, slot| !slot.is_expired(now));
        let evicted = before.saturating_sub(self.inner.entries.len());
        self.inner
            .expired_keys
            .fetch_add(evicted as u64, Ordering::Relaxed);
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::WrongType {
            key: key.to_string(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("keys", &self.inner.entries.len())
            .field("available", &self.is_available())
            .finish()
    }
}

/// Compile a Redis `KEYS` pattern.
///
/// Redis spells class negation `[^..]` and escapes with a backslash; `glob`
/// wants `[!..]` and bracketed literals. Runs of `*` collapse to one because
/// `glob` reserves `**` for path components.
fn compile_pattern(pattern: &str) -> StoreResult<glob::Pattern> {
    let mut translated = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    if in_class {
                        translated.push(escaped);
                    } else {
                        translated.push_str(&glob::Pattern::escape(&escaped.to_string()));
                    }
                }
            }
            '[' if !in_class => {
                in_class = true;
                translated.push('[');
                if chars.next_if_eq(&'^').is_some() {
                    translated.push('!');
                }
            }
            ']' if in_class => {
                in_class = false;
                translated.push(']');
            }
            '*' if !in_class => {
                while chars.next_if_eq(&'*').is_some() {}
                translated.push('*');
            }
            other => translated.push(other),
        }
    }
    glob::Pattern::new(&translated).map_err(|e| StoreError::command("KEYS", e))
}

/// Resolve a Redis inclusive range against a list length.
fn normalize_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.begin()?;
        self.evict_if_expired(key, now);
        match self.inner.entries.get(key) {
            Some(slot) => match &slot.value {
                StoredValue::Str(value) => Ok(Some(value.clone())),
                _ => Err(Self::wrong_type(key)),
            },
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let now = self.begin()?;
        let slot = Slot {
            value: StoredValue::Str(value.to_string()),
            expires_at: Some(now + Duration::from_secs(ttl_secs.max(1))),
        };
        self.inner.entries.insert(key.to_string(), slot);
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let now = self.begin()?;
        self.evict_if_expired(key, now);
        let mut slot = self
            .inner
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(StoredValue::Str("0".to_string())));
        match &mut slot.value {
            StoredValue::Str(current) => {
                let next = current
                    .parse::<i64>()
                    .ok()
                    .and_then(|n| n.checked_add(1))
                    .ok_or_else(|| StoreError::NotAnInteger {
                        key: key.to_string(),
                    })?;
                *current = next.to_string();
                Ok(next)
            }
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        let now = self.begin()?;
        self.evict_if_expired(key, now);
        if ttl_secs == 0 {
            return Ok(self.inner.entries.remove(key).is_some());
        }
        match self.inner.entries.get_mut(key) {
            Some(mut slot) => {
                slot.expires_at = Some(now + Duration::from_secs(ttl_secs));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyExpiry> {
        let now = self.begin()?;
        self.evict_if_expired(key, now);
        Ok(match self.inner.entries.get(key) {
            None => KeyExpiry::Missing,
            Some(slot) => match slot.expires_at {
                None => KeyExpiry::Persistent,
                Some(at) => {
                    let remaining = at.saturating_duration_since(now);
                    // Round up like Redis does for a partially elapsed second.
                    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                    KeyExpiry::ExpiresIn(secs)
                }
            },
        })
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        let now = self.begin()?;
        self.evict_if_expired(key, now);
        let mut slot = self
            .inner
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(StoredValue::List(VecDeque::new())));
        match &mut slot.value {
            StoredValue::List(items) => {
                items.push_front(value.to_string());
                Ok(items.len() as u64)
            }
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()> {
        let now = self.begin()?;
        self.evict_if_expired(key, now);
        let emptied = match self.inner.entries.get_mut(key) {
            None => return Ok(()),
            Some(mut slot) => match &mut slot.value {
                StoredValue::List(items) => match normalize_range(items.len(), start, stop) {
                    Some((from, to)) => {
                        items.truncate(to + 1);
                        items.drain(..from);
                        items.is_empty()
                    }
                    None => true,
                },
                _ => return Err(Self::wrong_type(key)),
            },
        };
        if emptied {
            self.inner.entries.remove(key);
        }
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let now = self.begin()?;
        self.evict_if_expired(key, now);
        match self.inner.entries.get(key) {
            None => Ok(Vec::new()),
            Some(slot) => match &slot.value {
                StoredValue::List(items) => Ok(normalize_range(items.len(), start, stop)
                    .map(|(from, to)| items.range(from..=to).cloned().collect())
                    .unwrap_or_default()),
                _ => Err(Self::wrong_type(key)),
            },
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let now = self.begin()?;
        self.evict_if_expired(key, now);
        let mut slot = self
            .inner
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(StoredValue::Set(HashSet::new())));
        match &mut slot.value {
            StoredValue::Set(members) => Ok(members.insert(member.to_string())),
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        let now = self.begin()?;
        self.evict_if_expired(key, now);
        match self.inner.entries.get(key) {
            None => Ok(false),
            Some(slot) => match &slot.value {
                StoredValue::Set(members) => Ok(members.contains(member)),
                _ => Err(Self::wrong_type(key)),
            },
        }
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let now = self.begin()?;
        let matcher = compile_pattern(pattern)?;
        self.sweep_expired(now);
        Ok(self
            .inner
            .entries
            .iter()
            .filter(|entry| matcher.matches(entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        let now = self.begin()?;
        let mut removed = 0;
        for key in keys {
            self.evict_if_expired(key, now);
            if self.inner.entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.begin()?;
        Ok(())
    }

    async fn info(&self, section: &str) -> StoreResult<String> {
        let now = self.begin()?;
        self.sweep_expired(now);
        let section = section.to_ascii_lowercase();
        let text = match section.as_str() {
            "memory" => {
                let used: usize = self
                    .inner
                    .entries
                    .iter()
                    .map(|entry| entry.key().len() + entry.value().value.approx_bytes())
                    .sum();
                format!(
                    "# Memory\r\nused_memory:{}\r\nkeys:{}\r\n",
                    used,
                    self.inner.entries.len()
                )
            }
            "stats" => format!(
                "# Stats\r\ntotal_commands_processed:{}\r\nexpired_keys:{}\r\n",
                self.inner.commands.load(Ordering::SeqCst),
                self.inner.expired_keys.load(Ordering::Relaxed)
            ),
            other => {
                let mut title = other.to_string();
                if let Some(first) = title.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                format!("# {}\r\n", title)
            }
        };
        Ok(text)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_ex_expires() {
        let store = InMemoryStore::new();
        store.set_ex("product:7", "{}", 30).await.unwrap();
        assert_eq!(store.ttl("product:7").await.unwrap(), KeyExpiry::ExpiresIn(30));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(store.get("product:7").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("product:7").await.unwrap(), None);
        assert_eq!(store.ttl("product:7").await.unwrap(), KeyExpiry::Missing);
    }

    #[tokio::test]
    async fn test_set_ex_overwrites_wholesale() {
        let store = InMemoryStore::new();
        store.lpush("k", "a").await.unwrap();
        store.set_ex("k", "v", 10).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_keeps_expiry() {
        let store = InMemoryStore::new();
        assert_eq!(store.incr("rate:a").await.unwrap(), 1);
        assert_eq!(store.ttl("rate:a").await.unwrap(), KeyExpiry::Persistent);

        assert!(store.expire("rate:a", 60).await.unwrap());
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(store.incr("rate:a").await.unwrap(), 2);
        assert_eq!(store.ttl("rate:a").await.unwrap(), KeyExpiry::ExpiresIn(40));
    }

    #[tokio::test]
    async fn test_incr_non_integer() {
        let store = InMemoryStore::new();
        store.set_ex("k", "abc", 10).await.unwrap();
        assert!(matches!(
            store.incr("k").await,
            Err(StoreError::NotAnInteger { .. })
        ));
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = InMemoryStore::new();
        store.sadd("valid_api_keys", "k").await.unwrap();
        assert!(matches!(
            store.get("valid_api_keys").await,
            Err(StoreError::WrongType { .. })
        ));
        assert!(matches!(
            store.lpush("valid_api_keys", "x").await,
            Err(StoreError::WrongType { .. })
        ));
    }

    #[tokio::test]
    async fn test_expire_missing_key() {
        let store = InMemoryStore::new();
        assert!(!store.expire("missing", 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_push_trim_range() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.lpush("logs", &i.to_string()).await.unwrap();
        }
        assert_eq!(
            store.lrange("logs", 0, -1).await.unwrap(),
            vec!["4", "3", "2", "1", "0"]
        );

        store.ltrim("logs", 0, 2).await.unwrap();
        assert_eq!(store.lrange("logs", 0, 100).await.unwrap(), vec!["4", "3", "2"]);
        assert_eq!(store.lrange("logs", -2, -1).await.unwrap(), vec!["3", "2"]);
        assert!(store.lrange("logs", 5, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trim_to_empty_removes_key() {
        let store = InMemoryStore::new();
        store.lpush("logs", "a").await.unwrap();
        store.ltrim("logs", 1, 0).await.unwrap();
        assert_eq!(store.ttl("logs").await.unwrap(), KeyExpiry::Missing);
    }

    #[tokio::test]
    async fn test_set_membership() {
        let store = InMemoryStore::new();
        assert!(store.sadd("valid_api_keys", "abc").await.unwrap());
        assert!(!store.sadd("valid_api_keys", "abc").await.unwrap());
        assert!(store.sismember("valid_api_keys", "abc").await.unwrap());
        assert!(!store.sismember("valid_api_keys", "xyz").await.unwrap());
        assert!(!store.sismember("other", "abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_and_del() {
        let store = InMemoryStore::new();
        store.set_ex("product:1", "{}", 30).await.unwrap();
        store.set_ex("product:2", "{}", 30).await.unwrap();
        store.set_ex("order:1", "{}", 30).await.unwrap();

        let mut keys = store.keys("product:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["product:1", "product:2"]);

        let removed = store
            .del(&["product:1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.keys("*").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_keys_patterns() {
        let store = InMemoryStore::new();
        for key in ["products", "product:7", "response:GET:/stats?x=1", "rate:a", "a*b", "hello"] {
            store.set_ex(key, "{}", 30).await.unwrap();
        }

        assert_eq!(store.keys("products").await.unwrap(), vec!["products"]);
        assert_eq!(store.keys("product:*").await.unwrap(), vec!["product:7"]);
        assert_eq!(
            store.keys("response:*:/stats*").await.unwrap(),
            vec!["response:GET:/stats?x=1"]
        );
        assert_eq!(store.keys("response:**").await.unwrap().len(), 1);
        assert_eq!(store.keys("rate:?").await.unwrap(), vec!["rate:a"]);
        assert_eq!(store.keys("a\\*b").await.unwrap(), vec!["a*b"]);
        assert_eq!(store.keys("h[ae]llo").await.unwrap(), vec!["hello"]);
        assert!(store.keys("h[^e]llo").await.unwrap().is_empty());
        assert_eq!(store.keys("*").await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_keys_rejects_malformed_pattern() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.keys("[abc").await,
            Err(StoreError::Command { .. })
        ));
    }

    #[tokio::test]
    async fn test_offline_store_fails_every_command() {
        let store = InMemoryStore::new();
        store.set_available(false);
        assert_eq!(store.ping().await, Err(StoreError::Unavailable));
        assert_eq!(store.get("k").await, Err(StoreError::Unavailable));
        assert_eq!(store.command_count(), 2);

        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_info_sections() {
        let store = InMemoryStore::new();
        store.set_ex("products", "[]", 30).await.unwrap();
        let memory = store.info("memory").await.unwrap();
        assert!(memory.starts_with("# Memory"));
        assert!(memory.contains("keys:1"));

        let stats = store.info("stats").await.unwrap();
        assert!(stats.contains("total_commands_processed:"));

        assert_eq!(store.info("server").await.unwrap(), "# Server\r\n");
    }

    #[test]
    fn test_normalize_range() {
        assert_eq!(normalize_range(5, 0, -1), Some((0, 4)));
        assert_eq!(normalize_range(5, 0, 100), Some((0, 4)));
        assert_eq!(normalize_range(5, -100, 1), Some((0, 1)));
        assert_eq!(normalize_range(5, 3, 1), None);
        assert_eq!(normalize_range(0, 0, -1), None);
    }

    proptest! {
        #[test]
        fn prop_trim_keeps_newest(pushes in 1usize..60, keep in 1usize..20) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            rt.block_on(async {
                let store = InMemoryStore::new();
                for i in 0..pushes {
                    store.lpush("l", &i.to_string()).await.unwrap();
                    store.ltrim("l", 0, keep as isize - 1).await.unwrap();
                }
                let items = store.lrange("l", 0, -1).await.unwrap();
                let expected: Vec<String> = (0..pushes)
                    .rev()
                    .take(keep)
                    .map(|i| i.to_string())
                    .collect();
                assert_eq!(items, expected);
            });
        }
    }
}
