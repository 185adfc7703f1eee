//! Redis backend.

use async_trait::async_trait;
use larder_core::{StoreError, StoreResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use secrecy::{ExposeSecret, SecretString};

use crate::traits::{KeyExpiry, KeyValueStore};

/// [`KeyValueStore`] backed by a single Redis server.
///
/// The connection manager reconnects on its own, so a Redis restart shows up
/// as a burst of `Connection` errors rather than a dead handle.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to the server at `url`.
    pub async fn connect(url: &SecretString) -> StoreResult<Self> {
        let client = redis::Client::open(url.expose_secret()).map_err(|e| {
            StoreError::Connection {
                reason: e.to_string(),
            }
        })?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Connection {
                reason: e.to_string(),
            })?;
        tracing::info!("Connected to Redis");
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

fn map_err(command: &str, key: &str, err: redis::RedisError) -> StoreError {
    if err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_io_error()
        || err.is_timeout()
    {
        return StoreError::Connection {
            reason: err.to_string(),
        };
    }
    if err.code() == Some("WRONGTYPE") {
        return StoreError::WrongType {
            key: key.to_string(),
        };
    }
    if command == "INCR" && err.to_string().contains("not an integer") {
        return StoreError::NotAnInteger {
            key: key.to_string(),
        };
    }
    StoreError::command(command, err)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn();
        conn.get(key).await.map_err(|e| map_err("GET", key, e))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.conn();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs.max(1))
            .await
            .map_err(|e| map_err("SETEX", key, e))
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn();
        conn.incr(key, 1i64)
            .await
            .map_err(|e| map_err("INCR", key, e))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        let mut conn = self.conn();
        let seconds = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        conn.expire(key, seconds)
            .await
            .map_err(|e| map_err("EXPIRE", key, e))
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyExpiry> {
        let mut conn = self.conn();
        let remaining: i64 = conn.ttl(key).await.map_err(|e| map_err("TTL", key, e))?;
        Ok(match remaining {
            -2 => KeyExpiry::Missing,
            -1 => KeyExpiry::Persistent,
            secs => KeyExpiry::ExpiresIn(secs.max(0) as u64),
        })
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        conn.lpush(key, value)
            .await
            .map_err(|e| map_err("LPUSH", key, e))
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()> {
        let mut conn = self.conn();
        conn.ltrim::<_, ()>(key, start, stop)
            .await
            .map_err(|e| map_err("LTRIM", key, e))
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        conn.lrange(key, start, stop)
            .await
            .map_err(|e| map_err("LRANGE", key, e))
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let added: u64 = conn
            .sadd(key, member)
            .await
            .map_err(|e| map_err("SADD", key, e))?;
        Ok(added > 0)
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        conn.sismember(key, member)
            .await
            .map_err(|e| map_err("SISMEMBER", key, e))
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        conn.keys(pattern)
            .await
            .map_err(|e| map_err("KEYS", pattern, e))
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        conn.del(keys).await.map_err(|e| map_err("DEL", "", e))
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| map_err("PING", "", e))
    }

    async fn info(&self, section: &str) -> StoreResult<String> {
        let mut conn = self.conn();
        redis::cmd("INFO")
            .arg(section)
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| map_err("INFO", "", e))
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
