//! Session store backends
//!
//! The store holds the latest playback snapshot per session and the
//! secret -> session id mapping, each with its own expiry. Redis is used
//! when reachable; the in-memory backend serves single-instance mode and
//! tests.

mod memory;
mod pubsub;

pub use memory::MemoryStore;
pub use pubsub::{SessionPubSub, Subscription};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use inflo_shared_config::RedisConfig;
use redis::aio::MultiplexedConnection;

/// Errors raised by a store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("timed out connecting to redis after {0}s")]
    ConnectTimeout(u64),

    #[error("key {0} holds a value of the wrong type")]
    WrongType(String),

    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value store with per-key expiry, shared by every request handler
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

enum SessionStoreInner {
    Redis(MultiplexedConnection),
    InMemory(MemoryStore),
}

impl SessionStore {
    /// Create a store backed by an established Redis connection
    pub fn new_with_redis(conn: MultiplexedConnection) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner::Redis(conn)),
        }
    }

    /// Create an in-memory store (single instance mode)
    pub fn new_in_memory() -> Self {
        Self {
            inner: Arc::new(SessionStoreInner::InMemory(MemoryStore::new())),
        }
    }

    /// Open a Redis client and verify it answers PING within the configured timeout
    pub async fn connect_redis(
        config: &RedisConfig,
    ) -> StoreResult<(redis::Client, MultiplexedConnection)> {
        let client = redis::Client::open(config.connection_url().as_str())?;
        let timeout = Duration::from_secs(config.connect_timeout_secs);

        let mut conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| StoreError::ConnectTimeout(config.connect_timeout_secs))??;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok((client, conn))
    }

    /// Check if we're using Redis (multi-instance capable)
    pub fn is_redis_backed(&self) -> bool {
        matches!(&*self.inner, SessionStoreInner::Redis(_))
    }

    /// Backend name for health reporting
    pub fn backend_name(&self) -> &'static str {
        if self.is_redis_backed() {
            "redis"
        } else {
            "memory"
        }
    }

    pub async fn ping(&self) -> StoreResult<()> {
        match &*self.inner {
            SessionStoreInner::Redis(conn) => {
                let mut conn = conn.clone();
                let _: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok(())
            }
            SessionStoreInner::InMemory(_) => Ok(()),
        }
    }

    /// GET
    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match &*self.inner {
            SessionStoreInner::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(redis::cmd("GET").arg(key).query_async(&mut conn).await?)
            }
            SessionStoreInner::InMemory(memory) => memory.get(key),
        }
    }

    /// SET with an expiry in seconds
    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        match &*self.inner {
            SessionStoreInner::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("EX")
                    .arg(ttl_secs)
                    .query_async(&mut conn)
                    .await?;
                Ok(())
            }
            SessionStoreInner::InMemory(memory) => {
                memory.set_ex(key, value, ttl_secs);
                Ok(())
            }
        }
    }

    /// EXISTS
    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        match &*self.inner {
            SessionStoreInner::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?)
            }
            SessionStoreInner::InMemory(memory) => Ok(memory.exists(key)),
        }
    }

    /// EXPIRE. Returns false when the key does not exist.
    pub async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        match &*self.inner {
            SessionStoreInner::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(redis::cmd("EXPIRE")
                    .arg(key)
                    .arg(ttl_secs)
                    .query_async(&mut conn)
                    .await?)
            }
            SessionStoreInner::InMemory(memory) => Ok(memory.expire(key, ttl_secs)),
        }
    }

    /// TTL in whole seconds: `None` if missing, `Some(-1)` without expiry
    pub async fn ttl(&self, key: &str) -> StoreResult<Option<i64>> {
        match &*self.inner {
            SessionStoreInner::Redis(conn) => {
                let mut conn = conn.clone();
                let ttl: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
                Ok((ttl != -2).then_some(ttl))
            }
            SessionStoreInner::InMemory(memory) => Ok(memory.ttl(key)),
        }
    }

    /// HGETALL. A missing key yields an empty map.
    pub async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        match &*self.inner {
            SessionStoreInner::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(redis::cmd("HGETALL").arg(key).query_async(&mut conn).await?)
            }
            SessionStoreInner::InMemory(memory) => memory.hget_all(key),
        }
    }

    /// HSET with several field/value pairs in one round trip
    pub async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        match &*self.inner {
            SessionStoreInner::Redis(conn) => {
                let mut conn = conn.clone();
                let mut cmd = redis::cmd("HSET");
                cmd.arg(key);
                for (field, value) in fields {
                    cmd.arg(*field).arg(value);
                }
                let _: i64 = cmd.query_async(&mut conn).await?;
                Ok(())
            }
            SessionStoreInner::InMemory(memory) => memory.hset_multiple(key, fields),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_set_get() {
        let store = SessionStore::new_in_memory();
        store.set_ex("secret:abc", "session-1", 60).await.unwrap();

        assert_eq!(
            store.get("secret:abc").await.unwrap(),
            Some("session-1".to_string())
        );
        assert!(store.exists("secret:abc").await.unwrap());
        assert!(!store.exists("secret:other").await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_hash_round_trip() {
        let store = SessionStore::new_in_memory();
        store
            .hset_multiple(
                "session:1",
                &[("playing", "1".to_string()), ("media_id", "x".to_string())],
            )
            .await
            .unwrap();

        let fields = store.hget_all("session:1").await.unwrap();
        assert_eq!(fields.get("playing").map(String::as_str), Some("1"));
        assert_eq!(fields.len(), 2);
        assert!(store.hget_all("session:missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_ttl_and_expire() {
        let store = SessionStore::new_in_memory();
        store.set_ex("k", "v", 3600).await.unwrap();

        let ttl = store.ttl("k").await.unwrap().unwrap();
        assert!(ttl > 3590 && ttl <= 3600);

        assert!(store.expire("k", 0).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.expire("k", 10).await.unwrap());
        assert_eq!(store.ttl("k").await.unwrap(), None);
    }

    #[test]
    fn test_backend_name() {
        let store = SessionStore::new_in_memory();
        assert!(!store.is_redis_backed());
        assert_eq!(store.backend_name(), "memory");
    }
}
