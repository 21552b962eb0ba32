#![forbid(unsafe_code)]
#![deny(warnings)]

//! Redis counter store for `turnstile` (companion crate).
//! Bring your own `redis::aio::ConnectionManager`; counters live under the
//! keys the limiter resolves, with the TTL assigned atomically on first
//! increment.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};
use std::sync::Arc;
use std::time::Duration;
use turnstile::CounterStore;

// INCR, and EXPIRE only when this call created the key, as one server-side
// step. Concurrent callers against a fresh key observe counts 1..=N with
// exactly one TTL assignment; later increments never extend it.
const INCREMENT_AND_EXPIRE: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// [`CounterStore`] backed by a shared Redis instance.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
    script: Arc<Script>,
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("conn", &"<redis::aio::ConnectionManager>")
            .finish()
    }
}

impl RedisCounterStore {
    /// Wrap an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn, script: Arc::new(Script::new(INCREMENT_AND_EXPIRE)) }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    type Error = RedisError;

    async fn get(&self, key: &str) -> Result<Option<u64>, RedisError> {
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    async fn increment_and_expire(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<u64, RedisError> {
        let mut conn = self.conn.clone();
        // EXPIRE has second granularity; sub-second windows round up.
        let mut seconds = window.as_secs();
        if window.subsec_nanos() > 0 {
            seconds += 1;
        }
        self.script.key(key).arg(seconds.max(1)).invoke_async(&mut conn).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, RedisError> {
        let mut conn = self.conn.clone();
        // TTL returns -2 for a missing key and -1 for a key with no expiry.
        let ttl: i64 = conn.ttl(key).await?;
        if ttl < 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_secs(ttl as u64)))
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, RedisError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }
}
