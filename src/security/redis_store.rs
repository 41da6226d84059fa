//! Redis-backed counter store shared by every instance of the service.
//!
//! Each bucket key is a hash `{count, reset}` with a TTL equal to the window,
//! so Redis expires stale windows itself and `sweep` has nothing to do.
//! Increments run as a single Lua script and are atomic across instances.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};

use crate::security::store::{RateLimitEntry, RateLimitStore, StoreError};

const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('HINCRBY', KEYS[1], 'count', 1)
if count == 1 then
    redis.call('HSET', KEYS[1], 'reset', ARGV[1])
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
local reset = tonumber(redis.call('HGET', KEYS[1], 'reset'))
return {count, reset}
"#;

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Rate limit counters kept in Redis.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    key_prefix: String,
    increment_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis, e.g. `redis://127.0.0.1/`.
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
            increment_script: Script::new(INCREMENT_SCRIPT),
        })
    }

    fn key(&self, bucket_key: &str) -> String {
        format!("{}{}", self.key_prefix, bucket_key)
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitEntry>, StoreError> {
        let mut conn = self.connection.clone();
        let (count, reset): (Option<u64>, Option<u64>) = redis::cmd("HMGET")
            .arg(self.key(key))
            .arg("count")
            .arg("reset")
            .query_async(&mut conn)
            .await?;

        Ok(match (count, reset) {
            (Some(count), Some(window_reset_at)) => Some(RateLimitEntry {
                bucket_key: key.to_string(),
                count,
                window_reset_at,
            }),
            _ => None,
        })
    }

    async fn set(&self, entry: RateLimitEntry) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let key = self.key(&entry.bucket_key);
        let _: () = redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(&key)
            .arg("count")
            .arg(entry.count)
            .arg("reset")
            .arg(entry.window_reset_at)
            .ignore()
            .cmd("PEXPIREAT")
            .arg(&key)
            .arg(entry.window_reset_at)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn sweep(&self, _now_ms: u64) -> Result<usize, StoreError> {
        Ok(0)
    }

    async fn increment(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
    ) -> Result<RateLimitEntry, StoreError> {
        let mut conn = self.connection.clone();
        let (count, window_reset_at): (u64, u64) = self
            .increment_script
            .key(self.key(key))
            .arg(now_ms.saturating_add(window_ms))
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        Ok(RateLimitEntry {
            bucket_key: key.to_string(),
            count,
            window_reset_at,
        })
    }
}
