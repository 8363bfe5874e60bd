//! # Redis Lock Store
//!
//! [`LockStore`] over Redis. A single `ConnectionManager` is shared by every
//! caller; it reconnects on its own after a dropped connection.

use crate::lock::{LockError, LockStore};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, Script};
use std::time::Duration;
use tracing::{debug, info};

/// Re-arm the TTL only while the key still holds the caller's token
const EXTEND_IF_HELD: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Lock store backed by Redis
#[derive(Clone)]
pub struct RedisLockStore {
    connection: ConnectionManager,
    extend_script: Script,
}

impl RedisLockStore {
    /// Open a managed connection
    ///
    /// Fails when the URL is malformed or the first connection attempt does
    /// not succeed.
    pub async fn connect(redis_url: &str) -> Result<Self, LockError> {
        let client = redis::Client::open(redis_url).map_err(classify)?;
        let connection = ConnectionManager::new(client).await.map_err(classify)?;

        info!("Connected to lock store");

        Ok(Self {
            connection,
            extend_script: Script::new(EXTEND_IF_HELD),
        })
    }
}

/// Map a Redis error to the lock error taxonomy
fn classify(error: RedisError) -> LockError {
    let message = error.to_string();
    if error.is_io_error()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
        || error.is_timeout()
        || error.is_unrecoverable_error()
    {
        LockError::Unavailable { message }
    } else {
        LockError::CommandFailed { message }
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let mut conn = self.connection.clone();

        // EX rejects zero
        let seconds = ttl.as_secs().max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("EX")
            .arg(seconds)
            .query_async(&mut conn)
            .await
            .map_err(classify)?;

        debug!(key = %key, acquired = reply.is_some(), "SET NX EX");
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), LockError> {
        let mut conn = self.connection.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(classify)?;

        debug!(key = %key, removed, "DEL");
        Ok(())
    }

    async fn extend_if_held(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let mut conn = self.connection.clone();
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let extended: i64 = self
            .extend_script
            .key(key)
            .arg(token)
            .arg(millis)
            .invoke_async(&mut conn)
            .await
            .map_err(classify)?;

        Ok(extended == 1)
    }

    async fn ping(&self) -> Result<(), LockError> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "redis_lock_tests.rs"]
mod tests;
