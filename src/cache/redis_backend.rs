//! Redis transport (feature `redis`).
//!
//! Every round trip is bounded by the configured timeout. A stalled server
//! then surfaces as [`BackendError::Timeout`] and the client fails open.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, RedisError, aio::MultiplexedConnection};

use super::backend::{BackendError, CacheBackend};

pub struct RedisBackend {
    conn: MultiplexedConnection,
    prefix: String,
    timeout: Duration,
}

impl RedisBackend {
    /// Connects eagerly so a bad URL is reported at start-up.
    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::open(url).map_err(|e| BackendError::unavailable(e.to_string()))?;
        let conn = bounded("CONNECT", timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|err| match err {
                BackendError::Command { message, .. } => BackendError::unavailable(message),
                other => other,
            })?;
        Ok(Self {
            conn,
            prefix: prefix.into(),
            timeout,
        })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn strip<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.prefix.as_str()).unwrap_or(key)
    }
}

async fn bounded<T, F>(op: &'static str, timeout: Duration, call: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, RedisError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(|e| BackendError::command(op, e)),
        Err(_) => Err(BackendError::Timeout { op, timeout }),
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut conn = self.conn.clone();
        bounded("GET", self.timeout, conn.get(self.prefixed(key))).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<(String, Vec<u8>)>, BackendError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let prefixed: Vec<String> = keys.iter().map(|key| self.prefixed(key)).collect();
        let values: Vec<Option<Vec<u8>>> =
            bounded("MGET", self.timeout, conn.mget(&prefixed)).await?;
        Ok(prefixed
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|value| (self.strip(key).to_string(), value)))
            .collect())
    }

    async fn set_many(
        &self,
        entries: Vec<(String, Vec<u8>)>,
        ttl: Duration,
    ) -> Result<(), BackendError> {
        if entries.is_empty() {
            return Ok(());
        }
        let seconds = ttl.as_secs().max(1);
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.set_ex(self.prefixed(&key), value, seconds).ignore();
        }
        let mut conn = self.conn.clone();
        bounded("SETEX", self.timeout, pipe.query_async(&mut conn)).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), BackendError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let prefixed: Vec<String> = keys.iter().map(|key| self.prefixed(key)).collect();
        bounded("DEL", self.timeout, conn.del(prefixed)).await
    }
}
