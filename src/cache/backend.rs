//! Key/value transport consumed by the cache engine.
//!
//! The engine only needs four primitives. Keys are plain strings, values are
//! opaque bytes (JSON produced by [`CacheSession`](super::CacheSession)).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Transport failure. The cache treats every variant as "unavailable" and fails open.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend rejected `{op}`: {message}")]
    Command { op: &'static str, message: String },
    #[error("cache backend timed out on `{op}` after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },
}

impl BackendError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn command(op: &'static str, message: impl ToString) -> Self {
        Self::Command {
            op,
            message: message.to_string(),
        }
    }
}

/// Networked key/value service with batch primitives.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Returns only the keys that are present.
    async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<(String, Vec<u8>)>, BackendError>;

    async fn set_many(
        &self,
        entries: Vec<(String, Vec<u8>)>,
        ttl: Duration,
    ) -> Result<(), BackendError>;

    async fn delete_many(&self, keys: &[String]) -> Result<(), BackendError>;
}
