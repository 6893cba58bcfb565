//! Fail-open wrapper around a [`CacheBackend`].
//!
//! Transport errors never reach callers: reads degrade to misses and writes are
//! dropped, both logged at `warn` and counted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::backend::{BackendError, CacheBackend};
use super::config::CacheConfig;
use super::memory::NullBackend;
use super::metrics::record_backend_error;

/// Shared handle to the cache backend. Cheap to clone.
#[derive(Clone)]
pub struct CacheClient {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

impl CacheClient {
    /// Builds a client. A disabled config swaps the backend for [`NullBackend`].
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        let backend = if config.enabled {
            backend
        } else {
            Arc::new(NullBackend)
        };
        Self { backend, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(err) => {
                self.report("get", 1, &err);
                None
            }
        }
    }

    pub async fn get_many(&self, keys: &[String]) -> HashMap<String, Vec<u8>> {
        if keys.is_empty() {
            return HashMap::new();
        }
        match self.backend.get_many(keys).await {
            Ok(found) => found.into_iter().collect(),
            Err(err) => {
                self.report("get_many", keys.len(), &err);
                HashMap::new()
            }
        }
    }

    /// Returns `false` when the write was dropped.
    pub async fn set_many(&self, entries: Vec<(String, Vec<u8>)>, ttl: Duration) -> bool {
        if entries.is_empty() {
            return true;
        }
        let count = entries.len();
        match self.backend.set_many(entries, ttl).await {
            Ok(()) => true,
            Err(err) => {
                self.report("set_many", count, &err);
                false
            }
        }
    }

    /// Returns `false` when the delete was dropped.
    pub async fn delete_many(&self, keys: &[String]) -> bool {
        if keys.is_empty() {
            return true;
        }
        match self.backend.delete_many(keys).await {
            Ok(()) => true,
            Err(err) => {
                self.report("delete_many", keys.len(), &err);
                false
            }
        }
    }

    fn report(&self, op: &'static str, key_count: usize, err: &BackendError) {
        record_backend_error(op);
        warn!(
            cache = "backend",
            backend = self.backend.name(),
            op,
            key_count,
            error = %err,
            "cache backend call failed; continuing without cache"
        );
    }
}
