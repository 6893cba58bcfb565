//! Request-scoped cache handle.
//!
//! One [`CacheSession`] lives for one request. All reads go through its buffer,
//! all writes and deletes are staged there and leave the process in a single
//! [`flush`](CacheSession::flush). Values are stored as JSON; an undecodable
//! value reads as a miss.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::buffer::{Lookup, RequestBuffer};
use super::client::CacheClient;
use super::lock::mutex_lock;
use super::metrics::{record_flush, record_invalidated};

const SOURCE: &str = "cache::session";

/// What a flush sent to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub set: usize,
    pub deleted: usize,
    /// True when at least one batch was dropped by a failing backend.
    pub degraded: bool,
}

#[derive(Debug)]
pub struct CacheSession {
    client: CacheClient,
    buffer: Mutex<RequestBuffer>,
}

impl CacheSession {
    pub fn new(client: CacheClient) -> Self {
        Self {
            client,
            buffer: Mutex::new(RequestBuffer::new()),
        }
    }

    pub fn client(&self) -> &CacheClient {
        &self.client
    }

    pub fn default_ttl(&self) -> Duration {
        self.client.config().default_ttl()
    }

    pub async fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        let lookup = mutex_lock(&self.buffer, SOURCE, "get").lookup(key);
        if let Lookup::Known(value) = lookup {
            return value;
        }
        let value = self.client.get(key).await;
        mutex_lock(&self.buffer, SOURCE, "get").remember(key.to_string(), value.clone());
        value
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        decode(key, &raw)
    }

    /// Fetches every key not already known to the buffer in one backend call.
    pub async fn get_many_raw(&self, keys: &[String]) -> HashMap<String, Vec<u8>> {
        let mut found = HashMap::new();
        let mut unknown = Vec::new();
        {
            let buffer = mutex_lock(&self.buffer, SOURCE, "get_many");
            for key in keys {
                match buffer.lookup(key) {
                    Lookup::Known(Some(value)) => {
                        found.insert(key.clone(), value);
                    }
                    Lookup::Known(None) => {}
                    Lookup::Unknown => unknown.push(key.clone()),
                }
            }
        }
        if unknown.is_empty() {
            return found;
        }

        let mut fetched = self.client.get_many(&unknown).await;
        let mut buffer = mutex_lock(&self.buffer, SOURCE, "get_many");
        for key in unknown {
            let value = fetched.remove(&key);
            buffer.remember(key.clone(), value.clone());
            if let Some(value) = value {
                found.insert(key, value);
            }
        }
        found
    }

    pub async fn get_many<T: DeserializeOwned>(&self, keys: &[String]) -> HashMap<String, T> {
        self.get_many_raw(keys)
            .await
            .into_iter()
            .filter_map(|(key, raw)| decode(&key, &raw).map(|value| (key, value)))
            .collect()
    }

    /// Reads a meta-key. `None` means the set is unknown.
    pub async fn get_key_set(&self, key: &str) -> Option<BTreeSet<String>> {
        self.get(key).await
    }

    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: &T) {
        let ttl = self.default_ttl();
        self.set_with_ttl(key, value, ttl);
    }

    pub fn set_with_ttl<T: Serialize>(&self, key: impl Into<String>, value: &T, ttl: Duration) {
        let key = key.into();
        match serde_json::to_vec(value) {
            Ok(raw) => mutex_lock(&self.buffer, SOURCE, "set").set(key, raw, ttl),
            Err(err) => warn!(cache = "session", key = %key, error = %err, "failed to encode cache value"),
        }
    }

    /// Stages deletes; sent as one batch on flush.
    pub fn delete_many<I>(&self, keys: I)
    where
        I: IntoIterator<Item = String>,
    {
        mutex_lock(&self.buffer, SOURCE, "delete_many").add(keys);
    }

    pub fn is_dirty(&self) -> bool {
        !mutex_lock(&self.buffer, SOURCE, "is_dirty").is_empty()
    }

    /// Sends staged writes and deletes, then clears the buffer. A no-op when nothing is staged.
    pub async fn flush(&self) -> FlushReport {
        let pending = mutex_lock(&self.buffer, SOURCE, "flush").take_pending();
        if pending.is_empty() {
            return FlushReport::default();
        }

        let started_at = Instant::now();
        let mut report = FlushReport {
            set: pending.set_count(),
            deleted: pending.deletes.len(),
            degraded: false,
        };

        if !self.client.delete_many(&pending.deletes).await {
            report.degraded = true;
        }
        for (ttl, entries) in pending.sets {
            if !self.client.set_many(entries, ttl).await {
                report.degraded = true;
            }
        }

        if report.deleted > 0 {
            record_invalidated(report.deleted);
        }
        record_flush(started_at.elapsed().as_secs_f64() * 1000.0);
        debug!(
            cache = "session",
            set = report.set,
            deleted = report.deleted,
            degraded = report.degraded,
            "flushed request buffer"
        );
        report
    }

    pub fn reset(&self) {
        mutex_lock(&self.buffer, SOURCE, "reset").reset();
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &[u8]) -> Option<T> {
    match serde_json::from_slice(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(cache = "session", key, error = %err, "undecodable cache value treated as miss");
            None
        }
    }
}
