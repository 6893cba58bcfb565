//! In-process transports.
//!
//! [`MemoryBackend`] backs tests and single-node deployments. It can be switched
//! into an outage mode to exercise the fail-open paths. [`NullBackend`] is used
//! when caching is disabled.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::backend::{BackendError, CacheBackend};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Operation counts, one per batch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendOps {
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, Entry>,
    unavailable: AtomicBool,
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails until switched back.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn ops(&self) -> BackendOps {
        BackendOps {
            gets: self.gets.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    /// Whether a live entry exists, bypassing outage mode and counters.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.is_live(Instant::now()))
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(BackendError::unavailable("memory backend switched off"))
        } else {
            Ok(())
        }
    }

    fn read(&self, key: &str, now: Instant) -> Option<Vec<u8>> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        }
        None
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.check()?;
        self.gets.fetch_add(1, Ordering::Relaxed);
        Ok(self.read(key, Instant::now()))
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<(String, Vec<u8>)>, BackendError> {
        self.check()?;
        self.gets.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        Ok(keys
            .iter()
            .filter_map(|key| self.read(key, now).map(|value| (key.clone(), value)))
            .collect())
    }

    async fn set_many(
        &self,
        entries: Vec<(String, Vec<u8>)>,
        ttl: Duration,
    ) -> Result<(), BackendError> {
        self.check()?;
        self.sets.fetch_add(1, Ordering::Relaxed);
        let expires_at = Instant::now() + ttl;
        for (key, value) in entries {
            self.entries.insert(key, Entry { value, expires_at });
        }
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), BackendError> {
        self.check()?;
        self.deletes.fetch_add(1, Ordering::Relaxed);
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }
}

/// Backend that stores nothing. Every read misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

#[async_trait]
impl CacheBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(None)
    }

    async fn get_many(&self, _keys: &[String]) -> Result<Vec<(String, Vec<u8>)>, BackendError> {
        Ok(Vec::new())
    }

    async fn set_many(
        &self,
        _entries: Vec<(String, Vec<u8>)>,
        _ttl: Duration,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    async fn delete_many(&self, _keys: &[String]) -> Result<(), BackendError> {
        Ok(())
    }
}
