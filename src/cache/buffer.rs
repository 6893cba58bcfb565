//! Request-scoped staging of cache traffic.
//!
//! Reads are memoized for the lifetime of a request, writes and deletes are
//! staged and only leave the process on flush. A staged delete cancels a staged
//! write for the same key and the other way round, and lookups observe the
//! staged state. The buffer itself performs no I/O; [`CacheSession`] drives it.
//!
//! [`CacheSession`]: super::CacheSession

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

/// Outcome of consulting the buffer before going to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The buffer knows the value for this request (possibly "absent").
    Known(Option<Vec<u8>>),
    Unknown,
}

/// Writes ready to be sent, grouped by TTL.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PendingWrites {
    pub sets: Vec<(Duration, Vec<(String, Vec<u8>)>)>,
    pub deletes: Vec<String>,
}

impl PendingWrites {
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty() && self.deletes.is_empty()
    }

    pub fn set_count(&self) -> usize {
        self.sets.iter().map(|(_, entries)| entries.len()).sum()
    }
}

#[derive(Debug, Default)]
pub struct RequestBuffer {
    reads: HashMap<String, Option<Vec<u8>>>,
    sets: BTreeMap<String, (Vec<u8>, Duration)>,
    deletes: BTreeSet<String>,
}

impl RequestBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &str) -> Lookup {
        if self.deletes.contains(key) {
            return Lookup::Known(None);
        }
        if let Some((value, _)) = self.sets.get(key) {
            return Lookup::Known(Some(value.clone()));
        }
        match self.reads.get(key) {
            Some(value) => Lookup::Known(value.clone()),
            None => Lookup::Unknown,
        }
    }

    /// Memoizes a backend read, present or not.
    pub fn remember(&mut self, key: String, value: Option<Vec<u8>>) {
        self.reads.insert(key, value);
    }

    pub fn set(&mut self, key: String, value: Vec<u8>, ttl: Duration) {
        self.deletes.remove(&key);
        self.reads.remove(&key);
        self.sets.insert(key, (value, ttl));
    }

    /// Stages deletes for every key. Duplicates collapse.
    pub fn add<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = String>,
    {
        for key in keys {
            self.sets.remove(&key);
            self.reads.remove(&key);
            self.deletes.insert(key);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty() && self.deletes.is_empty()
    }

    /// Drains staged writes and clears the read memo.
    pub fn take_pending(&mut self) -> PendingWrites {
        let mut by_ttl: BTreeMap<Duration, Vec<(String, Vec<u8>)>> = BTreeMap::new();
        for (key, (value, ttl)) in std::mem::take(&mut self.sets) {
            by_ttl.entry(ttl).or_default().push((key, value));
        }
        let deletes = std::mem::take(&mut self.deletes).into_iter().collect();
        self.reads.clear();
        PendingWrites {
            sets: by_ttl.into_iter().collect(),
            deletes,
        }
    }

    /// Discards everything without sending it.
    pub fn reset(&mut self) {
        self.reads.clear();
        self.sets.clear();
        self.deletes.clear();
    }
}
