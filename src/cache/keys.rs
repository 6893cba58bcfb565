//! Cache key derivation.
//!
//! Every key the engine reads, writes or deletes is produced here. The formats
//! are shared with consumers that populate the cache independently, so they
//! must stay byte-stable.

use std::collections::BTreeMap;
use std::fmt::Display;

use crate::domain::EntityId;

/// Global set of cached action-list keys, current generation.
pub const ACTION_KEYS: &str = "action_keys";
/// Global set of cached action-list keys, legacy generation.
pub const LEGACY_ACTION_KEYS: &str = "activity_keys";

const META_SUFFIX: &str = "_keys";
const CACHE_BUSTER: &str = "_";

/// Key of the set that records which cache keys under `prefix` are trustworthy.
pub fn meta_key(prefix: &str) -> String {
    format!("{prefix}{META_SUFFIX}")
}

pub fn instance_params_key(namespace: &str, id: EntityId) -> String {
    format!("{namespace}:{id}")
}

/// Meta-key governing every serialized variant of one instance.
pub fn serialized_meta_key(params_key: &str) -> String {
    format!("{params_key}:{META_SUFFIX}")
}

pub fn serialized_data_key(params_key: &str, flags: &QueryFlags) -> String {
    format!("{params_key}:{}", flags.encode())
}

/// Dataset-wide map of attachments keyed by the id of the thing they hang off.
pub fn attachments_key(dataset_id: EntityId) -> String {
    format!("dataset:{dataset_id}:attachments-by-thing_id")
}

/// Dataset-wide submission set summaries keyed by place.
pub fn submission_sets_key(dataset_id: EntityId) -> String {
    format!("dataset:{dataset_id}:submission_sets")
}

/// Cached activity list of one dataset. Registered in the global action meta-key.
pub fn action_list_key(dataset_id: EntityId) -> String {
    format!("dataset:{dataset_id}:actions")
}

/// Serialization options that select one cached representation of an instance.
///
/// Flags are kept sorted by name so two requests asking for the same variant
/// always derive the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFlags(BTreeMap<String, String>);

impl QueryFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Display) {
        self.0.insert(name.into(), value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `k1=v1:k2=v2`, or the empty string when no flag is set.
    pub fn encode(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl<K: Into<String>, V: Display> FromIterator<(K, V)> for QueryFlags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut flags = Self::new();
        for (name, value) in iter {
            flags.insert(name, value);
        }
        flags
    }
}

/// Key of one cached response: `{path}:{accept}:{query}:{groups}`.
///
/// The jQuery-style cache buster parameter (`_=<digits>`) is dropped from the
/// query so it does not fragment the cache.
pub fn response_key(path: &str, accept: &str, query: &str, groups: &str) -> String {
    format!("{path}:{accept}:{}:{groups}", strip_cache_buster(query))
}

fn strip_cache_buster(query: &str) -> String {
    query
        .split('&')
        .filter(|pair| !pair.is_empty() && !is_cache_buster(pair))
        .collect::<Vec<_>>()
        .join("&")
}

fn is_cache_buster(pair: &str) -> bool {
    match pair.split_once('=') {
        Some((name, value)) => {
            name == CACHE_BUSTER && !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_and_instance_keys() {
        assert_eq!(meta_key("/api/v2/alice/datasets"), "/api/v2/alice/datasets_keys");
        assert_eq!(instance_params_key("place", 7), "place:7");
        assert_eq!(serialized_meta_key("place:7"), "place:7:_keys");
        assert_eq!(attachments_key(3), "dataset:3:attachments-by-thing_id");
        assert_eq!(submission_sets_key(3), "dataset:3:submission_sets");
    }

    #[test]
    fn flags_are_sorted_by_name() {
        let flags = QueryFlags::new()
            .with("include_submissions", true)
            .with("include_invisible", false);
        assert_eq!(
            serialized_data_key("place:7", &flags),
            "place:7:include_invisible=false:include_submissions=true"
        );

        let same: QueryFlags = [("include_invisible", false), ("include_submissions", true)]
            .into_iter()
            .collect();
        assert_eq!(flags, same);
    }

    #[test]
    fn empty_flags_leave_trailing_separator() {
        assert_eq!(serialized_data_key("dataset:1", &QueryFlags::new()), "dataset:1:");
    }

    #[test]
    fn cache_buster_is_removed() {
        assert_eq!(
            response_key("/p", "application/json", "a=1&_=1699999&b=2", ""),
            "/p:application/json:a=1&b=2:"
        );
        assert_eq!(response_key("/p", "", "_=12", "__owners__"), "/p:::__owners__");
        assert_eq!(response_key("/p", "", "_=abc", ""), "/p::_=abc:");
        assert_eq!(response_key("/p", "", "x_=12", ""), "/p::x_=12:");
    }
}
