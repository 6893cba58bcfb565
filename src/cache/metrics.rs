//! Metric names and recording helpers for the cache engine.

use metrics::{counter, histogram};

pub const METRIC_CACHE_HIT_TOTAL: &str = "placecache_cache_hit_total";
pub const METRIC_CACHE_MISS_TOTAL: &str = "placecache_cache_miss_total";
pub const METRIC_BACKEND_ERROR_TOTAL: &str = "placecache_backend_error_total";
pub const METRIC_INVALIDATED_KEYS_TOTAL: &str = "placecache_invalidated_keys_total";
pub const METRIC_FLUSH_MS: &str = "placecache_flush_ms";

/// Which cache layer served (or failed to serve) a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Response,
    Serialized,
    Params,
}

impl Layer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Response => "response",
            Self::Serialized => "serialized",
            Self::Params => "params",
        }
    }
}

pub(crate) fn record_hit(layer: Layer) {
    counter!(METRIC_CACHE_HIT_TOTAL, "layer" => layer.as_str()).increment(1);
}

pub(crate) fn record_miss(layer: Layer) {
    counter!(METRIC_CACHE_MISS_TOTAL, "layer" => layer.as_str()).increment(1);
}

pub(crate) fn record_backend_error(op: &'static str) {
    counter!(METRIC_BACKEND_ERROR_TOTAL, "op" => op).increment(1);
}

pub(crate) fn record_invalidated(count: usize) {
    counter!(METRIC_INVALIDATED_KEYS_TOTAL).increment(count as u64);
}

pub(crate) fn record_flush(elapsed_ms: f64) {
    histogram!(METRIC_FLUSH_MS).record(elapsed_ms);
}
