//! Invalidation-aware cache engine.
//!
//! Caches three kinds of derived data on a shared key/value backend:
//!
//! - **Instance parameters**: the identifying values of an entity (owner,
//!   dataset slug, ids) needed to build every dependent key and URL.
//! - **Serialized data**: representations of one instance, one entry per set
//!   of serialization flags.
//! - **Responses**: whole HTTP responses keyed by path, `Accept`, query and
//!   viewer groups, stored by [`response_cache_layer`].
//!
//! Entries are trusted only while registered in a meta-key (a stored set of
//! keys). When an entity changes, [`Invalidator`] deletes every entry that
//! depends on it, together with the meta-keys, in one batch per request.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "memory"          # or "redis" with the `redis` feature
//! default_ttl_seconds = 3600
//! instance_params_ttl_seconds = 86400
//! api_root = "/api/v2"
//! legacy_api_root = "/api/v1"
//! ```

mod backend;
mod buffer;
mod cascade;
mod client;
mod config;
mod descriptor;
mod entities;
mod keys;
mod lock;
mod memory;
mod metrics;
mod middleware;
mod params;
#[cfg(feature = "redis")]
mod redis_backend;
mod registry;
mod session;

pub use backend::{BackendError, CacheBackend};
pub use buffer::{Lookup, PendingWrites, RequestBuffer};
pub use cascade::{Change, Invalidator};
pub use client::CacheClient;
pub use config::CacheConfig;
pub use descriptor::{Describe, EntityCache, EntityKind, Generation, Related};
pub use entities::{
    ActionCache, AttachmentCache, DatasetCache, Descriptors, PlaceCache, SubmissionCache,
    SubmissionSetCache, UserCache,
};
pub(crate) use lock::mutex_lock;
pub use keys::{
    ACTION_KEYS, LEGACY_ACTION_KEYS, QueryFlags, action_list_key, attachments_key,
    instance_params_key, meta_key, response_key, serialized_data_key, serialized_meta_key,
    submission_sets_key,
};
pub use memory::{BackendOps, MemoryBackend, NullBackend};
pub use self::metrics::{
    Layer, METRIC_BACKEND_ERROR_TOTAL, METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL,
    METRIC_FLUSH_MS, METRIC_INVALIDATED_KEYS_TOTAL,
};
pub use middleware::{
    CachedResponse, RequestCache, ResponseCacheState, ViewerGroups, response_cache_layer,
};
pub use params::{
    ActionParams, AttachmentParams, CacheParams, DatasetParams, PlaceParams, SubmissionParams,
    SubmissionSetParams, ThingType, UserParams, verify_path,
};
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;
pub use registry::{is_registered, keys_with_prefixes, register};
pub use session::{CacheSession, FlushReport};
