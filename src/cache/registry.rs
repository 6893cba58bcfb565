//! Request-prefix / meta-key registry.
//!
//! A response cached under a URL path is only trusted while its key is a member
//! of the path's meta-key. Invalidation deletes the members together with the
//! meta-key itself, so a missing meta-key always reads as "unknown".

use std::collections::BTreeSet;

use super::keys::meta_key;
use super::session::CacheSession;

/// All keys registered under any of `prefixes`, plus the meta-keys themselves.
pub async fn keys_with_prefixes<I, S>(session: &CacheSession, prefixes: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let metas: Vec<String> = prefixes
        .into_iter()
        .map(|prefix| meta_key(prefix.as_ref()))
        .collect();
    let stored = session.get_many::<BTreeSet<String>>(&metas).await;

    let mut keys: BTreeSet<String> = stored.into_values().flatten().collect();
    keys.extend(metas);
    keys
}

/// Adds `key` to the meta-key of `prefix`.
///
/// Read-modify-write through the request buffer; a concurrent registration by
/// another request can be lost, which only costs a recompute.
pub async fn register(session: &CacheSession, prefix: &str, key: &str) {
    let meta = meta_key(prefix);
    let mut members = session.get_key_set(&meta).await.unwrap_or_default();
    if members.insert(key.to_string()) {
        session.set(meta, &members);
    }
}

pub async fn is_registered(session: &CacheSession, prefix: &str, key: &str) -> bool {
    session
        .get_key_set(&meta_key(prefix))
        .await
        .is_some_and(|members| members.contains(key))
}
