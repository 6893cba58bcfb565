//! Entity cache descriptors.
//!
//! An [`EntityCache`] knows, for one entity type in one API generation, how to
//! derive the entity's characteristic parameters, which URL prefixes and which
//! related caches depend on it, and how to cache serialized representations of
//! it. The per-type knowledge lives in a [`Describe`] implementation; the key
//! bookkeeping shared by all types lives here.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::domain::EntityId;
use crate::routes::Routes;

use super::keys::{
    ACTION_KEYS, LEGACY_ACTION_KEYS, QueryFlags, attachments_key, instance_params_key,
    serialized_data_key, serialized_meta_key, submission_sets_key,
};
use super::metrics::{Layer, record_hit, record_miss};
use super::params::CacheParams;
use super::registry::keys_with_prefixes;
use super::session::CacheSession;

const LEGACY_NAMESPACE_PREFIX: &str = "legacy.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    User,
    Dataset,
    Place,
    SubmissionSet,
    Submission,
    Attachment,
    Action,
}

/// A cache that must be cleared together with an entity, beyond its own prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Related {
    /// Serialized data of the ancestor of this kind.
    Serialized(EntityKind),
    /// Serialized data of the place or submission the entity hangs off.
    Thing,
    /// `dataset:{id}:attachments-by-thing_id`.
    AttachmentsByThing,
    /// `dataset:{id}:submission_sets`.
    SubmissionSets,
    /// The global action meta-key and its members.
    ActionKeys,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        Self::User,
        Self::Dataset,
        Self::Place,
        Self::SubmissionSet,
        Self::Submission,
        Self::Attachment,
        Self::Action,
    ];

    pub fn namespace(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Dataset => "dataset",
            Self::Place => "place",
            Self::SubmissionSet => "submission_set",
            Self::Submission => "submission",
            Self::Attachment => "attachment",
            Self::Action => "action",
        }
    }

    /// Related caches cleared whenever an entity of this kind changes.
    pub fn cascade(self) -> &'static [Related] {
        use EntityKind::{Dataset, Place};
        match self {
            Self::User | Self::Dataset => &[],
            Self::Place => &[Related::Serialized(Dataset), Related::AttachmentsByThing],
            Self::SubmissionSet => &[
                Related::Serialized(Place),
                Related::Serialized(Dataset),
                Related::SubmissionSets,
            ],
            Self::Submission => &[
                Related::Serialized(Dataset),
                Related::Serialized(Place),
                Related::AttachmentsByThing,
                Related::SubmissionSets,
            ],
            Self::Attachment => &[Related::Thing, Related::AttachmentsByThing],
            Self::Action => &[Related::ActionKeys],
        }
    }

    /// Whether a legacy-generation counterpart must be cleared alongside.
    pub fn has_legacy_alias(self) -> bool {
        matches!(
            self,
            Self::Dataset | Self::Place | Self::Submission | Self::Attachment | Self::Action
        )
    }
}

/// API generation an entity cache serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    Current,
    Legacy,
}

impl Generation {
    pub fn namespace(self, kind: EntityKind) -> String {
        match self {
            Self::Current => kind.namespace().to_string(),
            Self::Legacy => format!("{LEGACY_NAMESPACE_PREFIX}{}", kind.namespace()),
        }
    }

    pub fn action_keys(self) -> &'static str {
        match self {
            Self::Current => ACTION_KEYS,
            Self::Legacy => LEGACY_ACTION_KEYS,
        }
    }
}

/// Per-type knowledge plugged into [`EntityCache`].
#[async_trait]
pub trait Describe: Send + Sync + 'static {
    type Entity: Send + Sync;
    type Params: CacheParams;

    const KIND: EntityKind;

    fn entity_id(entity: &Self::Entity) -> EntityId;

    /// Characteristic parameters of `entity`. Parent parameters come from the
    /// parent's instance parameter cache when present.
    async fn params_for(&self, session: &CacheSession, entity: &Self::Entity) -> Self::Params;

    fn request_prefixes(&self, routes: &Routes, params: &Self::Params) -> BTreeSet<String>;
}

pub struct EntityCache<D: Describe> {
    generation: Generation,
    namespace: String,
    routes: Arc<Routes>,
    describe: D,
}

impl<D: Describe> std::fmt::Debug for EntityCache<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("kind", &D::KIND)
            .field("generation", &self.generation)
            .field("root", &self.routes.root())
            .finish()
    }
}

impl<D: Describe> EntityCache<D> {
    pub fn new(generation: Generation, routes: Arc<Routes>, describe: D) -> Self {
        Self {
            generation,
            namespace: generation.namespace(D::KIND),
            routes,
            describe,
        }
    }

    pub fn kind(&self) -> EntityKind {
        D::KIND
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn instance_params_key(&self, id: EntityId) -> String {
        instance_params_key(&self.namespace, id)
    }

    /// Read-through lookup of an instance's parameters.
    ///
    /// `loader` runs only on a miss. Its error propagates and nothing is stored.
    pub async fn cached_instance_params<F, Fut, E>(
        &self,
        session: &CacheSession,
        id: EntityId,
        loader: F,
    ) -> Result<D::Params, E>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<D::Entity, E>> + Send,
    {
        let key = self.instance_params_key(id);
        if let Some(params) = lookup_params::<D::Params>(session, &key).await {
            return Ok(params);
        }
        let entity = loader().await?;
        Ok(self.derive_params(session, key, &entity).await)
    }

    /// Parameters of an entity snapshot already in hand.
    pub async fn params_of(&self, session: &CacheSession, entity: &D::Entity) -> D::Params {
        let key = self.instance_params_key(D::entity_id(entity));
        match lookup_params::<D::Params>(session, &key).await {
            Some(params) => params,
            None => self.derive_params(session, key, entity).await,
        }
    }

    async fn derive_params(&self, session: &CacheSession, key: String, entity: &D::Entity) -> D::Params {
        let params = self.describe.params_for(session, entity).await;
        let ttl = session.client().config().instance_params_ttl();
        session.set_with_ttl(key, &params, ttl);
        params
    }

    pub fn clear_instance_params(&self, session: &CacheSession, id: EntityId) {
        session.delete_many([self.instance_params_key(id)]);
    }

    pub fn request_prefixes(&self, params: &D::Params) -> BTreeSet<String> {
        self.describe.request_prefixes(&self.routes, params)
    }

    /// Keys of related caches that must be cleared with this instance.
    pub async fn related_keys(&self, session: &CacheSession, params: &D::Params) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        for related in D::KIND.cascade() {
            match *related {
                Related::Serialized(kind) => {
                    if let Some(id) = params.id_of(kind) {
                        let namespace = self.generation.namespace(kind);
                        keys.extend(serialized_keys_for(session, &namespace, id).await);
                    }
                }
                Related::Thing => {
                    if let Some((kind, id)) = params.thing() {
                        let namespace = self.generation.namespace(kind);
                        keys.extend(serialized_keys_for(session, &namespace, id).await);
                    }
                }
                Related::AttachmentsByThing => {
                    if let Some(dataset_id) = params.id_of(EntityKind::Dataset) {
                        keys.insert(attachments_key(dataset_id));
                    }
                }
                Related::SubmissionSets => {
                    if let Some(dataset_id) = params.id_of(EntityKind::Dataset) {
                        keys.insert(submission_sets_key(dataset_id));
                    }
                }
                Related::ActionKeys => {
                    let meta = self.generation.action_keys();
                    if let Some(members) = session.get_key_set(meta).await {
                        keys.extend(members);
                    }
                    keys.insert(meta.to_string());
                }
            }
        }
        keys
    }

    pub fn serialized_data_key(&self, id: EntityId, flags: &QueryFlags) -> String {
        serialized_data_key(&self.instance_params_key(id), flags)
    }

    /// Read-through cache of one serialized representation.
    ///
    /// A stored value is served only while its key is registered in the
    /// instance's serialized meta-key. On a miss `compute` runs, and its output
    /// is stored and registered. `compute` errors propagate uncached.
    pub async fn serialized_data<T, F, Fut, E>(
        &self,
        session: &CacheSession,
        id: EntityId,
        flags: &QueryFlags,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let params_key = self.instance_params_key(id);
        let key = serialized_data_key(&params_key, flags);
        let meta = serialized_meta_key(&params_key);

        let registered = session
            .get_key_set(&meta)
            .await
            .is_some_and(|members| members.contains(&key));
        if registered {
            if let Some(value) = session.get::<T>(&key).await {
                record_hit(Layer::Serialized);
                debug!(cache = "serialized", outcome = "hit", key = %key);
                return Ok(value);
            }
        }
        record_miss(Layer::Serialized);
        debug!(cache = "serialized", outcome = "miss", key = %key, registered);

        let value = compute().await?;
        session.set(key.clone(), &value);
        let mut members = session.get_key_set(&meta).await.unwrap_or_default();
        members.insert(key);
        session.set(meta, &members);
        Ok(value)
    }

    /// Every serialized variant key of the instance plus its meta-key.
    pub async fn serialized_data_keys(&self, session: &CacheSession, id: EntityId) -> BTreeSet<String> {
        serialized_keys_for(session, &self.namespace, id).await
    }

    /// Schedules deletion of every cache entry depending on `entity`.
    ///
    /// Parameters come from the instance cache or from the snapshot passed in;
    /// storage is never consulted, so this works for deleted entities too. The
    /// keys go out as one delete batch when the session flushes. Returns the
    /// scheduled key set.
    pub async fn clear_instance(&self, session: &CacheSession, entity: &D::Entity) -> BTreeSet<String> {
        let id = D::entity_id(entity);
        let params = self.params_of(session, entity).await;

        let prefixes = self.request_prefixes(&params);
        let mut keys = keys_with_prefixes(session, &prefixes).await;
        keys.extend(self.related_keys(session, &params).await);
        keys.extend(self.serialized_data_keys(session, id).await);
        keys.insert(self.instance_params_key(id));

        debug!(
            cache = "invalidate",
            kind = ?D::KIND,
            generation = ?self.generation,
            id,
            prefix_count = prefixes.len(),
            key_count = keys.len(),
            "scheduled instance invalidation"
        );
        session.delete_many(keys.iter().cloned());
        keys
    }
}

async fn lookup_params<P: CacheParams>(session: &CacheSession, key: &str) -> Option<P> {
    let params = session.get::<P>(key).await;
    match params {
        Some(_) => record_hit(Layer::Params),
        None => record_miss(Layer::Params),
    }
    params
}

async fn serialized_keys_for(session: &CacheSession, namespace: &str, id: EntityId) -> BTreeSet<String> {
    let meta = serialized_meta_key(&instance_params_key(namespace, id));
    let mut keys = session.get_key_set(&meta).await.unwrap_or_default();
    keys.insert(meta);
    keys
}
