//! Invalidation cascade and version aliases.
//!
//! Every successful create, update or delete calls [`Invalidator::invalidate`]
//! with the entity snapshot. The current-generation caches are cleared first;
//! kinds with a legacy alias are then cleared through the legacy descriptors
//! using the same snapshot. Kinds without an alias only lose their legacy
//! instance params, which aliased children build on. All deletes are staged on the session and go out in
//! its single flush.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use crate::domain::{
    Action, Attachment, Dataset, EntityId, Place, Submission, SubmissionSet, UserAccount,
};
use crate::routes::Routes;

use super::config::CacheConfig;
use super::descriptor::{EntityKind, Generation};
use super::entities::Descriptors;
use super::session::CacheSession;

/// A mutated entity, as it looked when the write committed (or before a delete).
#[derive(Debug, Clone, Copy)]
pub enum Change<'a> {
    User(&'a UserAccount),
    Dataset(&'a Dataset),
    Place(&'a Place),
    SubmissionSet(&'a SubmissionSet),
    Submission(&'a Submission),
    Attachment(&'a Attachment),
    Action(&'a Action),
}

impl Change<'_> {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::User(_) => EntityKind::User,
            Self::Dataset(_) => EntityKind::Dataset,
            Self::Place(_) => EntityKind::Place,
            Self::SubmissionSet(_) => EntityKind::SubmissionSet,
            Self::Submission(_) => EntityKind::Submission,
            Self::Attachment(_) => EntityKind::Attachment,
            Self::Action(_) => EntityKind::Action,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            Self::User(user) => user.id,
            Self::Dataset(dataset) => dataset.id,
            Self::Place(place) => place.id,
            Self::SubmissionSet(set) => set.id,
            Self::Submission(submission) => submission.id,
            Self::Attachment(attachment) => attachment.id,
            Self::Action(action) => action.id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Invalidator {
    current: Descriptors,
    legacy: Option<Descriptors>,
    aliased: BTreeSet<EntityKind>,
}

impl Invalidator {
    /// Builds both generations. Alias edges are resolved here, once.
    pub fn new(config: &CacheConfig) -> Self {
        let current = Descriptors::new(
            Generation::Current,
            Arc::new(Routes::new(config.api_root.as_str())),
        );
        let legacy = config
            .legacy_api_root
            .as_deref()
            .map(|root| Descriptors::new(Generation::Legacy, Arc::new(Routes::new(root))));
        let aliased = match legacy {
            Some(_) => EntityKind::ALL
                .into_iter()
                .filter(|kind| kind.has_legacy_alias())
                .collect(),
            None => BTreeSet::new(),
        };
        Self {
            current,
            legacy,
            aliased,
        }
    }

    pub fn current(&self) -> &Descriptors {
        &self.current
    }

    pub fn legacy(&self) -> Option<&Descriptors> {
        self.legacy.as_ref()
    }

    pub fn is_aliased(&self, kind: EntityKind) -> bool {
        self.aliased.contains(&kind)
    }

    /// Stages every delete needed after `change`. Returns the scheduled keys.
    pub async fn invalidate(&self, session: &CacheSession, change: Change<'_>) -> BTreeSet<String> {
        let kind = change.kind();
        let mut keys = clear(&self.current, session, change).await;
        let mut alias_keys = 0;
        if let Some(legacy) = &self.legacy {
            let cleared = if self.is_aliased(kind) {
                clear(legacy, session, change).await
            } else {
                // Aliased children embed these params in their legacy entries.
                let key = legacy.instance_params_key(kind, change.id());
                session.delete_many([key.clone()]);
                BTreeSet::from([key])
            };
            alias_keys = cleared.len();
            keys.extend(cleared);
        }

        info!(
            cache = "invalidate",
            kind = ?kind,
            id = change.id(),
            key_count = keys.len(),
            alias_key_count = alias_keys,
            "entity change invalidated cache entries"
        );
        keys
    }
}

async fn clear(caches: &Descriptors, session: &CacheSession, change: Change<'_>) -> BTreeSet<String> {
    match change {
        Change::User(user) => caches.users.clear_instance(session, user).await,
        Change::Dataset(dataset) => caches.datasets.clear_instance(session, dataset).await,
        Change::Place(place) => caches.places.clear_instance(session, place).await,
        Change::SubmissionSet(set) => caches.submission_sets.clear_instance(session, set).await,
        Change::Submission(submission) => {
            caches.submissions.clear_instance(session, submission).await
        }
        Change::Attachment(attachment) => {
            caches.attachments.clear_instance(session, attachment).await
        }
        Change::Action(action) => caches.actions.clear_instance(session, action).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheClient, MemoryBackend};

    fn dataset() -> Dataset {
        Dataset {
            id: 3,
            slug: "trees".into(),
            display_name: "Trees".into(),
            owner: UserAccount {
                id: 1,
                username: "alice".into(),
            },
        }
    }

    fn session() -> CacheSession {
        CacheSession::new(CacheClient::new(
            Arc::new(MemoryBackend::new()),
            CacheConfig::default(),
        ))
    }

    #[tokio::test]
    async fn aliased_kinds_clear_both_generations() {
        let invalidator = Invalidator::new(&CacheConfig::default());
        let keys = invalidator
            .invalidate(&session(), Change::Dataset(&dataset()))
            .await;

        assert!(keys.contains("dataset:3"));
        assert!(keys.contains("legacy.dataset:3"));
        assert!(keys.contains("/api/v2/alice/datasets/trees_keys"));
        assert!(keys.contains("/api/v1/alice/datasets/trees_keys"));
    }

    #[tokio::test]
    async fn unaliased_kinds_only_drop_legacy_params() {
        let invalidator = Invalidator::new(&CacheConfig::default());
        let set = SubmissionSet {
            id: 4,
            name: "comments".into(),
            place: Place {
                id: 7,
                title: "Oak".into(),
                visible: true,
                dataset: dataset(),
            },
        };
        let keys = invalidator
            .invalidate(&session(), Change::SubmissionSet(&set))
            .await;

        assert!(keys.contains("submission_set:4"));
        assert!(keys.contains("dataset:3:submission_sets"));
        let legacy: Vec<&String> = keys.iter().filter(|key| key.starts_with("legacy.")).collect();
        assert_eq!(legacy, ["legacy.submission_set:4"]);
        assert!(!keys.contains("/api/v1/alice/datasets/trees/places/7_keys"));
    }

    #[tokio::test]
    async fn no_legacy_root_disables_aliases() {
        let config = CacheConfig {
            legacy_api_root: None,
            ..Default::default()
        };
        let invalidator = Invalidator::new(&config);
        assert!(invalidator.legacy().is_none());
        assert!(!invalidator.is_aliased(EntityKind::Place));

        let keys = invalidator
            .invalidate(&session(), Change::Dataset(&dataset()))
            .await;
        assert!(!keys.contains("legacy.dataset:3"));
    }
}
