//! Descriptors for each cached entity type.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{
    Action, Attachment, AttachmentTarget, Dataset, EntityId, Place, Submission, SubmissionSet,
    UserAccount,
};
use crate::routes::{GENERIC_SUBMISSION_SET, Routes};

use super::descriptor::{Describe, EntityCache, EntityKind, Generation};
use super::params::{
    ActionParams, AttachmentParams, DatasetParams, PlaceParams, SubmissionParams,
    SubmissionSetParams, ThingType, UserParams,
};
use super::session::CacheSession;

pub type UserCache = EntityCache<UserDescriptor>;
pub type DatasetCache = EntityCache<DatasetDescriptor>;
pub type PlaceCache = EntityCache<PlaceDescriptor>;
pub type SubmissionSetCache = EntityCache<SubmissionSetDescriptor>;
pub type SubmissionCache = EntityCache<SubmissionDescriptor>;
pub type AttachmentCache = EntityCache<AttachmentDescriptor>;
pub type ActionCache = EntityCache<ActionDescriptor>;

#[derive(Debug, Default)]
pub struct UserDescriptor;

#[async_trait]
impl Describe for UserDescriptor {
    type Entity = UserAccount;
    type Params = UserParams;

    const KIND: EntityKind = EntityKind::User;

    fn entity_id(entity: &UserAccount) -> EntityId {
        entity.id
    }

    async fn params_for(&self, _session: &CacheSession, entity: &UserAccount) -> UserParams {
        UserParams::from(entity)
    }

    fn request_prefixes(&self, routes: &Routes, params: &UserParams) -> BTreeSet<String> {
        let owner = params.owner_username.as_str();
        BTreeSet::from([routes.user_detail(owner), routes.dataset_list(owner)])
    }
}

#[derive(Debug, Default)]
pub struct DatasetDescriptor;

#[async_trait]
impl Describe for DatasetDescriptor {
    type Entity = Dataset;
    type Params = DatasetParams;

    const KIND: EntityKind = EntityKind::Dataset;

    fn entity_id(entity: &Dataset) -> EntityId {
        entity.id
    }

    async fn params_for(&self, _session: &CacheSession, entity: &Dataset) -> DatasetParams {
        DatasetParams::from(entity)
    }

    fn request_prefixes(&self, routes: &Routes, params: &DatasetParams) -> BTreeSet<String> {
        let (owner, dataset) = (params.owner_username.as_str(), params.dataset_slug.as_str());
        BTreeSet::from([
            routes.dataset_detail(owner, dataset),
            routes.dataset_list(owner),
        ])
    }
}

pub struct PlaceDescriptor {
    datasets: Arc<DatasetCache>,
}

#[async_trait]
impl Describe for PlaceDescriptor {
    type Entity = Place;
    type Params = PlaceParams;

    const KIND: EntityKind = EntityKind::Place;

    fn entity_id(entity: &Place) -> EntityId {
        entity.id
    }

    async fn params_for(&self, session: &CacheSession, entity: &Place) -> PlaceParams {
        let dataset = self.datasets.params_of(session, &entity.dataset).await;
        PlaceParams::new(dataset, entity.id)
    }

    fn request_prefixes(&self, routes: &Routes, params: &PlaceParams) -> BTreeSet<String> {
        place_prefixes(routes, params)
    }
}

fn place_prefixes(routes: &Routes, params: &PlaceParams) -> BTreeSet<String> {
    let owner = params.dataset.owner_username.as_str();
    let dataset = params.dataset.dataset_slug.as_str();
    BTreeSet::from([
        routes.place_detail(owner, dataset, params.place_id),
        routes.place_list(owner, dataset),
        routes.dataset_detail(owner, dataset),
        routes.dataset_list(owner),
        routes.action_list(owner, dataset),
    ])
}

/// A submission set has no detail view; changing it touches its place and its lists.
pub struct SubmissionSetDescriptor {
    places: Arc<PlaceCache>,
}

#[async_trait]
impl Describe for SubmissionSetDescriptor {
    type Entity = SubmissionSet;
    type Params = SubmissionSetParams;

    const KIND: EntityKind = EntityKind::SubmissionSet;

    fn entity_id(entity: &SubmissionSet) -> EntityId {
        entity.id
    }

    async fn params_for(&self, session: &CacheSession, entity: &SubmissionSet) -> SubmissionSetParams {
        SubmissionSetParams {
            place: self.places.params_of(session, &entity.place).await,
            submission_set_name: entity.name.clone(),
            submission_set_id: entity.id,
        }
    }

    fn request_prefixes(&self, routes: &Routes, params: &SubmissionSetParams) -> BTreeSet<String> {
        let owner = params.place.dataset.owner_username.as_str();
        let dataset = params.place.dataset.dataset_slug.as_str();
        let place = params.place.place_id;
        let mut prefixes = BTreeSet::from([
            routes.place_detail(owner, dataset, place),
            routes.place_list(owner, dataset),
            routes.dataset_detail(owner, dataset),
            routes.action_list(owner, dataset),
        ]);
        for set in [params.submission_set_name.as_str(), GENERIC_SUBMISSION_SET] {
            prefixes.insert(routes.submission_list(owner, dataset, place, set));
            prefixes.insert(routes.dataset_submission_list(owner, dataset, set));
        }
        prefixes
    }
}

pub struct SubmissionDescriptor {
    sets: Arc<SubmissionSetCache>,
}

#[async_trait]
impl Describe for SubmissionDescriptor {
    type Entity = Submission;
    type Params = SubmissionParams;

    const KIND: EntityKind = EntityKind::Submission;

    fn entity_id(entity: &Submission) -> EntityId {
        entity.id
    }

    async fn params_for(&self, session: &CacheSession, entity: &Submission) -> SubmissionParams {
        let set = self.sets.params_of(session, &entity.set).await;
        SubmissionParams::new(set, entity.id)
    }

    fn request_prefixes(&self, routes: &Routes, params: &SubmissionParams) -> BTreeSet<String> {
        let owner = params.dataset.owner_username.as_str();
        let dataset = params.dataset.dataset_slug.as_str();
        let mut prefixes = submission_paths(routes, params);
        prefixes.extend([
            routes.place_detail(owner, dataset, params.place_id),
            routes.place_list(owner, dataset),
            routes.dataset_detail(owner, dataset),
            routes.dataset_list(owner),
        ]);
        prefixes
    }
}

/// Detail, list and dataset-wide list paths under both the specific set name
/// and the generic one, plus the dataset action list.
fn submission_paths(routes: &Routes, params: &SubmissionParams) -> BTreeSet<String> {
    let owner = params.dataset.owner_username.as_str();
    let dataset = params.dataset.dataset_slug.as_str();
    let mut prefixes = BTreeSet::from([routes.action_list(owner, dataset)]);
    for set in [params.submission_set_name.as_str(), GENERIC_SUBMISSION_SET] {
        prefixes.insert(routes.submission_detail(owner, dataset, params.place_id, set, params.submission_id));
        prefixes.insert(routes.submission_list(owner, dataset, params.place_id, set));
        prefixes.insert(routes.dataset_submission_list(owner, dataset, set));
    }
    prefixes
}

pub struct AttachmentDescriptor {
    places: Arc<PlaceCache>,
    submissions: Arc<SubmissionCache>,
}

#[async_trait]
impl Describe for AttachmentDescriptor {
    type Entity = Attachment;
    type Params = AttachmentParams;

    const KIND: EntityKind = EntityKind::Attachment;

    fn entity_id(entity: &Attachment) -> EntityId {
        entity.id
    }

    async fn params_for(&self, session: &CacheSession, entity: &Attachment) -> AttachmentParams {
        match &entity.target {
            AttachmentTarget::Place(place) => AttachmentParams::on_place(
                self.places.params_of(session, place).await,
                &entity.name,
                entity.id,
            ),
            AttachmentTarget::Submission(submission) => AttachmentParams::on_submission(
                self.submissions.params_of(session, submission).await,
                &entity.name,
                entity.id,
            ),
        }
    }

    fn request_prefixes(&self, routes: &Routes, params: &AttachmentParams) -> BTreeSet<String> {
        let owner = params.dataset.owner_username.as_str();
        let dataset = params.dataset.dataset_slug.as_str();
        match (params.thing_type, &params.submission_set_name, params.submission_set_id) {
            (ThingType::Submission, Some(set_name), Some(set_id)) => {
                let submission = SubmissionParams {
                    dataset: params.dataset.clone(),
                    place_id: params.place_id,
                    submission_set_name: set_name.clone(),
                    submission_set_id: set_id,
                    submission_id: params.thing_id,
                    thing_id: params.thing_id,
                    thing_type: ThingType::Submission,
                };
                let mut prefixes = submission_paths(routes, &submission);
                for set in [set_name.as_str(), GENERIC_SUBMISSION_SET] {
                    prefixes.insert(routes.submission_attachments(
                        owner,
                        dataset,
                        params.place_id,
                        set,
                        params.thing_id,
                    ));
                }
                prefixes
            }
            _ => {
                let place = PlaceParams::new(params.dataset.clone(), params.place_id);
                let mut prefixes = place_prefixes(routes, &place);
                prefixes.remove(&routes.dataset_detail(owner, dataset));
                prefixes.remove(&routes.dataset_list(owner));
                prefixes.insert(routes.place_attachments(owner, dataset, params.place_id));
                prefixes
            }
        }
    }
}

pub struct ActionDescriptor {
    datasets: Arc<DatasetCache>,
}

#[async_trait]
impl Describe for ActionDescriptor {
    type Entity = Action;
    type Params = ActionParams;

    const KIND: EntityKind = EntityKind::Action;

    fn entity_id(entity: &Action) -> EntityId {
        entity.id
    }

    async fn params_for(&self, session: &CacheSession, entity: &Action) -> ActionParams {
        ActionParams {
            dataset: self.datasets.params_of(session, &entity.dataset).await,
            action_id: entity.id,
            thing_id: entity.thing_id,
        }
    }

    fn request_prefixes(&self, routes: &Routes, params: &ActionParams) -> BTreeSet<String> {
        BTreeSet::from([routes.action_list(
            &params.dataset.owner_username,
            &params.dataset.dataset_slug,
        )])
    }
}

/// The full set of entity caches for one API generation, wired to their parents.
#[derive(Debug, Clone)]
pub struct Descriptors {
    pub users: Arc<UserCache>,
    pub datasets: Arc<DatasetCache>,
    pub places: Arc<PlaceCache>,
    pub submission_sets: Arc<SubmissionSetCache>,
    pub submissions: Arc<SubmissionCache>,
    pub attachments: Arc<AttachmentCache>,
    pub actions: Arc<ActionCache>,
}

impl Descriptors {
    pub fn new(generation: Generation, routes: Arc<Routes>) -> Self {
        let users = Arc::new(EntityCache::new(generation, routes.clone(), UserDescriptor));
        let datasets = Arc::new(EntityCache::new(generation, routes.clone(), DatasetDescriptor));
        let places = Arc::new(EntityCache::new(
            generation,
            routes.clone(),
            PlaceDescriptor {
                datasets: datasets.clone(),
            },
        ));
        let submission_sets = Arc::new(EntityCache::new(
            generation,
            routes.clone(),
            SubmissionSetDescriptor {
                places: places.clone(),
            },
        ));
        let submissions = Arc::new(EntityCache::new(
            generation,
            routes.clone(),
            SubmissionDescriptor {
                sets: submission_sets.clone(),
            },
        ));
        let attachments = Arc::new(EntityCache::new(
            generation,
            routes.clone(),
            AttachmentDescriptor {
                places: places.clone(),
                submissions: submissions.clone(),
            },
        ));
        let actions = Arc::new(EntityCache::new(
            generation,
            routes,
            ActionDescriptor {
                datasets: datasets.clone(),
            },
        ));

        Self {
            users,
            datasets,
            places,
            submission_sets,
            submissions,
            attachments,
            actions,
        }
    }

    pub fn instance_params_key(&self, kind: EntityKind, id: EntityId) -> String {
        match kind {
            EntityKind::User => self.users.instance_params_key(id),
            EntityKind::Dataset => self.datasets.instance_params_key(id),
            EntityKind::Place => self.places.instance_params_key(id),
            EntityKind::SubmissionSet => self.submission_sets.instance_params_key(id),
            EntityKind::Submission => self.submissions.instance_params_key(id),
            EntityKind::Attachment => self.attachments.instance_params_key(id),
            EntityKind::Action => self.actions.instance_params_key(id),
        }
    }
}
