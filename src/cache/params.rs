//! Characteristic parameters.
//!
//! The smallest set of identifying values needed to derive every cache key and
//! URL prefix that depends on an entity. Each type serializes to a flat JSON
//! object, which is what the instance parameter cache stores.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::domain::{
    Action, Attachment, AttachmentTarget, Dataset, EntityId, Place, Submission, SubmissionSet,
    UserAccount,
};

use super::descriptor::EntityKind;

/// Behaviour shared by every parameter type.
pub trait CacheParams: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Primary key of the entity of `kind` these params identify, if they identify one.
    fn id_of(&self, kind: EntityKind) -> Option<EntityId>;

    /// The place or submission these params belong to, for kinds that hang off one.
    fn thing(&self) -> Option<(EntityKind, EntityId)> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThingType {
    Place,
    Submission,
}

impl ThingType {
    pub fn kind(self) -> EntityKind {
        match self {
            Self::Place => EntityKind::Place,
            Self::Submission => EntityKind::Submission,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserParams {
    pub owner_username: String,
    pub owner_id: EntityId,
}

impl From<&UserAccount> for UserParams {
    fn from(user: &UserAccount) -> Self {
        Self {
            owner_username: user.username.clone(),
            owner_id: user.id,
        }
    }
}

impl CacheParams for UserParams {
    fn id_of(&self, kind: EntityKind) -> Option<EntityId> {
        (kind == EntityKind::User).then_some(self.owner_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetParams {
    pub owner_username: String,
    pub owner_id: EntityId,
    pub dataset_slug: String,
    pub dataset_id: EntityId,
}

impl From<&Dataset> for DatasetParams {
    fn from(dataset: &Dataset) -> Self {
        Self {
            owner_username: dataset.owner.username.clone(),
            owner_id: dataset.owner.id,
            dataset_slug: dataset.slug.clone(),
            dataset_id: dataset.id,
        }
    }
}

impl DatasetParams {
    fn dataset_id_of(&self, kind: EntityKind) -> Option<EntityId> {
        match kind {
            EntityKind::Dataset => Some(self.dataset_id),
            EntityKind::User => Some(self.owner_id),
            _ => None,
        }
    }
}

impl CacheParams for DatasetParams {
    fn id_of(&self, kind: EntityKind) -> Option<EntityId> {
        self.dataset_id_of(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceParams {
    #[serde(flatten)]
    pub dataset: DatasetParams,
    pub place_id: EntityId,
    pub thing_id: EntityId,
    pub thing_type: ThingType,
}

impl PlaceParams {
    pub fn new(dataset: DatasetParams, place_id: EntityId) -> Self {
        Self {
            dataset,
            place_id,
            thing_id: place_id,
            thing_type: ThingType::Place,
        }
    }
}

impl From<&Place> for PlaceParams {
    fn from(place: &Place) -> Self {
        Self::new(DatasetParams::from(&place.dataset), place.id)
    }
}

impl CacheParams for PlaceParams {
    fn id_of(&self, kind: EntityKind) -> Option<EntityId> {
        match kind {
            EntityKind::Place => Some(self.place_id),
            _ => self.dataset.dataset_id_of(kind),
        }
    }

    fn thing(&self) -> Option<(EntityKind, EntityId)> {
        Some((self.thing_type.kind(), self.thing_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSetParams {
    #[serde(flatten)]
    pub place: PlaceParams,
    pub submission_set_name: String,
    pub submission_set_id: EntityId,
}

impl From<&SubmissionSet> for SubmissionSetParams {
    fn from(set: &SubmissionSet) -> Self {
        Self {
            place: PlaceParams::from(&set.place),
            submission_set_name: set.name.clone(),
            submission_set_id: set.id,
        }
    }
}

impl CacheParams for SubmissionSetParams {
    fn id_of(&self, kind: EntityKind) -> Option<EntityId> {
        match kind {
            EntityKind::SubmissionSet => Some(self.submission_set_id),
            _ => self.place.id_of(kind),
        }
    }

    fn thing(&self) -> Option<(EntityKind, EntityId)> {
        self.place.thing()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionParams {
    #[serde(flatten)]
    pub dataset: DatasetParams,
    pub place_id: EntityId,
    pub submission_set_name: String,
    pub submission_set_id: EntityId,
    pub submission_id: EntityId,
    pub thing_id: EntityId,
    pub thing_type: ThingType,
}

impl SubmissionParams {
    pub fn new(set: SubmissionSetParams, submission_id: EntityId) -> Self {
        Self {
            dataset: set.place.dataset,
            place_id: set.place.place_id,
            submission_set_name: set.submission_set_name,
            submission_set_id: set.submission_set_id,
            submission_id,
            thing_id: submission_id,
            thing_type: ThingType::Submission,
        }
    }
}

impl From<&Submission> for SubmissionParams {
    fn from(submission: &Submission) -> Self {
        Self::new(SubmissionSetParams::from(&submission.set), submission.id)
    }
}

impl CacheParams for SubmissionParams {
    fn id_of(&self, kind: EntityKind) -> Option<EntityId> {
        match kind {
            EntityKind::Submission => Some(self.submission_id),
            EntityKind::SubmissionSet => Some(self.submission_set_id),
            EntityKind::Place => Some(self.place_id),
            _ => self.dataset.dataset_id_of(kind),
        }
    }

    fn thing(&self) -> Option<(EntityKind, EntityId)> {
        Some((self.thing_type.kind(), self.thing_id))
    }
}

/// Parameters of an attachment: those of the thing it hangs off plus its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentParams {
    #[serde(flatten)]
    pub dataset: DatasetParams,
    pub place_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_set_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_set_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<EntityId>,
    pub thing_id: EntityId,
    pub thing_type: ThingType,
    pub attachment_name: String,
    pub attachment_id: EntityId,
}

impl AttachmentParams {
    pub fn on_place(place: PlaceParams, name: impl Into<String>, id: EntityId) -> Self {
        Self {
            dataset: place.dataset,
            place_id: place.place_id,
            submission_set_name: None,
            submission_set_id: None,
            submission_id: None,
            thing_id: place.thing_id,
            thing_type: place.thing_type,
            attachment_name: name.into(),
            attachment_id: id,
        }
    }

    pub fn on_submission(submission: SubmissionParams, name: impl Into<String>, id: EntityId) -> Self {
        Self {
            dataset: submission.dataset,
            place_id: submission.place_id,
            submission_set_name: Some(submission.submission_set_name),
            submission_set_id: Some(submission.submission_set_id),
            submission_id: Some(submission.submission_id),
            thing_id: submission.thing_id,
            thing_type: submission.thing_type,
            attachment_name: name.into(),
            attachment_id: id,
        }
    }
}

impl From<&Attachment> for AttachmentParams {
    fn from(attachment: &Attachment) -> Self {
        match &attachment.target {
            AttachmentTarget::Place(place) => {
                Self::on_place(PlaceParams::from(place), &attachment.name, attachment.id)
            }
            AttachmentTarget::Submission(submission) => Self::on_submission(
                SubmissionParams::from(submission),
                &attachment.name,
                attachment.id,
            ),
        }
    }
}

impl CacheParams for AttachmentParams {
    fn id_of(&self, kind: EntityKind) -> Option<EntityId> {
        match kind {
            EntityKind::Attachment => Some(self.attachment_id),
            EntityKind::Submission => self.submission_id,
            EntityKind::SubmissionSet => self.submission_set_id,
            EntityKind::Place => Some(self.place_id),
            _ => self.dataset.dataset_id_of(kind),
        }
    }

    fn thing(&self) -> Option<(EntityKind, EntityId)> {
        Some((self.thing_type.kind(), self.thing_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionParams {
    #[serde(flatten)]
    pub dataset: DatasetParams,
    pub action_id: EntityId,
    pub thing_id: EntityId,
}

impl From<&Action> for ActionParams {
    fn from(action: &Action) -> Self {
        Self {
            dataset: DatasetParams::from(&action.dataset),
            action_id: action.id,
            thing_id: action.thing_id,
        }
    }
}

impl CacheParams for ActionParams {
    fn id_of(&self, kind: EntityKind) -> Option<EntityId> {
        match kind {
            EntityKind::Action => Some(self.action_id),
            _ => self.dataset.dataset_id_of(kind),
        }
    }
}

/// Checks URL arguments against cached parameters.
///
/// Every argument whose name is a characteristic parameter must match it;
/// arguments with other names are ignored. Lets a handler reject an entity
/// addressed under the wrong owner or dataset without reading storage.
pub fn verify_path<P: CacheParams>(params: &P, args: &[(&str, &str)]) -> bool {
    let Ok(Value::Object(map)) = serde_json::to_value(params) else {
        return false;
    };
    args.iter().all(|(name, expected)| match map.get(*name) {
        None => true,
        Some(Value::String(actual)) => actual == expected,
        Some(Value::Number(actual)) => actual.to_string() == *expected,
        Some(Value::Bool(actual)) => actual.to_string() == *expected,
        Some(_) => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

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

    fn place() -> Place {
        Place {
            id: 7,
            title: "Oak".into(),
            visible: true,
            dataset: dataset(),
        }
    }

    fn submission() -> Submission {
        Submission {
            id: 12,
            body: "nice".into(),
            visible: true,
            set: SubmissionSet {
                id: 4,
                name: "comments".into(),
                place: place(),
            },
        }
    }

    #[test]
    fn place_params_serialize_flat() {
        let params = PlaceParams::from(&place());
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({
                "owner_username": "alice",
                "owner_id": 1,
                "dataset_slug": "trees",
                "dataset_id": 3,
                "place_id": 7,
                "thing_id": 7,
                "thing_type": "place",
            })
        );
        let back: PlaceParams = serde_json::from_value(serde_json::to_value(&params).unwrap()).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn submission_params_point_at_themselves() {
        let params = SubmissionParams::from(&submission());
        assert_eq!(params.thing(), Some((EntityKind::Submission, 12)));
        assert_eq!(params.id_of(EntityKind::Place), Some(7));
        assert_eq!(params.id_of(EntityKind::Dataset), Some(3));
        assert_eq!(params.id_of(EntityKind::Attachment), None);
    }

    #[test]
    fn attachment_params_follow_their_thing() {
        let on_place = Attachment {
            id: 30,
            name: "photo.jpg".into(),
            file_url: "/media/photo.jpg".into(),
            target: AttachmentTarget::Place(place()),
        };
        let params = AttachmentParams::from(&on_place);
        assert_eq!(params.thing(), Some((EntityKind::Place, 7)));
        assert_eq!(params.id_of(EntityKind::Submission), None);
        let value = serde_json::to_value(&params).unwrap();
        assert!(value.get("submission_id").is_none());

        let on_submission = Attachment {
            target: AttachmentTarget::Submission(submission()),
            ..on_place
        };
        let params = AttachmentParams::from(&on_submission);
        assert_eq!(params.thing(), Some((EntityKind::Submission, 12)));
        assert_eq!(params.submission_set_name.as_deref(), Some("comments"));
    }

    #[test]
    fn verify_path_compares_named_arguments() {
        let params = PlaceParams::from(&place());
        assert!(verify_path(
            &params,
            &[("owner_username", "alice"), ("dataset_slug", "trees"), ("place_id", "7")]
        ));
        assert!(!verify_path(&params, &[("dataset_slug", "bushes")]));
        assert!(verify_path(&params, &[("format", "json")]));
    }
}
