//! Request and response bodies of the demo API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Action, Attachment, Dataset, EntityId, Place, Submission};
use crate::routes::Routes;

#[derive(Debug, Deserialize)]
pub struct CreateDatasetRequest {
    pub slug: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDatasetRequest {
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlaceRequest {
    pub title: String,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlaceRequest {
    pub title: Option<String>,
    pub visible: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAttachmentRequest {
    pub name: String,
    pub file_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSubmissionRequest {
    pub body: String,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
}

fn visible_by_default() -> bool {
    true
}

/// Serialization flags accepted on detail reads. Values are the literal
/// strings `true` or `false`.
#[derive(Debug, Default, Deserialize)]
pub struct DetailQuery {
    pub include_invisible: Option<String>,
    pub include_submissions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetView {
    pub id: EntityId,
    pub url: String,
    pub owner: String,
    pub slug: String,
    pub display_name: String,
    pub places: PlacesSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacesSummary {
    pub url: String,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentView {
    pub id: EntityId,
    pub name: String,
    pub file: String,
}

impl From<&Attachment> for AttachmentView {
    fn from(attachment: &Attachment) -> Self {
        Self {
            id: attachment.id,
            name: attachment.name.clone(),
            file: attachment.file_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSetSummary {
    pub url: String,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionView {
    pub id: EntityId,
    pub url: String,
    pub set_name: String,
    pub body: String,
    pub visible: bool,
    pub attachments: Vec<AttachmentView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceView {
    pub id: EntityId,
    pub url: String,
    pub dataset: String,
    pub title: String,
    pub visible: bool,
    pub attachments: Vec<AttachmentView>,
    pub submission_sets: BTreeMap<String, SubmissionSetSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submissions: Option<BTreeMap<String, Vec<SubmissionView>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionView {
    pub id: EntityId,
    pub action: String,
    pub thing_id: EntityId,
    pub dataset: String,
}

/// Attachments of a dataset grouped by the id of the place or submission they hang off.
pub type AttachmentsByThing = BTreeMap<EntityId, Vec<AttachmentView>>;

/// Submission set names and visible counts per place id.
pub type SubmissionSetsByPlace = BTreeMap<EntityId, BTreeMap<String, usize>>;

impl DatasetView {
    pub fn new(routes: &Routes, dataset: &Dataset, place_count: usize) -> Self {
        let owner = dataset.owner.username.as_str();
        Self {
            id: dataset.id,
            url: routes.dataset_detail(owner, &dataset.slug),
            owner: owner.to_string(),
            slug: dataset.slug.clone(),
            display_name: dataset.display_name.clone(),
            places: PlacesSummary {
                url: routes.place_list(owner, &dataset.slug),
                length: place_count,
            },
        }
    }
}

impl PlaceView {
    pub fn new(
        routes: &Routes,
        place: &Place,
        attachments: Vec<AttachmentView>,
        sets: &BTreeMap<String, usize>,
    ) -> Self {
        let (owner, slug) = (place.owner().username.as_str(), place.dataset.slug.as_str());
        Self {
            id: place.id,
            url: routes.place_detail(owner, slug, place.id),
            dataset: routes.dataset_detail(owner, slug),
            title: place.title.clone(),
            visible: place.visible,
            attachments,
            submission_sets: sets
                .iter()
                .map(|(name, &length)| {
                    let summary = SubmissionSetSummary {
                        url: routes.submission_list(owner, slug, place.id, name),
                        length,
                    };
                    (name.clone(), summary)
                })
                .collect(),
            submissions: None,
        }
    }
}

impl SubmissionView {
    pub fn new(routes: &Routes, submission: &Submission, attachments: Vec<AttachmentView>) -> Self {
        let place = submission.place();
        Self {
            id: submission.id,
            url: routes.submission_detail(
                &place.owner().username,
                &place.dataset.slug,
                place.id,
                &submission.set.name,
                submission.id,
            ),
            set_name: submission.set.name.clone(),
            body: submission.body.clone(),
            visible: submission.visible,
            attachments,
        }
    }
}

impl ActionView {
    pub fn new(routes: &Routes, action: &Action) -> Self {
        Self {
            id: action.id,
            action: action.action.clone(),
            thing_id: action.thing_id,
            dataset: routes.dataset_detail(&action.dataset.owner.username, &action.dataset.slug),
        }
    }
}
