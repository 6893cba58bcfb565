//! Domain entities mirrored from persistent storage.
//!
//! Each record carries its ancestors by value, the way a storage query with the
//! parent rows joined in would return it. Cache descriptors rely on this to derive
//! characteristic parameters without issuing another read.

use serde::{Deserialize, Serialize};

/// Primary key type shared by every stored entity.
pub type EntityId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: EntityId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: EntityId,
    pub slug: String,
    pub display_name: String,
    pub owner: UserAccount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub id: EntityId,
    pub title: String,
    pub visible: bool,
    pub dataset: Dataset,
}

/// Named group of submissions attached to one place (comments, support, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSet {
    pub id: EntityId,
    pub name: String,
    pub place: Place,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: EntityId,
    pub body: String,
    pub visible: bool,
    pub set: SubmissionSet,
}

/// The thing an attachment hangs off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentTarget {
    Place(Place),
    Submission(Submission),
}

impl AttachmentTarget {
    pub fn thing_id(&self) -> EntityId {
        match self {
            Self::Place(place) => place.id,
            Self::Submission(submission) => submission.id,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        match self {
            Self::Place(place) => &place.dataset,
            Self::Submission(submission) => &submission.set.place.dataset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: EntityId,
    pub name: String,
    pub file_url: String,
    pub target: AttachmentTarget,
}

/// Activity-stream entry recorded whenever a place or submission is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: EntityId,
    pub action: String,
    pub thing_id: EntityId,
    pub dataset: Dataset,
}

impl Place {
    pub fn owner(&self) -> &UserAccount {
        &self.dataset.owner
    }
}

impl Submission {
    pub fn place(&self) -> &Place {
        &self.set.place
    }
}
