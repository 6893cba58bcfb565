//! Domain layer types.

pub mod entities;

pub use entities::{
    Action, Attachment, AttachmentTarget, Dataset, EntityId, Place, Submission, SubmissionSet,
    UserAccount,
};
