//! In-memory persistence for the demo API.
//!
//! Rows reference their parents by id, and every read joins the parents in so
//! callers receive full entity snapshots. Each public read counts as one query,
//! which lets tests observe how much work the caches saved.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

use crate::cache::mutex_lock;
use crate::domain::{
    Action, Attachment, AttachmentTarget, Dataset, EntityId, Place, Submission, SubmissionSet,
    UserAccount,
};

const SOURCE: &str = "infra::store";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: &'static str },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl StoreError {
    fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// The thing a new attachment is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThingRef {
    Place(EntityId),
    Submission(EntityId),
}

/// Everything removed by [`MemoryStore::delete_place`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedPlace {
    pub place: Place,
    pub sets: Vec<SubmissionSet>,
    pub submissions: Vec<Submission>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone)]
struct DatasetRow {
    slug: String,
    display_name: String,
    owner_id: EntityId,
}

#[derive(Debug, Clone)]
struct PlaceRow {
    title: String,
    visible: bool,
    dataset_id: EntityId,
}

#[derive(Debug, Clone)]
struct SetRow {
    name: String,
    place_id: EntityId,
}

#[derive(Debug, Clone)]
struct SubmissionRow {
    body: String,
    visible: bool,
    set_id: EntityId,
}

#[derive(Debug, Clone)]
struct AttachmentRow {
    name: String,
    file_url: String,
    thing: ThingRef,
}

#[derive(Debug, Clone)]
struct ActionRow {
    action: String,
    thing_id: EntityId,
    dataset_id: EntityId,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: EntityId,
    users: BTreeMap<EntityId, String>,
    datasets: BTreeMap<EntityId, DatasetRow>,
    places: BTreeMap<EntityId, PlaceRow>,
    sets: BTreeMap<EntityId, SetRow>,
    submissions: BTreeMap<EntityId, SubmissionRow>,
    attachments: BTreeMap<EntityId, AttachmentRow>,
    actions: BTreeMap<EntityId, ActionRow>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of read queries served since creation or the last reset.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset_read_count(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }

    fn tables(&self, op: &'static str) -> std::sync::MutexGuard<'_, Tables> {
        mutex_lock(&self.tables, SOURCE, op)
    }

    fn read(&self, op: &'static str) -> std::sync::MutexGuard<'_, Tables> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.tables(op)
    }

    /// Returns the account named `username`, creating it on first use.
    pub fn ensure_user(&self, username: &str) -> Result<UserAccount, StoreError> {
        validate_slug("username", username)?;
        let mut tables = self.tables("ensure_user");
        if let Some((&id, _)) = tables.users.iter().find(|(_, name)| *name == username) {
            return Ok(UserAccount {
                id,
                username: username.to_string(),
            });
        }
        let id = tables.allocate();
        tables.users.insert(id, username.to_string());
        Ok(UserAccount {
            id,
            username: username.to_string(),
        })
    }

    pub fn create_dataset(
        &self,
        owner: &str,
        slug: &str,
        display_name: &str,
    ) -> Result<Dataset, StoreError> {
        validate_slug("dataset slug", slug)?;
        let owner = self.ensure_user(owner)?;
        let mut tables = self.tables("create_dataset");
        let taken = tables
            .datasets
            .values()
            .any(|row| row.owner_id == owner.id && row.slug == slug);
        if taken {
            return Err(StoreError::Duplicate {
                constraint: "dataset_owner_slug",
            });
        }
        let id = tables.allocate();
        tables.datasets.insert(
            id,
            DatasetRow {
                slug: slug.to_string(),
                display_name: display_name.to_string(),
                owner_id: owner.id,
            },
        );
        tables.dataset(id)
    }

    pub fn dataset_by_slug(&self, owner: &str, slug: &str) -> Result<Dataset, StoreError> {
        let tables = self.read("dataset_by_slug");
        let id = tables
            .datasets
            .iter()
            .find(|(_, row)| {
                row.slug == slug && tables.users.get(&row.owner_id).map(String::as_str) == Some(owner)
            })
            .map(|(&id, _)| id)
            .ok_or_else(|| StoreError::not_found("dataset"))?;
        tables.dataset(id)
    }

    pub fn update_dataset(&self, id: EntityId, display_name: &str) -> Result<Dataset, StoreError> {
        let mut tables = self.tables("update_dataset");
        let row = tables
            .datasets
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("dataset"))?;
        row.display_name = display_name.to_string();
        tables.dataset(id)
    }

    pub fn create_place(
        &self,
        dataset_id: EntityId,
        title: &str,
        visible: bool,
    ) -> Result<Place, StoreError> {
        let mut tables = self.tables("create_place");
        if !tables.datasets.contains_key(&dataset_id) {
            return Err(StoreError::not_found("dataset"));
        }
        let id = tables.allocate();
        tables.places.insert(
            id,
            PlaceRow {
                title: title.to_string(),
                visible,
                dataset_id,
            },
        );
        tables.place(id)
    }

    pub fn place(&self, id: EntityId) -> Result<Place, StoreError> {
        self.read("place").place(id)
    }

    pub fn places_in_dataset(
        &self,
        dataset_id: EntityId,
        include_invisible: bool,
    ) -> Result<Vec<Place>, StoreError> {
        let tables = self.read("places_in_dataset");
        tables
            .places
            .iter()
            .filter(|(_, row)| row.dataset_id == dataset_id && (include_invisible || row.visible))
            .map(|(&id, _)| tables.place(id))
            .collect()
    }

    pub fn update_place(
        &self,
        id: EntityId,
        title: Option<&str>,
        visible: Option<bool>,
    ) -> Result<Place, StoreError> {
        let mut tables = self.tables("update_place");
        let row = tables
            .places
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("place"))?;
        if let Some(title) = title {
            row.title = title.to_string();
        }
        if let Some(visible) = visible {
            row.visible = visible;
        }
        tables.place(id)
    }

    /// Deletes a place with its submission sets, submissions and attachments.
    /// Returns snapshots of every removed row, taken before the delete.
    pub fn delete_place(&self, id: EntityId) -> Result<DeletedPlace, StoreError> {
        let mut tables = self.tables("delete_place");
        let place = tables.place(id)?;

        let set_ids: Vec<EntityId> = tables
            .sets
            .iter()
            .filter(|(_, row)| row.place_id == id)
            .map(|(&set_id, _)| set_id)
            .collect();
        let submission_ids: Vec<EntityId> = tables
            .submissions
            .iter()
            .filter(|(_, row)| set_ids.contains(&row.set_id))
            .map(|(&submission_id, _)| submission_id)
            .collect();
        let attachment_ids: Vec<EntityId> = tables
            .attachments
            .iter()
            .filter(|(_, row)| match row.thing {
                ThingRef::Place(place_id) => place_id == id,
                ThingRef::Submission(submission_id) => submission_ids.contains(&submission_id),
            })
            .map(|(&attachment_id, _)| attachment_id)
            .collect();

        let deleted = DeletedPlace {
            sets: set_ids
                .iter()
                .map(|&set_id| tables.submission_set(set_id))
                .collect::<Result<_, _>>()?,
            submissions: submission_ids
                .iter()
                .map(|&submission_id| tables.submission(submission_id))
                .collect::<Result<_, _>>()?,
            attachments: attachment_ids
                .iter()
                .map(|&attachment_id| tables.attachment(attachment_id))
                .collect::<Result<_, _>>()?,
            place,
        };

        tables
            .attachments
            .retain(|attachment_id, _| !attachment_ids.contains(attachment_id));
        tables
            .submissions
            .retain(|submission_id, _| !submission_ids.contains(submission_id));
        tables.sets.retain(|_, row| row.place_id != id);
        tables.places.remove(&id);
        Ok(deleted)
    }

    /// Returns the set called `name` on the place, creating it on first use.
    pub fn ensure_submission_set(
        &self,
        place_id: EntityId,
        name: &str,
    ) -> Result<(SubmissionSet, bool), StoreError> {
        validate_slug("submission set name", name)?;
        let mut tables = self.tables("ensure_submission_set");
        if !tables.places.contains_key(&place_id) {
            return Err(StoreError::not_found("place"));
        }
        let existing = tables
            .sets
            .iter()
            .find(|(_, row)| row.place_id == place_id && row.name == name)
            .map(|(&id, _)| id);
        match existing {
            Some(id) => Ok((tables.submission_set(id)?, false)),
            None => {
                let id = tables.allocate();
                tables.sets.insert(
                    id,
                    SetRow {
                        name: name.to_string(),
                        place_id,
                    },
                );
                Ok((tables.submission_set(id)?, true))
            }
        }
    }

    pub fn create_submission(
        &self,
        set_id: EntityId,
        body: &str,
        visible: bool,
    ) -> Result<Submission, StoreError> {
        let mut tables = self.tables("create_submission");
        if !tables.sets.contains_key(&set_id) {
            return Err(StoreError::not_found("submission set"));
        }
        let id = tables.allocate();
        tables.submissions.insert(
            id,
            SubmissionRow {
                body: body.to_string(),
                visible,
                set_id,
            },
        );
        tables.submission(id)
    }

    /// Submissions on a place, optionally restricted to one set name.
    pub fn submissions_for_place(
        &self,
        place_id: EntityId,
        set_name: Option<&str>,
        include_invisible: bool,
    ) -> Result<Vec<Submission>, StoreError> {
        let tables = self.read("submissions_for_place");
        tables
            .submissions
            .iter()
            .filter(|(_, row)| include_invisible || row.visible)
            .filter(|(_, row)| {
                tables.sets.get(&row.set_id).is_some_and(|set| {
                    set.place_id == place_id && set_name.is_none_or(|name| set.name == name)
                })
            })
            .map(|(&id, _)| tables.submission(id))
            .collect()
    }

    /// Submission set names on each place of a dataset, with visible submission counts.
    pub fn submission_set_summaries(
        &self,
        dataset_id: EntityId,
    ) -> Result<BTreeMap<EntityId, BTreeMap<String, usize>>, StoreError> {
        let tables = self.read("submission_set_summaries");
        let mut summaries: BTreeMap<EntityId, BTreeMap<String, usize>> = BTreeMap::new();
        for (set_id, set) in &tables.sets {
            let in_dataset = tables
                .places
                .get(&set.place_id)
                .is_some_and(|place| place.dataset_id == dataset_id);
            if !in_dataset {
                continue;
            }
            let count = tables
                .submissions
                .values()
                .filter(|row| row.set_id == *set_id && row.visible)
                .count();
            summaries
                .entry(set.place_id)
                .or_default()
                .insert(set.name.clone(), count);
        }
        Ok(summaries)
    }

    pub fn create_attachment(
        &self,
        thing: ThingRef,
        name: &str,
        file_url: &str,
    ) -> Result<Attachment, StoreError> {
        let mut tables = self.tables("create_attachment");
        let exists = match thing {
            ThingRef::Place(id) => tables.places.contains_key(&id),
            ThingRef::Submission(id) => tables.submissions.contains_key(&id),
        };
        if !exists {
            return Err(StoreError::not_found("attachment target"));
        }
        let id = tables.allocate();
        tables.attachments.insert(
            id,
            AttachmentRow {
                name: name.to_string(),
                file_url: file_url.to_string(),
                thing,
            },
        );
        tables.attachment(id)
    }

    /// Every attachment on any place or submission of a dataset.
    pub fn attachments_in_dataset(&self, dataset_id: EntityId) -> Result<Vec<Attachment>, StoreError> {
        let tables = self.read("attachments_in_dataset");
        let mut attachments = Vec::new();
        for &id in tables.attachments.keys() {
            let attachment = tables.attachment(id)?;
            if attachment.target.dataset().id == dataset_id {
                attachments.push(attachment);
            }
        }
        Ok(attachments)
    }

    pub fn record_action(
        &self,
        dataset_id: EntityId,
        action: &str,
        thing_id: EntityId,
    ) -> Result<Action, StoreError> {
        let mut tables = self.tables("record_action");
        if !tables.datasets.contains_key(&dataset_id) {
            return Err(StoreError::not_found("dataset"));
        }
        let id = tables.allocate();
        tables.actions.insert(
            id,
            ActionRow {
                action: action.to_string(),
                thing_id,
                dataset_id,
            },
        );
        tables.action(id)
    }

    /// Actions of a dataset, newest first.
    pub fn actions_in_dataset(&self, dataset_id: EntityId) -> Result<Vec<Action>, StoreError> {
        let tables = self.read("actions_in_dataset");
        tables
            .actions
            .iter()
            .rev()
            .filter(|(_, row)| row.dataset_id == dataset_id)
            .map(|(&id, _)| tables.action(id))
            .collect()
    }
}

impl Tables {
    fn allocate(&mut self) -> EntityId {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: EntityId) -> Result<UserAccount, StoreError> {
        let username = self.users.get(&id).ok_or_else(|| StoreError::not_found("user"))?;
        Ok(UserAccount {
            id,
            username: username.clone(),
        })
    }

    fn dataset(&self, id: EntityId) -> Result<Dataset, StoreError> {
        let row = self
            .datasets
            .get(&id)
            .ok_or_else(|| StoreError::not_found("dataset"))?;
        Ok(Dataset {
            id,
            slug: row.slug.clone(),
            display_name: row.display_name.clone(),
            owner: self.user(row.owner_id)?,
        })
    }

    fn place(&self, id: EntityId) -> Result<Place, StoreError> {
        let row = self.places.get(&id).ok_or_else(|| StoreError::not_found("place"))?;
        Ok(Place {
            id,
            title: row.title.clone(),
            visible: row.visible,
            dataset: self.dataset(row.dataset_id)?,
        })
    }

    fn submission_set(&self, id: EntityId) -> Result<SubmissionSet, StoreError> {
        let row = self
            .sets
            .get(&id)
            .ok_or_else(|| StoreError::not_found("submission set"))?;
        Ok(SubmissionSet {
            id,
            name: row.name.clone(),
            place: self.place(row.place_id)?,
        })
    }

    fn submission(&self, id: EntityId) -> Result<Submission, StoreError> {
        let row = self
            .submissions
            .get(&id)
            .ok_or_else(|| StoreError::not_found("submission"))?;
        Ok(Submission {
            id,
            body: row.body.clone(),
            visible: row.visible,
            set: self.submission_set(row.set_id)?,
        })
    }

    fn attachment(&self, id: EntityId) -> Result<Attachment, StoreError> {
        let row = self
            .attachments
            .get(&id)
            .ok_or_else(|| StoreError::not_found("attachment"))?;
        let target = match row.thing {
            ThingRef::Place(place_id) => AttachmentTarget::Place(self.place(place_id)?),
            ThingRef::Submission(submission_id) => {
                AttachmentTarget::Submission(self.submission(submission_id)?)
            }
        };
        Ok(Attachment {
            id,
            name: row.name.clone(),
            file_url: row.file_url.clone(),
            target,
        })
    }

    fn action(&self, id: EntityId) -> Result<Action, StoreError> {
        let row = self
            .actions
            .get(&id)
            .ok_or_else(|| StoreError::not_found("action"))?;
        Ok(Action {
            id,
            action: row.action.clone(),
            thing_id: row.thing_id,
            dataset: self.dataset(row.dataset_id)?,
        })
    }
}

/// Names that appear as URL path segments must be slugs, so the path a
/// client requests and the path the cache reverses are the same string.
fn validate_slug(what: &str, value: &str) -> Result<(), StoreError> {
    let valid = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::invalid(format!("`{value}` is not a valid {what}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (MemoryStore, Place) {
        let store = MemoryStore::new();
        let dataset = store.create_dataset("alice", "trees", "Trees").unwrap();
        let place = store.create_place(dataset.id, "Oak", true).unwrap();
        (store, place)
    }

    #[test]
    fn reads_join_parents_and_are_counted() {
        let (store, place) = seeded();
        assert_eq!(store.read_count(), 0);

        let loaded = store.place(place.id).unwrap();
        assert_eq!(loaded.dataset.owner.username, "alice");
        assert_eq!(loaded.dataset.slug, "trees");
        assert_eq!(store.read_count(), 1);
    }

    #[test]
    fn duplicate_slug_per_owner_is_rejected() {
        let store = MemoryStore::new();
        store.create_dataset("alice", "trees", "Trees").unwrap();
        let err = store.create_dataset("alice", "trees", "Again").unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        store.create_dataset("bob", "trees", "Bob's trees").unwrap();
    }

    #[test]
    fn submission_sets_are_created_once() {
        let (store, place) = seeded();
        let (first, created) = store.ensure_submission_set(place.id, "comments").unwrap();
        assert!(created);
        let (again, created) = store.ensure_submission_set(place.id, "comments").unwrap();
        assert!(!created);
        assert_eq!(first.id, again.id);
    }

    #[test]
    fn deleting_a_place_removes_dependents() {
        let (store, place) = seeded();
        let (set, _) = store.ensure_submission_set(place.id, "comments").unwrap();
        let submission = store.create_submission(set.id, "nice", true).unwrap();
        store
            .create_attachment(ThingRef::Submission(submission.id), "a.jpg", "/media/a.jpg")
            .unwrap();
        store
            .create_attachment(ThingRef::Place(place.id), "b.jpg", "/media/b.jpg")
            .unwrap();

        let deleted = store.delete_place(place.id).unwrap();
        assert_eq!(deleted.place.id, place.id);
        assert_eq!(deleted.sets, vec![set]);
        assert_eq!(deleted.submissions, vec![submission]);
        assert_eq!(deleted.attachments.len(), 2);
        assert_eq!(store.place(place.id), Err(StoreError::not_found("place")));
        assert!(store.attachments_in_dataset(place.dataset.id).unwrap().is_empty());
        assert!(store.submission_set_summaries(place.dataset.id).unwrap().is_empty());
    }

    #[test]
    fn path_segments_must_be_slugs() {
        let (store, place) = seeded();
        for name in ["my notes", "", "caf\u{e9}", "a/b"] {
            assert!(matches!(
                store.ensure_submission_set(place.id, name),
                Err(StoreError::InvalidInput { .. })
            ));
        }
        assert!(store.ensure_user("bob smith").is_err());
        assert!(store.create_dataset("alice", "street trees", "Trees").is_err());
        assert!(store.ensure_submission_set(place.id, "field-notes_2").is_ok());
    }

    #[test]
    fn invisible_rows_are_filtered_unless_requested() {
        let (store, place) = seeded();
        store.create_place(place.dataset.id, "Hidden", false).unwrap();
        assert_eq!(store.places_in_dataset(place.dataset.id, false).unwrap().len(), 1);
        assert_eq!(store.places_in_dataset(place.dataset.id, true).unwrap().len(), 2);
    }
}
