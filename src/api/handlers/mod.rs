//! Demo API handlers.
//!
//! Reads go through the entity caches; every successful write hands the
//! written entities to the invalidator before returning. The response cache
//! middleware flushes the staged deletes once the handler is done.

mod actions;
mod datasets;
mod places;
mod submissions;

pub use actions::list_actions;
pub use datasets::{create_dataset, dataset_detail, update_dataset};
pub use places::{create_attachment, create_place, delete_place, place_detail, update_place};
pub use submissions::{create_submission, list_submissions};

use std::sync::Arc;

use crate::cache::{CacheSession, PlaceParams, attachments_key, submission_sets_key, verify_path};
use crate::domain::EntityId;

use super::error::ApiError;
use super::middleware::Viewer;
use super::models::{AttachmentView, AttachmentsByThing, SubmissionSetsByPlace};
use super::state::ApiState;

/// Query flags are switched on by their presence, unless spelled `false` or `0`.
pub(crate) fn enabled(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(value) => !matches!(value.trim(), "false" | "0"),
    }
}

pub(crate) fn require_owner(viewer: &Viewer, owner: &str, flag: bool) -> Result<(), ApiError> {
    if flag && !viewer.owns(owner) {
        return Err(ApiError::forbidden(
            "include_invisible is restricted to the dataset owner",
        ));
    }
    Ok(())
}

/// Cached parameters of a place, checked against the URL it was addressed by.
pub(crate) async fn place_params(
    state: &ApiState,
    cache: &CacheSession,
    owner: &str,
    dataset: &str,
    place_id: EntityId,
) -> Result<PlaceParams, ApiError> {
    let store = Arc::clone(&state.store);
    let params = state
        .invalidator
        .current()
        .places
        .cached_instance_params(cache, place_id, || async move {
            store.place(place_id).map_err(ApiError::from)
        })
        .await?;

    let place = place_id.to_string();
    let args = [
        ("owner_username", owner),
        ("dataset_slug", dataset),
        ("place_id", place.as_str()),
    ];
    if !verify_path(&params, &args) {
        return Err(ApiError::not_found("place not found"));
    }
    Ok(params)
}

/// Dataset-wide attachments, read through `dataset:{id}:attachments-by-thing_id`.
pub(crate) async fn attachments_by_thing(
    state: &ApiState,
    cache: &CacheSession,
    dataset_id: EntityId,
) -> Result<AttachmentsByThing, ApiError> {
    let key = attachments_key(dataset_id);
    if let Some(cached) = cache.get::<AttachmentsByThing>(&key).await {
        return Ok(cached);
    }

    let mut grouped = AttachmentsByThing::new();
    for attachment in state.store.attachments_in_dataset(dataset_id)? {
        grouped
            .entry(attachment.target.thing_id())
            .or_default()
            .push(AttachmentView::from(&attachment));
    }
    cache.set(key, &grouped);
    Ok(grouped)
}

/// Dataset-wide submission set summaries, read through `dataset:{id}:submission_sets`.
pub(crate) async fn submission_sets_by_place(
    state: &ApiState,
    cache: &CacheSession,
    dataset_id: EntityId,
) -> Result<SubmissionSetsByPlace, ApiError> {
    let key = submission_sets_key(dataset_id);
    if let Some(cached) = cache.get::<SubmissionSetsByPlace>(&key).await {
        return Ok(cached);
    }

    let summaries = state.store.submission_set_summaries(dataset_id)?;
    cache.set(key, &summaries);
    Ok(summaries)
}
