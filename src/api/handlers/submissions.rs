use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::api::error::ApiError;
use crate::api::models::{CreateSubmissionRequest, SubmissionView};
use crate::api::state::ApiState;
use crate::cache::{Change, RequestCache};
use crate::domain::EntityId;
use crate::routes::GENERIC_SUBMISSION_SET;

use super::{attachments_by_thing, place_params};

/// Visible submissions of one set on a place; the generic set name lists every set.
pub async fn list_submissions(
    State(state): State<ApiState>,
    Extension(cache): Extension<RequestCache>,
    Path((owner, slug, place_id, set)): Path<(String, String, EntityId, String)>,
) -> Result<Json<Vec<SubmissionView>>, ApiError> {
    let params = place_params(&state, &cache, &owner, &slug, place_id).await?;
    let set_name = (set != GENERIC_SUBMISSION_SET).then_some(set.as_str());

    let submissions = state
        .store
        .submissions_for_place(place_id, set_name, false)?;
    let attachments = attachments_by_thing(&state, &cache, params.dataset.dataset_id).await?;

    let views = submissions
        .iter()
        .map(|submission| {
            let files = attachments.get(&submission.id).cloned().unwrap_or_default();
            SubmissionView::new(&state.routes, submission, files)
        })
        .collect();
    Ok(Json(views))
}

pub async fn create_submission(
    State(state): State<ApiState>,
    Extension(cache): Extension<RequestCache>,
    Path((owner, slug, place_id, set)): Path<(String, String, EntityId, String)>,
    Json(payload): Json<CreateSubmissionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if set == GENERIC_SUBMISSION_SET {
        return Err(ApiError::bad_request(
            "submissions must be posted to a named set",
            Some(format!("`{GENERIC_SUBMISSION_SET}` lists every set and cannot be written")),
        ));
    }
    let params = place_params(&state, &cache, &owner, &slug, place_id).await?;

    let (submission_set, created) = state.store.ensure_submission_set(place_id, &set)?;
    if created {
        state
            .invalidator
            .invalidate(&cache, Change::SubmissionSet(&submission_set))
            .await;
    }

    let submission = state
        .store
        .create_submission(submission_set.id, &payload.body, payload.visible)?;
    let action = state
        .store
        .record_action(params.dataset.dataset_id, "create", submission.id)?;

    state
        .invalidator
        .invalidate(&cache, Change::Submission(&submission))
        .await;
    state.invalidator.invalidate(&cache, Change::Action(&action)).await;

    Ok((
        StatusCode::CREATED,
        Json(SubmissionView::new(&state.routes, &submission, Vec::new())),
    ))
}
