use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::api::error::ApiError;
use crate::api::middleware::Viewer;
use crate::api::models::{
    AttachmentView, CreateAttachmentRequest, CreatePlaceRequest, DetailQuery, PlaceView,
    SubmissionView, UpdatePlaceRequest,
};
use crate::api::state::ApiState;
use crate::cache::{CacheSession, Change, QueryFlags, RequestCache};
use crate::domain::EntityId;
use crate::infra::store::ThingRef;

use super::{attachments_by_thing, enabled, place_params, require_owner, submission_sets_by_place};

fn require_writer(viewer: &Viewer, owner: &str) -> Result<(), ApiError> {
    if viewer.owns(owner) {
        Ok(())
    } else {
        Err(ApiError::forbidden("places can only be changed by the dataset owner"))
    }
}

pub async fn create_place(
    State(state): State<ApiState>,
    Extension(cache): Extension<RequestCache>,
    Extension(viewer): Extension<Viewer>,
    Path((owner, slug)): Path<(String, String)>,
    Json(payload): Json<CreatePlaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_writer(&viewer, &owner)?;

    let dataset = state.store.dataset_by_slug(&owner, &slug)?;
    let place = state
        .store
        .create_place(dataset.id, &payload.title, payload.visible)?;
    let action = state.store.record_action(dataset.id, "create", place.id)?;

    state.invalidator.invalidate(&cache, Change::Place(&place)).await;
    state.invalidator.invalidate(&cache, Change::Action(&action)).await;

    let view = PlaceView::new(&state.routes, &place, Vec::new(), &BTreeMap::new());
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn place_detail(
    State(state): State<ApiState>,
    Extension(cache): Extension<RequestCache>,
    Extension(viewer): Extension<Viewer>,
    Path((owner, slug, place_id)): Path<(String, String, EntityId)>,
    Query(query): Query<DetailQuery>,
) -> Result<Json<PlaceView>, ApiError> {
    let include_invisible = enabled(query.include_invisible.as_deref());
    let include_submissions = enabled(query.include_submissions.as_deref());
    require_owner(&viewer, &owner, include_invisible)?;

    place_params(&state, &cache, &owner, &slug, place_id).await?;

    let flags = QueryFlags::new()
        .with("include_invisible", include_invisible)
        .with("include_submissions", include_submissions);
    let state_ref: &ApiState = &state;
    let session: &CacheSession = &cache;
    let view = state
        .invalidator
        .current()
        .places
        .serialized_data(session, place_id, &flags, move || {
            render_place(state_ref, session, place_id, include_invisible, include_submissions)
        })
        .await?;

    Ok(Json(view))
}

pub async fn update_place(
    State(state): State<ApiState>,
    Extension(cache): Extension<RequestCache>,
    Extension(viewer): Extension<Viewer>,
    Path((owner, slug, place_id)): Path<(String, String, EntityId)>,
    Json(payload): Json<UpdatePlaceRequest>,
) -> Result<Json<PlaceView>, ApiError> {
    require_writer(&viewer, &owner)?;
    let params = place_params(&state, &cache, &owner, &slug, place_id).await?;

    let place = state
        .store
        .update_place(place_id, payload.title.as_deref(), payload.visible)?;
    let action = state
        .store
        .record_action(params.dataset.dataset_id, "update", place.id)?;

    state.invalidator.invalidate(&cache, Change::Place(&place)).await;
    state.invalidator.invalidate(&cache, Change::Action(&action)).await;

    let view = render_place(&state, &cache, place_id, true, false).await?;
    Ok(Json(view))
}

pub async fn delete_place(
    State(state): State<ApiState>,
    Extension(cache): Extension<RequestCache>,
    Extension(viewer): Extension<Viewer>,
    Path((owner, slug, place_id)): Path<(String, String, EntityId)>,
) -> Result<StatusCode, ApiError> {
    require_writer(&viewer, &owner)?;
    let params = place_params(&state, &cache, &owner, &slug, place_id).await?;

    let deleted = state.store.delete_place(place_id)?;
    let action = state
        .store
        .record_action(params.dataset.dataset_id, "delete", deleted.place.id)?;

    // Children first: clearing a child derives its parent's params again.
    for attachment in &deleted.attachments {
        state
            .invalidator
            .invalidate(&cache, Change::Attachment(attachment))
            .await;
    }
    for submission in &deleted.submissions {
        state
            .invalidator
            .invalidate(&cache, Change::Submission(submission))
            .await;
    }
    for set in &deleted.sets {
        state
            .invalidator
            .invalidate(&cache, Change::SubmissionSet(set))
            .await;
    }
    state
        .invalidator
        .invalidate(&cache, Change::Place(&deleted.place))
        .await;
    state.invalidator.invalidate(&cache, Change::Action(&action)).await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_attachment(
    State(state): State<ApiState>,
    Extension(cache): Extension<RequestCache>,
    Extension(viewer): Extension<Viewer>,
    Path((owner, slug, place_id)): Path<(String, String, EntityId)>,
    Json(payload): Json<CreateAttachmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_writer(&viewer, &owner)?;
    place_params(&state, &cache, &owner, &slug, place_id).await?;

    let attachment = state.store.create_attachment(
        ThingRef::Place(place_id),
        &payload.name,
        &payload.file_url,
    )?;
    state
        .invalidator
        .invalidate(&cache, Change::Attachment(&attachment))
        .await;

    Ok((StatusCode::CREATED, Json(AttachmentView::from(&attachment))))
}

/// Builds the full representation of one place from storage and the dataset aggregates.
async fn render_place(
    state: &ApiState,
    cache: &CacheSession,
    place_id: EntityId,
    include_invisible: bool,
    include_submissions: bool,
) -> Result<PlaceView, ApiError> {
    let place = state.store.place(place_id)?;
    if !place.visible && !include_invisible {
        return Err(ApiError::not_found("place not found"));
    }

    let dataset_id = place.dataset.id;
    let attachments = attachments_by_thing(state, cache, dataset_id).await?;
    let sets = submission_sets_by_place(state, cache, dataset_id).await?;
    let no_sets = BTreeMap::new();

    let mut view = PlaceView::new(
        &state.routes,
        &place,
        attachments.get(&place.id).cloned().unwrap_or_default(),
        sets.get(&place.id).unwrap_or(&no_sets),
    );

    if include_submissions {
        let mut grouped: BTreeMap<String, Vec<SubmissionView>> = BTreeMap::new();
        for submission in state
            .store
            .submissions_for_place(place.id, None, include_invisible)?
        {
            let files = attachments.get(&submission.id).cloned().unwrap_or_default();
            grouped
                .entry(submission.set.name.clone())
                .or_default()
                .push(SubmissionView::new(&state.routes, &submission, files));
        }
        view.submissions = Some(grouped);
    }

    Ok(view)
}
