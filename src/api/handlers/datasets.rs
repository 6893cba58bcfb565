use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::api::error::ApiError;
use crate::api::middleware::Viewer;
use crate::api::models::{CreateDatasetRequest, DatasetView, DetailQuery, UpdateDatasetRequest};
use crate::api::state::ApiState;
use crate::cache::{Change, QueryFlags, RequestCache};

use super::{enabled, require_owner};

pub async fn create_dataset(
    State(state): State<ApiState>,
    Extension(cache): Extension<RequestCache>,
    Extension(viewer): Extension<Viewer>,
    Path(owner): Path<String>,
    Json(payload): Json<CreateDatasetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !viewer.owns(&owner) {
        return Err(ApiError::forbidden("datasets can only be created by their owner"));
    }

    let dataset = state
        .store
        .create_dataset(&owner, payload.slug.trim(), &payload.display_name)?;
    state
        .invalidator
        .invalidate(&cache, Change::Dataset(&dataset))
        .await;

    Ok((
        StatusCode::CREATED,
        Json(DatasetView::new(&state.routes, &dataset, 0)),
    ))
}

pub async fn dataset_detail(
    State(state): State<ApiState>,
    Extension(cache): Extension<RequestCache>,
    Extension(viewer): Extension<Viewer>,
    Path((owner, slug)): Path<(String, String)>,
    Query(query): Query<DetailQuery>,
) -> Result<Json<DatasetView>, ApiError> {
    let include_invisible = enabled(query.include_invisible.as_deref());
    require_owner(&viewer, &owner, include_invisible)?;

    let dataset = state.store.dataset_by_slug(&owner, &slug)?;
    let flags = QueryFlags::new().with("include_invisible", include_invisible);
    let (store, routes, snapshot) = (&state.store, &state.routes, &dataset);
    let view = state
        .invalidator
        .current()
        .datasets
        .serialized_data(&cache, dataset.id, &flags, move || async move {
            let places = store.places_in_dataset(snapshot.id, include_invisible)?;
            Ok::<_, ApiError>(DatasetView::new(routes, snapshot, places.len()))
        })
        .await?;

    Ok(Json(view))
}

pub async fn update_dataset(
    State(state): State<ApiState>,
    Extension(cache): Extension<RequestCache>,
    Extension(viewer): Extension<Viewer>,
    Path((owner, slug)): Path<(String, String)>,
    Json(payload): Json<UpdateDatasetRequest>,
) -> Result<Json<DatasetView>, ApiError> {
    if !viewer.owns(&owner) {
        return Err(ApiError::forbidden("datasets can only be changed by their owner"));
    }

    let current = state.store.dataset_by_slug(&owner, &slug)?;
    let dataset = state
        .store
        .update_dataset(current.id, &payload.display_name)?;
    state
        .invalidator
        .invalidate(&cache, Change::Dataset(&dataset))
        .await;

    let places = state.store.places_in_dataset(dataset.id, false)?;
    Ok(Json(DatasetView::new(&state.routes, &dataset, places.len())))
}
