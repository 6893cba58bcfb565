use axum::Json;
use axum::extract::{Extension, Path, State};
use tracing::debug;

use crate::api::error::ApiError;
use crate::api::models::ActionView;
use crate::api::state::ApiState;
use crate::cache::{ACTION_KEYS, RequestCache, action_list_key};

/// Activity stream of a dataset, newest first.
///
/// The list is cached under `dataset:{id}:actions` and trusted only while that
/// key is a member of the global action meta-key, which every action write clears.
pub async fn list_actions(
    State(state): State<ApiState>,
    Extension(cache): Extension<RequestCache>,
    Path((owner, slug)): Path<(String, String)>,
) -> Result<Json<Vec<ActionView>>, ApiError> {
    let dataset = state.store.dataset_by_slug(&owner, &slug)?;
    let key = action_list_key(dataset.id);

    let mut members = cache.get_key_set(ACTION_KEYS).await.unwrap_or_default();
    if members.contains(&key) {
        if let Some(cached) = cache.get::<Vec<ActionView>>(&key).await {
            debug!(cache = "actions", outcome = "hit", key = %key);
            return Ok(Json(cached));
        }
    }

    let views: Vec<ActionView> = state
        .store
        .actions_in_dataset(dataset.id)?
        .iter()
        .map(|action| ActionView::new(&state.routes, action))
        .collect();

    cache.set(key.clone(), &views);
    members.insert(key);
    cache.set(ACTION_KEYS, &members);
    Ok(Json(views))
}
