//! Demo REST API served under the current API root.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::cache::{ResponseCacheState, response_cache_layer};

/// Routes are registered with the full root so the paths the response cache
/// sees match what [`Routes`](crate::routes::Routes) reverses.
pub fn build_router(state: ApiState, cache: ResponseCacheState) -> Router {
    let root = state.routes.root().to_string();
    let datasets = format!("{root}/{{owner}}/datasets");
    let dataset = format!("{datasets}/{{dataset}}");
    let place = format!("{dataset}/places/{{place}}");

    Router::new()
        .route(&datasets, post(handlers::create_dataset))
        .route(
            &dataset,
            get(handlers::dataset_detail).patch(handlers::update_dataset),
        )
        .route(&format!("{dataset}/actions"), get(handlers::list_actions))
        .route(&format!("{dataset}/places"), post(handlers::create_place))
        .route(
            &place,
            get(handlers::place_detail)
                .patch(handlers::update_place)
                .delete(handlers::delete_place),
        )
        .route(
            &format!("{place}/attachments"),
            post(handlers::create_attachment),
        )
        .route(
            &format!("{place}/{{set}}"),
            get(handlers::list_submissions).post(handlers::create_submission),
        )
        .with_state(state.clone())
        .layer(axum_middleware::from_fn_with_state(
            cache,
            response_cache_layer,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::resolve_viewer,
        ))
        .layer(axum_middleware::from_fn(middleware::log_responses))
}
