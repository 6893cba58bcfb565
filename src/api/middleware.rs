use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};

use crate::cache::ViewerGroups;

use super::error::ErrorReport;
use super::state::ApiState;

/// Header naming the requesting user. Stands in for real authentication.
pub const VIEWER_HEADER: &str = "x-viewer";
/// Group granted to the owner of the addressed dataset.
pub const OWNERS_GROUP: &str = "__owners__";

/// Who is asking, as seen by the handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    pub username: Option<String>,
}

impl Viewer {
    pub fn owns(&self, owner: &str) -> bool {
        self.username.as_deref() == Some(owner)
    }
}

/// Resolves the viewer and their groups before the response cache runs, so
/// owners and anonymous users never share a cached response.
pub async fn resolve_viewer(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let viewer = Viewer {
        username: viewer_name(request.headers()),
    };
    let owner = request
        .uri()
        .path()
        .strip_prefix(state.routes.root())
        .and_then(|rest| rest.trim_start_matches('/').split('/').next())
        .filter(|segment| !segment.is_empty());
    if let Some(owner) = owner {
        if viewer.owns(owner) {
            request
                .extensions_mut()
                .insert(ViewerGroups(OWNERS_GROUP.to_string()));
        }
    }
    request.extensions_mut().insert(viewer);
    next.run(request).await
}

fn viewer_name(headers: &HeaderMap) -> Option<String> {
    headers
        .get(VIEWER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "placecache::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                "request failed",
            );
        } else {
            warn!(
                target = "placecache::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                "client request error",
            );
        }
    }

    response
}
