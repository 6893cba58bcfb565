//! Response cache middleware.
//!
//! Opens a [`CacheSession`] for every request and flushes it exactly once when
//! the handler is done, whatever the method or outcome. GET responses are
//! cached under `{path}:{accept}:{query}:{groups}` and registered in the
//! path's meta-key; a stored response is served only while it is registered.

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::client::CacheClient;
use super::keys::response_key;
use super::metrics::{Layer, record_hit, record_miss};
use super::registry;
use super::session::CacheSession;

const MAX_CACHED_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Shared state for [`response_cache_layer`].
#[derive(Clone, Debug)]
pub struct ResponseCacheState {
    pub client: CacheClient,
}

/// The viewer's permission groups relative to the addressed dataset.
///
/// Inserted by the authentication layer; absent means anonymous.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewerGroups(pub String);

/// The request's cache session, available to handlers as an extension.
#[derive(Clone, Debug)]
pub struct RequestCache(pub Arc<CacheSession>);

impl std::ops::Deref for RequestCache {
    type Target = CacheSession;

    fn deref(&self) -> &CacheSession {
        &self.0
    }
}

/// A response as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Base64 of the body bytes.
    pub body: String,
}

#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(state): State<ResponseCacheState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let session = Arc::new(CacheSession::new(state.client.clone()));
    request
        .extensions_mut()
        .insert(RequestCache(Arc::clone(&session)));

    let method = request.method().clone();
    if !is_safe(&method) {
        let response = next.run(request).await;
        session.flush().await;
        return response;
    }

    let mut response = if method == Method::GET {
        serve_cached(&session, request, next).await
    } else {
        next.run(request).await
    };

    session.flush().await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

async fn serve_cached(session: &CacheSession, request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();
    // Invalidation reverses decoded paths, so an encoded one could never be cleared.
    if path.contains('%') {
        debug!(cache = "response", outcome = "bypass", "percent-encoded path is not cached");
        return next.run(request).await;
    }
    let accept = request
        .headers()
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();
    let query = request.uri().query().unwrap_or("").to_string();
    let groups = request
        .extensions()
        .get::<ViewerGroups>()
        .map(|groups| groups.0.clone())
        .unwrap_or_default();
    let key = response_key(&path, &accept, &query, &groups);

    if let Some(cached) = session.get::<CachedResponse>(&key).await {
        if registry::is_registered(session, &path, &key).await {
            if let Some(response) = build_response(&cached) {
                record_hit(Layer::Response);
                debug!(cache = "response", outcome = "hit", "serving cached response");
                return response;
            }
        } else {
            debug!(cache = "response", outcome = "unregistered", "ignoring unregistered entry");
        }
    }
    record_miss(Layer::Response);
    debug!(cache = "response", outcome = "miss", "cache miss, executing handler");

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }
    let size = response.body().size_hint().upper();
    if !size.is_some_and(|bytes| bytes <= MAX_CACHED_BODY_BYTES as u64) {
        debug!(cache = "response", outcome = "bypass", body_bytes = ?size, "response too large to cache");
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(cache = "response", error = %err, "failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let cached = CachedResponse {
        status: parts.status.as_u16(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect(),
        body: STANDARD.encode(&bytes),
    };
    session.set(key.clone(), &cached);
    registry::register(session, &path, &key).await;
    debug!(cache = "response", body_bytes = bytes.len(), "caching response");

    Response::from_parts(parts, Body::from(bytes))
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn build_response(cached: &CachedResponse) -> Option<Response> {
    let body = match STANDARD.decode(&cached.body) {
        Ok(body) => body,
        Err(err) => {
            warn!(cache = "response", error = %err, "cached body is not valid base64");
            return None;
        }
    };

    let mut builder = Response::builder().status(cached.status);
    for (name, value) in &cached.headers {
        if let Ok(value) = HeaderValue::from_str(value) {
            builder = builder.header(name.as_str(), value);
        }
    }
    builder.body(Body::from(body)).ok()
}
