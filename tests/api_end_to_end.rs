use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use placecache::api::{self, ApiState, middleware::VIEWER_HEADER};
use placecache::cache::{CacheClient, CacheConfig, Invalidator, MemoryBackend, ResponseCacheState};
use placecache::infra::store::MemoryStore;
use serde_json::{Value, json};
use tower::ServiceExt;

const OWNER: &str = "alice";
const DATASET: &str = "/api/v2/alice/datasets/trees";

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    backend: Arc<MemoryBackend>,
}

impl TestApp {
    fn new() -> Self {
        let config = CacheConfig::default();
        let backend = Arc::new(MemoryBackend::new());
        let client = CacheClient::new(backend.clone(), config.clone());
        let store = Arc::new(MemoryStore::new());
        let state = ApiState::new(store.clone(), Invalidator::new(&config));
        let router = api::build_router(state, ResponseCacheState { client });
        Self {
            router,
            store,
            backend,
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        viewer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(viewer) = viewer {
            builder = builder.header(VIEWER_HEADER, viewer);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request should build"),
            None => builder.body(Body::empty()).expect("request should build"),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should buffer");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("body should be json")
        };
        (status, value)
    }

    async fn get(&self, uri: &str, viewer: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, viewer, None).await
    }

    /// Creates `alice/trees` with one visible place and returns the place id.
    async fn seed(&self) -> i64 {
        let (status, _) = self
            .send(
                Method::POST,
                "/api/v2/alice/datasets",
                Some(OWNER),
                Some(json!({ "slug": "trees", "display_name": "Trees" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, place) = self
            .send(
                Method::POST,
                &format!("{DATASET}/places"),
                Some(OWNER),
                Some(json!({ "title": "Oak" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        place["id"].as_i64().expect("place id")
    }
}

#[tokio::test]
async fn place_detail_is_cached_until_an_attachment_is_added() {
    let app = TestApp::new();
    let place_id = app.seed().await;
    let uri = format!("{DATASET}/places/{place_id}");

    app.store.reset_read_count();
    let (status, first) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.store.read_count() > 0);
    assert_eq!(first["attachments"], json!([]));

    app.store.reset_read_count();
    let (status, second) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.read_count(), 0);
    assert_eq!(second, first);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("{uri}/attachments"),
            Some(OWNER),
            Some(json!({ "name": "bark.jpg", "file_url": "/media/bark.jpg" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    app.store.reset_read_count();
    let (status, third) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.store.read_count() > 0);
    assert_eq!(third["attachments"][0]["name"], "bark.jpg");
}

#[tokio::test]
async fn both_dataset_variants_are_invalidated_by_a_new_place() {
    let app = TestApp::new();
    app.seed().await;
    let with_invisible = format!("{DATASET}?include_invisible");

    let (_, public) = app.get(DATASET, None).await;
    let (_, private) = app.get(&with_invisible, Some(OWNER)).await;
    assert_eq!(public["places"]["length"], 1);
    assert_eq!(private["places"]["length"], 1);
    let dataset_id = public["id"].as_i64().expect("dataset id");
    assert!(
        app.backend
            .contains(&format!("dataset:{dataset_id}:include_invisible=true"))
    );

    let (status, _) = app
        .send(
            Method::POST,
            &format!("{DATASET}/places"),
            Some(OWNER),
            Some(json!({ "title": "Hidden", "visible": false })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(
        !app.backend
            .contains(&format!("dataset:{dataset_id}:include_invisible=false"))
    );
    assert!(
        !app.backend
            .contains(&format!("dataset:{dataset_id}:include_invisible=true"))
    );

    app.store.reset_read_count();
    let (_, public) = app.get(DATASET, None).await;
    assert_eq!(public["places"]["length"], 1);
    assert!(app.store.read_count() > 0);

    let (_, private) = app.get(&with_invisible, Some(OWNER)).await;
    assert_eq!(private["places"]["length"], 2);
}

#[tokio::test]
async fn invisible_variants_are_restricted_to_the_owner() {
    let app = TestApp::new();
    let place_id = app.seed().await;

    let (status, body) = app
        .get(&format!("{DATASET}/places/{place_id}?include_invisible"), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");

    let (status, _) = app
        .get(&format!("{DATASET}/places/{place_id}?include_invisible"), Some("bob"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn place_addressed_under_the_wrong_dataset_is_not_found() {
    let app = TestApp::new();
    let place_id = app.seed().await;

    let (status, _) = app.get(&format!("{DATASET}/places/{place_id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    app.store.reset_read_count();
    let (status, _) = app
        .get(&format!("/api/v2/bob/datasets/trees/places/{place_id}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.store.read_count(), 0);
}

#[tokio::test]
async fn submissions_refresh_place_lists_and_activity() {
    let app = TestApp::new();
    let place_id = app.seed().await;
    let place_uri = format!("{DATASET}/places/{place_id}");
    let with_submissions = format!("{place_uri}?include_submissions");

    let (_, actions) = app.get(&format!("{DATASET}/actions"), None).await;
    assert_eq!(actions.as_array().map(Vec::len), Some(1));
    let (_, listed) = app.get(&format!("{place_uri}/comments"), None).await;
    assert_eq!(listed, json!([]));
    let (_, detail) = app.get(&with_submissions, None).await;
    assert_eq!(detail["submissions"], json!({}));

    let (status, created) = app
        .send(
            Method::POST,
            &format!("{place_uri}/comments"),
            None,
            Some(json!({ "body": "Lovely shade" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["set_name"], "comments");

    let (_, actions) = app.get(&format!("{DATASET}/actions"), None).await;
    assert_eq!(actions.as_array().map(Vec::len), Some(2));
    assert_eq!(actions[0]["thing_id"], created["id"]);

    let (_, listed) = app.get(&format!("{place_uri}/comments"), None).await;
    assert_eq!(listed[0]["body"], "Lovely shade");
    let (_, everything) = app.get(&format!("{place_uri}/submissions"), None).await;
    assert_eq!(everything.as_array().map(Vec::len), Some(1));

    let (_, detail) = app.get(&with_submissions, None).await;
    assert_eq!(detail["submissions"]["comments"][0]["body"], "Lovely shade");
    assert_eq!(detail["submission_sets"]["comments"]["length"], 1);
}

#[tokio::test]
async fn generic_submission_set_cannot_be_written() {
    let app = TestApp::new();
    let place_id = app.seed().await;

    let (status, _) = app
        .send(
            Method::POST,
            &format!("{DATASET}/places/{place_id}/submissions"),
            None,
            Some(json!({ "body": "hello" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn updates_and_deletes_reach_cached_readers() {
    let app = TestApp::new();
    let place_id = app.seed().await;
    let uri = format!("{DATASET}/places/{place_id}");

    let (_, before) = app.get(&uri, None).await;
    assert_eq!(before["title"], "Oak");

    let (status, updated) = app
        .send(
            Method::PATCH,
            &uri,
            Some(OWNER),
            Some(json!({ "title": "Old oak" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Old oak");

    let (_, after) = app.get(&uri, None).await;
    assert_eq!(after["title"], "Old oak");

    let (status, _) = app
        .send(
            Method::POST,
            &format!("{uri}/comments"),
            None,
            Some(json!({ "body": "Acorns everywhere" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app.send(Method::DELETE, &uri, Some(OWNER), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!app.backend.contains(&format!("place:{place_id}")));

    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_place_clears_its_submission_lists() {
    let app = TestApp::new();
    let place_id = app.seed().await;
    let uri = format!("{DATASET}/places/{place_id}");

    let (status, _) = app
        .send(
            Method::POST,
            &format!("{uri}/comments"),
            None,
            Some(json!({ "body": "hi" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    for list in ["comments", "submissions"] {
        let (status, listed) = app.get(&format!("{uri}/{list}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed[0]["body"], "hi");
    }

    let (status, _) = app.send(Method::DELETE, &uri, Some(OWNER), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    for list in ["comments", "submissions"] {
        let (status, _) = app.get(&format!("{uri}/{list}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{list} survived the delete");
    }
}

#[tokio::test]
async fn set_names_must_be_slugs() {
    let app = TestApp::new();
    let place_id = app.seed().await;

    let (status, body) = app
        .send(
            Method::POST,
            &format!("{DATASET}/places/{place_id}/my%20notes"),
            None,
            Some(json!({ "body": "hello" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_input");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v2/bob%20smith/datasets",
            Some("bob smith"),
            Some(json!({ "slug": "trees", "display_name": "Trees" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn encoded_paths_see_new_submissions() {
    let app = TestApp::new();
    let place_id = app.seed().await;
    let uri = format!("{DATASET}/places/{place_id}");
    let encoded = format!("{uri}/comm%65nts");

    for (n, body) in ["first", "second"].into_iter().enumerate() {
        let (status, _) = app
            .send(
                Method::POST,
                &format!("{uri}/comments"),
                None,
                Some(json!({ "body": body })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, listed) = app.get(&encoded, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().map(Vec::len), Some(n + 1));
    }
    assert!(!app.backend.keys().iter().any(|key| key.contains('%')));
}

#[tokio::test]
async fn writes_require_the_owner() {
    let app = TestApp::new();
    let place_id = app.seed().await;

    let (status, _) = app
        .send(
            Method::PATCH,
            &format!("{DATASET}/places/{place_id}"),
            Some("bob"),
            Some(json!({ "title": "Mine now" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::PATCH,
            DATASET,
            None,
            Some(json!({ "display_name": "Shrubs" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn dataset_rename_is_visible_immediately() {
    let app = TestApp::new();
    app.seed().await;

    let (_, before) = app.get(DATASET, None).await;
    assert_eq!(before["display_name"], "Trees");

    let (status, _) = app
        .send(
            Method::PATCH,
            DATASET,
            Some(OWNER),
            Some(json!({ "display_name": "Street trees" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, after) = app.get(DATASET, None).await;
    assert_eq!(after["display_name"], "Street trees");
}
