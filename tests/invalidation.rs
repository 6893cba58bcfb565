use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use placecache::cache::{
    CacheClient, CacheConfig, CacheSession, Change, Invalidator, MemoryBackend, QueryFlags,
    attachments_key, meta_key, register, submission_sets_key,
};
use placecache::domain::{
    Action, Attachment, AttachmentTarget, Dataset, Place, Submission, SubmissionSet, UserAccount,
};
use placecache::routes::Routes;

fn owner() -> UserAccount {
    UserAccount {
        id: 1,
        username: "alice".to_string(),
    }
}

fn dataset() -> Dataset {
    Dataset {
        id: 3,
        slug: "trees".to_string(),
        display_name: "Trees".to_string(),
        owner: owner(),
    }
}

fn place() -> Place {
    Place {
        id: 7,
        title: "Oak".to_string(),
        visible: true,
        dataset: dataset(),
    }
}

fn submission_set() -> SubmissionSet {
    SubmissionSet {
        id: 4,
        name: "comments".to_string(),
        place: place(),
    }
}

fn submission() -> Submission {
    Submission {
        id: 12,
        body: "Lovely shade".to_string(),
        visible: true,
        set: submission_set(),
    }
}

struct Harness {
    backend: Arc<MemoryBackend>,
    client: CacheClient,
    invalidator: Invalidator,
    current: Routes,
    legacy: Routes,
}

impl Harness {
    fn new() -> Self {
        let config = CacheConfig::default();
        let backend = Arc::new(MemoryBackend::new());
        let client = CacheClient::new(backend.clone(), config.clone());
        Self {
            backend,
            client,
            invalidator: Invalidator::new(&config),
            current: Routes::new("/api/v2"),
            legacy: Routes::new("/api/v1"),
        }
    }

    fn session(&self) -> CacheSession {
        CacheSession::new(self.client.clone())
    }

    /// Stores a response-like entry registered under `prefix`, the way the middleware does.
    async fn cache_response(&self, prefix: &str, key: &str) {
        let session = self.session();
        session.set(key, &"cached body");
        register(&session, prefix, key).await;
        session.flush().await;
    }

    async fn invalidate(&self, change: Change<'_>) {
        let session = self.session();
        self.invalidator.invalidate(&session, change).await;
        let report = session.flush().await;
        assert!(!report.degraded);
    }
}

#[tokio::test]
async fn repeated_reads_do_not_recompute() {
    let harness = Harness::new();
    let places = &harness.invalidator.current().places;
    let calls = AtomicUsize::new(0);
    let counter = &calls;
    let flags = QueryFlags::new().with("include_invisible", false);

    for _ in 0..3 {
        let session = harness.session();
        let value: String = places
            .serialized_data(&session, 7, &flags, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>("place 7".to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, "place 7");
        session.flush().await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(harness.backend.contains("place:7:include_invisible=false"));
    assert!(harness.backend.contains("place:7:_keys"));
}

async fn read_place_version(harness: &Harness, calls: &AtomicUsize) -> usize {
    let session = harness.session();
    let value: usize = harness
        .invalidator
        .current()
        .places
        .serialized_data(&session, 7, &QueryFlags::new(), move || async move {
            Ok::<_, Infallible>(calls.fetch_add(1, Ordering::SeqCst))
        })
        .await
        .unwrap();
    session.flush().await;
    value
}

#[tokio::test]
async fn change_forces_recompute_of_dependent_data() {
    let harness = Harness::new();
    let calls = AtomicUsize::new(0);

    assert_eq!(read_place_version(&harness, &calls).await, 0);
    assert_eq!(read_place_version(&harness, &calls).await, 0);

    harness.invalidate(Change::Place(&place())).await;

    assert_eq!(read_place_version(&harness, &calls).await, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn entries_outside_their_meta_key_are_ignored() {
    let harness = Harness::new();
    let datasets = &harness.invalidator.current().datasets;
    let flags = QueryFlags::new();

    let session = harness.session();
    let value: String = datasets
        .serialized_data(&session, 3, &flags, || async {
            Ok::<_, Infallible>("fresh".to_string())
        })
        .await
        .unwrap();
    assert_eq!(value, "fresh");
    session.flush().await;

    // The value survives but its meta-key is gone, as after a partial flush.
    let session = harness.session();
    session.delete_many(["dataset:3:_keys".to_string()]);
    session.flush().await;
    assert!(harness.backend.contains("dataset:3:"));

    let session = harness.session();
    let value: String = datasets
        .serialized_data(&session, 3, &flags, || async {
            Ok::<_, Infallible>("recomputed".to_string())
        })
        .await
        .unwrap();
    assert_eq!(value, "recomputed");
}

#[tokio::test]
async fn unregistered_response_keys_are_not_trusted() {
    let harness = Harness::new();
    let prefix = harness.current.place_detail("alice", "trees", 7);

    let session = harness.session();
    session.set("stray", &"body");
    session.flush().await;

    let session = harness.session();
    assert!(!placecache::cache::is_registered(&session, &prefix, "stray").await);
    register(&session, &prefix, "stray").await;
    assert!(placecache::cache::is_registered(&session, &prefix, "stray").await);
}

#[tokio::test]
async fn submission_change_clears_the_whole_cascade() {
    let harness = Harness::new();
    let current = harness.invalidator.current();
    let flags = QueryFlags::new().with("include_submissions", true);

    let session = harness.session();
    for id in [3, 99] {
        let _: String = current
            .datasets
            .serialized_data(&session, id, &QueryFlags::new(), move || async move {
                Ok::<_, Infallible>(format!("dataset {id}"))
            })
            .await
            .unwrap();
    }
    let _: String = current
        .places
        .serialized_data(&session, 7, &flags, || async {
            Ok::<_, Infallible>("place 7".to_string())
        })
        .await
        .unwrap();
    session.set(attachments_key(3), &"attachments");
    session.set(submission_sets_key(3), &"sets");
    session.flush().await;

    let routes = &harness.current;
    let dependent_prefixes = [
        routes.submission_detail("alice", "trees", 7, "comments", 12),
        routes.submission_list("alice", "trees", 7, "comments"),
        routes.submission_list("alice", "trees", 7, "submissions"),
        routes.dataset_submission_list("alice", "trees", "comments"),
        routes.place_detail("alice", "trees", 7),
        routes.place_list("alice", "trees"),
        routes.dataset_detail("alice", "trees"),
        routes.action_list("alice", "trees"),
    ];
    for (n, prefix) in dependent_prefixes.iter().enumerate() {
        harness.cache_response(prefix, &format!("response-{n}")).await;
    }
    harness
        .cache_response(&routes.place_detail("alice", "trees", 8), "unrelated")
        .await;

    harness.invalidate(Change::Submission(&submission())).await;

    let backend = &harness.backend;
    for (n, prefix) in dependent_prefixes.iter().enumerate() {
        assert!(!backend.contains(&meta_key(prefix)), "meta-key of {prefix} survived");
        assert!(!backend.contains(&format!("response-{n}")), "response under {prefix} survived");
    }
    assert!(!backend.contains("place:7:include_submissions=true"));
    assert!(!backend.contains("place:7:_keys"));
    assert!(!backend.contains("dataset:3:"));
    assert!(!backend.contains("dataset:3:_keys"));
    assert!(!backend.contains(&attachments_key(3)));
    assert!(!backend.contains(&submission_sets_key(3)));

    assert!(backend.contains("dataset:99:"));
    assert!(backend.contains("unrelated"));
}

#[tokio::test]
async fn aliased_changes_clear_the_legacy_generation() {
    let harness = Harness::new();
    let legacy = harness.invalidator.legacy().expect("legacy generation configured");

    let session = harness.session();
    legacy.places.params_of(&session, &place()).await;
    legacy.submission_sets.params_of(&session, &submission_set()).await;
    session.flush().await;
    assert!(harness.backend.contains("legacy.place:7"));
    assert!(harness.backend.contains("legacy.submission_set:4"));

    let legacy_prefix = harness.legacy.place_detail("alice", "trees", 7);
    harness.cache_response(&legacy_prefix, "legacy-response").await;

    harness.invalidate(Change::Place(&place())).await;

    assert!(!harness.backend.contains("legacy.place:7"));
    assert!(!harness.backend.contains(&meta_key(&legacy_prefix)));
    assert!(!harness.backend.contains("legacy-response"));

    // Sets have no legacy views, but legacy submissions build on their params.
    let legacy_set_prefix = harness
        .legacy
        .submission_list("alice", "trees", 7, "comments");
    harness.cache_response(&legacy_set_prefix, "legacy-list").await;
    harness.invalidate(Change::SubmissionSet(&submission_set())).await;
    assert!(!harness.backend.contains("legacy.submission_set:4"));
    assert!(harness.backend.contains("legacy-list"));
}

#[tokio::test]
async fn attachment_change_clears_the_thing_it_hangs_off() {
    let harness = Harness::new();
    let current = harness.invalidator.current();
    let attachment = Attachment {
        id: 30,
        name: "photo.jpg".to_string(),
        file_url: "/media/photo.jpg".to_string(),
        target: AttachmentTarget::Submission(submission()),
    };

    let session = harness.session();
    let _: String = current
        .submissions
        .serialized_data(&session, 12, &QueryFlags::new(), || async {
            Ok::<_, Infallible>("submission 12".to_string())
        })
        .await
        .unwrap();
    session.set(attachments_key(3), &"attachments");
    session.flush().await;

    let attachments_path = harness
        .current
        .submission_attachments("alice", "trees", 7, "comments", 12);
    harness.cache_response(&attachments_path, "attachment-list").await;

    harness.invalidate(Change::Attachment(&attachment)).await;

    assert!(!harness.backend.contains("submission:12:"));
    assert!(!harness.backend.contains(&attachments_key(3)));
    assert!(!harness.backend.contains("attachment-list"));
}

#[tokio::test]
async fn action_change_clears_every_cached_action_list() {
    let harness = Harness::new();
    let session = harness.session();
    session.set("dataset:3:actions", &"list");
    session.set("dataset:99:actions", &"other list");
    let members: std::collections::BTreeSet<String> =
        ["dataset:3:actions".to_string(), "dataset:99:actions".to_string()].into();
    session.set("action_keys", &members);
    session.flush().await;

    let action = Action {
        id: 40,
        action: "create".to_string(),
        thing_id: 7,
        dataset: dataset(),
    };
    harness.invalidate(Change::Action(&action)).await;

    assert!(!harness.backend.contains("action_keys"));
    assert!(!harness.backend.contains("dataset:3:actions"));
    assert!(!harness.backend.contains("dataset:99:actions"));
}

#[tokio::test]
async fn failing_backend_degrades_to_recompute() {
    let harness = Harness::new();
    harness.backend.set_available(false);
    let places = &harness.invalidator.current().places;
    let calls = AtomicUsize::new(0);
    let counter = &calls;

    for _ in 0..2 {
        let session = harness.session();
        let _: String = places
            .serialized_data(&session, 7, &QueryFlags::new(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>("place".to_string())
            })
            .await
            .unwrap();
        let report = session.flush().await;
        assert!(report.degraded);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let session = harness.session();
    let keys = harness
        .invalidator
        .invalidate(&session, Change::Place(&place()))
        .await;
    assert!(keys.contains("place:7"));
    assert!(session.flush().await.degraded);
}

#[tokio::test]
async fn invalidation_sends_one_delete_batch() {
    let harness = Harness::new();
    let before = harness.backend.ops();

    let session = harness.session();
    harness
        .invalidator
        .invalidate(&session, Change::Submission(&submission()))
        .await;
    harness
        .invalidator
        .invalidate(&session, Change::Place(&place()))
        .await;
    session.flush().await;
    session.flush().await;

    let after = harness.backend.ops();
    assert_eq!(after.deletes - before.deletes, 1);
}
