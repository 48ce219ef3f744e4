use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

use stemsplit::addressing::{ORIGINAL_TRACK, blob_key, content_hash};
use stemsplit::api::{AppState, models::SeparateResponse, router};
use stemsplit::config::Config;
use stemsplit::observability::Metrics;
use stemsplit::proto::{DeadLetter, QueueEntry};
use stemsplit::queue::{self, FjallJobQueue, JobQueue, QueueError};
use stemsplit::storage::{AUDIO_CONTENT_TYPE, StorageClient};

fn create_test_config() -> Config {
    let config_toml = r#"
[server]
bind_addr = "127.0.0.1:5050"
max_payload_bytes = "1KB"

[storage]
provider = "memory"
bucket = "songs"
    "#;

    toml::from_str(config_toml).expect("Failed to parse test config")
}

struct TestApp {
    router: Router,
    queue: Arc<FjallJobQueue>,
    storage: Arc<StorageClient>,
    metrics: Arc<Metrics>,
    _temp_dir: TempDir,
}

/// Builds a test app with isolated dependencies
fn build_test_app() -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let queue = Arc::new(
        FjallJobQueue::open(temp_dir.path().join("queue")).expect("Failed to open test queue"),
    );
    let storage = Arc::new(StorageClient::in_memory("songs"));
    let metrics = Arc::new(Metrics::new());

    let state = AppState::new(
        create_test_config(),
        storage.clone(),
        queue.clone(),
        metrics.clone(),
    );

    TestApp {
        router: router(state),
        queue,
        storage,
        metrics,
        _temp_dir: temp_dir,
    }
}

/// Queue that accepts nothing, as when the backend is unreachable
struct UnavailableQueue;

#[async_trait]
impl JobQueue for UnavailableQueue {
    async fn enqueue(&self, _entry: &QueueEntry) -> queue::Result<()> {
        Err(QueueError::Write("connection refused".to_string()))
    }

    async fn dequeue(&self, _wait: Duration) -> queue::Result<Option<QueueEntry>> {
        Err(QueueError::Read("connection refused".to_string()))
    }

    async fn peek_all(&self) -> queue::Result<Vec<QueueEntry>> {
        Err(QueueError::Read("connection refused".to_string()))
    }

    async fn dead_letter(&self, _letter: &DeadLetter) -> queue::Result<()> {
        Err(QueueError::Write("connection refused".to_string()))
    }

    async fn dead_letters(&self, _limit: usize) -> queue::Result<Vec<DeadLetter>> {
        Err(QueueError::Read("connection refused".to_string()))
    }

    async fn len(&self) -> queue::Result<usize> {
        Err(QueueError::Read("connection refused".to_string()))
    }

    async fn health(&self) -> queue::Result<()> {
        Err(QueueError::Read("connection refused".to_string()))
    }
}

fn submit_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/apiv1/separate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_submit_stores_original_and_enqueues() {
    let app = build_test_app();
    let mp3 = STANDARD.encode([0u8, 1, 2]);

    let response = app
        .router
        .clone()
        .oneshot(submit_request(json!({
            "song_name": "demo.mp3",
            "mp3": mp3,
            "callback": {"url": "http://localhost:9000/done"}
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: SeparateResponse = serde_json::from_value(json_body(response).await).unwrap();
    let hash = content_hash(&mp3);
    assert_eq!(body.hash, hash.as_str());
    assert_eq!(body.reason, "Song enqueued for separation");

    let stored = app
        .storage
        .get(&blob_key(&hash, ORIGINAL_TRACK))
        .await
        .unwrap();
    assert_eq!(&stored[..], &[0u8, 1, 2]);

    let pending = app.queue.peek_all().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].content_hash, hash.as_str());
    assert_eq!(pending[0].callback(), Some("http://localhost:9000/done"));
    assert_eq!(app.metrics.snapshot().jobs_submitted, 1);
}

#[tokio::test]
async fn test_duplicate_submissions_enqueue_twice() {
    let app = build_test_app();
    let body = json!({"song_name": "a.mp3", "mp3": "AAEC"});

    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(submit_request(body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.router.clone().oneshot(get("/apiv1/queue")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let hash = content_hash("AAEC").into_string();
    assert_eq!(json_body(response).await, json!({"queue": [hash, hash]}));
}

#[tokio::test]
async fn test_submit_without_callback() {
    let app = build_test_app();

    let response = app
        .router
        .clone()
        .oneshot(submit_request(json!({"song_name": "a.mp3", "mp3": "AAEC"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let pending = app.queue.peek_all().await.unwrap();
    assert_eq!(pending[0].callback(), None);
}

#[tokio::test]
async fn test_submit_rejects_invalid_base64() {
    let app = build_test_app();

    let response = app
        .router
        .clone()
        .oneshot(submit_request(json!({"song_name": "a.mp3", "mp3": "not base64!!"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "DECODE_ERROR");
    assert_eq!(app.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_submit_accepts_line_wrapped_base64() {
    let app = build_test_app();
    let encoded = STANDARD.encode([7u8; 120]);
    let mp3 = encoded
        .as_bytes()
        .chunks(76)
        .map(|line| std::str::from_utf8(line).unwrap())
        .collect::<Vec<_>>()
        .join("\n");

    let response = app
        .router
        .clone()
        .oneshot(submit_request(json!({"song_name": "wrapped.mp3", "mp3": mp3})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // addressed by the text as sent, line breaks included
    let hash = content_hash(&mp3);
    let body: SeparateResponse = serde_json::from_value(json_body(response).await).unwrap();
    assert_eq!(body.hash, hash.as_str());

    let stored = app
        .storage
        .get(&blob_key(&hash, ORIGINAL_TRACK))
        .await
        .unwrap();
    assert_eq!(&stored[..], &[7u8; 120]);
}

#[tokio::test]
async fn test_submit_storage_failure_enqueues_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let queue = Arc::new(FjallJobQueue::open(temp_dir.path().join("queue")).unwrap());
    let storage = Arc::new(StorageClient::local(temp_dir.path().join("blobs"), "songs").unwrap());

    // container directory replaced by a regular file
    let container_dir = temp_dir.path().join("blobs").join("songs");
    std::fs::remove_dir_all(&container_dir).unwrap();
    std::fs::write(&container_dir, b"not a directory").unwrap();

    let state = AppState::new(
        create_test_config(),
        storage,
        queue.clone(),
        Arc::new(Metrics::new()),
    );
    let response = router(state)
        .oneshot(submit_request(json!({"song_name": "a.mp3", "mp3": "AAEC"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["code"], "STORAGE_UNAVAILABLE");
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_submit_queue_failure_is_unavailable() {
    let storage = Arc::new(StorageClient::in_memory("songs"));
    let metrics = Arc::new(Metrics::new());
    let state = AppState::new(
        create_test_config(),
        storage.clone(),
        Arc::new(UnavailableQueue),
        metrics.clone(),
    );

    let response = router(state)
        .oneshot(submit_request(json!({"song_name": "a.mp3", "mp3": "AAEC"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["code"], "QUEUE_UNAVAILABLE");
    assert_eq!(metrics.snapshot().jobs_submitted, 0);
}

#[tokio::test]
async fn test_submit_rejects_non_http_callback() {
    let app = build_test_app();

    let response = app
        .router
        .clone()
        .oneshot(submit_request(json!({
            "mp3": "AAEC",
            "callback": {"url": "ftp://example.com/done"}
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_PAYLOAD");
}

#[tokio::test]
async fn test_submit_rejects_wrong_content_type() {
    let app = build_test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/apiv1/separate")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(json!({"mp3": "AAEC"}).to_string()))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_rejects_oversized_body() {
    let app = build_test_app();
    let mp3 = STANDARD.encode(vec![0u8; 2048]);

    let response = app
        .router
        .clone()
        .oneshot(submit_request(json!({"mp3": mp3})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_fetch_track_returns_audio() {
    let app = build_test_app();
    let hash = content_hash("AAEC");
    app.storage
        .put(&blob_key(&hash, "vocals"), b"sing".to_vec(), AUDIO_CONTENT_TYPE)
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/apiv1/track/{hash}/vocals")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"vocals.mp3\""
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"sing");
}

#[tokio::test]
async fn test_fetch_missing_track_is_not_found() {
    let app = build_test_app();
    let hash = content_hash("never uploaded");

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/apiv1/track/{hash}/drums")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_hash_is_bad_request() {
    let app = build_test_app();

    let response = app
        .router
        .clone()
        .oneshot(get("/apiv1/track/not-a-hash/vocals"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let hash = content_hash("AAEC");
    let response = app
        .router
        .clone()
        .oneshot(delete(&format!("/apiv1/remove/{hash}/..%2Fsecret")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let app = build_test_app();
    let hash = content_hash("AAEC");
    let key = blob_key(&hash, "bass");
    app.storage
        .put(&key, b"low".to_vec(), AUDIO_CONTENT_TYPE)
        .await
        .unwrap();

    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(delete(&format!("/apiv1/remove/{hash}/bass")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
    assert!(!app.storage.exists(&key).await.unwrap());

    // never uploaded
    let response = app
        .router
        .clone()
        .oneshot(delete(&format!("/apiv1/remove/{hash}/other")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_dead_letters_listing() {
    let app = build_test_app();
    for seed in ["a", "b", "c"] {
        let letter = DeadLetter::new(
            QueueEntry::new(content_hash(seed), None),
            "processing",
            "ProcessingFailure",
            "exit status: 1",
        );
        app.queue.dead_letter(&letter).await.unwrap();
    }

    let response = app
        .router
        .clone()
        .oneshot(get("/apiv1/dead-letters?limit=2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let letters = body["dead_letters"].as_array().unwrap();
    assert_eq!(letters.len(), 2);
    assert_eq!(letters[0]["entry"]["songhash"], content_hash("a").as_str());
    assert_eq!(letters[0]["failure_kind"], "ProcessingFailure");
}

#[tokio::test]
async fn test_health_reports_components() {
    let app = build_test_app();

    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["queue"], "healthy");
    assert_eq!(body["components"]["storage"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
