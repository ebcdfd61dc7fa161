//! HTTP API tests
//!
//! The release index points at an unroutable address, so every state starts
//! in offline mode over artifacts written into a temp cache.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use sentiscope_core::ModelVersion;
use sentiscope_models::{ArtifactModelLoader, LoadedModel, ModelLoader};
use sentiscope_server::{create_router, AppState, LoadMode, ServiceConfig};
use sentiscope_telemetry::{FeedbackConfig, JsonlFeedbackSink};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const ENCODER: &str = r#"{"kind":"bag_of_words","vocabulary":{"good":0,"bad":1,"food":2}}"#;
const CLASSIFIER_V1: &str = r#"{"kind":"linear","weights":[1.0,-1.0,0.0],"intercept":-0.5}"#;
const CLASSIFIER_V2: &str = r#"{"kind":"linear","weights":[-1.0,1.0,0.0],"intercept":-0.5}"#;

struct TestService {
    app: Router,
    state: AppState,
    feedback: Arc<JsonlFeedbackSink>,
    _dir: TempDir,
}

fn write_version(cache: &Path, version: &str, classifier: &str) {
    let dir = cache.join(version);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("encoder.json"), ENCODER).unwrap();
    std::fs::write(dir.join("classifier.json"), classifier).unwrap();
}

fn setup(
    versions: &[(&str, &str)],
    tweak: impl FnOnce(&mut ServiceConfig),
) -> (ServiceConfig, Arc<JsonlFeedbackSink>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("models");
    for (version, classifier) in versions {
        write_version(&cache, version, classifier);
    }

    let mut config = ServiceConfig {
        releases_url: "http://127.0.0.1:9/releases".to_string(),
        cache_dir: cache,
        discovery_timeout_secs: 2,
        download_timeout_secs: 2,
        feedback_path: dir.path().join("feedback.jsonl"),
        ..Default::default()
    };
    tweak(&mut config);
    config.validate().unwrap();

    let feedback = Arc::new(
        JsonlFeedbackSink::new(FeedbackConfig {
            path: config.feedback_path.clone(),
            sync_every: 0,
        })
        .unwrap(),
    );
    (config, feedback, dir)
}

async fn service(versions: &[(&str, &str)], tweak: impl FnOnce(&mut ServiceConfig)) -> TestService {
    let (config, feedback, dir) = setup(versions, tweak);
    let state = AppState::build(config, feedback.clone(), None).unwrap();
    state.initialize().await.unwrap();

    TestService {
        app: create_router(state.clone()),
        state,
        feedback,
        _dir: dir,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn both_versions() -> [(&'static str, &'static str); 2] {
    [("v1", CLASSIFIER_V1), ("v2", CLASSIFIER_V2)]
}

#[tokio::test]
async fn test_health() {
    let svc = service(&[], |_| {}).await;
    let response = svc
        .app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_predict_with_query_review() {
    let svc = service(&both_versions(), |c| c.default_version = Some("v1".into())).await;

    let (status, body) = send(&svc.app, "POST", "/predict?review=The%20food%20was%20good", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], 1);
    assert_eq!(body["version"], "v1");
    assert_eq!(body["raw_token_count"], 2);
    assert_eq!(body["encoded_token_count"], 2);
}

#[tokio::test]
async fn test_lazy_mode_activates_on_first_request() {
    let svc = service(&both_versions(), |c| c.default_version = Some("v2".into())).await;
    assert!(svc.state.registry.active_version().is_none());
    assert_eq!(svc.state.pending_default().unwrap().as_str(), "v2");

    let (status, body) = send(&svc.app, "POST", "/predict", Some(serde_json::json!({"review": "good"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], "v2");
    assert_eq!(svc.state.registry.active_version().unwrap().as_str(), "v2");
    assert!(svc.state.pending_default().is_none());
}

#[tokio::test]
async fn test_eager_mode_preloads_cache() {
    let svc = service(&both_versions(), |c| {
        c.load_mode = LoadMode::Eager;
        c.default_version = Some("v1".into());
    })
    .await;

    assert_eq!(svc.state.registry.resident_count(), 2);
    assert_eq!(svc.state.registry.active_version().unwrap().as_str(), "v1");
}

#[tokio::test]
async fn test_predict_named_version_in_body() {
    let svc = service(&both_versions(), |c| c.default_version = Some("v1".into())).await;

    let (status, body) = send(
        &svc.app,
        "POST",
        "/predict",
        Some(serde_json::json!({"review": "good food", "version": "v2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], "v2");
    assert_eq!(body["prediction"], 0);
}

#[tokio::test]
async fn test_empty_review_is_answered() {
    let svc = service(&both_versions(), |c| c.default_version = Some("v1".into())).await;

    let (status, body) = send(&svc.app, "POST", "/predict?review=", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["raw_token_count"], 0);
    assert_eq!(body["encoded_token_count"], 0);
    assert_eq!(body["prediction"], 0);
}

#[tokio::test]
async fn test_request_errors() {
    let svc = service(&both_versions(), |c| c.default_version = Some("v1".into())).await;

    let (status, body) = send(&svc.app, "POST", "/predict", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request");

    let (status, body) = send(&svc.app, "POST", "/predict?review=good&version=v9", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "unknown_version");

    let (status, body) = send(&svc.app, "POST", "/predict?review=good&version=..", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_version");

    let (status, _) = send(&svc.app, "GET", "/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_no_model_is_service_unavailable() {
    let svc = service(&[], |_| {}).await;

    let (status, body) = send(&svc.app, "POST", "/predict?review=good", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["type"], "model_not_ready");
}

#[tokio::test]
async fn test_broken_artifact_is_bad_gateway() {
    let svc = service(&[("v1", "{not json")], |c| c.default_version = Some("v1".into())).await;

    let (status, body) = send(&svc.app, "POST", "/predict?review=good", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["type"], "model_load");

    let (status, body) = send(&svc.app, "GET", "/models/v1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "failed");
    assert!(body["error"].as_str().unwrap().contains("malformed"));
}

#[tokio::test]
async fn test_switch_active_version() {
    let svc = service(&both_versions(), |c| {
        c.load_mode = LoadMode::Eager;
        c.default_version = Some("v1".into());
    })
    .await;

    let (_, before) = send(&svc.app, "POST", "/predict?review=good", None).await;
    assert_eq!(before["version"], "v1");
    assert_eq!(before["prediction"], 1);

    let (status, body) = send(&svc.app, "PUT", "/models/active", Some(serde_json::json!({"version": "v2"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], "v2");

    let (_, after) = send(&svc.app, "POST", "/predict?review=good", None).await;
    assert_eq!(after["version"], "v2");
    assert_eq!(after["prediction"], 0);

    let (status, _) = send(&svc.app, "PUT", "/models/active", Some(serde_json::json!({"version": "v9"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(svc.state.registry.active_version().unwrap().as_str(), "v2");
}

/// Delays one version's load so requests can overlap it
struct SlowLoader {
    inner: ArtifactModelLoader,
    slow: &'static str,
    delay: Duration,
}

#[async_trait]
impl ModelLoader for SlowLoader {
    async fn load(&self, version: &ModelVersion) -> sentiscope_core::Result<LoadedModel> {
        if version.as_str() == self.slow {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.load(version).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_switch_during_lazy_activation_sticks() {
    let (config, feedback, _dir) = setup(&both_versions(), |c| c.default_version = Some("v1".into()));
    let state = AppState::build_with_loader(config, feedback, None, |fetcher, catalog| {
        Arc::new(SlowLoader {
            inner: ArtifactModelLoader::new(fetcher, catalog),
            slow: "v1",
            delay: Duration::from_millis(300),
        })
    })
    .unwrap();
    state.initialize().await.unwrap();
    let app = create_router(state.clone());

    // First default-path request starts the slow lazy load of v1.
    let first = {
        let app = app.clone();
        tokio::spawn(async move { send(&app, "POST", "/predict?review=good", None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, body) = send(&app, "PUT", "/models/active", Some(serde_json::json!({"version": "v2"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], "v2");

    let (status, _) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);

    let (_, after) = send(&app, "POST", "/predict?review=good", None).await;
    assert_eq!(after["version"], "v2");
    assert_eq!(state.registry.active_version().unwrap().as_str(), "v2");
    assert!(state.pending_default().is_none());
}

#[tokio::test]
async fn test_models_overview() {
    let svc = service(&both_versions(), |c| {
        c.load_mode = LoadMode::Eager;
        c.default_version = Some("v2".into());
    })
    .await;

    let (status, body) = send(&svc.app, "GET", "/models", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], "v2");
    assert_eq!(body["resident"], serde_json::json!(["v1", "v2"]));
    assert_eq!(body["cached"], serde_json::json!(["v1", "v2"]));
    assert_eq!(body["releases"], serde_json::json!([]));

    let (status, body) = send(&svc.app, "GET", "/models/v2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "ready");
    assert_eq!(body["active"], true);
    assert_eq!(body["cached"], true);

    let (status, _) = send(&svc.app, "GET", "/models/v9", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_feedback_is_persisted() {
    let svc = service(&[], |_| {}).await;

    let (status, body) = send(
        &svc.app,
        "POST",
        "/feedback",
        Some(serde_json::json!({"review": "Great pasta", "prediction": 1, "is_correct": true})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");

    let (status, _) = send(
        &svc.app,
        "POST",
        "/feedback",
        Some(serde_json::json!({"review": "x", "prediction": 7, "is_correct": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    svc.feedback.flush().await.unwrap();
    let records = JsonlFeedbackSink::read_all(svc.feedback.path()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].review, "Great pasta");
    assert!(records[0].is_correct);
}

#[tokio::test]
async fn test_refresh_reports_unreachable_index() {
    let svc = service(&[], |_| {}).await;

    let (status, body) = send(&svc.app, "POST", "/models/refresh", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["type"], "discovery_unavailable");
}

#[tokio::test]
async fn test_metrics_requires_recorder() {
    let svc = service(&[], |_| {}).await;
    let (status, _) = send(&svc.app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
