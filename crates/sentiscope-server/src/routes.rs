//! HTTP routes and handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use sentiscope_core::{Error, FeedbackRecord, Label, ModelVersion};
use sentiscope_models::ModelState;
use sentiscope_telemetry::{ProcessSnapshot, ServiceEvent};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::time::UNIX_EPOCH;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/predict", post(predict))
        .route("/feedback", post(feedback))
        .route("/models", get(list_models))
        .route("/models/active", put(set_active))
        .route("/models/refresh", post(refresh_models))
        .route("/models/:version", get(model_status))
        .fallback(fallback)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> Response {
    let Some(handle) = &state.metrics else {
        return (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response();
    };

    ProcessSnapshot::capture().record();
    ServiceEvent::ResidentModels(state.registry.resident_count()).record();

    handle.render().into_response()
}

#[derive(Debug, Default, Deserialize)]
struct PredictQuery {
    review: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PredictBody {
    review: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    prediction: Label,
    version: String,
    raw_token_count: usize,
    encoded_token_count: u64,
}

/// Classify a review given as `?review=` or in a JSON body
async fn predict(
    State(state): State<AppState>,
    Query(query): Query<PredictQuery>,
    body: Bytes,
) -> Result<Json<PredictResponse>, AppError> {
    let result = run_prediction(&state, query, body).await;
    if let Err(e) = &result {
        ServiceEvent::PredictionFailed { kind: e.kind() }.record();
    }
    result
}

async fn run_prediction(
    state: &AppState,
    query: PredictQuery,
    body: Bytes,
) -> Result<Json<PredictResponse>, AppError> {
    let body: PredictBody = if body.iter().all(u8::is_ascii_whitespace) {
        PredictBody::default()
    } else {
        parse_json(&body)?
    };

    let review = query
        .review
        .or(body.review)
        .ok_or_else(|| AppError::InvalidRequest("missing review".to_string()))?;
    let version = query.version.or(body.version);

    let model = state.resolve_model(version.as_deref()).await?;
    let prediction = state.engine.predict(&model, &review);

    debug!(
        "Predicted {} with model {} in {:?}",
        prediction.result.label, prediction.version, prediction.elapsed
    );
    ServiceEvent::Prediction {
        version: prediction.version.to_string(),
        label: prediction.result.label,
        raw_tokens: prediction.result.raw_token_count,
        encoded_tokens: prediction.result.encoded_token_count,
        elapsed: prediction.elapsed,
    }
    .record();

    Ok(Json(PredictResponse {
        prediction: prediction.result.label,
        version: prediction.version.into(),
        raw_token_count: prediction.result.raw_token_count,
        encoded_token_count: prediction.result.encoded_token_count,
    }))
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    review: String,
    prediction: Label,
    is_correct: bool,
}

/// Accept feedback on a prediction
async fn feedback(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let request: FeedbackRequest = parse_json(&body)?;
    let is_correct = request.is_correct;

    state.feedback.submit(FeedbackRecord::new(
        request.review,
        request.prediction,
        request.is_correct,
    ))?;
    ServiceEvent::Feedback { is_correct }.record();

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response())
}

#[derive(Debug, Serialize)]
struct VersionStatus {
    version: String,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    loaded_at: Option<u64>,
    active: bool,
    in_catalog: bool,
    cached: bool,
}

fn version_status(state: &AppState, version: &ModelVersion, model_state: &ModelState) -> VersionStatus {
    VersionStatus {
        version: version.to_string(),
        state: model_state.name(),
        error: match model_state {
            ModelState::Failed(reason) => Some(reason.clone()),
            _ => None,
        },
        loaded_at: model_state.model().and_then(|m| {
            m.loaded_at()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs())
        }),
        active: state.registry.active_version().as_ref() == Some(version),
        in_catalog: state.catalog.get(version).is_some(),
        cached: state.fetcher.is_cached(version),
    }
}

/// Registry, catalog and cache overview
async fn list_models(State(state): State<AppState>) -> Result<Response, AppError> {
    let tracked: Vec<VersionStatus> = state
        .registry
        .states()
        .iter()
        .map(|(version, model_state)| version_status(&state, version, model_state))
        .collect();

    let releases: Vec<String> = state.catalog.versions().into_iter().map(String::from).collect();
    let cached: Vec<String> = state
        .fetcher
        .cached_versions()?
        .into_iter()
        .map(String::from)
        .collect();

    Ok(Json(json!({
        "active": state.registry.active_version().map(String::from),
        "pending_default": state.pending_default().map(String::from),
        "resident": state.registry.list_versions().into_iter().map(String::from).collect::<Vec<_>>(),
        "models": tracked,
        "releases": releases,
        "cached": cached,
    }))
    .into_response())
}

/// State of one version
async fn model_status(
    State(state): State<AppState>,
    Path(version): Path<String>,
) -> Result<Json<VersionStatus>, AppError> {
    let version = ModelVersion::new(version)?;
    let model_state = state.registry.state(&version);

    let status = version_status(&state, &version, &model_state);
    if matches!(model_state, ModelState::Uninitialized) && !status.in_catalog && !status.cached {
        return Err(Error::UnknownVersion(version.to_string()).into());
    }

    Ok(Json(status))
}

#[derive(Debug, Deserialize)]
struct ActivateRequest {
    version: String,
}

/// Switch the active version
async fn set_active(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let request: ActivateRequest = parse_json(&body)?;
    let version = ModelVersion::new(request.version)?;

    let model = state.activate(&version).await?;
    info!("Active model set to {} via API", model.version());

    Ok(Json(json!({ "active": model.version().as_str() })).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct RefreshQuery {
    #[serde(default)]
    activate_latest: bool,
}

/// Re-run discovery, optionally activating the newest release
async fn refresh_models(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> Result<Response, AppError> {
    let count = state.refresh_catalog().await?;
    info!("Release catalog refreshed: {} version(s)", count);

    if query.activate_latest {
        match state.catalog.latest() {
            Some(entry) => {
                state.activate(&entry.version).await?;
            }
            None => warn!("Refresh found no releases to activate"),
        }
    }

    Ok(Json(json!({
        "releases": state.catalog.versions().into_iter().map(String::from).collect::<Vec<_>>(),
        "active": state.registry.active_version().map(String::from),
    }))
    .into_response())
}

async fn fallback() -> Response {
    AppError::NotFound.into_response()
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::InvalidRequest(e.to_string()))
}

/// Handler error, rendered as `{"error": {"message", "type"}}`
#[derive(Debug)]
pub enum AppError {
    Service(Error),
    InvalidRequest(String),
    NotFound,
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::Service(e) => e.kind(),
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::NotFound => "not_found",
        }
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Service(err)
    }
}

/// HTTP status for a service error
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::ModelNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::UnknownVersion(_) => StatusCode::NOT_FOUND,
        Error::InvalidVersion(_) => StatusCode::BAD_REQUEST,
        Error::ModelLoad { .. } | Error::ArtifactUnavailable { .. } | Error::DiscoveryUnavailable(_) => {
            StatusCode::BAD_GATEWAY
        }
        Error::Configuration(_) | Error::Io(_) | Error::Serialization(_) | Error::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, message) = match self {
            AppError::Service(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    warn!("Request failed: {}", err);
                }
                (status, err.to_string())
            }
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
        };

        let body = json!({
            "error": {
                "message": message,
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}
