use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use validator::Validate;

use crate::config::EvalSettings;
use crate::database::RunSummary;
use crate::llm::{EvalReport, EvalResult, QaAnswer};
use crate::session::{EvalSession, SessionError, UploadReport};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const MAX_CONCURRENT_REQUESTS: usize = 16;
const RECENT_RUNS: i64 = 20;

#[derive(Clone)]
pub struct AppState {
    session: Arc<RwLock<EvalSession>>,
}

#[derive(Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 1, max = 2000))]
    question: String,
}

#[derive(Serialize)]
pub struct SettingsResponse {
    settings: EvalSettings,
    reload_pending: bool,
    document: Option<String>,
}

#[derive(Serialize)]
pub struct EvalResponse {
    run_id: Option<i64>,
    score: f32,
    correct: usize,
    total: usize,
    report: EvalReport,
}

#[derive(Serialize)]
struct ApiResponse {
    status: String,
}

/// Error body shared by every handler.
#[derive(Debug)]
pub struct ApiError {
    code: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        let code = if e.is_user_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.code.is_server_error() {
            tracing::error!("{}", self.message);
        } else {
            tracing::warn!("{}", self.message);
        }
        (self.code, Json(ApiResponse { status: self.message })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Create and configure the API router
pub fn create_api(session: EvalSession) -> Router {
    let state = AppState {
        session: Arc::new(RwLock::new(session)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_check))
        .route("/settings", get(get_settings).put(put_settings))
        .route("/upload", post(upload_handler))
        .route("/ask", post(ask_handler))
        .route("/eval", post(eval_handler))
        .route("/runs", get(runs_handler))
        .route("/runs/:id", get(run_results_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> Json<ApiResponse> {
    Json(ApiResponse {
        status: "Server is running and healthy".to_string(),
    })
}

fn settings_response(session: &EvalSession) -> SettingsResponse {
    SettingsResponse {
        settings: session.settings().clone(),
        reload_pending: session.reload_pending(),
        document: session.document_path().map(|p| p.display().to_string()),
    }
}

async fn get_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    let session = state.session.read().await;
    Json(settings_response(&session))
}

async fn put_settings(
    State(state): State<AppState>,
    Json(settings): Json<EvalSettings>,
) -> ApiResult<SettingsResponse> {
    let mut session = state.session.write().await;
    session.update_settings(settings)?;
    tracing::info!("Settings updated");
    Ok(Json(settings_response(&session)))
}

async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<UploadReport> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        upload = Some((name, data));
    }

    let (name, data) = upload.ok_or_else(|| ApiError::bad_request("Please choose a document to upload"))?;
    tracing::info!("Uploading {} ({} bytes)", name, data.len());

    let mut session = state.session.write().await;
    let report = session.upload(&name, &data).await?;
    Ok(Json(report))
}

async fn ask_handler(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> ApiResult<QaAnswer> {
    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let mut session = state.session.write().await;
    let answer = session.ask(&request.question).await?;
    Ok(Json(answer))
}

async fn eval_handler(State(state): State<AppState>) -> ApiResult<EvalResponse> {
    let mut session = state.session.write().await;
    let (report, run_id) = session
        .evaluate(|done, total| tracing::info!("Graded {}/{}", done, total))
        .await?;

    Ok(Json(EvalResponse {
        run_id,
        score: report.score(),
        correct: report.correct(),
        total: report.results.len(),
        report,
    }))
}

async fn runs_handler(State(state): State<AppState>) -> ApiResult<Vec<RunSummary>> {
    let session = state.session.read().await;
    Ok(Json(session.recent_runs(RECENT_RUNS).await?))
}

async fn run_results_handler(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
) -> ApiResult<Vec<EvalResult>> {
    let session = state.session.read().await;
    Ok(Json(session.run_results(run_id).await?))
}
