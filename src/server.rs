// HTTP surface: upload form, JSON API and stored image serving

use crate::config::AppConfig;
use crate::error::{ErrorKind, Result, UploadError};
use crate::filename::{allowed_file, sanitize_filename};
use crate::models::{FileUpload, PipelineOutcome};
use crate::pipeline::UploadPipeline;
use crate::ui;
use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use image::ImageFormat;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// State shared by all request handlers
pub struct AppState {
    pub pipeline: UploadPipeline,
}

pub type SharedState = Arc<AppState>;

/// Builds the application router. Bodies over `max_upload_bytes` are rejected
/// before they reach the pipeline.
pub fn router(pipeline: UploadPipeline, max_upload_bytes: usize) -> Router {
    let state = Arc::new(AppState { pipeline });
    Router::new()
        .route("/", get(index).post(upload_form))
        .route("/api/analyze", post(upload_api))
        .route("/static/uploads/:name", get(stored_image))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Binds the configured address and serves until the process stops.
pub async fn serve(config: &AppConfig, pipeline: UploadPipeline) -> Result<()> {
    let app = router(pipeline, config.max_upload_bytes);
    let addr = SocketAddr::new(config.host, config.port);
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> Html<String> {
    Html(ui::index_page(None))
}

/// Every pipeline or form error re-renders the form with a 200. Only an
/// oversized body keeps its transport status.
async fn upload_form(
    State(state): State<SharedState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => {
            warn!("Form post without a multipart body: {}", e);
            return form_error(UploadError::MissingFile);
        }
    };
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            warn!("Rejected multipart body: {}", e);
            return e.into_response();
        }
        Err(e) => {
            warn!("Malformed multipart body: {}", e);
            return form_error(UploadError::MissingFile);
        }
    };

    match run_pipeline(state, upload).await {
        Ok(report) => Html(ui::results_page(&report)).into_response(),
        Err(e) => form_error(e),
    }
}

fn form_error(err: UploadError) -> Response {
    Html(ui::index_page(Some(&err.to_string()))).into_response()
}

async fn upload_api(State(state): State<SharedState>, multipart: Multipart) -> Response {
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            warn!("Rejected multipart body: {}", e);
            return e.into_response();
        }
    };

    match run_pipeline(state, upload).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => (status_for(e.kind()), Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

async fn stored_image(State(state): State<SharedState>, Path(name): Path<String>) -> Response {
    if sanitize_filename(&name) != name || !allowed_file(&name) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let path = state.pipeline.config().upload_dir.join(&name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = ImageFormat::from_path(&path)
                .map(|format| format.to_mime_type())
                .unwrap_or("application/octet-stream");
            ([(header::CONTENT_TYPE, mime)], bytes).into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn health(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "detector_ready": state.pipeline.detector_ready(),
    }))
}

/// Finds the `file` field. `None` when the form has no such field.
async fn read_upload(mut multipart: Multipart) -> std::result::Result<Option<FileUpload>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await?;
            return Ok(Some(FileUpload::new(filename, data.to_vec())));
        }
    }
    Ok(None)
}

/// Runs the blocking pipeline off the async workers.
async fn run_pipeline(state: SharedState, upload: Option<FileUpload>) -> PipelineOutcome {
    match tokio::task::spawn_blocking(move || state.pipeline.process(upload)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Pipeline task failed: {}", e);
            Err(UploadError::Processing)
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::UserInput | ErrorKind::Decode => StatusCode::BAD_REQUEST,
        ErrorKind::Configuration => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Storage | ErrorKind::Processing => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
