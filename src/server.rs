//! HTTP API over [`DocChat`].
//!
//! # Endpoints
//!
//! | Method   | Path | Body | Response |
//! |----------|------|------|----------|
//! | `POST`   | `/upload` | multipart `file`, `file_type` | `{saved_name}` |
//! | `GET`    | `/collections` | | `{collections}` |
//! | `POST`   | `/activate` | form `saved_name` | `{status, saved_name}` |
//! | `DELETE` | `/collections/{name}` | | `{status, removed}` |
//! | `POST`   | `/clear_chat` | form `saved_name` | `{status}` |
//! | `POST`   | `/ask` | form `saved_name`, `question` | `{mode, answer}` |
//! | `GET`    | `/chat/{name}` | | `{chat: [{role, text}]}` |
//! | `GET`    | `/health` | | `{status, version}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "collection 'x_00000.pdf' not found" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `upstream` (502),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser UI on
//! another port can call the API.

use axum::{
    extract::{
        multipart::MultipartError, rejection::FormRejection, DefaultBodyLimit, Multipart, Path,
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::chat_history::ChatTurn;
use crate::collection::{DeleteError, DeletionReport};
use crate::config::Config;
use crate::extract::ExtractError;
use crate::models::FileType;
use crate::service::{AskResponse, DocChat, ServiceError};

type AppState = Arc<DocChat>;

/// Builds the providers from `config` and serves until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(DocChat::from_config(config.clone())?);
    run_server_with(config, service).await
}

/// Serves an already constructed service on `config.server.bind`.
pub async fn run_server_with(config: &Config, service: Arc<DocChat>) -> anyhow::Result<()> {
    let app = router(service, config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "docchat server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(service: Arc<DocChat>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/collections", get(handle_collections))
        .route("/collections/{name}", delete(handle_delete))
        .route("/activate", post(handle_activate))
        .route("/clear_chat", post(handle_clear_chat))
        .route("/ask", post(handle_ask))
        .route("/chat/{name}", get(handle_chat))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(service)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::BadRequest(_) => bad_request(message),
            ServiceError::NotFound(_) => app_error(StatusCode::NOT_FOUND, "not_found", message),
            ServiceError::Extract(ExtractError::Fetch { .. }) => {
                app_error(StatusCode::BAD_GATEWAY, "upstream", message)
            }
            ServiceError::Extract(_) => bad_request(message),
            ServiceError::Delete(DeleteError::InvalidName(_)) => bad_request(message),
            ServiceError::Upstream(_) => {
                tracing::warn!(error = %message, "provider call failed");
                app_error(StatusCode::BAD_GATEWAY, "upstream", message)
            }
            ServiceError::Delete(_) | ServiceError::Internal(_) => {
                tracing::error!(error = %message, "request failed");
                app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        app_error(err.status(), "bad_request", err.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    saved_name: String,
}

async fn handle_upload(
    State(service): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut file_type: Option<FileType> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| bad_request("file field has no filename"))?;
                let bytes = field.bytes().await?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("file_type") => {
                let value = field.text().await?;
                if !value.trim().is_empty() {
                    file_type = Some(value.parse().map_err(|e: anyhow::Error| {
                        bad_request(e.to_string())
                    })?);
                }
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or_else(|| bad_request("missing multipart field: file"))?;
    let saved_name = service.upload(&filename, &bytes, file_type)?;
    Ok(Json(UploadResponse { saved_name }))
}

// ============ GET /collections ============

#[derive(Serialize)]
struct CollectionsResponse {
    collections: Vec<String>,
}

async fn handle_collections(
    State(service): State<AppState>,
) -> Result<Json<CollectionsResponse>, AppError> {
    Ok(Json(CollectionsResponse {
        collections: service.collections()?,
    }))
}

// ============ POST /activate, /clear_chat ============

#[derive(Deserialize)]
struct CollectionForm {
    saved_name: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    saved_name: Option<String>,
}

async fn handle_activate(
    State(service): State<AppState>,
    form: Result<Form<CollectionForm>, FormRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let Form(form) = form?;
    service.activate(&form.saved_name).await?;
    Ok(Json(StatusResponse {
        status: "activated",
        saved_name: Some(form.saved_name),
    }))
}

async fn handle_clear_chat(
    State(service): State<AppState>,
    form: Result<Form<CollectionForm>, FormRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let Form(form) = form?;
    service.clear_chat(&form.saved_name).await?;
    Ok(Json(StatusResponse {
        status: "cleared",
        saved_name: None,
    }))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskForm {
    saved_name: String,
    question: String,
}

async fn handle_ask(
    State(service): State<AppState>,
    form: Result<Form<AskForm>, FormRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let Form(form) = form?;
    Ok(Json(service.ask(&form.saved_name, &form.question).await?))
}

// ============ GET /chat/{name} ============

#[derive(Serialize)]
struct ChatResponse {
    chat: Vec<ChatTurn>,
}

async fn handle_chat(
    State(service): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ChatResponse>, AppError> {
    Ok(Json(ChatResponse {
        chat: service.chat(&name)?,
    }))
}

// ============ DELETE /collections/{name} ============

#[derive(Serialize)]
struct DeleteResponse {
    status: &'static str,
    removed: DeletionReport,
}

async fn handle_delete(
    State(service): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let removed = service.delete(&name).await?;
    Ok(Json(DeleteResponse {
        status: "deleted",
        removed,
    }))
}
