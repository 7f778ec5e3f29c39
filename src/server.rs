//! JSON HTTP API over a shared [`Session`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/documents` | List uploaded documents |
//! | `POST`   | `/documents?name=<file>` | Upload a PDF (raw body) and index it |
//! | `POST`   | `/documents/{id}/index` | Re-index a document |
//! | `DELETE` | `/documents/{id}` | Retire the index and remove the document |
//! | `POST`   | `/query` | Search all documents and answer from the top page |
//! | `GET`    | `/documents/{id}/pages/{n}` | Page image (1-based `n`) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "stale_reference", "message": "page 9 of document … is out of range" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `not_found` | 404 |
//! | `stale_reference` | 409 |
//! | `index_error`, `render_error` | 422 |
//! | `storage_error` | 500 |
//! | `synthesis_error` | 502 |
//! | `model_load_error` | 503 |
//!
//! An upload whose indexing fails still returns `201`: the document exists
//! with status `failed`, and the indexing error is reported in the body.
//! Likewise a query whose answer could not be generated returns `200` with
//! the ranking and an `answer_error`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pagelens_core::models::{Document, QueryResult, SearchFailure};
use pagelens_core::Error;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::session::Session;

#[derive(Clone)]
struct AppState {
    session: Arc<Session>,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Both engines are loaded before the listener opens, so a misconfigured
/// model fails at startup instead of on the first request.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let session = Arc::new(Session::from_config(config)?);
    session.gateway().warm_up().await?;

    let app = router(session, config.server.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "listening");
    println!("PageLens listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

/// The API router for `session`.
pub fn router(session: Arc<Session>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", get(handle_list).post(handle_upload))
        .route("/documents/{id}", axum::routing::delete(handle_delete))
        .route("/documents/{id}/index", post(handle_reindex))
        .route("/documents/{id}/pages/{n}", get(handle_page))
        .route("/query", post(handle_query))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(AppState { session })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl From<&Error> for ErrorDetail {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

struct AppError {
    status: StatusCode,
    detail: ErrorDetail,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.detail })).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::UnknownDocument(_) => StatusCode::NOT_FOUND,
            Error::StaleReference { .. } => StatusCode::CONFLICT,
            Error::Index { .. } | Error::Render { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Synthesis(_) => StatusCode::BAD_GATEWAY,
            Error::ModelLoad { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: ErrorDetail::from(&err),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        detail: ErrorDetail {
            code: "bad_request".to_string(),
            message: message.into(),
        },
    }
}

// ============ Handlers ============

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_list(State(state): State<AppState>) -> Json<Vec<Document>> {
    Json(state.session.list())
}

#[derive(Deserialize)]
struct UploadParams {
    name: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    document: Document,
    indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorDetail>,
}

async fn handle_upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    if body.is_empty() {
        return Err(bad_request("request body must contain the document bytes"));
    }
    let name = params.name.unwrap_or_default();
    let outcome = state.session.upload(&body, &name).await?;

    let error = outcome.indexed.as_ref().err().map(ErrorDetail::from);
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            document: outcome.document,
            indexed: error.is_none(),
            error,
        }),
    ))
}

async fn handle_reindex(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    Ok(Json(state.session.reindex(&id).await?))
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    Ok(Json(state.session.delete(&id).await?))
}

async fn handle_page(
    State(state): State<AppState>,
    Path((id, n)): Path<(String, u32)>,
) -> Result<Response, AppError> {
    let page = state.session.page(&id, n).await?;
    Ok(([(header::CONTENT_TYPE, page.media_type)], page.bytes).into_response())
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct TopPage {
    document_id: String,
    page_number: u32,
    url: String,
}

#[derive(Serialize)]
struct QueryResponse {
    results: Vec<QueryResult>,
    failures: Vec<SearchFailure>,
    top_page: Option<TopPage>,
    answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer_error: Option<ErrorDetail>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if req.top_k == Some(0) {
        return Err(bad_request("top_k must be >= 1"));
    }

    let outcome = state.session.query(&req.query, req.top_k).await?;
    let top_page = match (&outcome.top_page, outcome.results.first()) {
        (Some(_), Some(top)) => Some(TopPage {
            document_id: top.document_id.clone(),
            page_number: top.page_number,
            url: format!("/documents/{}/pages/{}", top.document_id, top.page_number),
        }),
        _ => None,
    };
    let (answer, answer_error) = match outcome.answer {
        Some(Ok(text)) => (Some(text), None),
        Some(Err(e)) => (None, Some(ErrorDetail::from(&e))),
        None => (None, None),
    };

    Ok(Json(QueryResponse {
        results: outcome.results,
        failures: outcome.failures,
        top_page,
        answer,
        answer_error,
    }))
}
