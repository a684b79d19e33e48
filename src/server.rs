//! HTTP API.
//!
//! A thin adapter over [`ServiceState`]: it parses bodies, maps
//! [`RagError`] kinds to status codes, and renders JSON.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Readiness: 200 when answering is possible, 503 with the reason otherwise |
//! | `POST` | `/chat` | `{ "message": "..." }` → `{ "answer": "..." }` |
//! | `POST` | `/ingest` | Optional `{ "paths": [...] }`; absent or empty means full reingest |
//!
//! `/AIAgentHealth`, `/AIAgentChat` and `/AIAgentIngest` are kept as aliases
//! for existing clients.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_ready", "message": "vector_db not found. Run ingestion once ..." } }
//! ```
//!
//! Error codes: `bad_request` and `path_not_allowed` (400), `not_found` (404),
//! `not_ready` (503), `timeout` (504), `generation_failed`, `ingest_failed`,
//! `embedding_model_mismatch` and `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{NotReadyReason, RagError};
use crate::ingest::{IngestReport, IngestRequest};
use crate::state::ServiceState;

/// Builds the router over `state`. Used by [`run_server`] and by tests,
/// which drive it in-process.
pub fn router(state: Arc<ServiceState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/ingest", post(handle_ingest))
        .route("/AIAgentHealth", get(handle_health))
        .route("/AIAgentChat", post(handle_chat))
        .route("/AIAgentIngest", post(handle_ingest))
        .layer(cors)
        .with_state(state)
}

/// Binds `[server].bind` and serves until the process is terminated.
pub async fn run_server(state: Arc<ServiceState>) -> anyhow::Result<()> {
    let bind_addr = state.config().server.bind.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on http://{}", bind_addr);
    println!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
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

#[derive(Debug)]
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_ready(reason: &NotReadyReason) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "not_ready".to_string(),
        message: reason.to_string(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        if let RagError::NotReady(reason) = &err {
            return not_ready(reason);
        }
        AppError {
            status: err.status(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Server-side ingest failures get their own code and a uniform prefix.
fn ingest_error(err: RagError) -> AppError {
    if err.status() == StatusCode::INTERNAL_SERVER_ERROR {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "ingest_failed".to_string(),
            message: format!("Ingestion failed: {}", err),
        }
    } else {
        err.into()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health(
    State(state): State<Arc<ServiceState>>,
) -> Result<Json<HealthResponse>, AppError> {
    state.readiness().await.map_err(|r| not_ready(&r))?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
}

async fn handle_chat(
    State(state): State<Arc<ServiceState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    let answer = state.answer(&req.message).await?;
    Ok(Json(ChatResponse { answer }))
}

// ============ POST /ingest ============

/// Handler for `POST /ingest`.
///
/// The body may be absent, `null`, `{}`, or `{ "paths": [...] }`. The
/// pipeline runs on its own task so a client that disconnects mid-ingest
/// cannot cancel it between the index write and the chain publish.
async fn handle_ingest(
    State(state): State<Arc<ServiceState>>,
    body: Bytes,
) -> Result<Json<IngestReport>, AppError> {
    let request = parse_ingest_body(&body)?;
    tracing::info!(full = request.is_full(), "ingest requested");

    let task = tokio::spawn(async move { state.ingest(request).await });
    let report = task
        .await
        .map_err(|e| internal(format!("ingest task failed: {}", e)))?
        .map_err(ingest_error)?;
    Ok(Json(report))
}

fn parse_ingest_body(body: &[u8]) -> Result<IngestRequest, AppError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(IngestRequest::full());
    }
    let parsed: Option<IngestRequest> = serde_json::from_slice(body)
        .map_err(|e| bad_request(format!("invalid ingest body: {}", e)))?;
    Ok(parsed.unwrap_or_default())
}
