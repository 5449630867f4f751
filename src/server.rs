//! HTTP API.
//!
//! Admin and storefront surfaces over the same [`App`]: the polling
//! endpoints an admin UI drives while indexing, the search endpoint, and the
//! catalog change hooks.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/index/tick` | Run one batch; body `{ "force"?, "batch_size"? }` |
//! | `POST`   | `/index/force` | Reset progress and run a forced batch |
//! | `GET`    | `/index/status` | Collection state and counters |
//! | `POST`   | `/search` | Search with a filter selection |
//! | `GET`    | `/search/live?q=` | Up to five suggestions for search-as-you-type |
//! | `POST`   | `/items/{id}/sync` | Re-index one item after a catalog change |
//! | `DELETE` | `/items/{id}` | Remove one item from the index |
//!
//! Tick responses always use status 200; the body's `status` field tells a
//! polling client whether to call again.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "search_error", "message": "An error occurred while performing the search: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `invalid_item` (422), `engine_error` (502),
//! `search_error` (502), `internal` (500).

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app::App;
use crate::config::Config;
use crate::error::{IndexError, SearchError};
use crate::filter::FilterSelection;
use crate::indexer::{IndexStatus, SyncOutcome, TickReport};
use crate::results::ResultPage;
use crate::search::LiveHit;

type AppState = Arc<App>;

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = Arc::new(App::open(config).await?);
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, collection = %app.indexer.collection(), "Server listening");
    println!("catsync server listening on http://{}", bind_addr);

    axum::serve(listener, router(app)).await?;
    Ok(())
}

/// Routes with CORS open to every origin.
pub fn router(app: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/index/tick", post(handle_tick))
        .route("/index/force", post(handle_force))
        .route("/index/status", get(handle_status))
        .route("/search", post(handle_search))
        .route("/search/live", get(handle_live_search))
        .route("/items/{id}/sync", post(handle_sync_item))
        .route("/items/{id}", delete(handle_remove_item))
        .layer(cors)
        .with_state(app)
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
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        let (status, code) = match &err {
            IndexError::Engine(_) => (StatusCode::BAD_GATEWAY, "engine_error"),
            IndexError::Transform(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_item"),
            IndexError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "search_error",
            message: err.to_string(),
        }
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

// ============ POST /index/tick, /index/force ============

#[derive(Debug, Default, Deserialize)]
struct TickRequest {
    #[serde(default)]
    force: bool,
    batch_size: Option<usize>,
}

impl TickRequest {
    /// An empty body means defaults.
    fn parse(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| bad_request(format!("invalid request body: {}", e)))
    }

    fn batch_size(&self, app: &App) -> Result<usize, AppError> {
        match self.batch_size {
            Some(0) => Err(bad_request("batch_size must be > 0")),
            Some(n) => Ok(n),
            None => Ok(app.batch_size()),
        }
    }
}

async fn handle_tick(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<TickReport>, AppError> {
    let req = TickRequest::parse(&body)?;
    let batch_size = req.batch_size(&app)?;
    Ok(Json(app.indexer.tick(batch_size, req.force).await))
}

async fn handle_force(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<TickReport>, AppError> {
    let req = TickRequest::parse(&body)?;
    let batch_size = req.batch_size(&app)?;
    Ok(Json(app.indexer.force_reindex(batch_size).await))
}

// ============ GET /index/status ============

async fn handle_status(State(app): State<AppState>) -> Result<Json<IndexStatus>, AppError> {
    app.indexer
        .status()
        .await
        .map(Json)
        .map_err(|e| internal(e.to_string()))
}

// ============ POST /search ============

async fn handle_search(
    State(app): State<AppState>,
    Json(selection): Json<FilterSelection>,
) -> Result<Json<ResultPage>, AppError> {
    Ok(Json(app.search.search(&selection).await?))
}

// ============ GET /search/live ============

#[derive(Deserialize)]
struct LiveQuery {
    #[serde(default)]
    q: String,
}

#[derive(Serialize)]
struct LiveResponse {
    query: String,
    hits: Vec<LiveHit>,
}

async fn handle_live_search(
    State(app): State<AppState>,
    Query(LiveQuery { q }): Query<LiveQuery>,
) -> Result<Json<LiveResponse>, AppError> {
    let hits = app.search.live(&q).await?;
    Ok(Json(LiveResponse { query: q, hits }))
}

// ============ /items/{id} ============

#[derive(Serialize)]
struct SyncResponse {
    id: String,
    outcome: SyncOutcome,
}

async fn handle_sync_item(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SyncResponse>, AppError> {
    let outcome = app.indexer.sync_item(&id).await?;
    Ok(Json(SyncResponse { id, outcome }))
}

#[derive(Serialize)]
struct RemoveResponse {
    id: String,
    removed: bool,
}

async fn handle_remove_item(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RemoveResponse>, AppError> {
    let removed = app.indexer.remove_item(&id).await?;
    Ok(Json(RemoveResponse { id, removed }))
}
