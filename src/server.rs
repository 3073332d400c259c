//! Read-only JSON HTTP API over the note store.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/notes` | All notes, newest first, without `html` |
//! | `GET`  | `/notes/{key}` | One full note record |
//! | `GET`  | `/search?q=&limit=` | Full-text search over title and body |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no note with key: x" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::fts::SearchIndex;
use crate::models::{NoteRecord, SearchHit};
use crate::store::{RecordStore, SqliteRecordStore};

const DEFAULT_SEARCH_LIMIT: i64 = 20;

#[derive(Clone)]
struct AppState {
    store: Arc<dyn RecordStore>,
    index: Arc<SearchIndex>,
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = SqliteRecordStore::open(config).await?;
    let index = SearchIndex::new(store.pool().clone(), store.table());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("Serving notes on http://{}", config.server.bind);
    serve(listener, Arc::new(store), Arc::new(index)).await
}

/// Serve on an already-bound listener.
pub async fn serve(
    listener: tokio::net::TcpListener,
    store: Arc<dyn RecordStore>,
    index: Arc<SearchIndex>,
) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/notes", get(handle_list))
        .route("/notes/{key}", get(handle_get))
        .route("/search", get(handle_search))
        .layer(cors)
        .with_state(AppState { store, index });

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

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

// ============ Handlers ============

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

/// Listing entry: everything except the rendered HTML.
#[derive(Serialize)]
struct NoteListItem {
    key: String,
    topic: String,
    slug: String,
    title: String,
    url: String,
    summary: Option<String>,
    created_utc: Option<String>,
    updated_utc: Option<String>,
}

impl From<NoteRecord> for NoteListItem {
    fn from(r: NoteRecord) -> Self {
        Self {
            key: r.key,
            topic: r.topic,
            slug: r.slug,
            title: r.title,
            url: r.url,
            summary: r.summary,
            created_utc: r.created_utc,
            updated_utc: r.updated_utc,
        }
    }
}

async fn handle_list(State(state): State<AppState>) -> Result<Json<Vec<NoteListItem>>, AppError> {
    let notes = state.store.list().await?;
    Ok(Json(notes.into_iter().map(NoteListItem::from).collect()))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<NoteRecord>, AppError> {
    state
        .store
        .get(&key)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("no note with key: {}", key)))
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = params.q.unwrap_or_default();
    if query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    if !(1..=500).contains(&limit) {
        return Err(bad_request("limit must be between 1 and 500"));
    }

    let results = state.index.search(&query, limit).await?;
    Ok(Json(SearchResponse { results }))
}
