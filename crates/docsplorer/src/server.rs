//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/search` | Batch semantic search with context expansion |
//! | `POST` | `/search/filenames` | Filename lookup by text match |
//! | `GET`  | `/health` | Which backing clients have been created |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "limit must be >= 1" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `invalid_filter` | 400 |
//! | `search_failed` | 500 |
//! | `embedding_failed` | 502 |
//! | `store_unavailable` | 503 |
//! | `embedding_unavailable` | 503 |
//!
//! Server-side failures carry a generic message; the detail is logged.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use docsplorer_core::context::MAX_PAGE_NUMBER;
use docsplorer_core::search::SearchHit;
use docsplorer_core::SearchError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::connection::ConnectionOverrides;
use crate::filenames::FilenameSearch;
use crate::registry::ClientRegistry;
use crate::session::{SearchSession, SessionOptions};

const DEFAULT_FILENAME_LIMIT: usize = 10;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    registry: Arc<ClientRegistry>,
}

impl AppState {
    pub fn new(config: Config, registry: ClientRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", post(handle_search))
        .route("/search/filenames", post(handle_filenames))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `[server].bind` until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config.clone(), ClientRegistry::new(config));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(
        addr = %bind_addr,
        environment = %config.environment,
        "docsplorer listening"
    );
    axum::serve(listener, router(state)).await?;

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

pub struct AppError {
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

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        let (status, code) = match &err {
            SearchError::Config(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            SearchError::InvalidFilter(_) => (StatusCode::BAD_REQUEST, "invalid_filter"),
            SearchError::StoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
            SearchError::EmbeddingUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "embedding_unavailable")
            }
            SearchError::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_failed"),
            SearchError::SearchFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "search_failed"),
        };
        if err.is_client_error() {
            warn!(code, error = %err, "rejected request");
        } else {
            error!(code, error = %err, "request failed");
        }
        AppError {
            status,
            code: code.to_string(),
            message: err.public_message(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

/// Connection fields shared by both search bodies.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectionFields {
    #[serde(default)]
    pub use_production: bool,
    #[serde(default)]
    pub qdrant_url: Option<String>,
    #[serde(default)]
    pub qdrant_api_key: Option<String>,
    #[serde(default)]
    pub qdrant_verify_ssl: Option<bool>,
}

impl ConnectionFields {
    fn session_options(&self, context_window: Option<u32>) -> SessionOptions {
        SessionOptions {
            use_production: self.use_production,
            overrides: ConnectionOverrides {
                url: self.qdrant_url.clone(),
                api_key: self.qdrant_api_key.clone(),
                verify_tls: self.qdrant_verify_ssl,
            },
            context_window,
        }
    }
}

// ============ POST /search ============

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub collection_name: String,
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub filter: Option<Value>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub context_window_size: Option<i64>,
    #[serde(flatten)]
    pub connection: ConnectionFields,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<Vec<SearchHit>>,
}

async fn handle_search(
    State(state): State<AppState>,
    payload: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(body) = payload?;

    if body.search_queries.is_empty() {
        return Err(bad_request("search_queries must contain at least one query"));
    }
    let limit = match body.limit {
        None => state.config.search.default_limit,
        Some(n) if n >= 1 => n as usize,
        Some(_) => return Err(bad_request("limit must be >= 1")),
    };
    let context_window = match body.context_window_size {
        None => None,
        Some(n) if n >= 0 => Some(n.min(MAX_PAGE_NUMBER as i64) as u32),
        Some(_) => return Err(bad_request("context_window_size must be >= 0")),
    };

    let session = SearchSession::open(
        &state.registry,
        &state.config,
        &body.collection_name,
        body.connection.session_options(context_window),
    )
    .await?;

    let results = session
        .search(
            &body.search_queries,
            body.filter.as_ref(),
            limit,
            body.embedding_model.as_deref(),
        )
        .await?;

    Ok(Json(SearchResponse { results }))
}

// ============ POST /search/filenames ============

#[derive(Debug, Deserialize)]
pub struct FilenameBody {
    pub query: String,
    pub collection_name: String,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(flatten)]
    pub connection: ConnectionFields,
}

async fn handle_filenames(
    State(state): State<AppState>,
    payload: Result<Json<FilenameBody>, JsonRejection>,
) -> Result<Json<FilenameSearch>, AppError> {
    let Json(body) = payload?;

    let limit = match body.limit {
        None => DEFAULT_FILENAME_LIMIT,
        Some(n) if n >= 1 => n as usize,
        Some(_) => return Err(bad_request("limit must be >= 1")),
    };

    let session = SearchSession::open(
        &state.registry,
        &state.config,
        &body.collection_name,
        body.connection.session_options(None),
    )
    .await?;

    Ok(Json(session.search_filenames(&body.query, limit).await?))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    services: ServiceStatus,
}

#[derive(Serialize)]
struct ServiceStatus {
    store: &'static str,
    embedding: &'static str,
}

fn availability(ready: bool) -> &'static str {
    if ready {
        "ok"
    } else {
        "offline"
    }
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.registry.status();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        services: ServiceStatus {
            store: availability(status.store),
            embedding: availability(status.embedding),
        },
    })
}
