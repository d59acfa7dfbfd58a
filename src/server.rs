//! HTTP visualization API.
//!
//! Exposes the retrieval pipeline to browser front-ends as a JSON API. The
//! server owns one [`RetrievalPipeline`]: `POST /index` replaces its index,
//! `POST /query` ranks against it.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (version, provider, mock flag) |
//! | `GET`  | `/state` | Whether an index is loaded, and its parameters |
//! | `POST` | `/chunk` | Chunk text without embedding it |
//! | `POST` | `/index` | Chunk and embed text, replacing the current index |
//! | `POST` | `/query` | Rank indexed chunks and project them to 2D |
//! | `POST` | `/tokens` | Count tokens in text |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_indexed", "message": "index not built: call index() before query()" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_indexed` (409),
//! `embedding_failed` (502), `internal` (500).
//!
//! # Concurrency
//!
//! Requests touching the pipeline are serialized through one async mutex,
//! so a query never observes a half-built index. A query issued during a
//! long `/index` call waits for it to finish.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a front-end served
//! from another port can call the API.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use ragviz_core::chunk::{chunk_words, normalize_words};
use ragviz_core::{
    Chunk, ChunkParams, IndexSummary, PipelineError, PipelineState, QueryResult,
    RetrievalPipeline, TokenCount,
};

use crate::config::Config;
use crate::embedding::create_provider;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    session: Arc<Mutex<Session>>,
    /// Provider facts fixed at startup, readable without taking the lock.
    provider: Arc<ProviderInfo>,
}

/// The pipeline and when its current index was built.
struct Session {
    pipeline: RetrievalPipeline,
    indexed_at: Option<DateTime<Utc>>,
}

struct ProviderInfo {
    model: String,
    mock: bool,
}

impl AppState {
    /// Build state with the provider described by `config`.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let provider = create_provider(&config.embedding)?;
        Ok(Self::with_pipeline(config, RetrievalPipeline::new(provider)))
    }

    /// Build state around an existing pipeline.
    pub fn with_pipeline(config: &Config, pipeline: RetrievalPipeline) -> Self {
        let provider = ProviderInfo {
            model: pipeline.provider().model_name().to_string(),
            mock: pipeline.provider().is_mock(),
        };
        Self {
            config: Arc::new(config.clone()),
            session: Arc::new(Mutex::new(Session {
                pipeline,
                indexed_at: None,
            })),
            provider: Arc::new(provider),
        }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/state", get(handle_state))
        .route("/chunk", post(handle_chunk))
        .route("/index", post(handle_index))
        .route("/query", post(handle_query))
        .route("/tokens", post(handle_tokens))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind`. The server runs
/// until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config)?;

    if state.provider.mock {
        warn!("serving with mock embeddings; query scores will be meaningless");
    }
    info!(model = %state.provider.model, "embedding provider ready");

    let app = router(state);

    println!("ragviz server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
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
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_indexed"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }
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
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::NotIndexed => {
                AppError::new(StatusCode::CONFLICT, "not_indexed", message)
            }
            PipelineError::EmptyQuery => bad_request(message),
            PipelineError::QueryEmbedding(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, "embedding_failed", message)
            }
            PipelineError::BatchSizeMismatch { .. }
            | PipelineError::InconsistentDimensions { .. } => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    pub version: String,
    /// Embedding model name (`"mock"` in mock mode).
    pub provider: String,
    pub mock: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: state.provider.model.clone(),
        mock: state.provider.mock,
    })
}

// ============ GET /state ============

#[derive(Debug, Serialize)]
pub struct StateResponse {
    /// `"empty"` or `"indexed"`.
    pub state: &'static str,
    pub chunk_count: usize,
    pub params: Option<ChunkParams>,
    pub indexed_at: Option<DateTime<Utc>>,
}

async fn handle_state(State(state): State<AppState>) -> Json<StateResponse> {
    let session = state.session.lock().await;
    let label = match session.pipeline.state() {
        PipelineState::Empty => "empty",
        PipelineState::Indexed => "indexed",
    };
    Json(StateResponse {
        state: label,
        chunk_count: session.pipeline.chunks().len(),
        params: session.pipeline.params(),
        indexed_at: session.indexed_at,
    })
}

// ============ POST /chunk ============

/// Body for `POST /chunk` and `POST /index`. Missing parameters come from
/// `[chunking]`; negative values count as 0.
#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
    pub chunk_size: Option<i64>,
    pub overlap: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    pub params: ChunkParams,
    pub total_words: usize,
    pub chunks: Vec<Chunk>,
}

async fn handle_chunk(
    State(state): State<AppState>,
    payload: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<ChunkResponse>, AppError> {
    let Json(req) = payload?;
    let (chunk_size, overlap) = state.config.chunking.resolve(req.chunk_size, req.overlap);

    let params = ChunkParams::clamped(chunk_size, overlap);
    let words = normalize_words(&req.text);
    let chunks = chunk_words(&words, params);

    Ok(Json(ChunkResponse {
        params,
        total_words: words.len(),
        chunks,
    }))
}

// ============ POST /index ============

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    #[serde(flatten)]
    pub summary: IndexSummary,
    pub indexed_at: DateTime<Utc>,
}

async fn handle_index(
    State(state): State<AppState>,
    payload: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<IndexResponse>, AppError> {
    let Json(req) = payload?;
    let (chunk_size, overlap) = state.config.chunking.resolve(req.chunk_size, req.overlap);

    let mut session = state.session.lock().await;
    let summary = session.pipeline.index(&req.text, chunk_size, overlap).await?;
    let indexed_at = Utc::now();
    session.indexed_at = Some(indexed_at);

    Ok(Json(IndexResponse {
        summary,
        indexed_at,
    }))
}

// ============ POST /query ============

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Projection seed; defaults to `[visualization].seed`.
    pub seed: Option<f64>,
}

async fn handle_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResult>, AppError> {
    let Json(req) = payload?;
    let seed = req.seed.unwrap_or(state.config.visualization.seed);
    if !seed.is_finite() {
        return Err(bad_request("seed must be a finite number"));
    }

    let session = state.session.lock().await;
    let result = session.pipeline.query(&req.query, seed).await?;
    Ok(Json(result))
}

// ============ POST /tokens ============

#[derive(Debug, Deserialize)]
pub struct TokensRequest {
    pub text: String,
}

async fn handle_tokens(
    State(state): State<AppState>,
    payload: Result<Json<TokensRequest>, JsonRejection>,
) -> Result<Json<TokenCount>, AppError> {
    let Json(req) = payload?;
    let session = state.session.lock().await;
    let count = session.pipeline.provider().count_tokens(&req.text).await;
    Ok(Json(count))
}
