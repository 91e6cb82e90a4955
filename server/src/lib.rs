use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, HeaderValue, StatusCode}, routing::{get, post}, Json, Router};
use docsearch_core::persist::{load_snapshot, save_snapshot, IndexPaths};
use docsearch_core::{build_from, CorpusConfig, Document, Error, IndexManager, IndexStatus, MarkdownCorpus, RebuildSummary, Snapshot};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const DEFAULT_MAX_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Include BM25 scores in the hits
    #[serde(default)]
    pub score: bool,
}
fn default_limit() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    /// `false` until the first index has been published
    pub ready: bool,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Startup options for [`build_app`].
#[derive(Clone, Debug, Default)]
pub struct ServerConfig {
    /// Persisted index to load at startup and to write after a rebuild.
    pub index_dir: Option<PathBuf>,
    /// Corpus to rebuild from; also used at startup when no index is stored.
    pub corpus_root: Option<PathBuf>,
    pub corpus: CorpusConfig,
    pub max_limit: usize,
    pub admin_token: Option<String>,
    /// Comma-separated allowed origins; any origin when unset.
    pub cors_allow_origin: Option<String>,
}

impl ServerConfig {
    /// Fill in `ADMIN_TOKEN` and `CORS_ALLOW_ORIGIN` from the environment.
    pub fn with_env(mut self) -> Self {
        if self.admin_token.is_none() {
            self.admin_token = std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty());
        }
        if self.cors_allow_origin.is_none() {
            self.cors_allow_origin = std::env::var("CORS_ALLOW_ORIGIN").ok();
        }
        self
    }
}

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<IndexManager>,
    pub config: Arc<ServerConfig>,
    /// Held for the whole build-persist-publish sequence of a rebuild.
    pub rebuild_lock: Arc<Mutex<()>>,
}

#[derive(Serialize)]
pub struct RebuildResponse {
    #[serde(flatten)]
    pub summary: RebuildSummary,
    /// `false` when the new index is live but could not be written to disk.
    pub persisted: bool,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

/// Load the persisted index if there is one, otherwise build from the corpus
/// when configured. With neither the manager starts empty.
pub fn init_manager(config: &ServerConfig) -> Result<IndexManager> {
    let manager = IndexManager::new();
    if let Some(dir) = config.index_dir.as_ref().map(IndexPaths::new).filter(IndexPaths::exists) {
        manager.publish(load_snapshot(&dir)?);
    } else if let Some(root) = &config.corpus_root {
        let (snapshot, report) = build_from(&MarkdownCorpus::new(root, config.corpus.clone()))?;
        tracing::info!(indexed = report.included, skipped = report.skipped.len(), "built index from corpus at startup");
        persist(&snapshot, config);
        manager.publish(snapshot);
    } else {
        tracing::warn!("no index or corpus configured, serving an empty index");
    }
    Ok(manager)
}

/// Allow the listed origins, or any origin when none parse.
fn cors_layer(allow_origin: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let origins: Vec<HeaderValue> = allow_origin
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if origins.is_empty() {
        base.allow_origin(Any)
    } else {
        base.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn build_app(manager: Arc<IndexManager>, config: ServerConfig) -> Router {
    let cors = cors_layer(config.cors_allow_origin.as_deref());
    let state = AppState { manager, config: Arc::new(config), rebuild_lock: Arc::new(Mutex::new(())) };
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status_handler))
        .route("/search", get(search_handler))
        .route("/docs/*id", get(doc_handler))
        .route("/index/rebuild", post(rebuild_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let max = if state.config.max_limit == 0 { DEFAULT_MAX_LIMIT } else { state.config.max_limit };
    let limit = params.limit.min(max);

    let outcome = state.manager.search(&params.q, limit).map_err(|e| match e {
        Error::InvalidArgument(msg) => api_error(StatusCode::BAD_REQUEST, msg),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    })?;
    let results: Vec<SearchHit> = outcome
        .hits
        .into_iter()
        .map(|hit| SearchHit { id: hit.id, title: hit.title, repo: hit.repo, score: params.score.then_some(hit.score) })
        .collect();

    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, hits = results.len(), total_hits = outcome.total_hits, took_s = elapsed.as_secs_f64(), "search");
    Ok(Json(SearchResponse {
        query: params.q,
        ready: outcome.ready,
        took_s: elapsed.as_secs_f64(),
        total_hits: outcome.total_hits,
        results,
    }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Document>, ApiError> {
    match state.manager.fetch(&id) {
        Some(doc) => Ok(Json(doc)),
        None => Err((StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found", "id": id })))),
    }
}

pub async fn status_handler(State(state): State<AppState>) -> Json<IndexStatus> {
    Json(state.manager.status())
}

async fn rebuild_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<RebuildResponse>, ApiError> {
    authorize(&state, &headers)?;
    let Some(root) = state.config.corpus_root.clone() else {
        return Err(api_error(StatusCode::CONFLICT, "no corpus root configured"));
    };

    let task_state = state.clone();
    let response = tokio::task::spawn_blocking(move || {
        // One rebuild at a time, so the published snapshot and the one on disk agree
        let _guard = task_state.rebuild_lock.lock();
        let source = MarkdownCorpus::new(root, task_state.config.corpus.clone());
        let (snapshot, report) = build_from(&source)?;
        let persisted = persist(&snapshot, &task_state.config);
        task_state.manager.publish(snapshot);
        Ok::<_, Error>(RebuildResponse { summary: report.into(), persisted })
    })
    .await
    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(|e| match e {
        Error::BuildFailure { .. } => api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    })?;

    Ok(Json(response))
}

/// Write `snapshot` to the configured index directory. Returns `false` when
/// the write failed; with no index directory configured there is nothing to
/// write and the result is `true`.
fn persist(snapshot: &Snapshot, config: &ServerConfig) -> bool {
    let Some(dir) = &config.index_dir else {
        return true;
    };
    let created_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "".into());
    match save_snapshot(&IndexPaths::new(dir), snapshot, &created_at) {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, path = %dir.display(), "failed to persist index, serving it from memory only");
            false
        }
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.config.admin_token {
        Some(t) => t,
        None => return Err(api_error(StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set")),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(api_error(StatusCode::UNAUTHORIZED, "invalid admin token"))
    }
}
