use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post}, Json, Router};
use parking_lot::RwLock;
use rank_core::corpus::{load_documents, SplitMode};
use rank_core::persist::{load_snapshot, SnapshotPaths};
use rank_core::{Bm25Engine, DocId, EngineConfig, RankError, ResultFilter, ScoreExplanation, Tokenizer};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    /// Include documents scoring 0.
    #[serde(default)]
    pub all: bool,
}
fn default_k() -> usize { 10 }

#[derive(Deserialize)]
pub struct ExplainParams {
    pub q: String,
    pub doc_id: i64,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub snippet: Option<String>,
}

/// Where the served engine comes from, and how `/reload` rebuilds it.
#[derive(Debug, Clone)]
pub enum IndexSource {
    Corpus { path: PathBuf, split: SplitMode, config: EngineConfig },
    Snapshot(PathBuf),
    /// Fixed in-memory engine; cannot be reloaded.
    Static,
}

impl IndexSource {
    fn load(&self) -> Result<Option<Bm25Engine>> {
        match self {
            IndexSource::Corpus { path, split, config } => {
                let documents = load_documents(path, *split)?;
                Ok(Some(Bm25Engine::with_config(documents, *config)?))
            }
            IndexSource::Snapshot(dir) => {
                let (engine, _meta) = load_snapshot(&SnapshotPaths::new(dir))?;
                Ok(Some(engine))
            }
            IndexSource::Static => Ok(None),
        }
    }
}

/// Readers clone the inner `Arc` and drop the lock; `/reload` builds a new
/// engine before taking the write lock, so no reader sees a partial index.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<RwLock<Arc<Bm25Engine>>>,
    source: Arc<IndexSource>,
}

impl AppState {
    pub fn new(engine: Bm25Engine, source: IndexSource) -> Self {
        Self { engine: Arc::new(RwLock::new(Arc::new(engine))), source: Arc::new(source) }
    }

    pub fn engine(&self) -> Arc<Bm25Engine> {
        self.engine.read().clone()
    }

    fn replace(&self, engine: Bm25Engine) {
        *self.engine.write() = Arc::new(engine);
    }
}

pub fn build_app(source: IndexSource) -> Result<Router> {
    let engine = source
        .load()?
        .ok_or_else(|| anyhow::anyhow!("a static source needs an engine, use build_app_with_engine"))?;
    Ok(router(AppState::new(engine, source)))
}

pub fn build_app_with_engine(engine: Bm25Engine) -> Router {
    router(AppState::new(engine, IndexSource::Static))
}

fn router(app_state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/explain", get(explain_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/reload", post(reload_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let engine = state.engine();
    let filter = if params.all { ResultFilter::All } else { ResultFilter::NonZero };
    let ranked = engine.search_with(&params.q, usize::MAX, filter);
    let total_hits = ranked.len();
    let k = params.k.clamp(1, 100);

    let terms = highlight_terms_for(engine.config().tokenizer, &params.q);
    let results = ranked
        .into_iter()
        .take(k)
        .map(|hit| {
            let snippet = engine.get_document(hit.doc_id).ok().and_then(|text| snippet_from_text(text, &terms));
            SearchHit { doc_id: hit.doc_id, score: hit.score, snippet }
        })
        .collect();

    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, total_hits, took_s = elapsed.as_secs_f64(), "search served");
    Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits, results })
}

pub async fn explain_handler(State(state): State<AppState>, Query(params): Query<ExplainParams>) -> Result<Json<ScoreExplanation>, ApiError> {
    let engine = state.engine();
    let doc_id = engine.resolve_doc_id(params.doc_id).map_err(rank_error)?;
    let explanation = engine.explain_score(&params.q, doc_id).map_err(rank_error)?;
    Ok(Json(explanation))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<i64>) -> Result<Json<serde_json::Value>, ApiError> {
    let engine = state.engine();
    let doc_id = engine.resolve_doc_id(doc_id).map_err(rank_error)?;
    let text = engine.get_document(doc_id).map_err(rank_error)?;
    Ok(Json(serde_json::json!({
        "doc_id": doc_id,
        "length": engine.doc_length(doc_id).map_err(rank_error)?,
        "text": text,
    })))
}

async fn reload_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let source = state.source.clone();
    let loaded = tokio::task::spawn_blocking(move || source.load())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            tracing::warn!(error = %e, "reload failed, keeping current index");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        })?;
    let Some(engine) = loaded else {
        return Err((StatusCode::CONFLICT, "index was not loaded from disk and cannot be reloaded".into()));
    };
    let num_docs = engine.num_docs();
    state.replace(engine);
    tracing::info!(num_docs, "index reloaded");
    Ok(Json(serde_json::json!({ "num_docs": num_docs })))
}

fn rank_error(err: RankError) -> ApiError {
    match err {
        RankError::InvalidDocumentId { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        RankError::EmptyCorpus => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

/// Query terms as the engine sees them. Stemmed terms would not match the raw
/// text, so the analyzed policy highlights its unstemmed word tokens instead.
fn highlight_terms_for(tokenizer: Tokenizer, query: &str) -> Vec<String> {
    match tokenizer {
        Tokenizer::Whitespace | Tokenizer::Word => tokenizer.tokenize(query),
        Tokenizer::Analyzed => Tokenizer::Word.tokenize(query),
    }
}

fn snippet_from_text(text: &str, terms: &[String]) -> Option<String> {
    if text.is_empty() { return None; }
    let pattern = highlight_pattern(terms);
    let first_idx = pattern.as_ref().and_then(|pat| pat.find(text)).map(|m| m.start());
    let snippet = match first_idx {
        Some(idx) => {
            let start = char_boundary(text, idx.saturating_sub(100));
            let end = char_boundary(text, (idx + 200).min(text.len()));
            text[start..end].to_string()
        }
        None => text.chars().take(200).collect(),
    };
    match pattern {
        Some(pat) => Some(pat.replace_all(&snippet, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).into_owned()),
        None => Some(snippet),
    }
}

fn char_boundary(text: &str, mut idx: usize) -> usize {
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// One case-insensitive alternation over all terms, longest first, so a single
/// `replace_all` pass never rewrites markup it inserted itself.
fn highlight_pattern(terms: &[String]) -> Option<regex::Regex> {
    let mut escaped: Vec<String> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(regex::escape)
        .collect();
    if escaped.is_empty() { return None; }
    escaped.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    escaped.dedup();
    regex::RegexBuilder::new(&escaped.join("|")).case_insensitive(true).build().ok()
}
