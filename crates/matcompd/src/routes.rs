//! API routes for matcompd
//!
//! Comparisons and history access run on blocking workers: backend fetches
//! use a blocking HTTP client, the engine is CPU-bound and the history store
//! holds a synchronous SQLite connection.

use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use matcomp_common::{
    ClusterPolicy, CompareError, ComparisonRequest, ComparisonResult, HistoryError, HistoryRecord,
    HistoryStore, HistorySummary, InMemoryPredictionSource, NewHistoryRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

type AppStateArc = Arc<AppState>;

/// Listing size when `?limit=` is absent
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Run a history store operation on a blocking worker.
async fn with_history<T, F>(state: &AppStateArc, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&HistoryStore) -> Result<T, HistoryError> + Send + 'static,
    T: Send + 'static,
{
    let history = Arc::clone(&state.history);
    let outcome = tokio::task::spawn_blocking(move || op(&history))
        .await
        .map_err(|e| ApiError::Worker(e.to_string()))?;
    Ok(outcome?)
}

// ============================================================================
// Health Routes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub history_records: usize,
}

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Result<Json<HealthResponse>, ApiError> {
    let history_records = with_history(&state, |history| history.count()).await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        history_records,
    }))
}

// ============================================================================
// Compare Routes
// ============================================================================

/// `POST /v1/compare` body. Tolerance falls back to the configured default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareBody {
    pub task_ids: Vec<String>,
    pub target_columns: Vec<String>,
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub cluster_policy: Option<ClusterPolicy>,
}

/// One task's rows supplied directly by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineTask {
    pub task_id: String,
    #[serde(default)]
    pub predictions: Vec<Value>,
}

/// `POST /v1/compare/inline` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineCompareBody {
    pub target_columns: Vec<String>,
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub cluster_policy: Option<ClusterPolicy>,
    pub tasks: Vec<InlineTask>,
}

pub fn compare_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/compare", post(compare))
        .route("/v1/compare/inline", post(compare_inline))
}

async fn compare(
    State(state): State<AppStateArc>,
    Json(body): Json<CompareBody>,
) -> Result<Json<ComparisonResult>, ApiError> {
    let request = ComparisonRequest {
        task_ids: body.task_ids,
        target_columns: body.target_columns,
        tolerance: body.tolerance.unwrap_or(state.default_tolerance),
        cluster_policy: body.cluster_policy,
    };
    info!(
        "  Compare {} tasks on {:?} at {}%",
        request.task_ids.len(),
        request.target_columns,
        request.tolerance
    );

    let worker_state = Arc::clone(&state);
    let result = tokio::task::spawn_blocking(move || {
        worker_state
            .aggregator
            .compare_from_source(&request, worker_state.source.as_ref())
    })
    .await
    .map_err(|e| ApiError::Worker(e.to_string()))??;

    Ok(Json(result))
}

async fn compare_inline(
    State(state): State<AppStateArc>,
    Json(body): Json<InlineCompareBody>,
) -> Result<Json<ComparisonResult>, ApiError> {
    let task_ids: Vec<String> = body.tasks.iter().map(|t| t.task_id.clone()).collect();
    let request = ComparisonRequest {
        task_ids,
        target_columns: body.target_columns,
        tolerance: body.tolerance.unwrap_or(state.default_tolerance),
        cluster_policy: body.cluster_policy,
    };
    // duplicates would collapse in the source map; reject them first
    request.validate()?;

    let mut source = InMemoryPredictionSource::new();
    for task in body.tasks {
        source.insert(task.task_id, task.predictions);
    }
    info!("  Inline compare of {} tasks", source.len());

    let aggregator = state.aggregator;
    let result = tokio::task::spawn_blocking(move || aggregator.compare_from_source(&request, &source))
        .await
        .map_err(|e| ApiError::Worker(e.to_string()))??;

    Ok(Json(result))
}

// ============================================================================
// History Routes
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// `PUT /v1/history/:id` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteBody {
    #[serde(default)]
    pub note: Option<String>,
}

pub fn history_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/history", get(list_history).post(save_history))
        .route(
            "/v1/history/:id",
            get(get_history).put(update_history).delete(delete_history),
        )
}

async fn list_history(
    State(state): State<AppStateArc>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistorySummary>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let summaries = with_history(&state, move |history| history.list(limit)).await?;
    Ok(Json(summaries))
}

async fn save_history(
    State(state): State<AppStateArc>,
    Json(record): Json<NewHistoryRecord>,
) -> Result<(StatusCode, Json<HistoryRecord>), ApiError> {
    if record.task_ids.len() < 2 {
        return Err(CompareError::TooFewTasks.into());
    }
    if record.target_columns.is_empty() {
        return Err(CompareError::NoTargets.into());
    }

    let saved = with_history(&state, move |history| history.save(record)).await?;
    info!("  Saved comparison {}", saved.id);
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn get_history(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<Json<HistoryRecord>, ApiError> {
    let lookup = id.clone();
    with_history(&state, move |history| history.get(&lookup))
        .await?
        .map(Json)
        .ok_or_else(|| HistoryError::NotFound(id).into())
}

async fn update_history(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    Json(body): Json<NoteBody>,
) -> Result<Json<HistoryRecord>, ApiError> {
    let target = id.clone();
    let replacement =
        with_history(&state, move |history| history.update_note(&target, body.note)).await?;
    info!("  Replaced comparison {} with {}", id, replacement.id);
    Ok(Json(replacement))
}

async fn delete_history(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let target = id.clone();
    if with_history(&state, move |history| history.delete(&target)).await? {
        info!("  Deleted comparison {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(HistoryError::NotFound(id).into())
    }
}
