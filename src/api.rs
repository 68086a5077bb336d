use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::errors::{PipelineError, StoreError};
use crate::model::{ContentSource, DailyQuota, SubmissionRecord};
use crate::orchestrator::{Pipeline, RunSummary};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Shared with the scheduler; `/run` requests stop with it too.
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, cancel: CancellationToken) -> Self {
        Self { pipeline, cancel }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/runs", get(runs))
        .route("/run", post(trigger_run))
        .route("/sources", get(sources))
        .route("/submissions", get(submissions))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Store and pipeline failures as JSON error bodies.
pub struct ApiError(StatusCode, String);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::NoActiveSources => {
                ApiError(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            PipelineError::Store(s) => s.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

#[derive(serde::Serialize)]
struct StatusOut {
    quota: DailyQuota,
    remaining: u32,
    max_items_per_run: usize,
    min_relevance: f64,
    runs_recorded: usize,
    last_run: Option<RunSummary>,
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusOut>, ApiError> {
    let p = &state.pipeline;
    let quota = p.quota().snapshot(Utc::now().date_naive()).await?;
    let history = p.history();
    Ok(Json(StatusOut {
        remaining: quota.remaining(),
        quota,
        max_items_per_run: p.settings().max_items_per_run,
        min_relevance: p.settings().min_relevance,
        runs_recorded: history.len(),
        last_run: history.last(),
    }))
}

fn limit_param(q: &HashMap<String, String>, key: &str, default: usize) -> usize {
    q.get(key)
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
        .clamp(1, 500)
}

async fn runs(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Vec<RunSummary>> {
    let n = limit_param(&q, "n", 10);
    Json(state.pipeline.history().snapshot_last_n(n))
}

async fn trigger_run(State(state): State<AppState>) -> Result<Json<RunSummary>, ApiError> {
    let summary = state.pipeline.run(&state.cancel).await?;
    Ok(Json(summary))
}

async fn sources(State(state): State<AppState>) -> Result<Json<Vec<ContentSource>>, ApiError> {
    Ok(Json(state.pipeline.store().list_sources().await?))
}

async fn submissions(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<Vec<SubmissionRecord>>, ApiError> {
    let limit = limit_param(&q, "limit", 20);
    Ok(Json(state.pipeline.store().recent_submissions(limit).await?))
}
