//! HTTP surface: trigger a triage run, inspect recent ledger rows, and
//! a liveness probe.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{error, info};

use crate::pipeline::TriagePipeline;
use crate::pipeline::types::{ProcessedRecord, RunSummary};
use crate::store::Ledger;

const DEFAULT_RECENT_LIMIT: usize = 50;
const MAX_RECENT_LIMIT: usize = 500;

/// Shared state for the HTTP handlers.
pub struct AppState {
    pub pipeline: Arc<TriagePipeline>,
    pub ledger: Arc<dyn Ledger>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/agent/run", post(run_agent))
        .route("/api/agent/recent", get(recent_records))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Trigger one pipeline run and return its summary. Runs are sequential
/// by construction; concurrent POSTs each get their own full run, with
/// the ledger preventing duplicated actions.
async fn run_agent(State(state): State<Arc<AppState>>) -> Json<RunSummary> {
    info!("Triage run requested over HTTP");
    Json(state.pipeline.run().await)
}

#[derive(Deserialize)]
struct RecentParams {
    limit: Option<usize>,
}

async fn recent_records(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<ProcessedRecord>>, (StatusCode, String)> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);
    state.ledger.recent(limit).await.map(Json).map_err(|e| {
        error!(error = %e, "Failed to load recent records");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

async fn healthz() -> &'static str {
    "ok"
}
