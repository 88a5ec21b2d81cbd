//! Ingestion status and operator triggers.

use axum::extract::State;
use axum::Json;

use super::AppState;
use crate::error::AppError;
use crate::ingest::{BatchSummary, GapCheckReport, IngestionStats, RebuildSummary};

pub async fn get_ingestion_stats(State(state): State<AppState>) -> Json<IngestionStats> {
    Json(IngestionStats::collect(&state.subscriber, &state.reconciler))
}

pub async fn trigger_gap_check(
    State(state): State<AppState>,
) -> Result<Json<GapCheckReport>, AppError> {
    Ok(Json(state.reconciler.check().await?))
}

pub async fn rebuild(State(state): State<AppState>) -> Result<Json<RebuildSummary>, AppError> {
    Ok(Json(state.pipeline.rebuild_all().await?))
}

pub async fn recalculate_scores(
    State(state): State<AppState>,
) -> Result<Json<BatchSummary>, AppError> {
    Ok(Json(state.pipeline.scores().recompute_all().await?))
}
