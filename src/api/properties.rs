use axum::extract::{Path, State};
use axum::Json;

use super::AppState;
use crate::domain::PropertyStats;
use crate::error::AppError;

pub async fn get_all_property_stats(
    State(state): State<AppState>,
) -> Result<Json<Vec<PropertyStats>>, AppError> {
    Ok(Json(state.pipeline.get_property_stats().await?))
}

pub async fn get_property_stats(
    Path(id): Path<u32>,
    State(state): State<AppState>,
) -> Result<Json<PropertyStats>, AppError> {
    state
        .pipeline
        .get_property_stats()
        .await?
        .into_iter()
        .find(|s| s.property_id == id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Unknown property {}", id)))
}
