use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;

use crate::api::{parse_wallet, AppState, PageQuery};
use crate::domain::{LeaderboardEntry, LeaderboardStats, LeaderboardType, PlayerRanks};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn get_leaderboard(
    Query(params): Query<LeaderboardQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let kind = match params.kind.as_deref().map(str::trim) {
        Some("") | None => LeaderboardType::default(),
        Some(k) => LeaderboardType::from_str(&k.to_ascii_lowercase()).map_err(AppError::BadRequest)?,
    };
    let (limit, offset) = PageQuery {
        limit: params.limit,
        offset: params.offset,
    }
    .resolve()?;

    let entries = state
        .pipeline
        .repo()
        .leaderboard(kind, limit, offset)
        .await?;
    Ok(Json(entries))
}

pub async fn get_leaderboard_stats(
    State(state): State<AppState>,
) -> Result<Json<LeaderboardStats>, AppError> {
    Ok(Json(state.pipeline.repo().leaderboard_stats().await?))
}

pub async fn get_player_ranks(
    Path(wallet): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PlayerRanks>, AppError> {
    let wallet = parse_wallet(&wallet)?;
    state
        .pipeline
        .repo()
        .player_ranks(&wallet)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Player {} has no ranked activity", wallet)))
}
