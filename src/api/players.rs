use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;

use super::{parse_wallet, AppState, PageQuery};
use crate::domain::{Action, OwnershipRow, PlayerAggregate, UnixSecs};
use crate::engine::{SetCooldown, StealCooldown};
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipResponse {
    pub wallet: String,
    pub total_slots: i64,
    pub holdings: Vec<OwnershipRow>,
}

pub async fn get_player(
    Path(wallet): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PlayerAggregate>, AppError> {
    let wallet = parse_wallet(&wallet)?;
    Ok(Json(state.pipeline.get_aggregates(&wallet).await?))
}

pub async fn get_ownership(
    Path(wallet): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<OwnershipResponse>, AppError> {
    let wallet = parse_wallet(&wallet)?;
    let holdings = state.pipeline.get_ownership(&wallet).await?;
    Ok(Json(OwnershipResponse {
        wallet: wallet.to_string(),
        total_slots: holdings.iter().map(|row| row.slots).sum(),
        holdings,
    }))
}

pub async fn get_player_actions(
    Path(wallet): Path<String>,
    Query(page): Query<PageQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Action>>, AppError> {
    let wallet = parse_wallet(&wallet)?;
    let (limit, offset) = page.resolve()?;
    let actions = state
        .pipeline
        .repo()
        .actions_by_actor(&wallet, limit, offset)
        .await?;
    Ok(Json(actions))
}

pub async fn get_set_cooldowns(
    Path(wallet): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<SetCooldown>>, AppError> {
    let wallet = parse_wallet(&wallet)?;
    let cooldowns = state
        .pipeline
        .get_cooldowns(&wallet, UnixSecs::now())
        .await?;
    Ok(Json(cooldowns.sets))
}

pub async fn get_steal_cooldowns(
    Path(wallet): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<StealCooldown>>, AppError> {
    let wallet = parse_wallet(&wallet)?;
    let cooldowns = state
        .pipeline
        .get_cooldowns(&wallet, UnixSecs::now())
        .await?;
    Ok(Json(cooldowns.steals))
}
