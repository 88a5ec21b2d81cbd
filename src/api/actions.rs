use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;

use super::{AppState, PageQuery};
use crate::domain::{Action, ActionKind};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub kind: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn get_property_actions(
    Path(id): Path<u32>,
    Query(page): Query<PageQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Action>>, AppError> {
    if state.pipeline.catalog().property(id).is_none() {
        return Err(AppError::NotFound(format!("Unknown property {}", id)));
    }
    let (limit, offset) = page.resolve()?;
    let actions = state
        .pipeline
        .repo()
        .actions_by_asset(id, limit, offset)
        .await?;
    Ok(Json(actions))
}

pub async fn get_recent_actions(
    Query(params): Query<RecentQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Action>>, AppError> {
    let kind = match params.kind.as_deref() {
        Some("") | None => None,
        Some(k) => Some(ActionKind::from_str(k).map_err(AppError::BadRequest)?),
    };
    let (limit, offset) = PageQuery {
        limit: params.limit,
        offset: params.offset,
    }
    .resolve()?;

    let actions = state
        .pipeline
        .repo()
        .recent_actions(kind, limit, offset)
        .await?;
    Ok(Json(actions))
}
