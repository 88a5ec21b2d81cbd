pub mod actions;
pub mod admin;
pub mod health;
pub mod leaderboard;
pub mod players;
pub mod properties;

use crate::domain::Wallet;
use crate::error::AppError;
use crate::ingest::{GapReconciler, LiveSubscriber, Pipeline};
use axum::{
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Page size when the caller gives none.
pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub subscriber: Arc<LiveSubscriber>,
    pub reconciler: Arc<GapReconciler>,
}

impl AppState {
    pub fn new(
        pipeline: Arc<Pipeline>,
        subscriber: Arc<LiveSubscriber>,
        reconciler: Arc<GapReconciler>,
    ) -> Self {
        Self {
            pipeline,
            subscriber,
            reconciler,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    /// Validated `(limit, offset)`.
    pub fn resolve(&self) -> Result<(i64, i64), AppError> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = self.offset.unwrap_or(0);
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(AppError::BadRequest(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }
        if offset < 0 {
            return Err(AppError::BadRequest("offset must be >= 0".to_string()));
        }
        Ok((limit, offset))
    }
}

pub(crate) fn parse_wallet(raw: &str) -> Result<Wallet, AppError> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest("Invalid wallet address".to_string()));
    }
    Ok(Wallet::new(raw))
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/players/:wallet", get(players::get_player))
        .route("/v1/players/:wallet/ownership", get(players::get_ownership))
        .route("/v1/players/:wallet/actions", get(players::get_player_actions))
        .route("/v1/players/:wallet/cooldowns", get(players::get_set_cooldowns))
        .route(
            "/v1/players/:wallet/steal-cooldowns",
            get(players::get_steal_cooldowns),
        )
        .route(
            "/v1/properties/:id/actions",
            get(actions::get_property_actions),
        )
        .route("/v1/properties/stats", get(properties::get_all_property_stats))
        .route("/v1/properties/:id/stats", get(properties::get_property_stats))
        .route("/v1/actions/recent", get(actions::get_recent_actions))
        .route("/v1/leaderboard", get(leaderboard::get_leaderboard))
        .route("/v1/leaderboard/stats", get(leaderboard::get_leaderboard_stats))
        .route(
            "/v1/leaderboard/ranks/:wallet",
            get(leaderboard::get_player_ranks),
        )
        .route("/v1/ingestion/stats", get(admin::get_ingestion_stats))
        .route("/v1/ingestion/gap-check", post(admin::trigger_gap_check))
        .route("/v1/admin/rebuild", post(admin::rebuild))
        .route(
            "/v1/admin/recalculate-scores",
            post(admin::recalculate_scores),
        )
        .layer(cors)
        .with_state(state)
}
