//! Leaderboard listings over player stats.

use crate::domain::{
    LeaderboardEntry, LeaderboardStats, LeaderboardType, PlayerRanks, PropertyStats, Wallet,
};
use sqlx::Row;
use std::collections::BTreeMap;

use super::aggregates::{player_from_row, PLAYER_COLUMNS};
use super::{decode_error, Repository};

/// Largest page a leaderboard query returns.
pub const MAX_LEADERBOARD_LIMIT: i64 = 500;

fn order_column(kind: LeaderboardType) -> &'static str {
    match kind {
        LeaderboardType::Overall => "leaderboard_score",
        LeaderboardType::Wealth => "total_earned",
        LeaderboardType::Efficiency => "roi",
        LeaderboardType::Combat => "successful_steals",
        LeaderboardType::Defense => "defense_rating",
        LeaderboardType::Collections => "complete_sets",
        LeaderboardType::Income => "daily_income",
    }
}

impl Repository {
    /// Active players ranked by `kind`, ties broken by wallet.
    pub async fn leaderboard(
        &self,
        kind: LeaderboardType,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
        let limit = limit.clamp(0, MAX_LEADERBOARD_LIMIT);
        let offset = offset.max(0);
        let sql = format!(
            "SELECT {} FROM player_stats WHERE total_actions > 0 \
             ORDER BY {} DESC, wallet ASC LIMIT ? OFFSET ?",
            PLAYER_COLUMNS,
            order_column(kind)
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                Ok(LeaderboardEntry {
                    rank: offset + i as i64 + 1,
                    player: player_from_row(row)?,
                })
            })
            .collect()
    }

    pub async fn leaderboard_stats(&self) -> Result<LeaderboardStats, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_players,
                COALESCE(SUM(total_actions), 0) AS total_actions,
                COALESCE(SUM(total_earned), 0) AS total_earned,
                COALESCE(SUM(successful_steals), 0) AS total_steals,
                COALESCE(SUM(complete_sets), 0) AS total_complete_sets,
                COALESCE(AVG(leaderboard_score), 0.0) AS average_score,
                COALESCE(MAX(leaderboard_score), 0) AS top_score
            FROM player_stats
            WHERE total_actions > 0
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(LeaderboardStats {
            total_players: row.try_get("total_players")?,
            total_actions: row.try_get("total_actions")?,
            total_earned: row.try_get("total_earned")?,
            total_steals: row.try_get("total_steals")?,
            total_complete_sets: row.try_get("total_complete_sets")?,
            average_score: row.try_get("average_score")?,
            top_score: row.try_get("top_score")?,
        })
    }

    /// Ranks of an active player on every leaderboard type; `None` if the
    /// player has never acted.
    pub async fn player_ranks(&self, wallet: &Wallet) -> Result<Option<PlayerRanks>, sqlx::Error> {
        let active: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM player_stats WHERE wallet = ? AND total_actions > 0",
        )
        .bind(wallet.as_str())
        .fetch_optional(&self.pool)
        .await?;
        if active.is_none() {
            return Ok(None);
        }

        let mut ranks = BTreeMap::new();
        for kind in LeaderboardType::ALL {
            let column = order_column(kind);
            let sql = format!(
                "SELECT COUNT(*) + 1 FROM player_stats \
                 WHERE total_actions > 0 AND {col} > (SELECT {col} FROM player_stats WHERE wallet = ?)",
                col = column
            );
            let (rank,): (i64,) = sqlx::query_as(&sql)
                .bind(wallet.as_str())
                .fetch_one(&self.pool)
                .await?;
            ranks.insert(kind, rank);
        }
        Ok(Some(PlayerRanks {
            wallet: wallet.clone(),
            ranks,
        }))
    }

    /// Holder counts for properties with at least one slot held, by id.
    pub async fn property_stats(&self) -> Result<Vec<PropertyStats>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT property_id, COUNT(*) AS owners, SUM(slots) AS total_slots
            FROM property_ownership
            WHERE slots > 0
            GROUP BY property_id
            ORDER BY property_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get("property_id")?;
                Ok(PropertyStats {
                    property_id: u32::try_from(id).map_err(|e| decode_error(e.to_string()))?,
                    owners: row.try_get("owners")?,
                    total_slots: row.try_get("total_slots")?,
                })
            })
            .collect()
    }
}
