//! Ownership and player stats operations for the repository.

use crate::domain::{OwnershipRow, PlayerAggregate, UnixSecs, Wallet};
use crate::engine::{ProjectionSnapshot, Scores};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::{decode_error, now_secs, Repository};

pub(super) const PLAYER_COLUMNS: &str = "wallet, total_actions, properties_bought, \
     properties_sold, successful_steals, failed_steals, shields_activated, rewards_claimed, \
     times_stolen, total_spent, total_earned, total_slots_owned, daily_income, complete_sets, \
     roi, steal_win_rate, defense_rating, leaderboard_score, last_action_time";

pub(super) fn player_from_row(row: &SqliteRow) -> Result<PlayerAggregate, sqlx::Error> {
    Ok(PlayerAggregate {
        wallet: Wallet::new(row.try_get::<String, _>("wallet")?),
        total_actions: row.try_get("total_actions")?,
        properties_bought: row.try_get("properties_bought")?,
        properties_sold: row.try_get("properties_sold")?,
        successful_steals: row.try_get("successful_steals")?,
        failed_steals: row.try_get("failed_steals")?,
        shields_activated: row.try_get("shields_activated")?,
        rewards_claimed: row.try_get("rewards_claimed")?,
        times_stolen: row.try_get("times_stolen")?,
        total_spent: row.try_get("total_spent")?,
        total_earned: row.try_get("total_earned")?,
        total_slots_owned: row.try_get("total_slots_owned")?,
        daily_income: row.try_get("daily_income")?,
        complete_sets: row.try_get("complete_sets")?,
        roi: row.try_get("roi")?,
        steal_win_rate: row.try_get("steal_win_rate")?,
        defense_rating: row.try_get("defense_rating")?,
        leaderboard_score: row.try_get("leaderboard_score")?,
        last_action_time: row
            .try_get::<Option<i64>, _>("last_action_time")?
            .map(UnixSecs::new),
    })
}

fn ownership_from_row(row: &SqliteRow) -> Result<OwnershipRow, sqlx::Error> {
    let property_id: i64 = row.try_get("property_id")?;
    Ok(OwnershipRow {
        property_id: u32::try_from(property_id).map_err(|e| decode_error(e.to_string()))?,
        slots: row.try_get("slots")?,
    })
}

impl Repository {
    pub async fn load_player_in(
        conn: &mut SqliteConnection,
        wallet: &Wallet,
    ) -> Result<Option<PlayerAggregate>, sqlx::Error> {
        let sql = format!("SELECT {} FROM player_stats WHERE wallet = ?", PLAYER_COLUMNS);
        sqlx::query(&sql)
            .bind(wallet.as_str())
            .fetch_optional(&mut *conn)
            .await?
            .as_ref()
            .map(player_from_row)
            .transpose()
    }

    pub async fn load_holdings_in(
        conn: &mut SqliteConnection,
        wallet: &Wallet,
    ) -> Result<Vec<OwnershipRow>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT property_id, slots FROM property_ownership WHERE wallet = ? ORDER BY property_id",
        )
        .bind(wallet.as_str())
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(ownership_from_row).collect()
    }

    pub async fn save_player_in(
        conn: &mut SqliteConnection,
        agg: &PlayerAggregate,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO player_stats (
                wallet, total_actions, properties_bought, properties_sold,
                successful_steals, failed_steals, shields_activated, rewards_claimed,
                times_stolen, total_spent, total_earned, total_slots_owned,
                daily_income, complete_sets, roi, steal_win_rate, defense_rating,
                leaderboard_score, last_action_time, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(wallet) DO UPDATE SET
                total_actions = excluded.total_actions,
                properties_bought = excluded.properties_bought,
                properties_sold = excluded.properties_sold,
                successful_steals = excluded.successful_steals,
                failed_steals = excluded.failed_steals,
                shields_activated = excluded.shields_activated,
                rewards_claimed = excluded.rewards_claimed,
                times_stolen = excluded.times_stolen,
                total_spent = excluded.total_spent,
                total_earned = excluded.total_earned,
                total_slots_owned = excluded.total_slots_owned,
                daily_income = excluded.daily_income,
                complete_sets = excluded.complete_sets,
                roi = excluded.roi,
                steal_win_rate = excluded.steal_win_rate,
                defense_rating = excluded.defense_rating,
                leaderboard_score = excluded.leaderboard_score,
                last_action_time = excluded.last_action_time,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(agg.wallet.as_str())
        .bind(agg.total_actions)
        .bind(agg.properties_bought)
        .bind(agg.properties_sold)
        .bind(agg.successful_steals)
        .bind(agg.failed_steals)
        .bind(agg.shields_activated)
        .bind(agg.rewards_claimed)
        .bind(agg.times_stolen)
        .bind(agg.total_spent)
        .bind(agg.total_earned)
        .bind(agg.total_slots_owned)
        .bind(agg.daily_income)
        .bind(agg.complete_sets)
        .bind(agg.roi)
        .bind(agg.steal_win_rate)
        .bind(agg.defense_rating)
        .bind(agg.leaderboard_score)
        .bind(agg.last_action_time.map(|t| t.as_i64()))
        .bind(now_secs())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn save_holdings_in(
        conn: &mut SqliteConnection,
        wallet: &Wallet,
        holdings: &[OwnershipRow],
    ) -> Result<(), sqlx::Error> {
        let updated_at = now_secs();
        for row in holdings {
            sqlx::query(
                r#"
                INSERT INTO property_ownership (wallet, property_id, slots, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(wallet, property_id) DO UPDATE SET
                    slots = excluded.slots,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(wallet.as_str())
            .bind(i64::from(row.property_id))
            .bind(row.slots)
            .bind(updated_at)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn get_player(&self, wallet: &Wallet) -> Result<Option<PlayerAggregate>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::load_player_in(&mut *conn, wallet).await
    }

    /// Non-zero holdings of a player, ascending by property id.
    pub async fn get_ownership(&self, wallet: &Wallet) -> Result<Vec<OwnershipRow>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT property_id, slots FROM property_ownership \
             WHERE wallet = ? AND slots > 0 ORDER BY property_id",
        )
        .bind(wallet.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(ownership_from_row).collect()
    }

    /// Every player, ordered by wallet.
    pub async fn list_players(&self) -> Result<Vec<PlayerAggregate>, sqlx::Error> {
        let sql = format!("SELECT {} FROM player_stats ORDER BY wallet", PLAYER_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(player_from_row).collect()
    }

    pub async fn list_wallets(&self) -> Result<Vec<Wallet>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT wallet FROM player_stats ORDER BY wallet")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(w,)| Wallet::new(w)).collect())
    }

    /// Full persisted projection, in the same order as
    /// [`crate::engine::ProjectionState::snapshot`].
    pub async fn load_snapshot(&self) -> Result<ProjectionSnapshot, sqlx::Error> {
        let players = self.list_players().await?;
        let rows = sqlx::query(
            "SELECT wallet, property_id, slots FROM property_ownership ORDER BY wallet, property_id",
        )
        .fetch_all(&self.pool)
        .await?;
        let ownership = rows
            .iter()
            .map(|row| {
                let wallet: String = row.try_get("wallet")?;
                Ok((Wallet::new(wallet), ownership_from_row(row)?))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        Ok(ProjectionSnapshot { players, ownership })
    }

    /// Replace all derived state with `snapshot` inside `conn`'s transaction.
    pub async fn replace_projection_in(
        conn: &mut SqliteConnection,
        snapshot: &ProjectionSnapshot,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM property_ownership")
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM player_stats")
            .execute(&mut *conn)
            .await?;

        for player in &snapshot.players {
            Self::save_player_in(&mut *conn, player).await?;
        }
        for (wallet, row) in &snapshot.ownership {
            Self::save_holdings_in(&mut *conn, wallet, std::slice::from_ref(row)).await?;
        }
        Ok(())
    }

    /// Overwrite only the derived score fields of one player.
    pub async fn update_scores(
        &self,
        wallet: &Wallet,
        scores: &Scores,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE player_stats
            SET roi = ?, steal_win_rate = ?, defense_rating = ?, leaderboard_score = ?,
                updated_at = ?
            WHERE wallet = ?
            "#,
        )
        .bind(scores.roi)
        .bind(scores.steal_win_rate)
        .bind(scores.defense_rating)
        .bind(scores.leaderboard_score)
        .bind(now_secs())
        .bind(wallet.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_db;
    use super::*;

    fn player(wallet: &str, score: i64) -> PlayerAggregate {
        PlayerAggregate {
            total_actions: 3,
            properties_bought: 2,
            total_spent: 500,
            total_slots_owned: 4,
            roi: 0.5,
            leaderboard_score: score,
            last_action_time: Some(UnixSecs::new(1234)),
            ..PlayerAggregate::new(Wallet::new(wallet))
        }
    }

    fn scores(leaderboard_score: i64) -> Scores {
        Scores {
            roi: 2.0,
            steal_win_rate: 0.5,
            defense_rating: 0.25,
            leaderboard_score,
        }
    }

    #[tokio::test]
    async fn test_save_and_load_player() {
        let (repo, _temp) = setup_test_db().await;
        let agg = player("alice", 10);

        let mut tx = repo.begin().await.unwrap();
        Repository::save_player_in(&mut *tx, &agg).await.unwrap();
        Repository::save_holdings_in(
            &mut tx,
            &agg.wallet,
            &[
                OwnershipRow { property_id: 1, slots: 4 },
                OwnershipRow { property_id: 3, slots: 0 },
            ],
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(repo.get_player(&agg.wallet).await.unwrap(), Some(agg.clone()));
        assert_eq!(
            repo.get_ownership(&agg.wallet).await.unwrap(),
            vec![OwnershipRow { property_id: 1, slots: 4 }]
        );
        let snapshot = repo.load_snapshot().await.unwrap();
        assert_eq!(snapshot.ownership.len(), 2, "zero rows are kept");
    }

    #[tokio::test]
    async fn test_rolled_back_transaction_leaves_nothing() {
        let (repo, _temp) = setup_test_db().await;
        let agg = player("alice", 10);

        let mut tx = repo.begin().await.unwrap();
        Repository::save_player_in(&mut *tx, &agg).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(repo.get_player(&agg.wallet).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_projection() {
        let (repo, _temp) = setup_test_db().await;
        let mut tx = repo.begin().await.unwrap();
        Repository::save_player_in(&mut *tx, &player("stale", 1)).await.unwrap();
        tx.commit().await.unwrap();

        let snapshot = ProjectionSnapshot {
            players: vec![player("alice", 5), player("bob", 7)],
            ownership: vec![(Wallet::new("alice"), OwnershipRow { property_id: 0, slots: 2 })],
        };
        let mut tx = repo.begin().await.unwrap();
        Repository::replace_projection_in(&mut *tx, &snapshot).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(repo.load_snapshot().await.unwrap(), snapshot);
        assert!(repo.get_player(&Wallet::new("stale")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_scores() {
        let (repo, _temp) = setup_test_db().await;
        assert!(!repo
            .update_scores(&Wallet::new("ghost"), &scores(1))
            .await
            .unwrap());

        let mut tx = repo.begin().await.unwrap();
        Repository::save_player_in(&mut *tx, &player("alice", 0)).await.unwrap();
        tx.commit().await.unwrap();

        assert!(repo
            .update_scores(&Wallet::new("alice"), &scores(999))
            .await
            .unwrap());
        let stored = repo.get_player(&Wallet::new("alice")).await.unwrap().unwrap();
        assert_eq!(stored.leaderboard_score, 999);
        assert_eq!(stored.defense_rating, 0.25);
        assert_eq!(repo.list_wallets().await.unwrap(), vec![Wallet::new("alice")]);
    }
}
