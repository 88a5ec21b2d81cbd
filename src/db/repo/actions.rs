//! Action log operations for the repository.

use crate::domain::{Action, ActionKind, TxSignature, UnixSecs, Wallet};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::str::FromStr;

use super::{decode_error, now_secs, Repository};

/// Most recent action time per property id.
pub type LastActionTimes = BTreeMap<u32, UnixSecs>;

const ACTION_COLUMNS: &str = "tx_signature, kind, actor, counterparty, asset_id, quantity, \
     value, outcome, extra, observed_at";

fn action_from_row(row: &SqliteRow) -> Result<Action, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    let kind = ActionKind::from_str(&kind).map_err(decode_error)?;
    let extra: String = row.try_get("extra")?;
    let extra: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&extra).map_err(|e| decode_error(e.to_string()))?;
    let asset_id: Option<i64> = row.try_get("asset_id")?;
    let asset_id = asset_id
        .map(u32::try_from)
        .transpose()
        .map_err(|e| decode_error(e.to_string()))?;

    Ok(Action {
        transaction_id: TxSignature::new(row.try_get::<String, _>("tx_signature")?),
        kind,
        actor: Wallet::new(row.try_get::<String, _>("actor")?),
        counterparty: row
            .try_get::<Option<String>, _>("counterparty")?
            .map(Wallet::new),
        asset_id,
        quantity: row.try_get("quantity")?,
        value: row.try_get("value")?,
        outcome: row.try_get::<i64, _>("outcome")? != 0,
        extra,
        observed_at: UnixSecs::new(row.try_get("observed_at")?),
    })
}

fn times_by_asset(rows: Vec<SqliteRow>) -> Result<LastActionTimes, sqlx::Error> {
    let mut out = LastActionTimes::new();
    for row in rows {
        let asset: i64 = row.try_get("asset_id")?;
        let at: i64 = row.try_get("last_at")?;
        let asset = u32::try_from(asset).map_err(|e| decode_error(e.to_string()))?;
        out.insert(asset, UnixSecs::new(at));
    }
    Ok(out)
}

impl Repository {
    /// Insert an action if its signature is new, inside `conn`'s transaction.
    ///
    /// Returns `false` without writing when the signature already exists.
    pub async fn insert_action_in(
        conn: &mut SqliteConnection,
        action: &Action,
    ) -> Result<bool, sqlx::Error> {
        let extra = serde_json::to_string(&action.extra)
            .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
        let result = sqlx::query(
            r#"
            INSERT INTO game_actions (
                tx_signature, kind, actor, counterparty, asset_id, quantity,
                value, outcome, extra, observed_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tx_signature) DO NOTHING
            "#,
        )
        .bind(action.transaction_id.as_str())
        .bind(action.kind.as_str())
        .bind(action.actor.as_str())
        .bind(action.counterparty.as_ref().map(|w| w.as_str()))
        .bind(action.asset_id.map(i64::from))
        .bind(action.quantity)
        .bind(action.value)
        .bind(action.outcome as i64)
        .bind(extra)
        .bind(action.observed_at.as_i64())
        .bind(now_secs())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn action_exists(&self, signature: &TxSignature) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM game_actions WHERE tx_signature = ? LIMIT 1")
                .bind(signature.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Most recently observed action; the reconciler's high-water mark.
    pub async fn latest_action(&self) -> Result<Option<Action>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM game_actions ORDER BY observed_at DESC, id DESC LIMIT 1",
            ACTION_COLUMNS
        );
        sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(action_from_row)
            .transpose()
    }

    pub async fn count_actions(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM game_actions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Actions by one player, newest first.
    pub async fn actions_by_actor(
        &self,
        actor: &Wallet,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Action>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM game_actions WHERE actor = ? \
             ORDER BY observed_at DESC, id DESC LIMIT ? OFFSET ?",
            ACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(actor.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(action_from_row).collect()
    }

    /// Actions on one property, newest first.
    pub async fn actions_by_asset(
        &self,
        asset_id: u32,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Action>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM game_actions WHERE asset_id = ? \
             ORDER BY observed_at DESC, id DESC LIMIT ? OFFSET ?",
            ACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(asset_id))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(action_from_row).collect()
    }

    /// Recent actions across all players, optionally of one kind.
    pub async fn recent_actions(
        &self,
        kind: Option<ActionKind>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Action>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM game_actions WHERE (?1 IS NULL OR kind = ?1) \
             ORDER BY observed_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            ACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(kind.map(|k| k.as_str()))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(action_from_row).collect()
    }

    /// The whole log in replay order: `observed_at` then arrival.
    pub async fn all_actions_ordered_in(
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Action>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM game_actions ORDER BY observed_at ASC, id ASC",
            ACTION_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
        rows.iter().map(action_from_row).collect()
    }

    /// Whether any stored action involving one of `players` was observed
    /// strictly after `at`.
    pub async fn has_later_action_in(
        conn: &mut SqliteConnection,
        players: &[Wallet],
        at: UnixSecs,
    ) -> Result<bool, sqlx::Error> {
        for player in players {
            let row: Option<(i64,)> = sqlx::query_as(
                "SELECT 1 FROM game_actions \
                 WHERE observed_at > ?1 AND (actor = ?2 OR counterparty = ?2) LIMIT 1",
            )
            .bind(at.as_i64())
            .bind(player.as_str())
            .fetch_optional(&mut *conn)
            .await?;
            if row.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Time of the player's last buy per property.
    pub async fn last_buy_times(&self, player: &Wallet) -> Result<LastActionTimes, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT asset_id, MAX(observed_at) AS last_at
            FROM game_actions
            WHERE actor = ? AND kind = 'buy' AND asset_id IS NOT NULL
            GROUP BY asset_id
            "#,
        )
        .bind(player.as_str())
        .fetch_all(&self.pool)
        .await?;
        times_by_asset(rows)
    }

    /// Time of the player's last steal attempt per property.
    pub async fn last_steal_times(&self, player: &Wallet) -> Result<LastActionTimes, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT asset_id, MAX(observed_at) AS last_at
            FROM game_actions
            WHERE actor = ? AND kind IN ('steal_success', 'steal_failed')
              AND asset_id IS NOT NULL
            GROUP BY asset_id
            "#,
        )
        .bind(player.as_str())
        .fetch_all(&self.pool)
        .await?;
        times_by_asset(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_db;
    use super::*;
    use serde_json::json;

    impl Repository {
        async fn try_insert_action(&self, action: &Action) -> Result<bool, sqlx::Error> {
            let mut conn = self.pool.acquire().await?;
            Self::insert_action_in(&mut *conn, action).await
        }

        async fn get_action(&self, signature: &TxSignature) -> Result<Option<Action>, sqlx::Error> {
            let sql = format!(
                "SELECT {} FROM game_actions WHERE tx_signature = ?",
                ACTION_COLUMNS
            );
            sqlx::query(&sql)
                .bind(signature.as_str())
                .fetch_optional(&self.pool)
                .await?
                .as_ref()
                .map(action_from_row)
                .transpose()
        }
    }

    fn action(sig: &str, kind: ActionKind, actor: &str, asset: Option<u32>, at: i64) -> Action {
        Action {
            transaction_id: TxSignature::new(sig),
            kind,
            actor: Wallet::new(actor),
            counterparty: None,
            asset_id: asset,
            quantity: Some(1),
            value: Some(100),
            outcome: true,
            extra: BTreeMap::new(),
            observed_at: UnixSecs::new(at),
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let (repo, _temp) = setup_test_db().await;
        let a = action("sig-1", ActionKind::Buy, "alice", Some(2), 100);

        assert!(repo.try_insert_action(&a).await.unwrap());
        assert!(!repo.try_insert_action(&a).await.unwrap());
        assert_eq!(repo.count_actions().await.unwrap(), 1);
        assert!(repo.action_exists(&a.transaction_id).await.unwrap());
        assert!(!repo
            .action_exists(&TxSignature::new("other"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_stored_action_round_trips() {
        let (repo, _temp) = setup_test_db().await;
        let mut a = action("sig-1", ActionKind::StealSuccess, "alice", Some(7), 100);
        a.counterparty = Some(Wallet::new("bob"));
        a.extra.insert("vrfResult".to_string(), json!(42));
        repo.try_insert_action(&a).await.unwrap();

        let stored = repo.get_action(&a.transaction_id).await.unwrap().unwrap();
        assert_eq!(stored, a);
    }

    #[tokio::test]
    async fn test_latest_and_ordering() {
        let (repo, _temp) = setup_test_db().await;
        assert!(repo.latest_action().await.unwrap().is_none());

        repo.try_insert_action(&action("b", ActionKind::Buy, "alice", Some(1), 200))
            .await
            .unwrap();
        repo.try_insert_action(&action("a", ActionKind::Buy, "alice", Some(1), 100))
            .await
            .unwrap();
        repo.try_insert_action(&action("c", ActionKind::Claim, "bob", None, 150))
            .await
            .unwrap();

        let latest = repo.latest_action().await.unwrap().unwrap();
        assert_eq!(latest.transaction_id, TxSignature::new("b"));

        let mut conn = repo.pool.acquire().await.unwrap();
        let replay: Vec<String> = Repository::all_actions_ordered_in(&mut *conn)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.transaction_id.0)
            .collect();
        assert_eq!(replay, vec!["a", "c", "b"]);

        let alice = [Wallet::new("alice")];
        assert!(Repository::has_later_action_in(&mut *conn, &alice, UnixSecs::new(150))
            .await
            .unwrap());
        assert!(!Repository::has_later_action_in(&mut *conn, &alice, UnixSecs::new(200))
            .await
            .unwrap());
        drop(conn);

        let by_alice = repo
            .actions_by_actor(&Wallet::new("alice"), 10, 0)
            .await
            .unwrap();
        assert_eq!(by_alice.len(), 2);
        assert_eq!(by_alice[0].transaction_id, TxSignature::new("b"));

        let page = repo
            .actions_by_actor(&Wallet::new("alice"), 1, 1)
            .await
            .unwrap();
        assert_eq!(page[0].transaction_id, TxSignature::new("a"));

        let claims = repo
            .recent_actions(Some(ActionKind::Claim), 10, 0)
            .await
            .unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(repo.recent_actions(None, 10, 0).await.unwrap().len(), 3);
        assert_eq!(repo.actions_by_asset(1, 10, 0).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_last_times_per_property() {
        let (repo, _temp) = setup_test_db().await;
        for a in [
            action("1", ActionKind::Buy, "alice", Some(0), 100),
            action("2", ActionKind::Buy, "alice", Some(0), 300),
            action("3", ActionKind::Buy, "alice", Some(1), 200),
            action("4", ActionKind::StealFailed, "alice", Some(5), 250),
            action("5", ActionKind::Buy, "bob", Some(0), 900),
        ] {
            repo.try_insert_action(&a).await.unwrap();
        }

        let buys = repo.last_buy_times(&Wallet::new("alice")).await.unwrap();
        assert_eq!(buys.get(&0), Some(&UnixSecs::new(300)));
        assert_eq!(buys.get(&1), Some(&UnixSecs::new(200)));
        assert_eq!(buys.len(), 2);

        let steals = repo.last_steal_times(&Wallet::new("alice")).await.unwrap();
        assert_eq!(steals.get(&5), Some(&UnixSecs::new(250)));
    }
}
