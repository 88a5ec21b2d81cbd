//! Ingestion pipeline: decode, insert idempotently, project.
//!
//! A new action and the aggregate changes it causes commit in one SQL
//! transaction, and every projection runs under a single lock, so an
//! action is applied exactly once no matter how many paths deliver it.

use super::scores::ScoreRecalculator;
use crate::config::ScorePolicy;
use crate::db::Repository;
use crate::decoder::Decoder;
use crate::domain::{
    Action, Catalog, OwnershipRow, PlayerAggregate, PropertyStats, RawTransaction, UnixSecs, Wallet,
};
use crate::engine::{set_cooldowns, steal_cooldowns, ProjectionState, SetCooldown, StealCooldown};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Result of offering one transaction to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// A new action was stored and projected.
    pub inserted: bool,
    /// The decoded action, if the transaction carried a game event.
    pub action: Option<Action>,
}

impl IngestOutcome {
    fn nothing() -> Self {
        Self {
            inserted: false,
            action: None,
        }
    }
}

/// Counts from a full rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildSummary {
    pub actions: usize,
    pub players: usize,
    pub duration_ms: u64,
}

/// Both cooldown kinds for one player.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cooldowns {
    pub sets: Vec<SetCooldown>,
    pub steals: Vec<StealCooldown>,
}

#[derive(Debug)]
pub struct Pipeline {
    repo: Arc<Repository>,
    catalog: Arc<Catalog>,
    decoder: Decoder,
    scores: Arc<ScoreRecalculator>,
    projection_lock: Arc<Mutex<()>>,
}

impl Pipeline {
    pub fn new(
        repo: Arc<Repository>,
        catalog: Arc<Catalog>,
        decoder: Decoder,
        policy: ScorePolicy,
    ) -> Self {
        let projection_lock = Arc::new(Mutex::new(()));
        let scores = Arc::new(ScoreRecalculator::new(
            repo.clone(),
            policy,
            projection_lock.clone(),
        ));
        Self {
            repo,
            catalog,
            decoder,
            scores,
            projection_lock,
        }
    }

    pub fn repo(&self) -> &Arc<Repository> {
        &self.repo
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn scores(&self) -> &Arc<ScoreRecalculator> {
        &self.scores
    }

    /// Decode a transaction and store its action if it is new.
    ///
    /// Only the first decoded action of a transaction is kept; the store
    /// holds one action per signature.
    pub async fn ingest(&self, raw: &RawTransaction) -> Result<IngestOutcome, IngestError> {
        let mut actions = self.decoder.decode(raw);
        let Some(action) = actions.next() else {
            debug!(signature = %raw.signature, "No game actions in transaction");
            return Ok(IngestOutcome::nothing());
        };
        let ignored = actions.count();
        if ignored > 0 {
            debug!(
                signature = %raw.signature,
                ignored,
                "Transaction carried several game events, keeping the first"
            );
        }

        let inserted = self.store_and_project(&action).await?;
        Ok(IngestOutcome {
            inserted,
            action: Some(action),
        })
    }

    /// Insert `action` and, if it was new, project it onto touched players.
    pub async fn store_and_project(&self, action: &Action) -> Result<bool, IngestError> {
        let _guard = self.projection_lock.lock().await;
        let mut tx = self.repo.begin().await?;

        if !Repository::insert_action_in(&mut *tx, action).await? {
            tx.rollback().await?;
            debug!(signature = %action.transaction_id, "Action already stored");
            return Ok(false);
        }

        let touched = action.touched_players();
        if Repository::has_later_action_in(&mut *tx, &touched, action.observed_at).await? {
            // Arrived after newer actions were applied; applying it on top
            // would differ from chain order, so replay the log instead.
            let (replayed, _) = self.replay_in(&mut *tx).await?;
            tx.commit().await?;
            info!(
                signature = %action.transaction_id,
                kind = %action.kind,
                replayed,
                "Ingested out-of-order action"
            );
            return Ok(true);
        }

        let mut state = ProjectionState::new();
        for wallet in &touched {
            if let Some(agg) = Repository::load_player_in(&mut *tx, wallet).await? {
                let holdings = Repository::load_holdings_in(&mut *tx, wallet).await?;
                state.load_player(agg, holdings);
            }
        }

        state.apply(action, &self.catalog);

        for wallet in &touched {
            let Some(agg) = state.player_mut(wallet) else {
                continue;
            };
            self.scores.score(agg);
            Repository::save_player_in(&mut *tx, agg).await?;
            Repository::save_holdings_in(&mut *tx, wallet, &state.holdings(wallet)).await?;
        }

        tx.commit().await?;

        info!(
            signature = %action.transaction_id,
            kind = %action.kind,
            actor = %action.actor,
            "Ingested action"
        );
        Ok(true)
    }

    /// Recompute every aggregate from the stored actions.
    pub async fn rebuild_all(&self) -> Result<RebuildSummary, IngestError> {
        let started = Instant::now();
        let _guard = self.projection_lock.lock().await;

        let mut tx = self.repo.begin().await?;
        let (actions, players) = self.replay_in(&mut *tx).await?;
        tx.commit().await?;

        let summary = RebuildSummary {
            actions,
            players,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            actions = summary.actions,
            players = summary.players,
            duration_ms = summary.duration_ms,
            "Rebuilt aggregates"
        );
        Ok(summary)
    }

    /// Replace all derived state with a replay of the stored log. Returns
    /// `(actions, players)`. Caller holds the projection lock.
    async fn replay_in(&self, conn: &mut SqliteConnection) -> Result<(usize, usize), IngestError> {
        let actions = Repository::all_actions_ordered_in(&mut *conn).await?;
        let mut state = ProjectionState::replay(&actions, &self.catalog);
        for agg in state.players_mut() {
            self.scores.score(agg);
        }
        let snapshot = state.snapshot();
        Repository::replace_projection_in(&mut *conn, &snapshot).await?;
        Ok((actions.len(), snapshot.players.len()))
    }

    /// A player's aggregate, zeroed if the player has never acted.
    pub async fn get_aggregates(&self, wallet: &Wallet) -> Result<PlayerAggregate, IngestError> {
        Ok(self
            .repo
            .get_player(wallet)
            .await?
            .unwrap_or_else(|| PlayerAggregate::new(wallet.clone())))
    }

    pub async fn get_ownership(&self, wallet: &Wallet) -> Result<Vec<OwnershipRow>, IngestError> {
        Ok(self.repo.get_ownership(wallet).await?)
    }

    /// Holder counts for every catalog property, zero where nobody holds it.
    pub async fn get_property_stats(&self) -> Result<Vec<PropertyStats>, IngestError> {
        let held: BTreeMap<u32, PropertyStats> = self
            .repo
            .property_stats()
            .await?
            .into_iter()
            .map(|s| (s.property_id, s))
            .collect();
        Ok(self
            .catalog
            .properties()
            .map(|p| {
                held.get(&p.id).copied().unwrap_or(PropertyStats {
                    property_id: p.id,
                    owners: 0,
                    total_slots: 0,
                })
            })
            .collect())
    }

    pub async fn get_cooldowns(
        &self,
        wallet: &Wallet,
        now: UnixSecs,
    ) -> Result<Cooldowns, IngestError> {
        let buys = self.repo.last_buy_times(wallet).await?;
        let steals = self.repo.last_steal_times(wallet).await?;
        Ok(Cooldowns {
            sets: set_cooldowns(&self.catalog, &buys, now),
            steals: steal_cooldowns(&self.catalog, &steals, now),
        })
    }
}
