//! Score recalculation, per player and in batch.

use crate::config::ScorePolicy;
use crate::db::Repository;
use crate::domain::{PlayerAggregate, Wallet};
use crate::engine::{apply_scores, compute_scores, Scores};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("Unknown player: {0}")]
    UnknownPlayer(Wallet),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Outcome of a batch recalculation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub processed: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Derives composite scores from persisted counters.
///
/// Shares the projection lock with the pipeline, so a score write never
/// interleaves with a projection of the same player.
#[derive(Debug)]
pub struct ScoreRecalculator {
    repo: Arc<Repository>,
    policy: ScorePolicy,
    projection_lock: Arc<Mutex<()>>,
}

impl ScoreRecalculator {
    pub fn new(repo: Arc<Repository>, policy: ScorePolicy, projection_lock: Arc<Mutex<()>>) -> Self {
        Self {
            repo,
            policy,
            projection_lock,
        }
    }

    /// Score an in-memory aggregate; used inside projections.
    pub fn score(&self, agg: &mut PlayerAggregate) {
        apply_scores(agg, &self.policy);
    }

    /// Recompute and persist one player's scores.
    pub async fn recompute(&self, wallet: &Wallet) -> Result<Scores, ScoreError> {
        let _guard = self.projection_lock.lock().await;
        self.recompute_locked(wallet).await
    }

    async fn recompute_locked(&self, wallet: &Wallet) -> Result<Scores, ScoreError> {
        let agg = self
            .repo
            .get_player(wallet)
            .await?
            .ok_or_else(|| ScoreError::UnknownPlayer(wallet.clone()))?;
        let scores = compute_scores(&agg, &self.policy);
        self.repo.update_scores(wallet, &scores).await?;
        Ok(scores)
    }

    /// Recompute every player, continuing past individual failures.
    pub async fn recompute_all(&self) -> Result<BatchSummary, ScoreError> {
        let _guard = self.projection_lock.lock().await;
        let wallets = self.repo.list_wallets().await?;
        let mut summary = BatchSummary::default();

        for wallet in &wallets {
            summary.processed += 1;
            match self.recompute_locked(wallet).await {
                Ok(_) => summary.updated += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(player = %wallet, error = %e, "Score recalculation failed");
                }
            }
        }

        info!(
            processed = summary.processed,
            updated = summary.updated,
            failed = summary.failed,
            "Recalculated scores"
        );
        Ok(summary)
    }
}
