//! Gap reconciler: backfills transactions the live path missed.
//!
//! A check lists the program's recent signatures, skips the ones already
//! stored, and feeds the rest through the same pipeline the subscriber uses.
//! Only one check runs at a time; a second request while one is in flight
//! is refused rather than queued.

use super::pipeline::{IngestError, Pipeline};
use crate::chain::{ChainClient, ChainError};
use crate::config::GapConfig;
use crate::domain::{TxSignature, UnixSecs};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Signatures known to carry no game action, so they are not refetched on
/// every check. Cleared wholesale when it grows past this size.
const MAX_REMEMBERED_EMPTY: usize = 10_000;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("A gap check is already in progress")]
    CheckInProgress,
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Result of one completed check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GapCheckReport {
    pub signatures_checked: usize,
    pub gaps_found: usize,
    pub backfilled: usize,
    pub failed: usize,
}

/// Cumulative counters across checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GapStats {
    pub total_checks: u64,
    pub total_gaps_found: u64,
    pub total_backfilled: u64,
    pub last_check: Option<UnixSecs>,
    pub last_report: Option<GapCheckReport>,
}

struct Timer {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct GapReconciler {
    chain: Arc<dyn ChainClient>,
    pipeline: Arc<Pipeline>,
    program_id: String,
    config: GapConfig,
    check_lock: Mutex<()>,
    stats: StdMutex<GapStats>,
    empty_signatures: StdMutex<HashSet<TxSignature>>,
    timer: Mutex<Option<Timer>>,
}

impl GapReconciler {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        pipeline: Arc<Pipeline>,
        program_id: String,
        config: GapConfig,
    ) -> Self {
        Self {
            chain,
            pipeline,
            program_id,
            config,
            check_lock: Mutex::new(()),
            stats: StdMutex::new(GapStats::default()),
            empty_signatures: StdMutex::new(HashSet::new()),
            timer: Mutex::new(None),
        }
    }

    pub fn stats(&self) -> GapStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_checking(&self) -> bool {
        self.check_lock.try_lock().is_err()
    }

    /// Run one check now, or fail with `CheckInProgress` if one is running.
    pub async fn check(&self) -> Result<GapCheckReport, ReconcileError> {
        let Ok(_guard) = self.check_lock.try_lock() else {
            return Err(ReconcileError::CheckInProgress);
        };

        let result = self.run_check().await;

        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.total_checks += 1;
        stats.last_check = Some(UnixSecs::now());
        if let Ok(report) = &result {
            stats.total_gaps_found += report.gaps_found as u64;
            stats.total_backfilled += report.backfilled as u64;
            stats.last_report = Some(report.clone());
        }
        result
    }

    async fn run_check(&self) -> Result<GapCheckReport, ReconcileError> {
        let repo = self.pipeline.repo();
        let high_water = repo.latest_action().await?.map(|a| a.observed_at);
        let limit = match high_water {
            Some(_) => self.config.signature_limit,
            None => self.config.initial_backfill_limit,
        };
        debug!(high_water = ?high_water, limit, "Starting gap check");

        let signatures = self
            .chain
            .get_recent_signatures(&self.program_id, limit)
            .await?;

        let mut report = GapCheckReport {
            signatures_checked: signatures.len(),
            ..GapCheckReport::default()
        };

        let mut missing = Vec::new();
        for info in signatures.iter().rev() {
            if info.failed || self.is_known_empty(&info.signature) {
                continue;
            }
            if !repo.action_exists(&info.signature).await? {
                missing.push(info.signature.clone());
            }
        }
        report.gaps_found = missing.len();

        if missing.is_empty() {
            debug!(checked = report.signatures_checked, "No gaps found");
            return Ok(report);
        }
        info!(
            checked = report.signatures_checked,
            missing = missing.len(),
            "Backfilling missed transactions"
        );

        // Oldest first, so backfilled actions land in chain order.
        for (i, signature) in missing.iter().enumerate() {
            if i > 0 && !self.config.backfill_delay.is_zero() {
                sleep(self.config.backfill_delay).await;
            }
            match self.backfill_one(signature).await {
                Ok(true) => report.backfilled += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(signature = %signature, error = %e, "Backfill failed");
                }
            }
        }

        info!(
            gaps = report.gaps_found,
            backfilled = report.backfilled,
            failed = report.failed,
            "Gap check complete"
        );
        Ok(report)
    }

    async fn backfill_one(&self, signature: &TxSignature) -> Result<bool, ReconcileError> {
        let Some(tx) = self.chain.get_transaction(signature).await? else {
            debug!(signature = %signature, "Transaction not yet available");
            return Ok(false);
        };
        if tx.awaiting_block_time() {
            debug!(signature = %signature, "Transaction has no block time yet, retrying next check");
            return Ok(false);
        }
        let outcome = self.pipeline.ingest(&tx).await?;
        if outcome.action.is_none() && !tx.failed {
            self.remember_empty(signature);
        }
        Ok(outcome.inserted)
    }

    fn is_known_empty(&self, signature: &TxSignature) -> bool {
        self.empty_signatures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(signature)
    }

    fn remember_empty(&self, signature: &TxSignature) {
        let mut known = self.empty_signatures.lock().unwrap_or_else(|e| e.into_inner());
        if known.len() >= MAX_REMEMBERED_EMPTY {
            known.clear();
        }
        known.insert(signature.clone());
    }

    /// Start periodic checks: one after the initial delay, then every interval.
    pub async fn start(self: &Arc<Self>) {
        let mut timer = self.timer.lock().await;
        if timer.as_ref().is_some_and(|t| !t.task.is_finished()) {
            debug!("Gap reconciler already running");
            return;
        }
        let (stop, mut stop_rx) = watch::channel(false);
        let this = self.clone();
        let task = tokio::spawn(async move {
            let mut delay = this.config.initial_delay;
            loop {
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = stop_rx.changed() => break,
                }
                match this.check().await {
                    Ok(_) => {}
                    Err(ReconcileError::CheckInProgress) => {
                        debug!("Skipping scheduled gap check, one is already running");
                    }
                    Err(e) => error!(error = %e, "Scheduled gap check failed"),
                }
                delay = this.config.check_interval;
            }
        });
        *timer = Some(Timer { stop, task });
        info!(
            interval_secs = self.config.check_interval.as_secs(),
            "Started gap reconciler"
        );
    }

    pub async fn stop(&self) {
        let Some(Timer { stop, task }) = self.timer.lock().await.take() else {
            return;
        };
        let _ = stop.send(true);
        if let Err(e) = task.await {
            error!(error = %e, "Gap reconciler task panicked");
        }
        info!("Stopped gap reconciler");
    }
}
