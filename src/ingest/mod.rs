//! Ingestion: the pipeline plus the two paths that feed it.

pub mod pipeline;
pub mod reconciler;
pub mod scores;
pub mod subscriber;

pub use pipeline::{Cooldowns, IngestError, IngestOutcome, Pipeline, RebuildSummary};
pub use reconciler::{GapCheckReport, GapReconciler, GapStats, ReconcileError};
pub use scores::{BatchSummary, ScoreError, ScoreRecalculator};
pub use subscriber::{ConnectionState, LiveSubscriber, SubscriberError, SubscriberStats};

use crate::domain::UnixSecs;
use serde::Serialize;

/// Combined view over both ingestion paths.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionStats {
    pub connected: bool,
    pub state: ConnectionState,
    pub uptime_secs: Option<i64>,
    pub received: u64,
    pub processed: u64,
    pub failed: u64,
    pub reconnects: u64,
    pub success_rate: f64,
    pub total_checks: u64,
    pub total_gaps_found: u64,
    pub total_backfilled: u64,
    pub last_gap_check: Option<UnixSecs>,
    pub gap_check_running: bool,
}

impl IngestionStats {
    pub fn collect(subscriber: &LiveSubscriber, reconciler: &GapReconciler) -> Self {
        let live = subscriber.stats();
        let gaps = reconciler.stats();
        Self {
            connected: live.connected,
            state: live.state,
            uptime_secs: live.uptime_secs,
            received: live.received,
            processed: live.processed,
            failed: live.failed,
            reconnects: live.reconnects,
            success_rate: live.success_rate,
            total_checks: gaps.total_checks,
            total_gaps_found: gaps.total_gaps_found,
            total_backfilled: gaps.total_backfilled,
            last_gap_check: gaps.last_check,
            gap_check_running: reconciler.is_checking(),
        }
    }
}
