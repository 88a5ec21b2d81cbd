//! Raw transaction envelope as fetched from the chain.

use crate::domain::{TxSignature, UnixSecs};
use serde::{Deserialize, Serialize};

/// A confirmed transaction touching the game program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub signature: TxSignature,
    pub slot: u64,
    /// Chain-reported time; transactions without one cannot be ordered.
    pub block_time: Option<UnixSecs>,
    pub logs: Vec<String>,
    /// Execution failed on chain (`meta.err` was set).
    pub failed: bool,
}

impl RawTransaction {
    /// A successful transaction with a block time.
    pub fn confirmed(
        signature: TxSignature,
        slot: u64,
        block_time: UnixSecs,
        logs: Vec<String>,
    ) -> Self {
        Self {
            signature,
            slot,
            block_time: Some(block_time),
            logs,
            failed: false,
        }
    }

    /// Succeeded but the node has not assigned a block time yet; a later
    /// fetch will carry one.
    pub fn awaiting_block_time(&self) -> bool {
        !self.failed && self.block_time.is_none()
    }
}
