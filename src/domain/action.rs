//! Action type: one immutable game fact decoded from a chain event.

use crate::domain::{TxSignature, UnixSecs, Wallet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Kind of game action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Buy,
    Sell,
    StealSuccess,
    StealFailed,
    Claim,
    ShieldActivate,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Buy,
        ActionKind::Sell,
        ActionKind::StealSuccess,
        ActionKind::StealFailed,
        ActionKind::Claim,
        ActionKind::ShieldActivate,
    ];

    /// Storage/wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Buy => "buy",
            ActionKind::Sell => "sell",
            ActionKind::StealSuccess => "steal_success",
            ActionKind::StealFailed => "steal_failed",
            ActionKind::Claim => "claim",
            ActionKind::ShieldActivate => "shield_activate",
        }
    }

    /// Whether applying this kind changes slot ownership.
    pub fn moves_slots(&self) -> bool {
        matches!(
            self,
            ActionKind::Buy | ActionKind::Sell | ActionKind::StealSuccess
        )
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| format!("unknown action kind: {}", s))
    }
}

/// A single decoded game action, keyed by transaction signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Idempotency key.
    pub transaction_id: TxSignature,
    pub kind: ActionKind,
    /// Player who performed the action.
    pub actor: Wallet,
    /// Steal target, if any.
    pub counterparty: Option<Wallet>,
    pub asset_id: Option<u32>,
    /// Slots involved.
    pub quantity: Option<i64>,
    /// Currency amount in the smallest unit.
    pub value: Option<i64>,
    pub outcome: bool,
    /// Decoder-specific metadata.
    pub extra: BTreeMap<String, serde_json::Value>,
    /// Chain-reported block time; authoritative for all time math.
    pub observed_at: UnixSecs,
}

impl Action {
    /// Players whose aggregates this action touches (actor first).
    pub fn touched_players(&self) -> Vec<Wallet> {
        let mut players = vec![self.actor.clone()];
        if self.kind == ActionKind::StealSuccess {
            if let Some(target) = &self.counterparty {
                if target != &self.actor {
                    players.push(target.clone());
                }
            }
        }
        players
    }
}
