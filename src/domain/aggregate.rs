//! Derived per-player state rebuilt from the action log.

use crate::domain::{UnixSecs, Wallet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-player counters, totals, income and composite scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAggregate {
    pub wallet: Wallet,
    pub total_actions: i64,
    pub properties_bought: i64,
    pub properties_sold: i64,
    pub successful_steals: i64,
    pub failed_steals: i64,
    pub shields_activated: i64,
    pub rewards_claimed: i64,
    /// Times another player stole from this player.
    pub times_stolen: i64,
    pub total_spent: i64,
    pub total_earned: i64,
    /// Always equal to the sum of the player's ownership rows.
    pub total_slots_owned: i64,
    pub daily_income: i64,
    pub complete_sets: i64,
    pub roi: f64,
    pub steal_win_rate: f64,
    pub defense_rating: f64,
    pub leaderboard_score: i64,
    pub last_action_time: Option<UnixSecs>,
}

impl PlayerAggregate {
    /// Zeroed aggregate, as created lazily on first reference.
    pub fn new(wallet: Wallet) -> Self {
        Self {
            wallet,
            total_actions: 0,
            properties_bought: 0,
            properties_sold: 0,
            successful_steals: 0,
            failed_steals: 0,
            shields_activated: 0,
            rewards_claimed: 0,
            times_stolen: 0,
            total_spent: 0,
            total_earned: 0,
            total_slots_owned: 0,
            daily_income: 0,
            complete_sets: 0,
            roi: 0.0,
            steal_win_rate: 0.0,
            defense_rating: 0.0,
            leaderboard_score: 0,
            last_action_time: None,
        }
    }
}

/// Slots a player holds in one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipRow {
    pub property_id: u32,
    pub slots: i64,
}

/// Ranking dimension of a leaderboard listing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardType {
    #[default]
    Overall,
    Wealth,
    Efficiency,
    Combat,
    Defense,
    Collections,
    Income,
}

impl LeaderboardType {
    pub const ALL: [LeaderboardType; 7] = [
        LeaderboardType::Overall,
        LeaderboardType::Wealth,
        LeaderboardType::Efficiency,
        LeaderboardType::Combat,
        LeaderboardType::Defense,
        LeaderboardType::Collections,
        LeaderboardType::Income,
    ];
}

impl std::str::FromStr for LeaderboardType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overall" => Ok(LeaderboardType::Overall),
            "wealth" => Ok(LeaderboardType::Wealth),
            "efficiency" => Ok(LeaderboardType::Efficiency),
            "combat" => Ok(LeaderboardType::Combat),
            "defense" => Ok(LeaderboardType::Defense),
            "collections" => Ok(LeaderboardType::Collections),
            "income" => Ok(LeaderboardType::Income),
            other => Err(format!(
                "unknown leaderboard type '{}', expected one of overall, wealth, efficiency, combat, defense, collections, income",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: i64,
    #[serde(flatten)]
    pub player: PlayerAggregate,
}

/// Totals across all active players.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardStats {
    pub total_players: i64,
    pub total_actions: i64,
    pub total_earned: i64,
    pub total_steals: i64,
    pub total_complete_sets: i64,
    pub average_score: f64,
    pub top_score: i64,
}

/// One player's position on every leaderboard type. A rank is one more than
/// the number of active players strictly ahead, so ties share a rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRanks {
    pub wallet: Wallet,
    pub ranks: BTreeMap<LeaderboardType, i64>,
}

/// Current holders of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyStats {
    pub property_id: u32,
    /// Players holding at least one slot.
    pub owners: i64,
    pub total_slots: i64,
}
