//! Aggregate projection: the pure core of applying actions to derived state.
//!
//! Both the incremental path (load touched players, apply one action, persist)
//! and full rebuild (apply every stored action from empty) run through
//! [`ProjectionState::apply`], so the two cannot drift.

use crate::domain::{Action, ActionKind, Catalog, OwnershipRow, PlayerAggregate, Wallet};
use crate::engine::income::compute_daily_income;
use std::collections::BTreeMap;
use tracing::warn;

/// In-memory working set of player aggregates and ownership.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionState {
    players: BTreeMap<Wallet, PlayerAggregate>,
    ownership: BTreeMap<Wallet, BTreeMap<u32, i64>>,
}

/// Flattened state, in the order it is persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionSnapshot {
    pub players: Vec<PlayerAggregate>,
    pub ownership: Vec<(Wallet, OwnershipRow)>,
}

impl ProjectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the working set with a player's persisted state.
    pub fn load_player(&mut self, mut aggregate: PlayerAggregate, holdings: Vec<OwnershipRow>) {
        let rows: BTreeMap<u32, i64> = holdings
            .into_iter()
            .map(|row| (row.property_id, row.slots))
            .collect();
        let held: i64 = rows.values().sum();
        if held != aggregate.total_slots_owned {
            warn!(
                player = %aggregate.wallet,
                recorded = aggregate.total_slots_owned,
                held,
                "Slot total disagrees with ownership rows, using ownership"
            );
            aggregate.total_slots_owned = held;
        }
        self.ownership.insert(aggregate.wallet.clone(), rows);
        self.players.insert(aggregate.wallet.clone(), aggregate);
    }

    pub fn player(&self, wallet: &Wallet) -> Option<&PlayerAggregate> {
        self.players.get(wallet)
    }

    pub fn player_mut(&mut self, wallet: &Wallet) -> Option<&mut PlayerAggregate> {
        self.players.get_mut(wallet)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerAggregate> {
        self.players.values()
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut PlayerAggregate> {
        self.players.values_mut()
    }

    /// Ownership rows for a player, ascending by property id.
    pub fn holdings(&self, wallet: &Wallet) -> Vec<OwnershipRow> {
        self.ownership
            .get(wallet)
            .map(|rows| {
                rows.iter()
                    .map(|(property_id, slots)| OwnershipRow {
                        property_id: *property_id,
                        slots: *slots,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Apply one action. Must be called exactly once per stored action.
    pub fn apply(&mut self, action: &Action, catalog: &Catalog) {
        let actor = action.actor.clone();
        let value = action.value.unwrap_or(0).max(0);
        let quantity = action.quantity.unwrap_or(0);
        if quantity < 0 {
            warn!(
                signature = %action.transaction_id,
                quantity,
                "Negative slot quantity on action, treating as zero"
            );
        }
        let quantity = quantity.max(0);

        {
            let agg = self.aggregate_mut(&actor);
            agg.total_actions += 1;
            agg.last_action_time = agg.last_action_time.max(Some(action.observed_at));
        }

        match action.kind {
            ActionKind::Buy => {
                if let Some(asset) = self.asset_of(action) {
                    self.adjust_slots(&actor, asset, quantity, action);
                }
                let agg = self.aggregate_mut(&actor);
                agg.total_spent += value;
                agg.properties_bought += 1;
            }
            ActionKind::Sell => {
                if let Some(asset) = self.asset_of(action) {
                    self.adjust_slots(&actor, asset, -quantity, action);
                }
                let agg = self.aggregate_mut(&actor);
                agg.total_earned += value;
                agg.properties_sold += 1;
            }
            ActionKind::StealSuccess => {
                if let Some(asset) = self.asset_of(action) {
                    self.adjust_slots(&actor, asset, quantity, action);
                    match &action.counterparty {
                        Some(target) => {
                            self.adjust_slots(target, asset, -quantity, action);
                        }
                        None => warn!(
                            signature = %action.transaction_id,
                            "Successful steal without a target, only crediting attacker"
                        ),
                    }
                }
                if let Some(target) = &action.counterparty {
                    self.aggregate_mut(target).times_stolen += 1;
                }
                self.aggregate_mut(&actor).successful_steals += 1;
            }
            ActionKind::StealFailed => {
                let agg = self.aggregate_mut(&actor);
                agg.total_spent += value;
                agg.failed_steals += 1;
            }
            ActionKind::Claim => {
                let agg = self.aggregate_mut(&actor);
                agg.total_earned += value;
                agg.rewards_claimed += 1;
            }
            ActionKind::ShieldActivate => {
                let agg = self.aggregate_mut(&actor);
                agg.total_spent += value;
                agg.shields_activated += 1;
            }
        }

        if action.kind.moves_slots() {
            for wallet in action.touched_players() {
                self.recompute_holdings(&wallet, catalog);
            }
        }
    }

    /// Rebuild from scratch by applying `actions` in the given order.
    pub fn replay<'a>(actions: impl IntoIterator<Item = &'a Action>, catalog: &Catalog) -> Self {
        let mut state = Self::new();
        for action in actions {
            state.apply(action, catalog);
        }
        state
    }

    pub fn snapshot(&self) -> ProjectionSnapshot {
        let players = self.players.values().cloned().collect();
        let ownership = self
            .ownership
            .iter()
            .flat_map(|(wallet, rows)| {
                rows.iter().map(move |(property_id, slots)| {
                    (
                        wallet.clone(),
                        OwnershipRow {
                            property_id: *property_id,
                            slots: *slots,
                        },
                    )
                })
            })
            .collect();
        ProjectionSnapshot { players, ownership }
    }

    fn aggregate_mut(&mut self, wallet: &Wallet) -> &mut PlayerAggregate {
        self.players
            .entry(wallet.clone())
            .or_insert_with(|| PlayerAggregate::new(wallet.clone()))
    }

    fn asset_of(&self, action: &Action) -> Option<u32> {
        if action.asset_id.is_none() {
            warn!(
                signature = %action.transaction_id,
                kind = %action.kind,
                "Slot-moving action without a property id, ownership unchanged"
            );
        }
        action.asset_id
    }

    /// Add `delta` slots, clamping at zero.
    fn adjust_slots(&mut self, wallet: &Wallet, property_id: u32, delta: i64, action: &Action) {
        let slots = self
            .ownership
            .entry(wallet.clone())
            .or_default()
            .entry(property_id)
            .or_insert(0);
        let next = *slots + delta;
        if next < 0 {
            warn!(
                signature = %action.transaction_id,
                player = %wallet,
                property_id,
                held = *slots,
                delta,
                "Ownership would go negative, clamping to zero"
            );
        }
        *slots = next.max(0);
    }

    /// Re-derive slot total, income and complete sets from current holdings.
    fn recompute_holdings(&mut self, wallet: &Wallet, catalog: &Catalog) {
        let holdings = self.holdings(wallet);
        let total: i64 = holdings.iter().map(|r| r.slots).sum();
        let income = compute_daily_income(&holdings, catalog);

        let agg = self.aggregate_mut(wallet);
        agg.total_slots_owned = total;
        agg.daily_income = income.daily_income;
        agg.complete_sets = income.complete_sets;
    }
}
