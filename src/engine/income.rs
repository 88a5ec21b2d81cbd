//! Daily income with set-completion bonus.
//!
//! Income is always derived from the full current holdings plus the static
//! catalog, never from deltas, so it is identical after replay.

use crate::domain::{Catalog, OwnershipRow, Property};
use std::collections::BTreeMap;
use tracing::warn;

const BPS: i128 = 10_000;

/// Result of an income recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IncomeBreakdown {
    pub daily_income: i64,
    pub complete_sets: i64,
}

/// Compute a player's daily income from their ownership rows.
///
/// Rows with zero slots are ignored. A set is complete when the player holds
/// at least one slot in every member property; then the first `min_slots`
/// slots of each member property earn `(10000 + bonus_bps) / 10000` of base.
pub fn compute_daily_income(holdings: &[OwnershipRow], catalog: &Catalog) -> IncomeBreakdown {
    let mut by_set: BTreeMap<u32, Vec<(&Property, i64)>> = BTreeMap::new();
    for row in holdings.iter().filter(|r| r.slots > 0) {
        match catalog.property(row.property_id) {
            Some(property) => by_set
                .entry(property.set_id)
                .or_default()
                .push((property, row.slots)),
            None => warn!(
                property_id = row.property_id,
                "Ownership row references a property missing from the catalog"
            ),
        }
    }

    // Everything is accumulated scaled by BPS * BPS and floored once at the end.
    let mut scaled_total: i128 = 0;
    let mut complete_sets = 0i64;

    for (set_id, owned) in &by_set {
        let bonus_bps = catalog.set(*set_id).map(|s| s.bonus_bps).unwrap_or(0) as i128;
        let complete = owned.len() >= catalog.member_count(*set_id);
        let min_slots = owned.iter().map(|(_, slots)| *slots).min().unwrap_or(0);

        if complete {
            complete_sets += 1;
        }

        for (property, slots) in owned {
            let per_slot = property.scaled_income_per_slot();
            let (base_slots, bonus_slots) = if complete {
                let bonus = (*slots).min(min_slots);
                (*slots - bonus, bonus)
            } else {
                (*slots, 0)
            };
            scaled_total += base_slots as i128 * per_slot * BPS;
            scaled_total += bonus_slots as i128 * per_slot * (BPS + bonus_bps);
        }
    }

    let daily = scaled_total / (BPS * BPS);
    IncomeBreakdown {
        daily_income: i64::try_from(daily).unwrap_or(i64::MAX),
        complete_sets,
    }
}
