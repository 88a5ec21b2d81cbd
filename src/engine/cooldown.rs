//! Purchase and steal cooldowns derived from action times.
//!
//! All start times are chain `observed_at` values; only the "remaining" figure
//! uses the caller's `now`.

use crate::domain::{Catalog, UnixSecs};
use serde::Serialize;
use std::collections::BTreeMap;

/// Cooldown on buying again in a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCooldown {
    pub set_id: u32,
    pub set_name: Option<String>,
    /// Property of the most recent purchase in the set.
    pub last_property_id: u32,
    pub last_purchase: UnixSecs,
    pub cooldown_secs: i64,
    pub remaining_secs: i64,
    pub ready: bool,
}

/// Cooldown on stealing from one property again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StealCooldown {
    pub property_id: u32,
    pub last_attempt: UnixSecs,
    pub cooldown_secs: i64,
    pub remaining_secs: i64,
    pub ready: bool,
}

fn remaining(started: UnixSecs, cooldown_secs: i64, now: UnixSecs) -> i64 {
    (started.as_i64() + cooldown_secs - now.as_i64()).max(0)
}

/// One entry per set the player has bought into.
pub fn set_cooldowns(
    catalog: &Catalog,
    last_buys: &BTreeMap<u32, UnixSecs>,
    now: UnixSecs,
) -> Vec<SetCooldown> {
    // Latest purchase per set; ties go to the lower property id.
    let mut latest: BTreeMap<u32, (u32, UnixSecs)> = BTreeMap::new();
    for (property_id, at) in last_buys {
        let Some(property) = catalog.property(*property_id) else {
            continue;
        };
        let entry = latest.entry(property.set_id).or_insert((*property_id, *at));
        if *at > entry.1 {
            *entry = (*property_id, *at);
        }
    }

    latest
        .into_iter()
        .filter_map(|(set_id, (property_id, at))| {
            let cooldown_secs = catalog.set_cooldown_secs(set_id)?;
            let remaining_secs = remaining(at, cooldown_secs, now);
            Some(SetCooldown {
                set_id,
                set_name: catalog.set(set_id).and_then(|s| s.name.clone()),
                last_property_id: property_id,
                last_purchase: at,
                cooldown_secs,
                remaining_secs,
                ready: remaining_secs == 0,
            })
        })
        .collect()
}

/// One entry per property the player has attempted to steal from.
pub fn steal_cooldowns(
    catalog: &Catalog,
    last_steals: &BTreeMap<u32, UnixSecs>,
    now: UnixSecs,
) -> Vec<StealCooldown> {
    last_steals
        .iter()
        .filter_map(|(property_id, at)| {
            let cooldown_secs = catalog.steal_cooldown_secs(*property_id)?;
            let remaining_secs = remaining(*at, cooldown_secs, now);
            Some(StealCooldown {
                property_id: *property_id,
                last_attempt: *at,
                cooldown_secs,
                remaining_secs,
                ready: remaining_secs == 0,
            })
        })
        .collect()
}
