//! Event decoder: raw transaction log bundle -> typed Actions.
//!
//! Decoding is a pure, lossy projection. Failed transactions, transactions
//! without a block time, unknown event names and events missing their actor
//! all decode to nothing rather than an error.

pub mod parser;

pub use parser::{event_discriminator, program_data_line, LogParser, ProgramDataParser, RawEvent};

use crate::domain::{Action, ActionKind, RawTransaction, TxSignature, UnixSecs, Wallet};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Alternate spellings of one logical field, tried in order.
type Keys = &'static [&'static str];

#[derive(Debug, Clone, Copy)]
enum Quantity {
    Field(Keys),
    FieldOr(Keys, i64),
    Fixed(i64),
    Absent,
}

/// How one recognized event maps to an Action.
#[derive(Debug)]
struct EventSpec {
    names: &'static [&'static str],
    kind: ActionKind,
    actor: Keys,
    counterparty: Option<Keys>,
    asset: Option<Keys>,
    quantity: Quantity,
    value: Keys,
    /// (name stored in `extra`, alternate keys)
    extra: &'static [(&'static str, Keys)],
}

const PROPERTY_ID: Keys = &["propertyId", "property_id"];

const EVENTS: &[EventSpec] = &[
    EventSpec {
        names: &["PropertyBoughtEvent"],
        kind: ActionKind::Buy,
        actor: &["player"],
        counterparty: None,
        asset: Some(PROPERTY_ID),
        quantity: Quantity::Field(&["slots", "slots_bought"]),
        value: &["totalCost", "total_cost"],
        extra: &[
            ("slotsOwned", &["slotsOwned", "slots_owned"]),
            ("totalSlotsOwned", &["totalSlotsOwned", "total_slots_owned"]),
            ("price", &["price"]),
        ],
    },
    EventSpec {
        names: &["PropertySoldEvent"],
        kind: ActionKind::Sell,
        actor: &["player"],
        counterparty: None,
        asset: Some(PROPERTY_ID),
        quantity: Quantity::Field(&["slots", "slots_sold"]),
        value: &["received"],
        extra: &[
            ("sellValuePercent", &["sellValuePercent", "sell_value_percent"]),
            ("daysHeld", &["daysHeld", "days_held"]),
        ],
    },
    EventSpec {
        names: &["StealSuccessEvent"],
        kind: ActionKind::StealSuccess,
        actor: &["attacker"],
        counterparty: Some(&["target"]),
        asset: Some(PROPERTY_ID),
        quantity: Quantity::FieldOr(&["slotsStolen", "slots_stolen"], 1),
        value: &["stealCost", "steal_cost"],
        extra: &[
            ("targeted", &["targeted"]),
            ("vrfResult", &["vrfResult", "vrf_result"]),
        ],
    },
    EventSpec {
        names: &["StealFailureEvent", "StealFailedEvent"],
        kind: ActionKind::StealFailed,
        actor: &["attacker"],
        counterparty: Some(&["target"]),
        asset: Some(PROPERTY_ID),
        quantity: Quantity::Fixed(0),
        value: &["stealCost", "steal_cost"],
        extra: &[
            ("targeted", &["targeted"]),
            ("vrfResult", &["vrfResult", "vrf_result"]),
        ],
    },
    EventSpec {
        names: &["ShieldActivatedEvent"],
        kind: ActionKind::ShieldActivate,
        actor: &["player"],
        counterparty: None,
        asset: Some(PROPERTY_ID),
        quantity: Quantity::Field(&["slotsShielded", "slots_shielded"]),
        value: &["cost", "shield_cost"],
        extra: &[("expiry", &["expiry"])],
    },
    EventSpec {
        names: &["RewardsClaimedEvent"],
        kind: ActionKind::Claim,
        actor: &["player"],
        counterparty: None,
        asset: None,
        quantity: Quantity::Absent,
        value: &["amount"],
        extra: &[("hoursElapsed", &["hoursElapsed", "hours_elapsed"])],
    },
];

/// Every event name the decoder recognizes.
pub fn known_event_names() -> impl Iterator<Item = &'static str> {
    EVENTS.iter().flat_map(|spec| spec.names.iter().copied())
}

/// Matches names ignoring the case of the first letter.
fn find_spec(name: &str) -> Option<&'static EventSpec> {
    let mut chars = name.chars();
    let first = chars.next()?.to_ascii_uppercase();
    let normalized: String = std::iter::once(first).chain(chars).collect();
    EVENTS
        .iter()
        .find(|spec| spec.names.contains(&normalized.as_str()))
}

/// First present, non-null value among `keys`.
pub fn lookup<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| fields.get(*k))
        .find(|v| !v.is_null())
}

/// Integer from a JSON number or a decimal string.
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok())),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn int_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    lookup(fields, keys).and_then(as_int)
}

fn wallet_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<Wallet> {
    match lookup(fields, keys)? {
        Value::String(s) if !s.is_empty() => Some(Wallet::new(s.clone())),
        _ => None,
    }
}

/// Map one raw event to an Action, or `None` if it is not a game event.
pub fn event_to_action(
    event: &RawEvent,
    signature: &TxSignature,
    observed_at: UnixSecs,
) -> Option<Action> {
    let Some(spec) = find_spec(&event.name) else {
        debug!(signature = %signature, event = %event.name, "Skipping unrecognized event");
        return None;
    };
    let fields = &event.fields;

    let Some(actor) = wallet_field(fields, spec.actor) else {
        debug!(signature = %signature, event = %event.name, "Skipping event without an actor");
        return None;
    };

    let quantity = match spec.quantity {
        Quantity::Field(keys) => int_field(fields, keys),
        Quantity::FieldOr(keys, default) => Some(int_field(fields, keys).unwrap_or(default)),
        Quantity::Fixed(n) => Some(n),
        Quantity::Absent => None,
    };

    let extra: BTreeMap<String, Value> = spec
        .extra
        .iter()
        .filter_map(|(name, keys)| lookup(fields, keys).map(|v| (name.to_string(), v.clone())))
        .collect();

    Some(Action {
        transaction_id: signature.clone(),
        kind: spec.kind,
        actor,
        counterparty: spec.counterparty.and_then(|keys| wallet_field(fields, keys)),
        asset_id: spec
            .asset
            .and_then(|keys| int_field(fields, keys))
            .and_then(|id| u32::try_from(id).ok()),
        quantity,
        value: int_field(fields, spec.value),
        outcome: spec.kind != ActionKind::StealFailed,
        extra,
        observed_at,
    })
}

/// Decodes transactions with a pluggable log parser.
#[derive(Debug, Clone)]
pub struct Decoder {
    parser: Arc<dyn LogParser>,
}

impl Decoder {
    pub fn new(parser: Arc<dyn LogParser>) -> Self {
        Self { parser }
    }

    /// Decoder over `Program data:` lines for every known event.
    pub fn program_data() -> Self {
        Self::new(Arc::new(ProgramDataParser::new(known_event_names())))
    }

    /// Actions in the order their events appear in the logs.
    pub fn decode<'a>(&'a self, tx: &'a RawTransaction) -> impl Iterator<Item = Action> + 'a {
        let events = match tx.block_time {
            _ if tx.failed => {
                debug!(signature = %tx.signature, "Skipping transaction that failed on chain");
                Vec::new()
            }
            None => {
                debug!(signature = %tx.signature, "Skipping transaction without block time");
                Vec::new()
            }
            Some(_) => self.parser.parse(&tx.logs),
        };
        let observed_at = tx.block_time.unwrap_or_default();
        events
            .into_iter()
            .filter_map(move |event| event_to_action(&event, &tx.signature, observed_at))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::program_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx(logs: Vec<String>) -> RawTransaction {
        RawTransaction::confirmed(
            TxSignature::new("sig-1"),
            42,
            UnixSecs::new(1_700_000_000),
            logs,
        )
    }

    fn raw(name: &str, fields: Value) -> RawEvent {
        match fields {
            Value::Object(fields) => RawEvent {
                name: name.to_string(),
                fields,
            },
            _ => panic!("fields must be an object"),
        }
    }

    fn map(event: RawEvent) -> Option<Action> {
        event_to_action(&event, &TxSignature::new("s"), UnixSecs::new(10))
    }

    #[test]
    fn test_buy_event_camel_case() {
        let action = map(raw(
            "PropertyBoughtEvent",
            json!({"player": "alice", "propertyId": 3, "slots": 2, "totalCost": "7000000000000", "slotsOwned": 4}),
        ))
        .unwrap();
        assert_eq!(action.kind, ActionKind::Buy);
        assert_eq!(action.actor, Wallet::new("alice"));
        assert_eq!(action.asset_id, Some(3));
        assert_eq!(action.quantity, Some(2));
        assert_eq!(action.value, Some(7_000_000_000_000));
        assert_eq!(action.extra.get("slotsOwned"), Some(&json!(4)));
        assert!(action.outcome);
        assert_eq!(action.observed_at, UnixSecs::new(10));
    }

    #[test]
    fn test_snake_case_alternates() {
        let action = map(raw(
            "propertySoldEvent",
            json!({"player": "bob", "property_id": 1, "slots_sold": 3, "received": 55, "days_held": 2}),
        ))
        .unwrap();
        assert_eq!(action.kind, ActionKind::Sell);
        assert_eq!(action.asset_id, Some(1));
        assert_eq!(action.quantity, Some(3));
        assert_eq!(action.value, Some(55));
        assert_eq!(action.extra.get("daysHeld"), Some(&json!(2)));
    }

    #[test]
    fn test_first_convention_wins() {
        let fields = json!({"propertyId": 5, "property_id": 9});
        let Value::Object(fields) = fields else { unreachable!() };
        assert_eq!(lookup(&fields, PROPERTY_ID), Some(&json!(5)));
    }

    #[test]
    fn test_null_falls_through_to_alternate() {
        let fields = json!({"stealCost": null, "steal_cost": 12});
        let Value::Object(fields) = fields else { unreachable!() };
        assert_eq!(int_field(&fields, &["stealCost", "steal_cost"]), Some(12));
    }

    #[test]
    fn test_steal_success_defaults_to_one_slot() {
        let action = map(raw(
            "StealSuccessEvent",
            json!({"attacker": "a", "target": "b", "propertyId": 7, "stealCost": 100}),
        ))
        .unwrap();
        assert_eq!(action.kind, ActionKind::StealSuccess);
        assert_eq!(action.counterparty, Some(Wallet::new("b")));
        assert_eq!(action.quantity, Some(1));
    }

    #[test]
    fn test_steal_failure_aliases() {
        for name in ["StealFailureEvent", "StealFailedEvent", "stealFailedEvent"] {
            let action = map(raw(
                name,
                json!({"attacker": "a", "target": "b", "property_id": 7, "steal_cost": 100, "vrf_result": 9}),
            ))
            .unwrap();
            assert_eq!(action.kind, ActionKind::StealFailed);
            assert_eq!(action.quantity, Some(0));
            assert!(!action.outcome);
            assert_eq!(action.extra.get("vrfResult"), Some(&json!(9)));
        }
    }

    #[test]
    fn test_claim_has_no_asset_or_quantity() {
        let action = map(raw("RewardsClaimedEvent", json!({"player": "c", "amount": 900}))).unwrap();
        assert_eq!(action.kind, ActionKind::Claim);
        assert_eq!(action.asset_id, None);
        assert_eq!(action.quantity, None);
        assert_eq!(action.value, Some(900));
    }

    #[test]
    fn test_unknown_or_actorless_events_are_skipped() {
        assert!(map(raw("SomethingElse", json!({"player": "x"}))).is_none());
        assert!(map(raw("PropertyBoughtEvent", json!({"propertyId": 1}))).is_none());
        assert!(map(raw("", json!({}))).is_none());
    }

    #[test]
    fn test_decode_full_transaction() {
        let decoder = Decoder::program_data();
        let logs = vec![
            "Program log: Instruction: ActivateShield".to_string(),
            program_data_line(
                "ShieldActivatedEvent",
                &json!({"player": "p", "propertyId": 2, "slotsShielded": 3, "cost": 40, "expiry": 99}),
            ),
        ];
        let transaction = tx(logs);
        let actions: Vec<Action> = decoder.decode(&transaction).collect();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::ShieldActivate);
        assert_eq!(actions[0].transaction_id, TxSignature::new("sig-1"));
        assert_eq!(actions[0].observed_at, UnixSecs::new(1_700_000_000));
    }

    #[test]
    fn test_failed_or_untimed_transactions_decode_to_nothing() {
        let decoder = Decoder::program_data();
        let logs = vec![program_data_line(
            "RewardsClaimedEvent",
            &json!({"player": "p", "amount": 1}),
        )];

        let mut failed = tx(logs.clone());
        failed.failed = true;
        assert_eq!(decoder.decode(&failed).count(), 0);

        let mut untimed = tx(logs);
        untimed.block_time = None;
        assert_eq!(decoder.decode(&untimed).count(), 0);
    }
}
