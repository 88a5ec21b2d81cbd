//! Chain-specific log framing.
//!
//! The program emits one `Program data: <base64>` line per event. The payload
//! is an 8-byte discriminator, `sha256("event:<Name>")[..8]`, followed by the
//! event fields as a UTF-8 JSON object.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

const PROGRAM_DATA_PREFIX: &str = "Program data: ";

/// A named event with untyped fields, before mapping to an Action.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub name: String,
    pub fields: Map<String, Value>,
}

/// Turns a transaction's log lines into raw events.
///
/// Implementations never fail: lines they do not understand are skipped.
pub trait LogParser: Send + Sync + fmt::Debug {
    fn parse(&self, logs: &[String]) -> Vec<RawEvent>;
}

/// 8-byte event discriminator for `name`.
pub fn event_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("event:{}", name).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Encode an event as the log line the program would emit.
pub fn program_data_line(name: &str, fields: &Value) -> String {
    let mut payload = event_discriminator(name).to_vec();
    payload.extend_from_slice(fields.to_string().as_bytes());
    format!("{}{}", PROGRAM_DATA_PREFIX, STANDARD.encode(payload))
}

/// Parser for `Program data:` lines with a known set of event names.
#[derive(Clone)]
pub struct ProgramDataParser {
    names: HashMap<[u8; 8], String>,
}

impl ProgramDataParser {
    pub fn new<I, S>(event_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = event_names
            .into_iter()
            .map(Into::into)
            .map(|name: String| (event_discriminator(&name), name))
            .collect();
        Self { names }
    }

    fn parse_line(&self, line: &str) -> Option<RawEvent> {
        let encoded = line.strip_prefix(PROGRAM_DATA_PREFIX)?.trim();
        let bytes = match STANDARD.decode(encoded) {
            Ok(b) => b,
            Err(e) => {
                debug!(error = %e, "Skipping program data line with invalid base64");
                return None;
            }
        };
        if bytes.len() < 8 {
            return None;
        }
        let (disc, body) = bytes.split_at(8);
        let mut key = [0u8; 8];
        key.copy_from_slice(disc);
        let Some(name) = self.names.get(&key) else {
            debug!(discriminator = %hex::encode(key), "Skipping unknown event discriminator");
            return None;
        };

        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => Some(RawEvent {
                name: name.clone(),
                fields,
            }),
            Ok(_) => {
                debug!(event = %name, "Skipping event whose body is not an object");
                None
            }
            Err(e) => {
                debug!(event = %name, error = %e, "Skipping event with malformed body");
                None
            }
        }
    }
}

impl fmt::Debug for ProgramDataParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.names.values().collect();
        names.sort();
        f.debug_struct("ProgramDataParser")
            .field("events", &names)
            .finish()
    }
}

impl LogParser for ProgramDataParser {
    fn parse(&self, logs: &[String]) -> Vec<RawEvent> {
        logs.iter().filter_map(|line| self.parse_line(line)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_discriminator_matches_sha256_prefix() {
        let expected = Sha256::digest(b"event:PropertyBoughtEvent");
        assert_eq!(
            event_discriminator("PropertyBoughtEvent").as_slice(),
            &expected[..8]
        );
        assert_eq!(
            hex::encode(event_discriminator("A")).len(),
            16,
            "discriminator is 8 bytes"
        );
    }

    #[test]
    fn test_parse_known_event_and_skip_noise() {
        let parser = ProgramDataParser::new(["PropertyBoughtEvent"]);
        let logs = vec![
            "Program H1zz invoke [1]".to_string(),
            "Program log: Instruction: BuyProperty".to_string(),
            program_data_line("PropertyBoughtEvent", &json!({"player": "abc", "slots": 2})),
            program_data_line("UnknownEvent", &json!({"x": 1})),
            "Program data: !!!not-base64!!!".to_string(),
            "Program H1zz success".to_string(),
        ];

        let events = parser.parse(&logs);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "PropertyBoughtEvent");
        assert_eq!(events[0].fields.get("slots"), Some(&json!(2)));
    }

    #[test]
    fn test_non_object_body_is_skipped() {
        let parser = ProgramDataParser::new(["RewardsClaimedEvent"]);
        let logs = vec![program_data_line("RewardsClaimedEvent", &json!([1, 2, 3]))];
        assert!(parser.parse(&logs).is_empty());
    }

    #[test]
    fn test_truncated_payload_is_skipped() {
        let parser = ProgramDataParser::new(["RewardsClaimedEvent"]);
        let logs = vec![format!("Program data: {}", STANDARD.encode([1u8, 2, 3]))];
        assert!(parser.parse(&logs).is_empty());
    }
}
