//! Domain primitives: UnixSecs, Wallet, TxSignature.

use serde::{Deserialize, Serialize};

/// Chain-reported time in seconds since Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UnixSecs(pub i64);

impl UnixSecs {
    /// Create a UnixSecs from seconds.
    pub fn new(secs: i64) -> Self {
        UnixSecs(secs)
    }

    /// Get the underlying seconds value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Current wall-clock time. Only used for "time remaining" reads,
    /// never for anything derived from the action log.
    pub fn now() -> Self {
        UnixSecs(chrono::Utc::now().timestamp())
    }
}

/// Player wallet address (base58 string on chain, opaque here).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wallet(pub String);

impl Wallet {
    /// Create a Wallet from a string.
    pub fn new(addr: impl Into<String>) -> Self {
        Wallet(addr.into())
    }

    /// Get the wallet as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form used in log lines.
    pub fn short(&self) -> String {
        abbreviate(&self.0)
    }
}

impl std::fmt::Display for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction signature; the idempotency key of the whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxSignature(pub String);

impl TxSignature {
    pub fn new(sig: impl Into<String>) -> Self {
        TxSignature(sig.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> String {
        abbreviate(&self.0)
    }
}

impl std::fmt::Display for TxSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn abbreviate(s: &str) -> String {
    if s.len() <= 12 || !s.is_ascii() {
        return s.to_string();
    }
    format!("{}..{}", &s[..6], &s[s.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_display() {
        let w = Wallet::new("7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU");
        assert_eq!(w.to_string(), "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU");
        assert_eq!(w.short(), "7xKXtg..gAsU");
    }

    #[test]
    fn test_short_keeps_short_values() {
        assert_eq!(TxSignature::new("abc").short(), "abc");
    }

    #[test]
    fn test_unix_secs_ordering() {
        assert!(UnixSecs::new(1000) < UnixSecs::new(2000));
    }

    #[test]
    fn test_transparent_serialization() {
        let json = serde_json::to_string(&Wallet::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
        let json = serde_json::to_string(&UnixSecs::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
