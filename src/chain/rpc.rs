//! JSON-RPC chain client.

use super::{ChainClient, ChainError, SignatureInfo};
use crate::domain::{RawTransaction, TxSignature, UnixSecs};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Chain client over HTTP JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: Client,
    url: String,
    max_elapsed: Duration,
}

impl RpcChainClient {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
            max_elapsed: Duration::from_secs(30),
        }
    }

    /// Bound on the total time spent retrying transient failures per call.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        let body = retry(backoff, || async {
            let response = self
                .client
                .post(&self.url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(ChainError::Network(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(ChainError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(ChainError::Http {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(ChainError::Http {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| backoff::Error::permanent(ChainError::Parse(e.to_string())))
        })
        .await?;

        rpc_result(body)
    }
}

/// Unwrap a JSON-RPC envelope into its `result`.
fn rpc_result(mut body: Value) -> Result<Value, ChainError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        return Err(ChainError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    body.get_mut("result")
        .map(Value::take)
        .ok_or_else(|| ChainError::Parse("Missing result field".to_string()))
}

/// Parse a `getTransaction` result. `null` means the node does not have it.
pub fn parse_transaction(
    signature: &TxSignature,
    result: &Value,
) -> Result<Option<RawTransaction>, ChainError> {
    if result.is_null() {
        return Ok(None);
    }
    let slot = result
        .get("slot")
        .and_then(Value::as_u64)
        .ok_or_else(|| ChainError::Parse("Missing slot field".to_string()))?;
    let block_time = result
        .get("blockTime")
        .and_then(Value::as_i64)
        .map(UnixSecs::new);
    let meta = result.get("meta");
    let failed = meta
        .and_then(|m| m.get("err"))
        .map(|e| !e.is_null())
        .unwrap_or(false);
    let logs = meta
        .and_then(|m| m.get("logMessages"))
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(Some(RawTransaction {
        signature: signature.clone(),
        slot,
        block_time,
        logs,
        failed,
    }))
}

/// Parse a `getSignaturesForAddress` result.
pub fn parse_signatures(result: &Value) -> Result<Vec<SignatureInfo>, ChainError> {
    let entries = result
        .as_array()
        .ok_or_else(|| ChainError::Parse("Expected array response".to_string()))?;

    entries
        .iter()
        .map(|entry| {
            let signature = entry
                .get("signature")
                .and_then(Value::as_str)
                .ok_or_else(|| ChainError::Parse("Missing signature field".to_string()))?;
            Ok(SignatureInfo {
                signature: TxSignature::new(signature),
                slot: entry.get("slot").and_then(Value::as_u64).unwrap_or(0),
                block_time: entry
                    .get("blockTime")
                    .and_then(Value::as_i64)
                    .map(UnixSecs::new),
                failed: entry.get("err").map(|e| !e.is_null()).unwrap_or(false),
            })
        })
        .collect()
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn get_transaction(
        &self,
        signature: &TxSignature,
    ) -> Result<Option<RawTransaction>, ChainError> {
        debug!(signature = %signature, "Fetching transaction");
        let result = self
            .rpc_call(
                "getTransaction",
                json!([
                    signature.as_str(),
                    {
                        "encoding": "json",
                        "commitment": "confirmed",
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await?;
        parse_transaction(signature, &result)
    }

    async fn get_recent_signatures(
        &self,
        program_id: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, ChainError> {
        debug!(program_id, limit, "Fetching recent signatures");
        let result = self
            .rpc_call(
                "getSignaturesForAddress",
                json!([program_id, { "limit": limit, "commitment": "confirmed" }]),
            )
            .await?;
        parse_signatures(&result)
    }

    async fn health(&self) -> Result<(), ChainError> {
        let result = self.rpc_call("getHealth", json!([])).await?;
        match result.as_str() {
            Some("ok") => Ok(()),
            _ => Err(ChainError::Parse(format!("Unexpected health: {}", result))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_elapsed_override() {
        let client = RpcChainClient::new("http://localhost:8899".to_string());
        assert_eq!(client.max_elapsed, Duration::from_secs(30));
        let client = client.with_max_elapsed(Duration::from_secs(2));
        assert_eq!(client.max_elapsed, Duration::from_secs(2));
    }

    #[test]
    fn test_parse_transaction() {
        let result = json!({
            "slot": 250_000_000u64,
            "blockTime": 1_700_000_123,
            "meta": {
                "err": null,
                "logMessages": ["Program X invoke [1]", "Program data: AAAA"]
            }
        });
        let tx = parse_transaction(&TxSignature::new("sig"), &result)
            .unwrap()
            .unwrap();
        assert_eq!(tx.slot, 250_000_000);
        assert_eq!(tx.block_time, Some(UnixSecs::new(1_700_000_123)));
        assert_eq!(tx.logs.len(), 2);
        assert!(!tx.failed);
    }

    #[test]
    fn test_parse_failed_transaction() {
        let result = json!({
            "slot": 1,
            "blockTime": null,
            "meta": { "err": { "InstructionError": [0, "Custom"] }, "logMessages": null }
        });
        let tx = parse_transaction(&TxSignature::new("sig"), &result)
            .unwrap()
            .unwrap();
        assert!(tx.failed);
        assert_eq!(tx.block_time, None);
        assert!(tx.logs.is_empty());
    }

    #[test]
    fn test_null_transaction_is_absent() {
        assert!(parse_transaction(&TxSignature::new("sig"), &Value::Null)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parse_signatures() {
        let result = json!([
            { "signature": "new", "slot": 11, "err": null, "blockTime": 200 },
            { "signature": "old", "slot": 10, "err": { "x": 1 }, "blockTime": null }
        ]);
        let sigs = parse_signatures(&result).unwrap();
        assert_eq!(sigs.len(), 2);
        assert_eq!(sigs[0].signature, TxSignature::new("new"));
        assert_eq!(sigs[0].block_time, Some(UnixSecs::new(200)));
        assert!(sigs[1].failed);
    }

    #[test]
    fn test_rpc_error_envelope() {
        let body = json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32602, "message": "Invalid param"}});
        match rpc_result(body) {
            Err(ChainError::Rpc { code, message }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "Invalid param");
            }
            other => panic!("Expected Rpc error, got {:?}", other),
        }
    }
}
