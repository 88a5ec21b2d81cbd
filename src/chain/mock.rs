//! In-memory chain for tests without network calls.

use super::{ChainClient, ChainError, LogFeed, Notification, SignatureInfo, Subscription};
use crate::domain::{RawTransaction, TxSignature};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Default)]
struct MockState {
    transactions: HashMap<TxSignature, RawTransaction>,
    /// Newest first.
    signatures: Vec<SignatureInfo>,
    /// Remaining `get_transaction` calls that report "not found" per signature.
    lag: HashMap<TxSignature, usize>,
    /// Remaining fetches per signature that return the transaction without
    /// its block time.
    untimed: HashMap<TxSignature, usize>,
    fail_signature_listing: bool,
    subscribe_failures: usize,
    feed: Option<mpsc::Sender<Notification>>,
    feed_alive: Option<Arc<AtomicBool>>,
    fetch_calls: usize,
    subscribe_calls: usize,
}

/// Mock chain implementing both [`ChainClient`] and [`LogFeed`].
#[derive(Debug, Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<MockState>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a transaction; it becomes the newest recent signature.
    pub fn with_transaction(self, tx: RawTransaction) -> Self {
        self.add_transaction(tx);
        self
    }

    /// Report "not found" for the first `attempts` fetches of `signature`.
    pub fn with_lag(self, signature: TxSignature, attempts: usize) -> Self {
        self.state().lag.insert(signature, attempts);
        self
    }

    /// Return `signature` without a block time for the first `attempts` fetches.
    pub fn with_untimed(self, signature: TxSignature, attempts: usize) -> Self {
        self.state().untimed.insert(signature, attempts);
        self
    }

    /// Fail the next `count` subscribe calls.
    pub fn with_subscribe_failures(self, count: usize) -> Self {
        self.state().subscribe_failures = count;
        self
    }

    pub fn add_transaction(&self, tx: RawTransaction) {
        let mut state = self.state();
        state.signatures.insert(
            0,
            SignatureInfo {
                signature: tx.signature.clone(),
                slot: tx.slot,
                block_time: tx.block_time,
                failed: tx.failed,
            },
        );
        state.transactions.insert(tx.signature.clone(), tx);
    }

    pub fn set_fail_signature_listing(&self, fail: bool) {
        self.state().fail_signature_listing = fail;
    }

    /// Push a notification to the current subscriber. Returns false if none.
    pub async fn notify(&self, signature: &TxSignature) -> bool {
        let (sender, slot) = {
            let state = self.state();
            let slot = state
                .transactions
                .get(signature)
                .map(|tx| tx.slot)
                .unwrap_or(0);
            (state.feed.clone(), slot)
        };
        match sender {
            Some(sender) => sender
                .send(Notification {
                    signature: signature.clone(),
                    slot,
                    failed: false,
                })
                .await
                .is_ok(),
            None => false,
        }
    }

    /// Simulate the node dropping the live connection.
    pub fn drop_connection(&self) {
        let mut state = self.state();
        state.feed = None;
        if let Some(alive) = state.feed_alive.take() {
            alive.store(false, Ordering::Release);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.state()
            .feed
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    pub fn fetch_calls(&self) -> usize {
        self.state().fetch_calls
    }

    pub fn subscribe_calls(&self) -> usize {
        self.state().subscribe_calls
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_transaction(
        &self,
        signature: &TxSignature,
    ) -> Result<Option<RawTransaction>, ChainError> {
        let mut state = self.state();
        state.fetch_calls += 1;
        if let Some(remaining) = state.lag.get_mut(signature) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }
        let mut tx = state.transactions.get(signature).cloned();
        if let Some(remaining) = state.untimed.get_mut(signature) {
            if *remaining > 0 {
                *remaining -= 1;
                if let Some(tx) = tx.as_mut() {
                    tx.block_time = None;
                }
            }
        }
        Ok(tx)
    }

    async fn get_recent_signatures(
        &self,
        _program_id: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, ChainError> {
        let state = self.state();
        if state.fail_signature_listing {
            return Err(ChainError::Http {
                status: 503,
                message: "Server error".to_string(),
            });
        }
        Ok(state.signatures.iter().take(limit).cloned().collect())
    }

    async fn health(&self) -> Result<(), ChainError> {
        Ok(())
    }
}

#[async_trait]
impl LogFeed for MockChain {
    async fn subscribe(&self, _program_id: &str) -> Result<Subscription, ChainError> {
        let (tx, rx) = mpsc::channel(64);
        let alive = Arc::new(AtomicBool::new(true));
        {
            let mut state = self.state();
            state.subscribe_calls += 1;
            if state.subscribe_failures > 0 {
                state.subscribe_failures -= 1;
                return Err(ChainError::Network("connection refused".to_string()));
            }
            state.feed = Some(tx);
            state.feed_alive = Some(alive.clone());
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let mock = self.clone();
        let task = tokio::spawn(async move {
            let _ = shutdown_rx.await;
            mock.drop_connection();
        });
        Ok(Subscription::new(rx, alive, shutdown_tx, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UnixSecs;

    fn tx(sig: &str, slot: u64) -> RawTransaction {
        RawTransaction::confirmed(TxSignature::new(sig), slot, UnixSecs::new(100), vec![])
    }

    #[tokio::test]
    async fn test_recent_signatures_newest_first() {
        let mock = MockChain::new()
            .with_transaction(tx("a", 1))
            .with_transaction(tx("b", 2))
            .with_transaction(tx("c", 3));
        let sigs = mock.get_recent_signatures("prog", 2).await.unwrap();
        let names: Vec<&str> = sigs.iter().map(|s| s.signature.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_lag_reports_not_found_first() {
        let mock = MockChain::new()
            .with_transaction(tx("a", 1))
            .with_lag(TxSignature::new("a"), 2);
        let sig = TxSignature::new("a");
        assert!(mock.get_transaction(&sig).await.unwrap().is_none());
        assert!(mock.get_transaction(&sig).await.unwrap().is_none());
        assert!(mock.get_transaction(&sig).await.unwrap().is_some());
        assert_eq!(mock.fetch_calls(), 3);
    }

    #[tokio::test]
    async fn test_notify_reaches_subscription() {
        let mock = MockChain::new().with_transaction(tx("a", 9));
        let mut sub = mock.subscribe("prog").await.unwrap();
        assert!(mock.notify(&TxSignature::new("a")).await);
        let n = sub.next().await.unwrap();
        assert_eq!(n.signature, TxSignature::new("a"));
        assert_eq!(n.slot, 9);
    }
}
