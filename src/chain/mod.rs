//! Chain access: transaction queries and the log notification feed.

use crate::domain::{RawTransaction, TxSignature, UnixSecs};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

pub mod mock;
pub mod rpc;
pub mod ws;

pub use mock::MockChain;
pub use rpc::RpcChainClient;
pub use ws::WsLogFeed;

/// Error type for chain operations.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Connection timeout, DNS failure, socket reset.
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    /// JSON-RPC level error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Subscription error: {0}")]
    Subscription(String),
}

/// One entry of a recent-signatures listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: TxSignature,
    pub slot: u64,
    pub block_time: Option<UnixSecs>,
    pub failed: bool,
}

/// Read access to the chain.
#[async_trait]
pub trait ChainClient: Send + Sync + fmt::Debug {
    /// Fetch a confirmed transaction. `Ok(None)` when the node does not
    /// (yet) know it.
    async fn get_transaction(
        &self,
        signature: &TxSignature,
    ) -> Result<Option<RawTransaction>, ChainError>;

    /// Most recent signatures mentioning `program_id`, newest first.
    async fn get_recent_signatures(
        &self,
        program_id: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, ChainError>;

    async fn health(&self) -> Result<(), ChainError>;
}

/// A transaction notification from the live feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub signature: TxSignature,
    pub slot: u64,
    pub failed: bool,
}

/// Source of live notifications for a program.
#[async_trait]
pub trait LogFeed: Send + Sync + fmt::Debug {
    async fn subscribe(&self, program_id: &str) -> Result<Subscription, ChainError>;
}

/// An open subscription. Notifications arrive on the channel until the
/// connection drops or [`Subscription::unsubscribe`] is called.
pub struct Subscription {
    notifications: mpsc::Receiver<Notification>,
    alive: Arc<AtomicBool>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// `task` owns the connection; it must set `alive` to false when it ends
    /// and deregister when `shutdown` fires.
    pub fn new(
        notifications: mpsc::Receiver<Notification>,
        alive: Arc<AtomicBool>,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            notifications,
            alive,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    /// Next notification, or `None` once the connection is gone.
    pub async fn next(&mut self) -> Option<Notification> {
        self.notifications.recv().await
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Deregister and wait briefly for the connection task to finish.
    pub async fn unsubscribe(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .is_err()
            {
                warn!("Subscription task did not stop within 5s");
            }
        }
        self.alive.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_error_display() {
        let err = ChainError::Network("connection reset".to_string());
        assert_eq!(err.to_string(), "Network error: connection reset");

        let err = ChainError::Http {
            status: 503,
            message: "Server error".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 503: Server error");

        let err = ChainError::Rpc {
            code: -32009,
            message: "slot skipped".to_string(),
        };
        assert_eq!(err.to_string(), "RPC error -32009: slot skipped");
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_task() {
        let (tx, rx) = mpsc::channel(4);
        let alive = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task_alive = alive.clone();
        let task = tokio::spawn(async move {
            let _tx = tx;
            let _ = shutdown_rx.await;
            task_alive.store(false, Ordering::Release);
        });

        let sub = Subscription::new(rx, alive.clone(), shutdown_tx, task);
        assert!(sub.is_alive());
        sub.unsubscribe().await;
        assert!(!alive.load(Ordering::Acquire));
    }
}
