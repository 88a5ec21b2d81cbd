//! Live subscriber: log notifications -> fetched transactions -> pipeline.
//!
//! Each notification is handled in its own task. A transaction that cannot
//! be fetched after the retry schedule is counted as failed and left for the
//! gap reconciler. Lost connections are re-established after a fixed delay;
//! running out of reconnect attempts is fatal.

use super::pipeline::Pipeline;
use crate::chain::{ChainClient, ChainError, LogFeed, Notification, Subscription};
use crate::config::SubscriberConfig;
use crate::domain::UnixSecs;
use crate::retry::{poll_with_schedule, PollOutcome};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubscriberError {
    #[error("Gave up reconnecting after {attempts} attempts: {last_error}")]
    ReconnectExhausted { attempts: u32, last_error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
}

/// Point-in-time view of the subscriber counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberStats {
    pub state: ConnectionState,
    pub connected: bool,
    pub uptime_secs: Option<i64>,
    pub received: u64,
    pub processed: u64,
    pub failed: u64,
    pub reconnects: u64,
    /// `processed / received`, or 1.0 before anything arrived.
    pub success_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    reconnects: AtomicU64,
}

#[derive(Debug)]
struct Connection {
    state: ConnectionState,
    since: Option<UnixSecs>,
}

struct Inner {
    feed: Arc<dyn LogFeed>,
    chain: Arc<dyn ChainClient>,
    pipeline: Arc<Pipeline>,
    program_id: String,
    config: SubscriberConfig,
    connection: StdMutex<Connection>,
    counters: Counters,
    fatal: watch::Sender<Option<SubscriberError>>,
}

struct Running {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

enum SessionEnd {
    Stopped,
    Lost,
}

pub struct LiveSubscriber {
    inner: Arc<Inner>,
    running: Mutex<Option<Running>>,
}

impl LiveSubscriber {
    pub fn new(
        feed: Arc<dyn LogFeed>,
        chain: Arc<dyn ChainClient>,
        pipeline: Arc<Pipeline>,
        program_id: String,
        config: SubscriberConfig,
    ) -> Self {
        let (fatal, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                feed,
                chain,
                pipeline,
                program_id,
                config,
                connection: StdMutex::new(Connection {
                    state: ConnectionState::Disconnected,
                    since: None,
                }),
                counters: Counters::default(),
                fatal,
            }),
            running: Mutex::new(None),
        }
    }

    /// Start the connection loop. Calling it while running is a no-op.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            debug!("Subscriber already running");
            return;
        }
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(self.inner.clone(), stop_rx));
        *running = Some(Running { stop, task });
        info!(program_id = %self.inner.program_id, "Started live subscriber");
    }

    /// Unsubscribe and wait for the connection loop to finish.
    pub async fn stop(&self) {
        let Some(Running { stop, task }) = self.running.lock().await.take() else {
            return;
        };
        let _ = stop.send(true);
        if let Err(e) = task.await {
            error!(error = %e, "Subscriber task panicked");
        }
        info!("Stopped live subscriber");
    }

    /// Resolves once the subscriber has given up for good.
    pub async fn fatal_error(&self) -> SubscriberError {
        let mut rx = self.inner.fatal.subscribe();
        loop {
            if let Some(err) = rx.borrow_and_update().clone() {
                return err;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.connection().state
    }

    pub fn stats(&self) -> SubscriberStats {
        let (state, since) = {
            let conn = self.inner.connection();
            (conn.state, conn.since)
        };
        let counters = &self.inner.counters;
        let received = counters.received.load(Ordering::Relaxed);
        let processed = counters.processed.load(Ordering::Relaxed);
        let success_rate = if received == 0 {
            1.0
        } else {
            processed as f64 / received as f64
        };
        SubscriberStats {
            state,
            connected: state == ConnectionState::Subscribed,
            uptime_secs: since.map(|t| (UnixSecs::now().as_i64() - t.as_i64()).max(0)),
            received,
            processed,
            failed: counters.failed.load(Ordering::Relaxed),
            reconnects: counters.reconnects.load(Ordering::Relaxed),
            success_rate,
        }
    }
}

impl Inner {
    fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        let mut conn = self.connection();
        conn.since = match state {
            ConnectionState::Subscribed => Some(UnixSecs::now()),
            _ => None,
        };
        conn.state = state;
    }
}

async fn run(inner: Arc<Inner>, mut stop: watch::Receiver<bool>) {
    let mut tasks = JoinSet::new();
    let mut failures: u32 = 0;
    let max_attempts = inner.config.max_reconnect_attempts;

    while !*stop.borrow() {
        inner.set_state(ConnectionState::Connecting);
        match inner.feed.subscribe(&inner.program_id).await {
            Ok(subscription) => {
                failures = 0;
                inner.set_state(ConnectionState::Subscribed);
                info!(program_id = %inner.program_id, "Subscribed to program logs");

                let end = session(&inner, subscription, &mut stop, &mut tasks).await;
                inner.set_state(ConnectionState::Disconnected);
                if matches!(end, SessionEnd::Stopped) {
                    break;
                }
                warn!("Log subscription lost, reconnecting");
            }
            Err(e) => {
                failures += 1;
                inner.set_state(ConnectionState::Disconnected);
                if failures >= max_attempts {
                    error!(attempts = failures, error = %e, "Reconnect attempts exhausted");
                    inner.fatal.send_replace(Some(SubscriberError::ReconnectExhausted {
                        attempts: failures,
                        last_error: e.to_string(),
                    }));
                    break;
                }
                warn!(
                    attempt = failures,
                    max_attempts,
                    error = %e,
                    "Failed to subscribe to program logs"
                );
            }
        }

        inner.counters.reconnects.fetch_add(1, Ordering::Relaxed);
        tokio::select! {
            _ = sleep(inner.config.reconnect_delay) => {}
            _ = stop.changed() => {}
        }
    }

    tasks.shutdown().await;
    inner.set_state(ConnectionState::Disconnected);
}

/// Drive one subscription until it is lost or the subscriber is stopped.
async fn session(
    inner: &Arc<Inner>,
    mut subscription: Subscription,
    stop: &mut watch::Receiver<bool>,
    tasks: &mut JoinSet<()>,
) -> SessionEnd {
    let mut health = interval(inner.config.health_check_interval);
    health.set_missed_tick_behavior(MissedTickBehavior::Delay);
    health.tick().await;

    loop {
        tokio::select! {
            _ = stop.changed() => {
                subscription.unsubscribe().await;
                return SessionEnd::Stopped;
            }
            notification = subscription.next() => match notification {
                Some(notification) => {
                    inner.counters.received.fetch_add(1, Ordering::Relaxed);
                    tasks.spawn(handle_notification(inner.clone(), notification));
                }
                None => return SessionEnd::Lost,
            },
            _ = health.tick() => {
                if !subscription.is_alive() {
                    warn!("Health check found a dead subscription");
                    subscription.unsubscribe().await;
                    return SessionEnd::Lost;
                }
                debug!(in_flight = tasks.len(), "Subscription healthy");
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "Notification task panicked");
                }
            }
        }
    }
}

async fn handle_notification(inner: Arc<Inner>, notification: Notification) {
    let signature = notification.signature;
    if notification.failed {
        debug!(signature = %signature, "Skipping failed transaction");
        inner.counters.processed.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let chain = &inner.chain;
    let outcome = poll_with_schedule(&inner.config.fetch_retry_delays, |attempt| {
        debug!(signature = %signature, attempt, "Fetching transaction");
        let fetch = chain.get_transaction(&signature);
        async move {
            // Without a block time the transaction cannot be ordered yet.
            Ok::<_, ChainError>(fetch.await?.filter(|tx| !tx.awaiting_block_time()))
        }
    })
    .await;

    match outcome {
        PollOutcome::Found { value, attempts } => match inner.pipeline.ingest(&value).await {
            Ok(result) => {
                inner.counters.processed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    signature = %signature,
                    attempts,
                    inserted = result.inserted,
                    "Processed notification"
                );
            }
            Err(e) => {
                inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(signature = %signature, error = %e, "Failed to ingest transaction");
            }
        },
        PollOutcome::Exhausted {
            attempts,
            last_error,
        } => {
            inner.counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                signature = %signature,
                attempts,
                last_error = ?last_error.map(|e| e.to_string()),
                "Transaction not available, leaving it to gap reconciliation"
            );
        }
    }
}
