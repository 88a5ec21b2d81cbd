//! WebSocket `logsSubscribe` feed.

use super::{ChainError, LogFeed, Notification, Subscription};
use crate::domain::TxSignature;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);
const CHANNEL_CAPACITY: usize = 1024;

/// Live feed over the node's pubsub endpoint.
#[derive(Debug, Clone)]
pub struct WsLogFeed {
    ws_url: String,
}

impl WsLogFeed {
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }
}

/// Extract a notification from a `logsNotification` message.
pub fn parse_logs_notification(message: &Value) -> Option<Notification> {
    if message.get("method").and_then(Value::as_str) != Some("logsNotification") {
        return None;
    }
    let result = message.get("params")?.get("result")?;
    let value = result.get("value")?;
    let signature = value.get("signature").and_then(Value::as_str)?;
    Some(Notification {
        signature: TxSignature::new(signature),
        slot: result
            .get("context")
            .and_then(|c| c.get("slot"))
            .and_then(Value::as_u64)
            .unwrap_or(0),
        failed: value.get("err").map(|e| !e.is_null()).unwrap_or(false),
    })
}

#[async_trait]
impl LogFeed for WsLogFeed {
    async fn subscribe(&self, program_id: &str) -> Result<Subscription, ChainError> {
        let (ws_stream, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "logsSubscribe",
            "params": [{ "mentions": [program_id] }, { "commitment": "confirmed" }],
        });
        write
            .send(Message::Text(request.to_string()))
            .await
            .map_err(|e| ChainError::Subscription(e.to_string()))?;

        // The first reply with our request id carries the subscription id.
        let subscription_id = tokio::time::timeout(SUBSCRIBE_TIMEOUT, async {
            while let Some(msg) = read.next().await {
                let msg = msg.map_err(|e| ChainError::Subscription(e.to_string()))?;
                let Message::Text(text) = msg else { continue };
                let Ok(reply) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                if reply.get("id").and_then(Value::as_i64) != Some(1) {
                    continue;
                }
                if let Some(error) = reply.get("error") {
                    return Err(ChainError::Subscription(error.to_string()));
                }
                return reply
                    .get("result")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| ChainError::Parse("Missing subscription id".to_string()));
            }
            Err(ChainError::Subscription(
                "Stream ended before subscribing".to_string(),
            ))
        })
        .await
        .map_err(|_| ChainError::Subscription("Timed out waiting for subscription".to_string()))??;

        info!(subscription_id, program_id, "Subscribed to program logs");

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let alive = Arc::new(AtomicBool::new(true));
        let task_alive = alive.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        let unsubscribe = json!({
                            "jsonrpc": "2.0",
                            "id": 2,
                            "method": "logsUnsubscribe",
                            "params": [subscription_id],
                        });
                        if let Err(e) = write.send(Message::Text(unsubscribe.to_string())).await {
                            debug!(error = %e, "Failed to send logsUnsubscribe");
                        }
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let Ok(value) = serde_json::from_str::<Value>(&text) else {
                                    debug!("Ignoring non-JSON websocket message");
                                    continue;
                                };
                                if let Some(notification) = parse_logs_notification(&value) {
                                    if tx.send(notification).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if write.send(Message::Pong(data)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                warn!(?frame, "WebSocket closed by server");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "WebSocket error");
                                break;
                            }
                            None => {
                                warn!("WebSocket stream ended");
                                break;
                            }
                        }
                    }
                }
            }
            task_alive.store(false, Ordering::Release);
        });

        Ok(Subscription::new(rx, alive, shutdown_tx, task))
    }
}
