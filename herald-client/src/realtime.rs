//! WebSocket realtime manager with reconnect backoff.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::StreamExt;
use herald_core::ServerFrame;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::api_client::WsClient;
use crate::config::ReconnectConfig;
use crate::reconciler::FeedEvent;

/// Keep a push connection open and forward its frames to `sender`.
///
/// Reconnects forever with exponential backoff and jitter. Returns once the
/// receiving side of `sender` is dropped.
pub fn spawn_ws_manager(ws: WsClient, sender: mpsc::Sender<FeedEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = ws.reconnect_config().initial_ms;
        loop {
            match ws.connect().await {
                Ok(mut stream) => {
                    backoff = ws.reconnect_config().initial_ms;

                    while let Some(message) = stream.next().await {
                        match message {
                            Ok(Message::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                                Ok(ServerFrame::Connected { session_id }) => {
                                    debug!(session_id = %session_id, "push session attached");
                                    if sender.send(FeedEvent::Connected).await.is_err() {
                                        return;
                                    }
                                }
                                Ok(ServerFrame::Event(envelope)) => {
                                    if sender.send(FeedEvent::Event(envelope)).await.is_err() {
                                        return;
                                    }
                                }
                                Ok(ServerFrame::Error { message }) => {
                                    warn!(message = %message, "server reported a push error");
                                }
                                Err(err) => {
                                    warn!(error = %err, "WS decode error");
                                }
                            },
                            Ok(Message::Close(_)) => break,
                            Ok(_) => {}
                            Err(err) => {
                                warn!(error = %err, "WS receive error");
                                break;
                            }
                        }
                    }

                    let disconnected = FeedEvent::Disconnected {
                        reason: "connection closed".to_string(),
                    };
                    if sender.send(disconnected).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!(error = %err, backoff_ms = backoff, "WS connect failed");
                    if sender.is_closed() {
                        return;
                    }
                }
            }

            let delay = jittered_backoff(backoff, ws.reconnect_config().jitter_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            backoff = next_backoff(backoff, ws.reconnect_config());
        }
    })
}

/// The delay after `current_ms`, capped at `max_ms`.
pub fn next_backoff(current_ms: u64, config: &ReconnectConfig) -> u64 {
    let next = (current_ms as f64 * config.multiplier) as u64;
    next.min(config.max_ms)
}

pub fn jittered_backoff(base_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return base_ms;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64;
    let jitter = nanos % jitter_ms;
    base_ms.saturating_add(jitter)
}
