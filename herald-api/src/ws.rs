//! WebSocket push transport.
//!
//! ## Protocol
//!
//! 1. Client connects to `GET /ws` with the `x-user-id` header
//! 2. Connection upgraded; a broadcast session is attached
//! 3. Server sends `{"frame":"connected","session_id":...}`
//! 4. Server forwards every change event as `{"frame":"event","seq":..,"event":{..}}`
//! 5. On close or send failure the session is detached
//!
//! Events are not filtered by recipient here; the client does that.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use herald_core::{ServerFrame, UserId};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::auth::Identity;
use crate::broadcast::BroadcastChannel;
use crate::telemetry::with_metrics;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(channel): State<Arc<BroadcastChannel>>,
    identity: Identity,
) -> Response {
    info!(user_id = %identity.user_id, "WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, channel, identity.user_id))
}

/// Runs for the lifetime of one WebSocket connection.
async fn handle_socket(socket: WebSocket, channel: Arc<BroadcastChannel>, user_id: UserId) {
    let (mut sender, mut receiver) = socket.split();

    let mut subscription = channel.attach();
    let session_id = subscription.session_id();
    with_metrics(|m| m.session_attached());
    info!(user_id = %user_id, session_id = %session_id, "WebSocket connected");

    if let Err(e) = send_frame(&mut sender, &ServerFrame::Connected { session_id }).await {
        error!(session_id = %session_id, error = %e, "Failed to send Connected frame");
        drop(subscription);
        with_metrics(|m| m.session_detached());
        return;
    }

    // Inbound messages are only watched for close.
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!(session_id = %session_id, "Client sent close frame");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            envelope = subscription.recv() => {
                let Some(envelope) = envelope else {
                    info!(session_id = %session_id, "Session detached from channel");
                    break;
                };
                let seq = envelope.seq;
                if let Err(e) = send_frame(&mut sender, &ServerFrame::Event(envelope)).await {
                    warn!(
                        session_id = %session_id,
                        seq,
                        error = %e,
                        "Failed to send event, closing connection"
                    );
                    break;
                }
            }
            _ = &mut recv_task => {
                debug!(session_id = %session_id, "Receiver task finished");
                break;
            }
        }
    }

    recv_task.abort();
    drop(subscription);
    with_metrics(|m| m.session_detached());
    info!(user_id = %user_id, session_id = %session_id, "WebSocket disconnected");
}

/// Serialize a frame to JSON and send it as a text message.
///
/// A frame that cannot be serialized is replaced by an `Error` frame, so the
/// client learns it missed something instead of silently losing it.
async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let json = encode_frame(frame).map_err(axum::Error::new)?;
    sender.send(Message::Text(json)).await
}

fn encode_frame<T: Serialize>(frame: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame).or_else(|e| {
        error!(error = %e, "Failed to serialize frame");
        serde_json::to_string(&ServerFrame::Error {
            message: format!("frame dropped: {}", e),
        })
    })
}
