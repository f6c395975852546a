//! WebSocket subscriber handling.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use webcast_stream::Broadcaster;

/// Drive one WebSocket subscriber until it disconnects.
///
/// The socket is registered with the broadcaster and receives every event
/// generated after registration (no replay of history). Inbound messages
/// are informational only; a close frame or a socket error unregisters the
/// subscriber.
pub async fn subscriber_connected(socket: WebSocket, broadcaster: Arc<Broadcaster>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let id = broadcaster.subscribe(tx);
    tracing::info!(subscriber = %id, "websocket subscriber connected");

    let forward = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_tx.send(Message::text(payload)).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(message) if message.is_close() => break,
            Ok(message) => {
                if let Ok(text) = message.to_str() {
                    tracing::debug!(subscriber = %id, text, "subscriber message ignored");
                }
            }
            Err(error) => {
                tracing::debug!(subscriber = %id, %error, "websocket read error");
                break;
            }
        }
    }

    broadcaster.unsubscribe(id);
    forward.abort();
    tracing::info!(subscriber = %id, "websocket subscriber disconnected");
}
