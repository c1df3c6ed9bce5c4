use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, trace, warn};

use tandem_types::events::GatewayEvent;
use tandem_types::models::UserId;

use crate::registry::{ConnectionHandle, ConnectionRegistry};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive a WebSocket whose user was authenticated at the HTTP upgrade.
///
/// The connection is registered for `user_id` (closing any previous one),
/// receives a `Ready` event, then gets every frame pushed to its handle until
/// the client goes away, the heartbeat lapses, or the handle is closed.
pub async fn handle_connection(
    socket: WebSocket,
    registry: ConnectionRegistry,
    user_id: UserId,
    outbound_capacity: usize,
) {
    let (mut sender, mut receiver) = socket.split();

    let (handle, mut outbound) = ConnectionHandle::new(outbound_capacity);
    let conn_id = handle.conn_id();
    registry.register(user_id, handle).await;

    info!("User {} connected to gateway (conn {})", user_id, conn_id);

    let ready = match (GatewayEvent::Ready { user_id }).to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to encode Ready for user {}: {}", user_id, e);
            registry.unregister_connection(user_id, conn_id).await;
            return;
        }
    };
    if sender.send(Message::Text(ready.into())).await.is_err() {
        registry.unregister_connection(user_id, conn_id).await;
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward pushed frames -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else {
                        // Handle closed (replaced or unregistered)
                        let close = CloseFrame {
                            code: close_code::NORMAL,
                            reason: "connection closed by server".into(),
                        };
                        let _ = sender.send(Message::Close(Some(close))).await;
                        break;
                    };

                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("User {} heartbeat timeout (missed {} pongs), dropping connection", user_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Messages are sent over REST; inbound frames only keep the link alive.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Text(text) => {
                    trace!(
                        "User {} sent ignored text frame: {}",
                        user_id,
                        text.chars().take(200).collect::<String>()
                    );
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.unregister_connection(user_id, conn_id).await;
    info!("User {} disconnected from gateway (conn {})", user_id, conn_id);
}
