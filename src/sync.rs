//! Real-time sync channel. Each device holds one WebSocket; after a
//! token-authenticated handshake the connection is registered under its user
//! and every `timer-sync` / `session-update` it sends is relayed to the
//! user's other connections. Nothing on this channel is persisted; the
//! session and break stores remain the state of record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Duration;
use uuid::Uuid;

use crate::auth;
use crate::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const OUTBOUND_BUFFER: usize = 100;

pub type ConnId = u64;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Auth { token: String },
    #[serde(rename_all = "camelCase")]
    TimerSync {
        session_id: Uuid,
        elapsed_time: i64,
        is_running: bool,
    },
    SessionUpdate {
        action: String,
        session: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Auth {
        status: AuthStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    TimerSync {
        session_id: Uuid,
        elapsed_time: i64,
        is_running: bool,
    },
    SessionUpdate {
        action: String,
        session: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    Success,
    Error,
}

struct ClientHandle {
    user_id: Uuid,
    tx: mpsc::Sender<ServerMessage>,
}

/// The set of live, authenticated connections. Constructed once in `main` and
/// injected through application state; registration and removal happen only
/// in the owning connection's task, broadcast only reads.
#[derive(Default)]
pub struct SyncRegistry {
    next_id: AtomicU64,
    clients: RwLock<HashMap<ConnId, ClientHandle>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: Uuid, tx: mpsc::Sender<ServerMessage>) -> ConnId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.write().await.insert(id, ClientHandle { user_id, tx });
        id
    }

    pub async fn unregister(&self, id: ConnId) {
        self.clients.write().await.remove(&id);
    }

    /// Fan a message out to every other connection of the same user. Delivery
    /// is best-effort: a connection whose outbound buffer is full misses the
    /// message rather than stalling the sender. Returns the delivery count.
    pub async fn broadcast(
        &self,
        user_id: Uuid,
        sender: Option<ConnId>,
        message: ServerMessage,
    ) -> usize {
        let clients = self.clients.read().await;
        let mut delivered = 0;
        for (id, handle) in clients.iter() {
            if handle.user_id != user_id || Some(*id) == sender {
                continue;
            }
            match handle.tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => log::warn!("sync delivery to connection {id} failed: {err}"),
            }
        }
        delivered
    }
}

/// Frames queued for the socket writer task.
enum OutboundFrame {
    Json(ServerMessage),
    Ping,
    Pong(Vec<u8>),
}

enum Flow {
    Continue,
    Close,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    log::info!("new sync connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_BUFFER);

    // Writer task: the only place that touches the socket's send half.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let message = match frame {
                OutboundFrame::Json(server_msg) => match serde_json::to_string(&server_msg) {
                    Ok(json) => Message::Text(json),
                    Err(err) => {
                        log::error!("failed to serialize sync message: {err}");
                        continue;
                    }
                },
                OutboundFrame::Ping => Message::Ping(Vec::new()),
                OutboundFrame::Pong(data) => Message::Pong(data),
            };
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    // Set on successful auth; connections never rebind to another user.
    let mut authed: Option<(ConnId, Uuid)> = None;
    let mut alive = true;

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if !alive {
                    log::info!("sync connection missed heartbeat, terminating");
                    break;
                }
                alive = false;
                if outbound_tx.send(OutboundFrame::Ping).await.is_err() {
                    break;
                }
            }
            incoming = ws_rx.next() => {
                let Some(result) = incoming else { break };
                match result {
                    Ok(Message::Text(text)) => {
                        match handle_text(&text, &state, &outbound_tx, &mut authed).await {
                            Flow::Continue => {}
                            Flow::Close => break,
                        }
                    }
                    Ok(Message::Pong(_)) => alive = true,
                    Ok(Message::Ping(data)) => {
                        let _ = outbound_tx.send(OutboundFrame::Pong(data)).await;
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        log::warn!("sync connection error: {err}");
                        break;
                    }
                }
            }
        }
    }

    if let Some((conn_id, _)) = authed {
        state.sync.unregister(conn_id).await;
    }
    // Let the writer drain queued frames (auth errors in particular) before
    // the socket drops.
    drop(outbound_tx);
    let _ = send_task.await;
    log::info!("sync connection closed");
}

async fn handle_text(
    text: &str,
    state: &AppState,
    outbound_tx: &mpsc::Sender<OutboundFrame>,
    authed: &mut Option<(ConnId, Uuid)>,
) -> Flow {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            log::warn!("unparseable sync message: {err}");
            return Flow::Continue;
        }
    };

    match message {
        ClientMessage::Auth { token } => match auth::verify_token(&state.tokens, &token).await {
            Ok(user) => {
                if authed.is_none() {
                    let conn_id = state
                        .sync
                        .register(user.user_id, wrap_sender(outbound_tx.clone()))
                        .await;
                    *authed = Some((conn_id, user.user_id));
                    log::info!("sync connection authenticated for user {}", user.user_id);
                }
                let _ = outbound_tx
                    .send(OutboundFrame::Json(ServerMessage::Auth {
                        status: AuthStatus::Success,
                        message: None,
                    }))
                    .await;
                Flow::Continue
            }
            Err(err) => {
                let _ = outbound_tx
                    .send(OutboundFrame::Json(ServerMessage::Auth {
                        status: AuthStatus::Error,
                        message: Some(err.to_string()),
                    }))
                    .await;
                Flow::Close
            }
        },
        ClientMessage::TimerSync { session_id, elapsed_time, is_running } => {
            // Ignored until the connection has authenticated.
            if let Some((conn_id, user_id)) = *authed {
                state
                    .sync
                    .broadcast(
                        user_id,
                        Some(conn_id),
                        ServerMessage::TimerSync { session_id, elapsed_time, is_running },
                    )
                    .await;
            }
            Flow::Continue
        }
        ClientMessage::SessionUpdate { action, session } => {
            if let Some((conn_id, user_id)) = *authed {
                state
                    .sync
                    .broadcast(
                        user_id,
                        Some(conn_id),
                        ServerMessage::SessionUpdate { action, session },
                    )
                    .await;
            }
            Flow::Continue
        }
    }
}

/// Adapt the registry's `ServerMessage` sender onto this connection's frame
/// channel. The adapter task ends once the registry drops its sender.
fn wrap_sender(tx: mpsc::Sender<OutboundFrame>) -> mpsc::Sender<ServerMessage> {
    let (server_tx, mut server_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);
    tokio::spawn(async move {
        while let Some(message) = server_rx.recv().await {
            if tx.send(OutboundFrame::Json(message)).await.is_err() {
                break;
            }
        }
    });
    server_tx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer_sync(elapsed_time: i64) -> ServerMessage {
        ServerMessage::TimerSync {
            session_id: Uuid::new_v4(),
            elapsed_time,
            is_running: true,
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_other_connections_of_the_same_user() {
        let registry = SyncRegistry::new();
        let user = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let (tx_c, mut rx_c) = mpsc::channel(8);
        let conn_a = registry.register(user, tx_a).await;
        let _conn_b = registry.register(user, tx_b).await;
        let _conn_c = registry.register(stranger, tx_c).await;

        let delivered = registry.broadcast(user, Some(conn_a), timer_sync(42)).await;

        assert_eq!(delivered, 1);
        assert!(matches!(
            rx_b.try_recv(),
            Ok(ServerMessage::TimerSync { elapsed_time: 42, .. })
        ));
        // The sender and the other user's connection see nothing.
        assert!(rx_a.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn server_originated_broadcast_reaches_every_connection() {
        let registry = SyncRegistry::new();
        let user = Uuid::new_v4();

        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        registry.register(user, tx_a).await;
        registry.register(user, tx_b).await;

        let delivered = registry.broadcast(user, None, timer_sync(7)).await;

        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unregistered_connections_no_longer_receive() {
        let registry = SyncRegistry::new();
        let user = Uuid::new_v4();

        let (tx, mut rx) = mpsc::channel(8);
        let conn = registry.register(user, tx).await;
        registry.unregister(conn).await;

        let delivered = registry.broadcast(user, None, timer_sync(1)).await;
        assert_eq!(delivered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn client_messages_parse_from_the_wire_format() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"auth","token":"abc123"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Auth { ref token } if token == "abc123"));

        let id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"timer-sync","sessionId":"{id}","elapsedTime":90,"isRunning":false}}"#
        );
        let msg: ClientMessage = serde_json::from_str(&raw).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::TimerSync { session_id, elapsed_time: 90, is_running: false }
                if session_id == id
        ));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"session-update","action":"end","session":{"id":1}}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::SessionUpdate { ref action, .. } if action == "end"));
    }

    #[test]
    fn server_messages_serialize_to_the_wire_format() {
        let value = serde_json::to_value(ServerMessage::Auth {
            status: AuthStatus::Success,
            message: None,
        })
        .unwrap();
        assert_eq!(value["type"], "auth");
        assert_eq!(value["status"], "success");
        assert!(value.get("message").is_none());

        let value = serde_json::to_value(timer_sync(15)).unwrap();
        assert_eq!(value["type"], "timer-sync");
        assert_eq!(value["elapsedTime"], 15);
        assert_eq!(value["isRunning"], true);
        assert!(value.get("sessionId").is_some());
    }
}
