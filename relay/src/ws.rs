use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use classroom_shared::protocol::{ClientMsg, ParticipantId, RelayedMsg, ServerMsg};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::room::{RoomBroadcast, RoomCommand};

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub room_tx: mpsc::Sender<RoomCommand>,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, app_state))
}

/// The message `me` should see for a room broadcast, if any.
/// Participants never hear their own traffic back.
pub fn server_msg_for(broadcast: &RoomBroadcast, me: ParticipantId) -> Option<ServerMsg> {
    match broadcast {
        RoomBroadcast::ParticipantJoined(id) if *id != me => {
            Some(ServerMsg::ParticipantJoined { id: *id })
        }
        RoomBroadcast::ParticipantLeft(id) if *id != me => {
            Some(ServerMsg::ParticipantLeft { id: *id })
        }
        RoomBroadcast::HostChanged(host_id) => Some(ServerMsg::HostChanged { host_id: *host_id }),
        RoomBroadcast::Relay { from, to, payload } => {
            if *from == me || to.is_some_and(|to| to != me) {
                return None;
            }
            Some(ServerMsg::Relay(RelayedMsg {
                from: *from,
                payload: payload.clone(),
            }))
        }
        _ => None,
    }
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // Join the room
    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .room_tx
        .send(RoomCommand::Join { response: resp_tx })
        .await
        .is_err()
    {
        tracing::error!("Failed to send Join command");
        return;
    }

    let (welcome, mut broadcast_rx) = match resp_rx.await {
        Ok(Some(admission)) => admission,
        Ok(None) => {
            tracing::warn!("Connection refused, room is full");
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
        Err(_) => {
            tracing::error!("Failed to receive welcome");
            return;
        }
    };
    let my_id = welcome.self_id;

    tracing::info!("Participant {} connected", my_id);

    let sent_welcome = match serde_json::to_string(&ServerMsg::Welcome(welcome)) {
        Ok(json) => sink.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to encode welcome: {}", e);
            false
        }
    };

    while sent_welcome {
        tokio::select! {
            // Participant -> room
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let (to, payload) = match serde_json::from_str::<ClientMsg>(&text) {
                            Ok(ClientMsg::Broadcast { payload }) => (None, payload),
                            Ok(ClientMsg::SendTo { to, payload }) => (Some(to), payload),
                            Err(e) => {
                                tracing::warn!("Participant {} sent an unreadable message: {}", my_id, e);
                                continue;
                            }
                        };
                        let relay = RoomCommand::Relay { from: my_id, to, payload };
                        if app_state.room_tx.send(relay).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {} // Ignore ping/pong/binary
                }
            }

            // Room -> participant
            result = broadcast_rx.recv() => {
                match result {
                    Ok(broadcast) => {
                        let Some(server_msg) = server_msg_for(&broadcast, my_id) else {
                            continue;
                        };
                        if let Ok(json) = serde_json::to_string(&server_msg) {
                            if sink.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Participant {} lagged by {} messages", my_id, n);
                        // Dropped transforms are superseded by later ones
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // Cleanup on disconnect
    let _ = app_state
        .room_tx
        .send(RoomCommand::Leave { id: my_id })
        .await;
    tracing::info!("Participant {} disconnected", my_id);
}
