//! Integration tests for the classroom relay.
//!
//! These tests start a real relay and connect over WebSocket to check
//! membership and forwarding end to end.

use classroom_relay::config::RelayConfig;
use classroom_relay::room::{run_room_loop, RoomBroadcast, RoomCommand};
use classroom_relay::ws::{ws_handler, AppState};
use classroom_shared::protocol::{
    ClientMsg, ParticipantId, SeatWire, SeatsGeneratedMsg, ServerMsg, SessionMsg,
    PROTOCOL_VERSION,
};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a relay on a random available port and return its WebSocket URL.
async fn start_test_relay(max_participants: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = RelayConfig {
        listen_addr: addr.to_string(),
        max_participants,
    };

    let (room_tx, room_rx) = mpsc::channel::<RoomCommand>(256);
    let (broadcast_tx, _) = broadcast::channel::<RoomBroadcast>(256);
    tokio::spawn(run_room_loop(room_rx, broadcast_tx, config));

    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(AppState { room_tx });

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("ws://{}/ws", addr)
}

async fn connect(url: &str) -> Ws {
    let (ws, _) = connect_async(url).await.expect("Failed to connect");
    ws
}

/// Read the next text message and parse as ServerMsg.
async fn recv_msg(ws: &mut Ws) -> ServerMsg {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text).expect("Failed to parse relay message");
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("WebSocket error: {}", e),
            None => panic!("WebSocket closed unexpectedly"),
        }
    }
}

async fn recv_msg_timeout(ws: &mut Ws, timeout: Duration) -> Option<ServerMsg> {
    tokio::time::timeout(timeout, recv_msg(ws)).await.ok()
}

async fn send_msg(ws: &mut Ws, msg: &ClientMsg) {
    let json = serde_json::to_string(msg).unwrap();
    ws.send(Message::Text(json.into())).await.unwrap();
}

/// Connect and consume the welcome, returning the assigned id.
async fn join(url: &str) -> (Ws, ParticipantId) {
    let mut ws = connect(url).await;
    match recv_msg(&mut ws).await {
        ServerMsg::Welcome(welcome) => {
            let id = welcome.self_id;
            (ws, id)
        }
        other => panic!("Expected Welcome, got {:?}", other),
    }
}

fn seats(generation: u32) -> SessionMsg {
    SessionMsg::SeatsGenerated(SeatsGeneratedMsg {
        generation,
        seats: vec![SeatWire {
            index: 0,
            position: [1.0, 0.0, 2.0],
            heading: 180.0,
        }],
        assignments: vec![],
    })
}

const QUIET: Duration = Duration::from_millis(200);

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_first_participant_is_host() {
    let url = start_test_relay(8).await;
    let mut ws = connect(&url).await;

    match recv_msg(&mut ws).await {
        ServerMsg::Welcome(welcome) => {
            assert_eq!(welcome.protocol_version, PROTOCOL_VERSION);
            assert_eq!(welcome.self_id, 1);
            assert_eq!(welcome.host_id, 1);
            assert_eq!(welcome.participants, vec![1]);
        }
        other => panic!("Expected Welcome, got {:?}", other),
    }
}

#[tokio::test]
async fn test_join_is_announced_to_others() {
    let url = start_test_relay(8).await;
    let (mut ws1, id1) = join(&url).await;

    let mut ws2 = connect(&url).await;
    match recv_msg(&mut ws2).await {
        ServerMsg::Welcome(welcome) => {
            assert_eq!(welcome.host_id, id1);
            assert_eq!(welcome.participants, vec![id1, welcome.self_id]);
        }
        other => panic!("Expected Welcome, got {:?}", other),
    }

    assert_eq!(
        recv_msg(&mut ws1).await,
        ServerMsg::ParticipantJoined { id: 2 }
    );
    // No announcement of itself
    assert!(recv_msg_timeout(&mut ws2, QUIET).await.is_none());
}

#[tokio::test]
async fn test_broadcast_is_not_echoed() {
    let url = start_test_relay(8).await;
    let (mut ws1, id1) = join(&url).await;
    let (mut ws2, _) = join(&url).await;
    let _joined = recv_msg(&mut ws1).await;

    send_msg(&mut ws1, &ClientMsg::Broadcast { payload: seats(1) }).await;

    match recv_msg(&mut ws2).await {
        ServerMsg::Relay(relayed) => {
            assert_eq!(relayed.from, id1);
            assert_eq!(relayed.payload, seats(1));
        }
        other => panic!("Expected Relay, got {:?}", other),
    }
    assert!(recv_msg_timeout(&mut ws1, QUIET).await.is_none());
}

#[tokio::test]
async fn test_send_to_reaches_only_recipient() {
    let url = start_test_relay(8).await;
    let (mut ws1, _) = join(&url).await;
    let (mut ws2, _) = join(&url).await;
    let (mut ws3, id3) = join(&url).await;
    // Drain join announcements
    for _ in 0..2 {
        recv_msg(&mut ws1).await;
    }
    recv_msg(&mut ws2).await;

    send_msg(
        &mut ws1,
        &ClientMsg::SendTo {
            to: id3,
            payload: seats(4),
        },
    )
    .await;

    match recv_msg(&mut ws3).await {
        ServerMsg::Relay(relayed) => assert_eq!(relayed.payload, seats(4)),
        other => panic!("Expected Relay, got {:?}", other),
    }
    assert!(recv_msg_timeout(&mut ws2, QUIET).await.is_none());
}

#[tokio::test]
async fn test_host_leaving_hands_over() {
    let url = start_test_relay(8).await;
    let (ws1, id1) = join(&url).await;
    let (mut ws2, id2) = join(&url).await;

    drop(ws1);

    assert_eq!(
        recv_msg(&mut ws2).await,
        ServerMsg::ParticipantLeft { id: id1 }
    );
    assert_eq!(
        recv_msg(&mut ws2).await,
        ServerMsg::HostChanged { host_id: id2 }
    );
}

#[tokio::test]
async fn test_full_room_refuses_connection() {
    let url = start_test_relay(1).await;
    let (_ws1, _) = join(&url).await;
    let mut ws2 = connect(&url).await;

    let frame = tokio::time::timeout(Duration::from_secs(2), ws2.next())
        .await
        .expect("relay should close the refused connection");
    match frame {
        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {}
        Some(Ok(other)) => panic!("Expected close, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreadable_message_is_ignored() {
    let url = start_test_relay(8).await;
    let (mut ws1, _) = join(&url).await;
    let (mut ws2, _) = join(&url).await;
    let _joined = recv_msg(&mut ws1).await;

    ws1.send(Message::Text("not json".into())).await.unwrap();
    send_msg(&mut ws1, &ClientMsg::Broadcast { payload: seats(2) }).await;

    match recv_msg(&mut ws2).await {
        ServerMsg::Relay(relayed) => assert_eq!(relayed.payload, seats(2)),
        other => panic!("Expected Relay, got {:?}", other),
    }
}
