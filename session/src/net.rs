//! WebSocket transport to the classroom relay.

use crate::transport::{Transport, TransportEvent};
use classroom_shared::protocol::{
    ClientMsg, ParticipantId, ServerMsg, SessionMsg, WelcomeMsg, PROTOCOL_VERSION,
};
use std::collections::BTreeSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(1000);
const MAX_RECONNECT_DELAY: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone)]
pub enum NetEvent {
    Connected,
    Disconnected,
    /// Welcome plus the moment it came off the socket, so the room time it
    /// carries can be carried forward to whenever it is polled.
    Welcome {
        welcome: WelcomeMsg,
        received_at: Instant,
    },
    Message(ServerMsg),
    ProtocolMismatch { server: u32, client: u32 },
}

type CmdSender = tokio::sync::mpsc::UnboundedSender<ClientMsg>;

/// Relay connection running on its own thread and tokio runtime.
/// Reconnects on its own; room state is rebuilt from each `welcome`.
pub struct WsTransport {
    connected: bool,
    self_id: Option<ParticipantId>,
    host_id: Option<ParticipantId>,
    participants: BTreeSet<ParticipantId>,
    protocol_mismatch: bool,
    event_rx: Receiver<NetEvent>,
    cmd_tx: CmdSender,
}

impl WsTransport {
    pub fn connect(url: impl Into<String>) -> Self {
        let url = url.into();
        tracing::info!("Connecting to relay at {}", url);
        let (event_tx, event_rx) = mpsc::channel::<NetEvent>();
        let cmd_tx = spawn_network_thread(url, event_tx);
        Self::from_channels(event_rx, cmd_tx)
    }

    fn from_channels(event_rx: Receiver<NetEvent>, cmd_tx: CmdSender) -> Self {
        Self {
            connected: false,
            self_id: None,
            host_id: None,
            participants: BTreeSet::new(),
            protocol_mismatch: false,
            event_rx,
            cmd_tx,
        }
    }

    pub fn protocol_mismatch(&self) -> bool {
        self.protocol_mismatch
    }

    fn send(&self, msg: ClientMsg) {
        if self.connected {
            let _ = self.cmd_tx.send(msg);
        }
    }

    fn apply(&mut self, event: NetEvent) -> Option<TransportEvent> {
        match event {
            NetEvent::Connected => {
                tracing::debug!("Relay socket open, waiting for welcome");
                None
            }
            NetEvent::Disconnected => {
                if self.connected {
                    tracing::warn!("Disconnected from relay");
                }
                self.connected = false;
                self.self_id = None;
                self.host_id = None;
                self.participants.clear();
                None
            }
            NetEvent::ProtocolMismatch { server, client } => {
                tracing::error!(
                    "Relay speaks protocol {} but this client speaks {}",
                    server,
                    client
                );
                self.protocol_mismatch = true;
                None
            }
            NetEvent::Welcome {
                welcome,
                received_at,
            } => Some(self.apply_welcome(welcome, received_at)),
            NetEvent::Message(msg) => self.apply_server_msg(msg),
        }
    }

    /// Rebuild room state and report the room time as of now.
    fn apply_welcome(&mut self, welcome: WelcomeMsg, received_at: Instant) -> TransportEvent {
        tracing::info!(
            "Joined room as participant {} (host {}, {} present, room time {:.2}s)",
            welcome.self_id,
            welcome.host_id,
            welcome.participants.len(),
            welcome.room_time
        );
        self.connected = true;
        self.self_id = Some(welcome.self_id);
        self.host_id = Some(welcome.host_id);
        self.participants = welcome.participants.into_iter().collect();
        self.participants.insert(welcome.self_id);
        TransportEvent::RoomTime(welcome.room_time + received_at.elapsed().as_secs_f64())
    }

    fn apply_server_msg(&mut self, msg: ServerMsg) -> Option<TransportEvent> {
        match msg {
            ServerMsg::Welcome(welcome) => Some(self.apply_welcome(welcome, Instant::now())),
            ServerMsg::ParticipantJoined { id } => {
                self.participants.insert(id);
                Some(TransportEvent::ParticipantJoined(id))
            }
            ServerMsg::ParticipantLeft { id } => {
                self.participants.remove(&id);
                Some(TransportEvent::ParticipantLeft(id))
            }
            ServerMsg::HostChanged { host_id } => {
                self.host_id = Some(host_id);
                Some(TransportEvent::HostChanged(host_id))
            }
            ServerMsg::Relay(relayed) => Some(TransportEvent::Message {
                from: relayed.from,
                payload: relayed.payload,
            }),
        }
    }
}

impl Transport for WsTransport {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn local_id(&self) -> Option<ParticipantId> {
        self.self_id
    }

    fn host_id(&self) -> Option<ParticipantId> {
        self.host_id
    }

    fn participants(&self) -> Vec<ParticipantId> {
        self.participants.iter().copied().collect()
    }

    fn broadcast(&mut self, payload: SessionMsg) {
        self.send(ClientMsg::Broadcast { payload });
    }

    fn send_to(&mut self, to: ParticipantId, payload: SessionMsg) {
        self.send(ClientMsg::SendTo { to, payload });
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut raw = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            raw.push(event);
        }
        raw.into_iter().filter_map(|e| self.apply(e)).collect()
    }
}

fn spawn_network_thread(url: String, event_tx: Sender<NetEvent>) -> CmdSender {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let (cmd_tx, mut cmd_rx) = tokio::sync::mpsc::unbounded_channel::<ClientMsg>();

    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_multi_thread()
            .enable_io()
            .enable_time()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("Failed to build network runtime: {}", e);
                return;
            }
        };

        rt.block_on(async move {
            let mut reconnect_delay = INITIAL_RECONNECT_DELAY;

            loop {
                let connect = tokio_tungstenite::connect_async(url.as_str()).await;

                let (ws_stream, _) = match connect {
                    Ok(x) => x,
                    Err(e) => {
                        tracing::debug!("Relay connect failed: {}", e);
                        tokio::time::sleep(reconnect_delay).await;
                        reconnect_delay = (reconnect_delay.mul_f32(1.5)).min(MAX_RECONNECT_DELAY);
                        continue;
                    }
                };

                reconnect_delay = INITIAL_RECONNECT_DELAY;
                if event_tx.send(NetEvent::Connected).is_err() {
                    // Transport dropped
                    return;
                }

                // Anything queued while offline is stale
                while cmd_rx.try_recv().is_ok() {}

                let (mut write, mut read) = ws_stream.split();

                loop {
                    tokio::select! {
                        biased;

                        cmd = cmd_rx.recv() => {
                            let Some(cmd) = cmd else {
                                let _ = write.close().await;
                                return;
                            };
                            if let Ok(text) = serde_json::to_string(&cmd) {
                                if write.send(Message::Text(text.into())).await.is_err() {
                                    break;
                                }
                            }
                        }

                        msg = read.next() => {
                            match msg {
                                Some(Ok(Message::Text(txt))) => {
                                    match serde_json::from_str::<ServerMsg>(&txt) {
                                        Ok(ServerMsg::Welcome(welcome)) => {
                                            let received_at = Instant::now();
                                            if welcome.protocol_version != PROTOCOL_VERSION {
                                                let _ = event_tx.send(NetEvent::ProtocolMismatch {
                                                    server: welcome.protocol_version,
                                                    client: PROTOCOL_VERSION,
                                                });
                                                let _ = write.close().await;
                                                break;
                                            }
                                            let _ = event_tx.send(NetEvent::Welcome { welcome, received_at });
                                        }
                                        Ok(server_msg) => {
                                            let _ = event_tx.send(NetEvent::Message(server_msg));
                                        }
                                        Err(e) => tracing::warn!("Unparseable relay message: {}", e),
                                    }
                                }
                                Some(Ok(Message::Close(_))) => break,
                                Some(Ok(_)) => {}
                                Some(Err(_)) => break,
                                None => break,
                            }
                        }
                    }
                }

                if event_tx.send(NetEvent::Disconnected).is_err() {
                    return;
                }
                tokio::time::sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay.mul_f32(1.5)).min(MAX_RECONNECT_DELAY);
            }
        });
    });

    cmd_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_shared::protocol::{RelayedMsg, SeatsGeneratedMsg};

    fn offline() -> (WsTransport, Sender<NetEvent>, tokio::sync::mpsc::UnboundedReceiver<ClientMsg>) {
        let (event_tx, event_rx) = mpsc::channel();
        let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();
        (WsTransport::from_channels(event_rx, cmd_tx), event_tx, cmd_rx)
    }

    fn seats() -> SessionMsg {
        SessionMsg::SeatsGenerated(SeatsGeneratedMsg {
            generation: 1,
            seats: vec![],
            assignments: vec![],
        })
    }

    #[test]
    fn welcome_sets_room_state() {
        let (mut transport, event_tx, _cmd_rx) = offline();
        assert!(!transport.is_connected());
        event_tx.send(NetEvent::Connected).unwrap();
        event_tx
            .send(NetEvent::Message(ServerMsg::Welcome(WelcomeMsg {
                protocol_version: PROTOCOL_VERSION,
                self_id: 3,
                host_id: 1,
                participants: vec![1, 3],
                room_time: 0.0,
            })))
            .unwrap();
        assert_eq!(transport.poll_events().len(), 1);
        assert!(transport.is_connected());
        assert_eq!(transport.local_id(), Some(3));
        assert_eq!(transport.host_id(), Some(1));
        assert_eq!(transport.participants(), vec![1, 3]);
    }

    #[test]
    fn welcome_room_time_runs_on_until_polled() {
        let (mut transport, event_tx, _cmd_rx) = offline();
        let received_at = Instant::now();
        event_tx
            .send(NetEvent::Welcome {
                welcome: WelcomeMsg {
                    protocol_version: PROTOCOL_VERSION,
                    self_id: 2,
                    host_id: 1,
                    participants: vec![1, 2],
                    room_time: 30.0,
                },
                received_at,
            })
            .unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let events = transport.poll_events();
        let waited = received_at.elapsed().as_secs_f64();
        assert_eq!(events.len(), 1);
        match events[0] {
            TransportEvent::RoomTime(room_time) => {
                assert!(room_time >= 30.05, "room_time = {}", room_time);
                assert!(room_time <= 30.0 + waited, "room_time = {}", room_time);
            }
            ref other => panic!("Expected RoomTime, got {:?}", other),
        }
        assert_eq!(transport.local_id(), Some(2));
    }

    #[test]
    fn room_messages_become_transport_events() {
        let (mut transport, event_tx, _cmd_rx) = offline();
        for msg in [
            ServerMsg::ParticipantJoined { id: 4 },
            ServerMsg::ParticipantLeft { id: 1 },
            ServerMsg::HostChanged { host_id: 3 },
            ServerMsg::Relay(RelayedMsg {
                from: 3,
                payload: seats(),
            }),
        ] {
            event_tx.send(NetEvent::Message(msg)).unwrap();
        }
        let events = transport.poll_events();
        assert_eq!(
            events,
            vec![
                TransportEvent::ParticipantJoined(4),
                TransportEvent::ParticipantLeft(1),
                TransportEvent::HostChanged(3),
                TransportEvent::Message {
                    from: 3,
                    payload: seats()
                },
            ]
        );
        assert_eq!(transport.host_id(), Some(3));
    }

    #[test]
    fn disconnect_clears_state_and_drops_sends() {
        let (mut transport, event_tx, mut cmd_rx) = offline();
        event_tx
            .send(NetEvent::Message(ServerMsg::Welcome(WelcomeMsg {
                protocol_version: PROTOCOL_VERSION,
                self_id: 2,
                host_id: 1,
                participants: vec![1, 2],
                room_time: 0.0,
            })))
            .unwrap();
        transport.poll_events();
        transport.broadcast(seats());
        assert!(matches!(cmd_rx.try_recv(), Ok(ClientMsg::Broadcast { .. })));

        event_tx.send(NetEvent::Disconnected).unwrap();
        transport.poll_events();
        assert!(!transport.is_connected());
        assert_eq!(transport.local_id(), None);
        transport.send_to(1, seats());
        assert!(cmd_rx.try_recv().is_err());
    }

    #[test]
    fn protocol_mismatch_is_flagged() {
        let (mut transport, event_tx, _cmd_rx) = offline();
        event_tx
            .send(NetEvent::ProtocolMismatch {
                server: 99,
                client: PROTOCOL_VERSION,
            })
            .unwrap();
        transport.poll_events();
        assert!(transport.protocol_mismatch());
        assert!(!transport.is_connected());
    }
}
