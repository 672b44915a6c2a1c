use crate::config::RelayConfig;
use crate::state::RoomState;
use classroom_shared::protocol::{ParticipantId, SessionMsg, WelcomeMsg};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

/// What a connection gets back on joining: its welcome and a receiver
/// subscribed before anyone else heard about it.
pub type Admission = (WelcomeMsg, broadcast::Receiver<RoomBroadcast>);

/// Commands from participant connections to the room loop
pub enum RoomCommand {
    Join {
        response: oneshot::Sender<Option<Admission>>,
    },
    Leave {
        id: ParticipantId,
    },
    Relay {
        from: ParticipantId,
        /// None delivers to everyone but the sender
        to: Option<ParticipantId>,
        payload: SessionMsg,
    },
}

/// Broadcasts from the room loop to all connections
#[derive(Debug, Clone, PartialEq)]
pub enum RoomBroadcast {
    ParticipantJoined(ParticipantId),
    ParticipantLeft(ParticipantId),
    HostChanged(ParticipantId),
    Relay {
        from: ParticipantId,
        to: Option<ParticipantId>,
        payload: SessionMsg,
    },
}

/// Run the room. Owns all membership state and ends when every command
/// sender is gone.
pub async fn run_room_loop(
    mut cmd_rx: mpsc::Receiver<RoomCommand>,
    broadcast_tx: broadcast::Sender<RoomBroadcast>,
    config: RelayConfig,
) {
    let mut state = RoomState::new(config.max_participants);
    let started = Instant::now();

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            RoomCommand::Join { response } => {
                let previous_host = state.host_id();
                let Some(id) = state.add_participant() else {
                    tracing::warn!(
                        "Room full ({} participants), join refused",
                        state.participant_count()
                    );
                    let _ = response.send(None);
                    continue;
                };

                let _ = broadcast_tx.send(RoomBroadcast::ParticipantJoined(id));
                if let Some(host) = state.host_id().filter(|_| previous_host.is_some()) {
                    if Some(host) != previous_host {
                        let _ = broadcast_tx.send(RoomBroadcast::HostChanged(host));
                    }
                }

                let admission = state
                    .welcome(id, started.elapsed().as_secs_f64())
                    .map(|welcome| (welcome, broadcast_tx.subscribe()));
                if response.send(admission).is_err() {
                    // Connection gave up while waiting
                    state.remove_participant(id);
                    let _ = broadcast_tx.send(RoomBroadcast::ParticipantLeft(id));
                    continue;
                }
                tracing::info!(
                    "Participant {} joined (host {:?}, {} present)",
                    id,
                    state.host_id(),
                    state.participant_count()
                );
            }
            RoomCommand::Leave { id } => {
                if !state.contains(id) {
                    continue;
                }
                let new_host = state.remove_participant(id);
                let _ = broadcast_tx.send(RoomBroadcast::ParticipantLeft(id));
                if let Some(host) = new_host {
                    tracing::info!("Host handed over to participant {}", host);
                    let _ = broadcast_tx.send(RoomBroadcast::HostChanged(host));
                }
                tracing::info!("Participant {} left", id);
            }
            RoomCommand::Relay { from, to, payload } => {
                if !state.contains(from) {
                    continue;
                }
                if let Some(to) = to.filter(|to| !state.contains(*to)) {
                    tracing::debug!("Participant {} sent to absent participant {}", from, to);
                    continue;
                }
                let _ = broadcast_tx.send(RoomBroadcast::Relay { from, to, payload });
            }
        }
    }

    tracing::info!("Room loop ended");
}
