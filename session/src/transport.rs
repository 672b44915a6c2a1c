//! Transport seam between the session core and the network.
//!
//! `LoopbackHub` keeps every participant of a room in one process without
//! touching the network stack. Tests and local runs use it in place of the
//! relay.

use crate::clock::Clock;
use classroom_shared::protocol::{ParticipantId, SessionMsg};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    ParticipantJoined(ParticipantId),
    ParticipantLeft(ParticipantId),
    HostChanged(ParticipantId),
    /// Room session time, in seconds, as of this poll. Sent once per join so
    /// every participant can stamp and read transforms on the same time base.
    RoomTime(f64),
    Message {
        from: ParticipantId,
        payload: SessionMsg,
    },
}

/// Fire-and-forget message transport for one participant.
pub trait Transport {
    fn is_connected(&self) -> bool;

    fn local_id(&self) -> Option<ParticipantId>;

    fn host_id(&self) -> Option<ParticipantId>;

    /// Every participant in the room, including the local one.
    fn participants(&self) -> Vec<ParticipantId>;

    /// Deliver to every other participant.
    fn broadcast(&mut self, payload: SessionMsg);

    fn send_to(&mut self, to: ParticipantId, payload: SessionMsg);

    /// Drain everything received since the last call.
    fn poll_events(&mut self) -> Vec<TransportEvent>;
}

#[derive(Debug, Default)]
struct Peer {
    inbox: VecDeque<TransportEvent>,
    room_time_sent: bool,
}

#[derive(Debug)]
struct HubState {
    next_id: ParticipantId,
    peers: BTreeMap<ParticipantId, Peer>,
    host_id: Option<ParticipantId>,
    muted: BTreeSet<ParticipantId>,
}

impl Default for HubState {
    fn default() -> Self {
        Self {
            next_id: 1,
            peers: BTreeMap::new(),
            host_id: None,
            muted: BTreeSet::new(),
        }
    }
}

impl HubState {
    /// Ids count up from 1, wrap past the max and skip ids still in use.
    fn allocate_id(&mut self) -> Option<ParticipantId> {
        for _ in 0..ParticipantId::MAX {
            let id = self.next_id;
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);
            if !self.peers.contains_key(&id) {
                return Some(id);
            }
        }
        None
    }

    fn push_to_others(&mut self, except: ParticipantId, event: TransportEvent) {
        for (id, peer) in self.peers.iter_mut() {
            if *id != except {
                peer.inbox.push_back(event.clone());
            }
        }
    }

    /// Re-elect the lowest id and tell everyone if it changed.
    fn refresh_host(&mut self) {
        let lowest = self.peers.keys().next().copied();
        if lowest != self.host_id {
            self.host_id = lowest;
            if let Some(host) = lowest {
                tracing::info!("Loopback host is now participant {}", host);
                for peer in self.peers.values_mut() {
                    peer.inbox.push_back(TransportEvent::HostChanged(host));
                }
            }
        }
    }
}

/// In-process room shared by every `LoopbackTransport` it hands out.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
    room_clock: Option<Arc<dyn Clock + Send + Sync>>,
}

impl fmt::Debug for LoopbackHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackHub")
            .field("state", &self.state)
            .field("room_clock", &self.room_clock.is_some())
            .finish()
    }
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Room whose session time comes from `clock`. Each participant gets a
    /// `RoomTime` on its first poll, the way the relay stamps its welcome.
    pub fn with_clock(clock: impl Clock + Send + Sync + 'static) -> Self {
        Self {
            state: Arc::default(),
            room_clock: Some(Arc::new(clock)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the room as a new participant.
    pub fn connect(&self) -> LoopbackTransport {
        let mut state = self.lock();
        let id = state.allocate_id();
        if let Some(id) = id {
            state.peers.insert(id, Peer::default());
            state.push_to_others(id, TransportEvent::ParticipantJoined(id));
            if state.host_id.is_none() {
                state.host_id = Some(id);
            } else {
                state.refresh_host();
            }
            tracing::debug!("Loopback participant {} connected", id);
        } else {
            tracing::warn!("Loopback room is full");
        }
        LoopbackTransport {
            id,
            hub: self.clone(),
        }
    }

    /// Drop a participant as if its connection was lost.
    pub fn disconnect(&self, id: ParticipantId) {
        let mut state = self.lock();
        if state.peers.remove(&id).is_none() {
            return;
        }
        state.muted.remove(&id);
        state.push_to_others(id, TransportEvent::ParticipantLeft(id));
        state.refresh_host();
        tracing::debug!("Loopback participant {} disconnected", id);
    }

    /// Silently drop everything `id` sends while muted.
    pub fn set_muted(&self, id: ParticipantId, muted: bool) {
        let mut state = self.lock();
        if muted {
            state.muted.insert(id);
        } else {
            state.muted.remove(&id);
        }
    }

    /// Deliver a message to `to` as though `from` had sent it.
    pub fn inject(&self, to: ParticipantId, from: ParticipantId, payload: SessionMsg) {
        let mut state = self.lock();
        if let Some(peer) = state.peers.get_mut(&to) {
            peer.inbox.push_back(TransportEvent::Message { from, payload });
        }
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        self.lock().peers.keys().copied().collect()
    }

    pub fn host_id(&self) -> Option<ParticipantId> {
        self.lock().host_id
    }
}

/// One participant's handle on a `LoopbackHub`.
#[derive(Debug)]
pub struct LoopbackTransport {
    id: Option<ParticipantId>,
    hub: LoopbackHub,
}

impl LoopbackTransport {
    /// Id assigned at connect time, kept after disconnection.
    pub fn id(&self) -> Option<ParticipantId> {
        self.id
    }

    pub fn hub(&self) -> &LoopbackHub {
        &self.hub
    }

    fn send(&self, to: Option<ParticipantId>, payload: SessionMsg) {
        let Some(from) = self.id else {
            return;
        };
        let mut state = self.hub.lock();
        if !state.peers.contains_key(&from) || state.muted.contains(&from) {
            return;
        }
        let event = TransportEvent::Message { from, payload };
        match to {
            Some(to) => {
                if let Some(peer) = state.peers.get_mut(&to) {
                    peer.inbox.push_back(event);
                }
            }
            None => state.push_to_others(from, event),
        }
    }
}

impl Transport for LoopbackTransport {
    fn is_connected(&self) -> bool {
        match self.id {
            Some(id) => self.hub.lock().peers.contains_key(&id),
            None => false,
        }
    }

    fn local_id(&self) -> Option<ParticipantId> {
        if self.is_connected() {
            self.id
        } else {
            None
        }
    }

    fn host_id(&self) -> Option<ParticipantId> {
        if self.is_connected() {
            self.hub.host_id()
        } else {
            None
        }
    }

    fn participants(&self) -> Vec<ParticipantId> {
        if self.is_connected() {
            self.hub.participants()
        } else {
            Vec::new()
        }
    }

    fn broadcast(&mut self, payload: SessionMsg) {
        self.send(None, payload);
    }

    fn send_to(&mut self, to: ParticipantId, payload: SessionMsg) {
        self.send(Some(to), payload);
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let Some(id) = self.id else {
            return Vec::new();
        };
        let mut state = self.hub.lock();
        let Some(peer) = state.peers.get_mut(&id) else {
            return Vec::new();
        };
        let mut events = Vec::with_capacity(peer.inbox.len() + 1);
        if let Some(clock) = &self.hub.room_clock {
            if !peer.room_time_sent {
                peer.room_time_sent = true;
                events.push(TransportEvent::RoomTime(clock.now()));
            }
        }
        events.extend(peer.inbox.drain(..));
        events
    }
}
