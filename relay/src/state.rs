use classroom_shared::protocol::{ParticipantId, WelcomeMsg, PROTOCOL_VERSION};
use std::collections::BTreeSet;

/// Room membership owned by the room loop.
pub struct RoomState {
    participants: BTreeSet<ParticipantId>,
    host_id: Option<ParticipantId>,
    next_participant_id: ParticipantId,
    max_participants: usize,
}

impl RoomState {
    pub fn new(max_participants: usize) -> Self {
        Self {
            participants: BTreeSet::new(),
            host_id: None,
            next_participant_id: 1,
            max_participants: max_participants.min(ParticipantId::MAX as usize),
        }
    }

    /// Admit a participant. Returns None when the room is full.
    pub fn add_participant(&mut self) -> Option<ParticipantId> {
        if self.participants.len() >= self.max_participants {
            return None;
        }
        let id = self.allocate_id();
        self.participants.insert(id);
        self.refresh_host();
        Some(id)
    }

    /// Remove a participant. Returns the new host if the host changed.
    pub fn remove_participant(&mut self, id: ParticipantId) -> Option<ParticipantId> {
        if !self.participants.remove(&id) {
            return None;
        }
        self.refresh_host()
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.participants.contains(&id)
    }

    pub fn host_id(&self) -> Option<ParticipantId> {
        self.host_id
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        self.participants.iter().copied().collect()
    }

    /// Welcome for `id` stamped with `room_time`, or None if it is not in the room.
    pub fn welcome(&self, id: ParticipantId, room_time: f64) -> Option<WelcomeMsg> {
        if !self.contains(id) {
            return None;
        }
        Some(WelcomeMsg {
            protocol_version: PROTOCOL_VERSION,
            self_id: id,
            host_id: self.host_id?,
            participants: self.participants(),
            room_time,
        })
    }

    /// Ids count up from 1 and wrap, skipping ids still in use.
    /// Only called with at least one id free.
    fn allocate_id(&mut self) -> ParticipantId {
        loop {
            let id = self.next_participant_id;
            self.next_participant_id = self.next_participant_id.checked_add(1).unwrap_or(1);
            if !self.participants.contains(&id) {
                return id;
            }
        }
    }

    /// Lowest id hosts. Returns the new host when it changed to someone.
    fn refresh_host(&mut self) -> Option<ParticipantId> {
        let host = self.participants.first().copied();
        if host == self.host_id {
            return None;
        }
        self.host_id = host;
        host
    }
}
