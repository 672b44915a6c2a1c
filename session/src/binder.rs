use classroom_shared::protocol::ParticipantId;
use std::collections::{BTreeMap, BTreeSet};

pub use classroom_shared::protocol::SeatAssignmentWire as SeatAssignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatBinding {
    pub seat_index: u32,
    /// False once the participant has left; the seat stays reserved until the next assignment.
    pub active: bool,
}

/// Participant to seat mapping.
#[derive(Debug, Default)]
pub struct SeatBinder {
    initialized: bool,
    bindings: BTreeMap<ParticipantId, SeatBinding>,
}

impl SeatBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&mut self) {
        self.bindings.clear();
        self.initialized = true;
        tracing::debug!("Seat binder initialized");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Host side. Participants keep a seat they already hold if it still exists;
    /// everyone else fills the lowest free indices in ascending id order.
    pub fn assign_seats(
        &mut self,
        participants: &[ParticipantId],
        seat_count: u32,
    ) -> Vec<SeatAssignment> {
        let present: BTreeSet<ParticipantId> = participants.iter().copied().collect();

        self.bindings
            .retain(|id, binding| present.contains(id) && binding.seat_index < seat_count);
        for binding in self.bindings.values_mut() {
            binding.active = true;
        }

        let taken: BTreeSet<u32> = self.bindings.values().map(|b| b.seat_index).collect();
        let mut free = (0..seat_count).filter(|i| !taken.contains(i));

        for id in present {
            if self.bindings.contains_key(&id) {
                continue;
            }
            match free.next() {
                Some(seat_index) => {
                    self.bindings.insert(
                        id,
                        SeatBinding {
                            seat_index,
                            active: true,
                        },
                    );
                }
                None => {
                    tracing::warn!("No free seat for participant {}", id);
                }
            }
        }

        self.assignments()
    }

    /// Observer side: mirror the host's mapping.
    pub fn apply_assignments(&mut self, assignments: &[SeatAssignment]) {
        self.bindings = assignments
            .iter()
            .map(|a| {
                (
                    a.participant_id,
                    SeatBinding {
                        seat_index: a.seat_index,
                        active: true,
                    },
                )
            })
            .collect();
    }

    pub fn deactivate(&mut self, id: ParticipantId) -> bool {
        match self.bindings.get_mut(&id) {
            Some(binding) if binding.active => {
                binding.active = false;
                true
            }
            _ => false,
        }
    }

    pub fn reactivate(&mut self, id: ParticipantId) -> bool {
        match self.bindings.get_mut(&id) {
            Some(binding) if !binding.active => {
                binding.active = true;
                true
            }
            _ => false,
        }
    }

    pub fn binding(&self, id: ParticipantId) -> Option<SeatBinding> {
        self.bindings.get(&id).copied()
    }

    pub fn seat_of(&self, id: ParticipantId) -> Option<u32> {
        self.bindings.get(&id).map(|b| b.seat_index)
    }

    pub fn occupant_of(&self, seat_index: u32) -> Option<ParticipantId> {
        self.bindings
            .iter()
            .find(|(_, b)| b.seat_index == seat_index)
            .map(|(id, _)| *id)
    }

    pub fn active_count(&self) -> usize {
        self.bindings.values().filter(|b| b.active).count()
    }

    /// Seat indices below `seat_count` with no binding, active or reserved.
    pub fn available_seats(&self, seat_count: u32) -> Vec<u32> {
        let taken: BTreeSet<u32> = self.bindings.values().map(|b| b.seat_index).collect();
        (0..seat_count).filter(|i| !taken.contains(i)).collect()
    }

    pub fn assignments(&self) -> Vec<SeatAssignment> {
        self.bindings
            .iter()
            .map(|(id, b)| SeatAssignment {
                participant_id: *id,
                seat_index: b.seat_index,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}
