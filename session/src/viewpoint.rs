use crate::spawner::EntityHandle;
use classroom_shared::protocol::ParticipantId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewpointEntry {
    pub handle: EntityHandle,
    pub heading_degrees: f64,
    pub confirmed: bool,
}

/// Which entity carries each participant's viewpoint. Filled at spawn time.
#[derive(Debug, Default)]
pub struct ViewpointRegistry {
    entries: HashMap<ParticipantId, ViewpointEntry>,
}

impl ViewpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the viewpoint entity for `id`. A replaced entry is unconfirmed.
    pub fn register(&mut self, id: ParticipantId, handle: EntityHandle, heading_degrees: f64) {
        self.entries.insert(
            id,
            ViewpointEntry {
                handle,
                heading_degrees,
                confirmed: false,
            },
        );
    }

    pub fn confirm(&mut self, id: ParticipantId) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.confirmed = true;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: ParticipantId) -> Option<&ViewpointEntry> {
        self.entries.get(&id)
    }

    pub fn is_confirmed(&self, id: ParticipantId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.confirmed)
    }

    pub fn remove(&mut self, id: ParticipantId) -> Option<ViewpointEntry> {
        self.entries.remove(&id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_confirm() {
        let mut registry = ViewpointRegistry::new();
        assert!(!registry.confirm(1));
        registry.register(1, EntityHandle(5), 90.0);
        assert!(!registry.is_confirmed(1));
        assert!(registry.confirm(1));
        assert!(registry.is_confirmed(1));
        assert_eq!(registry.get(1).map(|e| e.handle), Some(EntityHandle(5)));
    }

    #[test]
    fn re_register_resets_confirmation() {
        let mut registry = ViewpointRegistry::new();
        registry.register(2, EntityHandle(1), 0.0);
        registry.confirm(2);
        registry.register(2, EntityHandle(7), 0.0);
        assert!(!registry.is_confirmed(2));
        assert_eq!(registry.remove(2).map(|e| e.handle), Some(EntityHandle(7)));
        assert!(registry.get(2).is_none());
    }
}
