use classroom_shared::protocol::ParticipantId;
use tokio::sync::broadcast;

/// Local notification that a startup phase finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseEvent {
    pub phase_name: String,
}

/// Lifecycle hooks for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PhaseCompleted(PhaseEvent),
    FullyInitialized,
    Error(String),
    /// The local participant's viewpoint is bound to its seat entity.
    ViewpointReady(ParticipantId),
}

/// Publish/subscribe channel handed to the orchestrator at construction.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        tracing::debug!("Session event: {:?}", event);
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
