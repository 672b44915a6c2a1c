//! Participant-side classroom session.
//!
//! Seat layout, startup orchestration and transform replication. Rendering,
//! networking and time come in through the `EntitySpawner`, `Transport` and
//! `Clock` seams.

pub mod binder;
pub mod clock;
pub mod driver;
pub mod events;
pub mod net;
pub mod orchestrator;
pub mod replication;
pub mod seating;
pub mod spawner;
pub mod transport;
pub mod viewpoint;
