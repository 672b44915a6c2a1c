//! Classroom room relay.
//!
//! Hands out participant ids, keeps the lowest id as host and forwards
//! session messages between the participants of a single room.

pub mod config;
pub mod room;
pub mod state;
pub mod ws;
