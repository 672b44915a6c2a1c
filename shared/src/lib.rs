//! Shared types for the classroom session.
//!
//! Math, wire protocol and configuration used by both the relay and the
//! participant-side session crate.

pub mod config;
pub mod protocol;
pub mod vec3;
