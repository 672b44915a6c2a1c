use serde::{Deserialize, Serialize};

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Participant id assigned by the relay. Stable for the lifetime of a connection.
pub type ParticipantId = u16;

// === Participant -> participant (carried inside the relay envelope) ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionMsg {
    #[serde(rename = "seats_generated")]
    SeatsGenerated(SeatsGeneratedMsg),
    #[serde(rename = "transform_update")]
    TransformUpdate(TransformUpdateMsg),
}

/// Host -> all. The authoritative seat list plus the participant/seat mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatsGeneratedMsg {
    /// Bumped by the host on every regeneration
    #[serde(default)]
    pub generation: u32,
    pub seats: Vec<SeatWire>,
    #[serde(default)]
    pub assignments: Vec<SeatAssignmentWire>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatWire {
    pub index: u32,
    pub position: [f32; 3],
    /// Yaw in degrees
    pub heading: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatAssignmentWire {
    pub participant_id: ParticipantId,
    pub seat_index: u32,
}

/// Authoritative participant -> all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformUpdateMsg {
    pub participant_id: ParticipantId,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    /// Quaternion as [x, y, z, w]
    pub rotation: [f32; 4],
    /// Sender's session clock at send time (seconds)
    pub send_timestamp: f64,
}

// === Relay -> participant ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "welcome")]
    Welcome(WelcomeMsg),
    #[serde(rename = "participant_joined")]
    ParticipantJoined { id: ParticipantId },
    #[serde(rename = "participant_left")]
    ParticipantLeft { id: ParticipantId },
    #[serde(rename = "host_changed")]
    HostChanged {
        #[serde(rename = "hostId")]
        host_id: ParticipantId,
    },
    #[serde(rename = "relay")]
    Relay(RelayedMsg),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMsg {
    pub protocol_version: u32,
    pub self_id: ParticipantId,
    pub host_id: ParticipantId,
    /// Every participant in the room, including self
    pub participants: Vec<ParticipantId>,
    /// Seconds since the room started, read when the welcome was built.
    /// Participants offset their own clocks onto this time base.
    #[serde(default)]
    pub room_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedMsg {
    pub from: ParticipantId,
    pub payload: SessionMsg,
}

// === Participant -> relay ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    /// Deliver to every other participant
    #[serde(rename = "broadcast")]
    Broadcast { payload: SessionMsg },
    /// Deliver to one named participant
    #[serde(rename = "send_to")]
    SendTo {
        to: ParticipantId,
        payload: SessionMsg,
    },
}
