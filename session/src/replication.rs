//! Per-participant transform replication.
//!
//! The local participant owns an `AuthoritativeReplica` that decides when to
//! send. Every remote participant is shadowed by an `ObserverReplica` that
//! dead-reckons incoming updates and smooths toward them. Updates carry no
//! sequence number: the last message received wins.

use classroom_shared::config::ReplicationConfig;
use classroom_shared::protocol::{ParticipantId, TransformUpdateMsg};
use classroom_shared::vec3::{
    add, angle_between_degrees, distance, length, lerp, quat_slerp, scale, sub, Quat, Vec3,
};
use std::collections::BTreeMap;

const SEND_INTERVAL_SLACK: f64 = 1e-9;

/// Traffic counters for one replica.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyncStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub last_send_time: Option<f64>,
    pub last_receive_time: Option<f64>,
    pub average_lag: f64,
    pub max_lag: f64,
    total_lag: f64,
}

impl SyncStats {
    fn record_sent(&mut self, now: f64) {
        self.packets_sent += 1;
        self.last_send_time = Some(now);
    }

    fn record_received(&mut self, now: f64, lag: f64) {
        self.packets_received += 1;
        self.last_receive_time = Some(now);
        self.total_lag += lag;
        self.max_lag = self.max_lag.max(lag);
        self.average_lag = self.total_lag / self.packets_received as f64;
    }
}

/// Read access shared by both sides of a participant stream.
pub trait Replica {
    fn participant_id(&self) -> ParticipantId;
    fn is_authoritative(&self) -> bool;
    fn position(&self) -> Vec3;
    fn rotation(&self) -> Quat;
    fn velocity(&self) -> Vec3;
    fn stats(&self) -> &SyncStats;
}

/// The local participant's own transform. Only local game logic mutates it.
#[derive(Debug, Clone)]
pub struct AuthoritativeReplica {
    id: ParticipantId,
    config: ReplicationConfig,
    position: Vec3,
    rotation: Quat,
    velocity: Vec3,
    last_sent_position: Vec3,
    last_sent_rotation: Quat,
    last_send_timestamp: Option<f64>,
    stats: SyncStats,
}

impl AuthoritativeReplica {
    pub fn new(id: ParticipantId, config: ReplicationConfig, position: Vec3, rotation: Quat) -> Self {
        Self {
            id,
            config,
            position,
            rotation,
            velocity: Vec3::ZERO,
            last_sent_position: position,
            last_sent_rotation: rotation,
            last_send_timestamp: None,
            stats: SyncStats::default(),
        }
    }

    pub fn set_transform(&mut self, position: Vec3, rotation: Quat) {
        self.position = position;
        self.rotation = rotation;
    }

    pub fn last_send_timestamp(&self) -> Option<f64> {
        self.last_send_timestamp
    }

    /// Produce an update if the send interval has elapsed and the transform
    /// moved past a threshold. The first call always sends.
    pub fn poll_send(&mut self, now: f64) -> Option<TransformUpdateMsg> {
        let velocity = match self.last_send_timestamp {
            None => Vec3::ZERO,
            Some(last) => {
                let elapsed = now - last;
                if elapsed < self.config.send_interval() - SEND_INTERVAL_SLACK {
                    return None;
                }
                let moved = distance(self.position, self.last_sent_position);
                let turned = angle_between_degrees(self.rotation, self.last_sent_rotation);
                if moved <= self.config.position_threshold
                    && turned <= self.config.rotation_threshold_degrees
                {
                    return None;
                }
                if elapsed > 0.0 {
                    scale(sub(self.position, self.last_sent_position), 1.0 / elapsed)
                } else {
                    Vec3::ZERO
                }
            }
        };

        self.velocity = velocity;
        self.last_sent_position = self.position;
        self.last_sent_rotation = self.rotation;
        self.last_send_timestamp = Some(now);
        self.stats.record_sent(now);

        tracing::trace!(
            "Participant {} sends transform #{}",
            self.id,
            self.stats.packets_sent
        );

        Some(TransformUpdateMsg {
            participant_id: self.id,
            position: self.position.to_wire(),
            velocity: velocity.to_wire(),
            rotation: self.rotation.to_wire(),
            send_timestamp: now,
        })
    }
}

impl Replica for AuthoritativeReplica {
    fn participant_id(&self) -> ParticipantId {
        self.id
    }

    fn is_authoritative(&self) -> bool {
        true
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn rotation(&self) -> Quat {
        self.rotation
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn stats(&self) -> &SyncStats {
        &self.stats
    }
}

/// Read-only shadow of a remote participant.
#[derive(Debug, Clone)]
pub struct ObserverReplica {
    id: ParticipantId,
    config: ReplicationConfig,
    position: Vec3,
    rotation: Quat,
    velocity: Vec3,
    interpolation_target: Vec3,
    rotation_target: Quat,
    last_send_timestamp: Option<f64>,
    received_at: Option<f64>,
    last_update: Option<f64>,
    stats: SyncStats,
}

impl ObserverReplica {
    pub fn new(id: ParticipantId, config: ReplicationConfig, position: Vec3, rotation: Quat) -> Self {
        Self {
            id,
            config,
            position,
            rotation,
            velocity: Vec3::ZERO,
            interpolation_target: position,
            rotation_target: rotation,
            last_send_timestamp: None,
            received_at: None,
            last_update: None,
            stats: SyncStats::default(),
        }
    }

    pub fn interpolation_target(&self) -> Vec3 {
        self.interpolation_target
    }

    pub fn rotation_target(&self) -> Quat {
        self.rotation_target
    }

    pub fn last_send_timestamp(&self) -> Option<f64> {
        self.last_send_timestamp
    }

    /// Take an update as the new target, compensating for transit lag.
    /// `now` must be on the same room time base the sender stamped with.
    pub fn receive(&mut self, msg: &TransformUpdateMsg, now: f64) {
        let position = Vec3::from_wire(msg.position);
        let velocity = Vec3::from_wire(msg.velocity);
        let lag = (now - msg.send_timestamp).abs();

        self.interpolation_target = if length(velocity) > self.config.velocity_epsilon {
            add(position, scale(velocity, lag))
        } else {
            position
        };
        self.rotation_target = Quat::from_wire(msg.rotation);
        self.velocity = velocity;
        self.last_send_timestamp = Some(msg.send_timestamp);
        self.received_at = Some(now);
        self.stats.record_received(now, lag);

        tracing::trace!(
            "Participant {} update received, lag {:.3}s",
            self.id,
            lag
        );
    }

    /// Advance the displayed transform toward the target.
    pub fn update(&mut self, now: f64) {
        let dt = match self.last_update {
            Some(last) => (now - last).max(0.0),
            None => 0.0,
        };
        self.last_update = Some(now);

        let t = (self.config.interpolation_speed * dt).clamp(0.0, 1.0);
        self.position = lerp(self.position, self.interpolation_target, t);

        if let Some(received_at) = self.received_at {
            if length(self.velocity) > self.config.prediction_threshold {
                let since_receipt = (now - received_at).max(0.0);
                let predicted = add(self.interpolation_target, scale(self.velocity, since_receipt));
                self.position = lerp(self.position, predicted, self.config.prediction_blend);
            }
        }

        self.rotation = quat_slerp(self.rotation, self.rotation_target, t);
    }
}

impl Replica for ObserverReplica {
    fn participant_id(&self) -> ParticipantId {
        self.id
    }

    fn is_authoritative(&self) -> bool {
        false
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn rotation(&self) -> Quat {
        self.rotation
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn stats(&self) -> &SyncStats {
        &self.stats
    }
}

/// One local authoritative stream plus a shadow per remote participant.
#[derive(Debug)]
pub struct ReplicationChannel {
    config: ReplicationConfig,
    local: Option<AuthoritativeReplica>,
    remotes: BTreeMap<ParticipantId, ObserverReplica>,
}

impl ReplicationChannel {
    pub fn new(config: ReplicationConfig) -> Self {
        Self {
            config,
            local: None,
            remotes: BTreeMap::new(),
        }
    }

    pub fn attach_local(&mut self, id: ParticipantId, position: Vec3, rotation: Quat) {
        if self.local.as_ref().map(|l| l.participant_id()) == Some(id) {
            return;
        }
        self.remotes.remove(&id);
        self.local = Some(AuthoritativeReplica::new(id, self.config, position, rotation));
    }

    /// Start shadowing `id`. An existing shadow is kept.
    pub fn attach_remote(&mut self, id: ParticipantId, position: Vec3, rotation: Quat) {
        if self.local_id() == Some(id) {
            return;
        }
        self.remotes
            .entry(id)
            .or_insert_with(|| ObserverReplica::new(id, self.config, position, rotation));
    }

    pub fn detach(&mut self, id: ParticipantId) -> bool {
        if self.local_id() == Some(id) {
            self.local = None;
            return true;
        }
        self.remotes.remove(&id).is_some()
    }

    pub fn clear(&mut self) {
        self.local = None;
        self.remotes.clear();
    }

    pub fn local_id(&self) -> Option<ParticipantId> {
        self.local.as_ref().map(|l| l.participant_id())
    }

    pub fn local(&self) -> Option<&AuthoritativeReplica> {
        self.local.as_ref()
    }

    pub fn remote(&self, id: ParticipantId) -> Option<&ObserverReplica> {
        self.remotes.get(&id)
    }

    pub fn remotes(&self) -> impl Iterator<Item = &ObserverReplica> {
        self.remotes.values()
    }

    pub fn set_local_transform(&mut self, position: Vec3, rotation: Quat) {
        if let Some(local) = self.local.as_mut() {
            local.set_transform(position, rotation);
        }
    }

    pub fn poll_outgoing(&mut self, now: f64) -> Option<TransformUpdateMsg> {
        self.local.as_mut().and_then(|l| l.poll_send(now))
    }

    /// Route an update to its shadow. Rejects updates claiming another
    /// participant's id, targeting the local stream, or with no shadow.
    pub fn receive(&mut self, from: ParticipantId, msg: &TransformUpdateMsg, now: f64) -> bool {
        if msg.participant_id != from {
            tracing::warn!(
                "Participant {} sent a transform for {}, dropped",
                from,
                msg.participant_id
            );
            return false;
        }
        if self.local_id() == Some(from) {
            return false;
        }
        match self.remotes.get_mut(&from) {
            Some(replica) => {
                replica.receive(msg, now);
                true
            }
            None => {
                tracing::debug!("No replica for participant {}, update dropped", from);
                false
            }
        }
    }

    pub fn update(&mut self, now: f64) {
        for replica in self.remotes.values_mut() {
            replica.update(now);
        }
    }
}
