//! Session startup state machine.
//!
//! `SessionOrchestrator::tick` is polled by a scheduler (see `driver`). Each
//! phase runs an entry action once, then checks a readiness predicate every
//! tick until it holds or the phase deadline passes. A timeout leads to
//! `ErrorRecovery`, which restarts from `CheckingNetwork` while the transport
//! is still connected and halts otherwise.

mod phase;
mod role;

pub use phase::SessionPhase;
pub use role::{HostDuties, ObserverDuties, Role};

use crate::binder::SeatBinder;
use crate::events::{EventBus, PhaseEvent, SessionEvent};
use crate::replication::{Replica, ReplicationChannel};
use crate::seating::SeatingSystem;
use crate::spawner::{EntityRoster, EntitySpawner, SpawnRequest, SpawnedEntity};
use crate::transport::{Transport, TransportEvent};
use crate::viewpoint::ViewpointRegistry;
use classroom_shared::config::SessionConfig;
use classroom_shared::protocol::{ParticipantId, SeatsGeneratedMsg, SessionMsg};
use classroom_shared::vec3::{Quat, Vec3};

/// Heads stop short of straight up or down.
pub const MAX_HEAD_PITCH_DEGREES: f64 = 80.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("phase {phase} timed out after {waited:.1}s")]
    PhaseTimeout { phase: SessionPhase, waited: f64 },
    #[error("network lost")]
    NetworkLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    /// Recovery found the transport gone; the caller decides what happens next.
    Halted,
    Stopped,
}

pub struct SessionOrchestrator<T, S> {
    config: SessionConfig,
    transport: T,
    spawner: S,
    events: EventBus,
    seating: SeatingSystem,
    binder: SeatBinder,
    roster: EntityRoster,
    viewpoints: ViewpointRegistry,
    replication: ReplicationChannel,
    role: Option<Role>,
    local_id: Option<ParticipantId>,
    /// Seats that arrived before the role was known
    stashed_seats: Option<(ParticipantId, SeatsGeneratedMsg)>,
    applied_generation: Option<u32>,
    run_state: RunState,
    phase: Option<SessionPhase>,
    phase_entered_at: f64,
    deadline: Option<f64>,
    not_before: f64,
    completed_phases: usize,
    pending_regeneration: Option<f64>,
    regeneration_count: u32,
    /// Room time minus local time. Transforms are stamped and aged in room time.
    room_clock_offset: f64,
}

impl<T: Transport, S: EntitySpawner> SessionOrchestrator<T, S> {
    pub fn new(config: SessionConfig, transport: T, spawner: S, events: EventBus) -> Self {
        Self {
            seating: SeatingSystem::new(config.seating),
            replication: ReplicationChannel::new(config.replication),
            config,
            transport,
            spawner,
            events,
            binder: SeatBinder::new(),
            roster: EntityRoster::new(),
            viewpoints: ViewpointRegistry::new(),
            role: None,
            local_id: None,
            stashed_seats: None,
            applied_generation: None,
            run_state: RunState::Idle,
            phase: None,
            phase_entered_at: 0.0,
            deadline: None,
            not_before: 0.0,
            completed_phases: 0,
            pending_regeneration: None,
            regeneration_count: 0,
            room_clock_offset: 0.0,
        }
    }

    /// Begin the startup sequence. Ignored while already running.
    pub fn start(&mut self, now: f64) {
        if self.run_state == RunState::Running {
            tracing::debug!("Session already running, start ignored");
            return;
        }
        tracing::info!("Starting session");
        self.run_state = RunState::Running;
        self.not_before = now + self.config.orchestrator.start_delay;
        self.restart(self.not_before);
    }

    /// Cancel every outstanding wait. Entities stay spawned.
    pub fn stop(&mut self) {
        if self.run_state == RunState::Running {
            tracing::info!("Session stopped in phase {:?}", self.phase);
        }
        self.run_state = RunState::Stopped;
        self.pending_regeneration = None;
        self.deadline = None;
    }

    pub fn tick(&mut self, now: f64) {
        if self.run_state != RunState::Running {
            return;
        }
        self.handle_transport_events(now);
        if now < self.not_before {
            return;
        }
        let Some(phase) = self.phase else {
            return;
        };
        match phase {
            SessionPhase::ErrorRecovery => self.tick_recovery(now),
            SessionPhase::Complete => self.tick_complete(now),
            _ => {
                if self.phase_ready(phase, now) {
                    self.complete_phase(phase, now);
                } else if self.deadline.is_some_and(|deadline| now >= deadline) {
                    self.fail_phase(phase, now);
                }
            }
        }
    }

    /// Feed the local participant's transform to replication.
    pub fn set_local_transform(&mut self, position: Vec3, rotation: Quat) {
        self.replication.set_local_transform(position, rotation);
    }

    /// Turn the local participant's head: yaw relative to its seat heading,
    /// pitch positive looking down. Does nothing until the local seat entity exists.
    pub fn set_head_angles(&mut self, yaw_offset_degrees: f64, pitch_degrees: f64) {
        let Some(seat) = self.local_seat().copied() else {
            return;
        };
        let rotation = Quat::from_yaw_pitch_degrees(
            seat.heading_degrees + yaw_offset_degrees,
            pitch_degrees.clamp(-MAX_HEAD_PITCH_DEGREES, MAX_HEAD_PITCH_DEGREES),
        );
        self.replication.set_local_transform(seat.position, rotation);
    }

    /// Seat entity occupied by the local participant.
    pub fn local_seat(&self) -> Option<&SpawnedEntity> {
        self.local_id.and_then(|id| self.roster.by_occupant(id))
    }

    pub fn phase(&self) -> Option<SessionPhase> {
        self.phase
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Some(SessionPhase::Complete)
    }

    /// Completed startup phases out of eight.
    pub fn progress(&self) -> f64 {
        self.completed_phases as f64 / SessionPhase::STARTUP.len() as f64
    }

    pub fn role(&self) -> Option<&Role> {
        self.role.as_ref()
    }

    pub fn is_host(&self) -> bool {
        self.role.as_ref().is_some_and(Role::is_host)
    }

    pub fn local_id(&self) -> Option<ParticipantId> {
        self.local_id
    }

    pub fn applied_generation(&self) -> Option<u32> {
        self.applied_generation
    }

    pub fn regeneration_count(&self) -> u32 {
        self.regeneration_count
    }

    /// Local time `now` on the room's time base.
    pub fn room_time(&self, now: f64) -> f64 {
        now + self.room_clock_offset
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn seating(&self) -> &SeatingSystem {
        &self.seating
    }

    pub fn binder(&self) -> &SeatBinder {
        &self.binder
    }

    pub fn roster(&self) -> &EntityRoster {
        &self.roster
    }

    pub fn viewpoints(&self) -> &ViewpointRegistry {
        &self.viewpoints
    }

    pub fn replication(&self) -> &ReplicationChannel {
        &self.replication
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    pub fn spawner_mut(&mut self) -> &mut S {
        &mut self.spawner
    }

    // === Phase machinery ===

    fn restart(&mut self, now: f64) {
        self.completed_phases = 0;
        self.applied_generation = None;
        self.pending_regeneration = None;
        self.replication.clear();
        self.enter_phase(SessionPhase::CheckingNetwork, now);
    }

    fn enter_phase(&mut self, phase: SessionPhase, now: f64) {
        tracing::debug!("Entering phase {}", phase);
        self.phase = Some(phase);
        self.phase_entered_at = now;
        self.deadline = phase
            .timeout(&self.config.orchestrator)
            .map(|timeout| now + timeout);

        match phase {
            SessionPhase::InitSeatingSystem => {
                if let Err(e) = self.seating.initialize() {
                    tracing::warn!("Seating system not initialized: {}", e);
                }
            }
            SessionPhase::InitBinder => self.binder.initialize(),
            SessionPhase::GenerateSeatsAndEntities => {
                if self.is_host() {
                    self.host_generate(now);
                }
            }
            SessionPhase::SyncNetworkData => {
                if let Some(Role::Host(duties)) = &self.role {
                    duties.publish(&mut self.transport);
                }
            }
            SessionPhase::Complete => self.enter_complete(),
            _ => {}
        }
    }

    fn phase_ready(&mut self, phase: SessionPhase, now: f64) -> bool {
        match phase {
            SessionPhase::CheckingNetwork => self.check_network(),
            SessionPhase::InitSeatingSystem => self.seating.is_initialized(),
            SessionPhase::InitSpawner => self.spawner.is_ready(),
            SessionPhase::InitBinder => self.binder.is_initialized(),
            SessionPhase::GenerateSeatsAndEntities => {
                let received = match &self.role {
                    Some(Role::Host(duties)) => {
                        return duties.generation() > 0
                            && self.applied_generation == Some(duties.generation());
                    }
                    Some(Role::Observer(duties)) => duties.latest().cloned(),
                    None => return false,
                };
                match received {
                    Some(msg) => {
                        self.apply_layout(&msg, now);
                        true
                    }
                    None => false,
                }
            }
            // Host broadcast on entry; observers have nothing to sync
            SessionPhase::SyncNetworkData => true,
            SessionPhase::SetupViewpointControl => self.bind_local_viewpoint(),
            SessionPhase::Complete | SessionPhase::ErrorRecovery => false,
        }
    }

    fn complete_phase(&mut self, phase: SessionPhase, now: f64) {
        self.completed_phases += 1;
        tracing::info!(
            "Phase {} complete ({}/{})",
            phase,
            self.completed_phases,
            SessionPhase::STARTUP.len()
        );
        let observer_sync = phase == SessionPhase::SyncNetworkData
            && matches!(self.role, Some(Role::Observer(_)));
        if !observer_sync {
            self.publish_phase(phase);
        }
        if let Some(next) = phase.next() {
            self.enter_phase(next, now);
        }
    }

    fn publish_phase(&self, phase: SessionPhase) {
        self.events.publish(SessionEvent::PhaseCompleted(PhaseEvent {
            phase_name: phase.name().to_string(),
        }));
    }

    fn fail_phase(&mut self, phase: SessionPhase, now: f64) {
        let err = SessionError::PhaseTimeout {
            phase,
            waited: now - self.phase_entered_at,
        };
        tracing::warn!("{}", err);
        self.events.publish(SessionEvent::Error(err.to_string()));
        self.enter_recovery(now);
    }

    fn enter_recovery(&mut self, now: f64) {
        self.phase = Some(SessionPhase::ErrorRecovery);
        self.phase_entered_at = now;
        self.deadline = Some(now + self.config.orchestrator.recovery_delay);
        self.pending_regeneration = None;
    }

    fn tick_recovery(&mut self, now: f64) {
        if self.deadline.is_some_and(|deadline| now < deadline) {
            return;
        }
        if self.transport.is_connected() {
            tracing::info!("Retrying session startup");
            self.restart(now);
        } else {
            let err = SessionError::NetworkLost;
            tracing::error!("Session halted: {}", err);
            self.events.publish(SessionEvent::Error(err.to_string()));
            self.run_state = RunState::Halted;
            self.deadline = None;
        }
    }

    fn enter_complete(&mut self) {
        self.completed_phases += 1;
        self.publish_phase(SessionPhase::Complete);
        self.events.publish(SessionEvent::FullyInitialized);
        self.attach_replicas();
        tracing::info!(
            "Session fully initialized as {} (participant {:?})",
            self.role.as_ref().map_or("unknown", Role::name),
            self.local_id
        );
    }

    fn tick_complete(&mut self, now: f64) {
        if !self.transport.is_connected() {
            let err = SessionError::NetworkLost;
            tracing::warn!("Connection lost after startup");
            self.events.publish(SessionEvent::Error(err.to_string()));
            self.enter_recovery(now);
            return;
        }

        if self.pending_regeneration.is_some_and(|at| now >= at) {
            self.pending_regeneration = None;
            self.regenerate(now);
        }

        let room_now = self.room_time(now);
        if let Some(update) = self.replication.poll_outgoing(room_now) {
            self.transport.broadcast(SessionMsg::TransformUpdate(update));
        }
        self.replication.update(room_now);
        for replica in self.replication.remotes() {
            if let Some(entity) = self.roster.by_occupant(replica.participant_id()) {
                self.spawner
                    .apply_transform(entity.handle, replica.position(), replica.rotation());
            }
        }
    }

    // === Phase actions ===

    fn check_network(&mut self) -> bool {
        if !self.transport.is_connected() {
            return false;
        }
        let (Some(local), Some(host)) = (self.transport.local_id(), self.transport.host_id())
        else {
            return false;
        };
        self.local_id = Some(local);
        self.resolve_role(local, host);
        true
    }

    fn resolve_role(&mut self, local: ParticipantId, host: ParticipantId) {
        let role = match self.role.take() {
            Some(Role::Host(duties)) if local == host => Role::Host(duties),
            Some(Role::Observer(mut duties)) if local != host => {
                if duties.host_id() != host {
                    duties.set_host(host);
                }
                Role::Observer(duties)
            }
            previous => {
                let generation = previous.as_ref().map_or(0, Role::generation);
                if local == host {
                    Role::Host(HostDuties::new(generation))
                } else {
                    Role::Observer(ObserverDuties::new(host))
                }
            }
        };
        tracing::info!("Participant {} acts as {} (host {})", local, role.name(), host);
        self.role = Some(role);

        if let (Some((from, msg)), Some(Role::Observer(duties))) =
            (self.stashed_seats.take(), self.role.as_mut())
        {
            duties.accept(from, msg);
        }
    }

    /// Solve, bind and spawn on the host. Returns false if no seats came out.
    fn host_generate(&mut self, now: f64) -> bool {
        let participants = self.transport.participants();
        let Some(Role::Host(duties)) = self.role.as_mut() else {
            return false;
        };
        match duties.generate(&mut self.seating, &mut self.binder, &participants) {
            Ok(msg) => {
                self.apply_layout(&msg, now);
                true
            }
            Err(e) => {
                tracing::warn!("Seat generation failed: {}", e);
                false
            }
        }
    }

    fn regenerate(&mut self, now: f64) {
        if !self.host_generate(now) {
            return;
        }
        if let Some(Role::Host(duties)) = &self.role {
            duties.publish(&mut self.transport);
        }
        self.regeneration_count += 1;
        self.publish_phase(SessionPhase::GenerateSeatsAndEntities);
        self.publish_phase(SessionPhase::SyncNetworkData);
        tracing::info!("Seats regenerated ({} so far)", self.regeneration_count);
    }

    /// Replace the spawned seat entities with one per seat in `msg`.
    fn apply_layout(&mut self, msg: &SeatsGeneratedMsg, now: f64) {
        if matches!(self.role, Some(Role::Observer(_))) {
            self.binder.apply_assignments(&msg.assignments);
        }

        self.roster.despawn_all(&mut self.spawner);
        self.viewpoints.clear();

        for seat in &msg.seats {
            let occupant = self.binder.occupant_of(seat.index);
            let request = SpawnRequest {
                seat_index: seat.index,
                occupant,
                position: Vec3::from_wire(seat.position),
                heading_degrees: seat.heading as f64,
            };
            match self.spawner.spawn(&request) {
                Ok(handle) => {
                    self.roster.insert(SpawnedEntity {
                        handle,
                        seat_index: seat.index,
                        occupant,
                        position: request.position,
                        heading_degrees: request.heading_degrees,
                    });
                    if let Some(id) = occupant.filter(|id| Some(*id) == self.local_id) {
                        self.viewpoints.register(id, handle, request.heading_degrees);
                    }
                }
                Err(e) => tracing::warn!("Seat {} not spawned: {}", seat.index, e),
            }
        }

        self.applied_generation = Some(msg.generation);
        tracing::info!(
            "Applied seat generation {}: {}/{} entities at t={:.2}",
            msg.generation,
            self.roster.len(),
            msg.seats.len(),
            now
        );

        if self.is_complete() {
            self.replication.clear();
            self.attach_replicas();
            self.bind_local_viewpoint();
        }
    }

    fn bind_local_viewpoint(&mut self) -> bool {
        let Some(local) = self.local_id else {
            return false;
        };
        let Some(entity) = self.roster.by_occupant(local).copied() else {
            return false;
        };
        if !self
            .spawner
            .bind_viewpoint(entity.handle, entity.heading_degrees)
        {
            return false;
        }
        if self.viewpoints.get(local).map(|e| e.handle) != Some(entity.handle) {
            self.viewpoints
                .register(local, entity.handle, entity.heading_degrees);
        }
        self.viewpoints.confirm(local);
        self.events.publish(SessionEvent::ViewpointReady(local));
        true
    }

    fn attach_replicas(&mut self) {
        for entity in self.roster.iter() {
            let Some(id) = entity.occupant else {
                continue;
            };
            let rotation = Quat::from_yaw_degrees(entity.heading_degrees);
            if Some(id) == self.local_id {
                self.replication.attach_local(id, entity.position, rotation);
            } else if self.binder.binding(id).is_some_and(|b| b.active) {
                self.replication.attach_remote(id, entity.position, rotation);
            }
        }
    }

    // === Transport events ===

    fn handle_transport_events(&mut self, now: f64) {
        for event in self.transport.poll_events() {
            match event {
                TransportEvent::ParticipantJoined(id) => self.on_participant_joined(id, now),
                TransportEvent::ParticipantLeft(id) => self.on_participant_left(id),
                TransportEvent::HostChanged(host) => self.on_host_changed(host, now),
                TransportEvent::RoomTime(room_now) => {
                    self.room_clock_offset = room_now - now;
                    tracing::debug!("Room clock offset {:+.3}s", self.room_clock_offset);
                }
                TransportEvent::Message {
                    from,
                    payload: SessionMsg::SeatsGenerated(msg),
                } => self.on_seats_generated(from, msg, now),
                TransportEvent::Message {
                    from,
                    payload: SessionMsg::TransformUpdate(update),
                } => {
                    let room_now = self.room_time(now);
                    self.replication.receive(from, &update, room_now);
                }
            }
        }
    }

    fn on_participant_joined(&mut self, id: ParticipantId, now: f64) {
        tracing::info!("Participant {} joined", id);
        self.binder.reactivate(id);
        if let Some(Role::Host(duties)) = &self.role {
            if duties.generation() > 0 {
                let at = now + self.config.orchestrator.regeneration_settle_delay;
                tracing::debug!("Seat regeneration scheduled for t={:.2}", at);
                self.pending_regeneration = Some(at);
            }
        }
    }

    /// Seats are kept so the participant can come back to the same place.
    fn on_participant_left(&mut self, id: ParticipantId) {
        tracing::info!("Participant {} left", id);
        if Some(id) == self.local_id {
            return;
        }
        self.binder.deactivate(id);
        self.replication.detach(id);
        self.viewpoints.remove(id);
    }

    fn on_host_changed(&mut self, host: ParticipantId, now: f64) {
        tracing::info!("Host is now participant {}", host);
        let Some(local) = self.local_id else {
            return;
        };
        self.role = match self.role.take() {
            Some(Role::Observer(duties)) if host == local => {
                tracing::info!("Promoted to host");
                let generation = duties.latest_generation();
                self.role = Some(Role::Host(HostDuties::new(generation)));
                match self.phase {
                    Some(SessionPhase::GenerateSeatsAndEntities) => {
                        self.host_generate(now);
                    }
                    Some(phase) if phase.is_after(SessionPhase::GenerateSeatsAndEntities) => {
                        self.pending_regeneration =
                            Some(now + self.config.orchestrator.regeneration_settle_delay);
                    }
                    _ => {}
                }
                self.role.take()
            }
            Some(Role::Observer(mut duties)) => {
                duties.set_host(host);
                Some(Role::Observer(duties))
            }
            Some(Role::Host(_)) if host != local => {
                tracing::warn!("No longer host, following participant {}", host);
                self.pending_regeneration = None;
                Some(Role::Observer(ObserverDuties::new(host)))
            }
            other => other,
        };
    }

    fn on_seats_generated(&mut self, from: ParticipantId, msg: SeatsGeneratedMsg, now: f64) {
        let to_apply = match self.role.as_mut() {
            Some(Role::Observer(duties)) => {
                let past_generation = self
                    .phase
                    .is_some_and(|p| p.is_after(SessionPhase::GenerateSeatsAndEntities));
                if duties.accept(from, msg) && past_generation {
                    duties.latest().cloned()
                } else {
                    None
                }
            }
            Some(Role::Host(_)) => {
                tracing::warn!("Ignoring seats from participant {} while hosting", from);
                None
            }
            None => {
                self.stashed_seats = Some((from, msg));
                None
            }
        };
        if let Some(msg) = to_apply {
            self.apply_layout(&msg, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawner::HeadlessSpawner;
    use crate::transport::LoopbackHub;
    use tokio::sync::broadcast;

    const DT: f64 = 1.0 / 30.0;

    type Orchestrator = SessionOrchestrator<crate::transport::LoopbackTransport, HeadlessSpawner>;

    fn orchestrator(hub: &LoopbackHub) -> (Orchestrator, broadcast::Receiver<SessionEvent>) {
        let events = EventBus::new(1024);
        let rx = events.subscribe();
        let orch = SessionOrchestrator::new(
            SessionConfig::default(),
            hub.connect(),
            HeadlessSpawner::new(),
            events,
        );
        (orch, rx)
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn phase_names(events: &[SessionEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::PhaseCompleted(p) => Some(p.phase_name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn lone_host_walks_all_phases_once() {
        let hub = LoopbackHub::new();
        let (mut host, mut rx) = orchestrator(&hub);
        host.start(0.0);
        let mut t = 0.0;
        for _ in 0..20 {
            host.tick(t);
            t += DT;
        }
        assert!(host.is_complete());
        assert!(host.is_host());
        assert_eq!(host.progress(), 1.0);

        let events = drain(&mut rx);
        let expected: Vec<String> = SessionPhase::STARTUP
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(phase_names(&events), expected);
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == SessionEvent::FullyInitialized)
                .count(),
            1
        );
        assert!(events.contains(&SessionEvent::ViewpointReady(1)));
        assert_eq!(host.roster().len(), 1);
        assert_eq!(host.spawner().viewpoint(), host.roster().by_occupant(1).map(|e| e.handle));
    }

    #[test]
    fn one_phase_per_tick() {
        let hub = LoopbackHub::new();
        let (mut host, _rx) = orchestrator(&hub);
        host.start(0.0);
        host.tick(0.0);
        assert_eq!(host.phase(), Some(SessionPhase::InitSeatingSystem));
        host.tick(DT);
        assert_eq!(host.phase(), Some(SessionPhase::InitSpawner));
    }

    #[test]
    fn second_start_is_ignored() {
        let hub = LoopbackHub::new();
        let (mut host, _rx) = orchestrator(&hub);
        host.start(0.0);
        host.tick(0.0);
        host.tick(DT);
        host.start(2.0 * DT);
        assert_eq!(host.phase(), Some(SessionPhase::InitSpawner));
    }

    #[test]
    fn start_delay_postpones_first_poll() {
        let hub = LoopbackHub::new();
        let events = EventBus::default();
        let mut config = SessionConfig::default();
        config.orchestrator.start_delay = 1.0;
        let mut host =
            SessionOrchestrator::new(config, hub.connect(), HeadlessSpawner::new(), events);
        host.start(0.0);
        host.tick(0.5);
        assert_eq!(host.phase(), Some(SessionPhase::CheckingNetwork));
        host.tick(1.0);
        assert_eq!(host.phase(), Some(SessionPhase::InitSeatingSystem));
    }

    #[test]
    fn stop_cancels_waits() {
        let hub = LoopbackHub::new();
        let (mut host, mut rx) = orchestrator(&hub);
        host.spawner_mut().set_ready(false);
        host.start(0.0);
        for i in 0..5 {
            host.tick(i as f64 * DT);
        }
        host.stop();
        host.tick(100.0);
        assert_eq!(host.phase(), Some(SessionPhase::InitSpawner));
        assert_eq!(host.run_state(), RunState::Stopped);
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, SessionEvent::Error(_))));
    }

    #[test]
    fn spawner_timeout_recovers_and_retries() {
        let hub = LoopbackHub::new();
        let (mut host, mut rx) = orchestrator(&hub);
        host.spawner_mut().set_ready(false);
        host.start(0.0);
        host.tick(0.0);
        host.tick(0.1);
        assert_eq!(host.phase(), Some(SessionPhase::InitSpawner));

        // component timeout is 5s from entering InitSpawner at t=0.1
        host.tick(5.0);
        assert_eq!(host.phase(), Some(SessionPhase::InitSpawner));
        host.tick(5.2);
        assert_eq!(host.phase(), Some(SessionPhase::ErrorRecovery));
        let errors: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Error(_)))
            .collect();
        assert_eq!(errors.len(), 1);

        host.spawner_mut().set_ready(true);
        host.tick(7.0);
        assert_eq!(host.phase(), Some(SessionPhase::ErrorRecovery));
        host.tick(8.3);
        assert_eq!(host.phase(), Some(SessionPhase::CheckingNetwork));
        assert_eq!(host.progress(), 0.0);

        let mut t = 8.3;
        for _ in 0..10 {
            t += DT;
            host.tick(t);
        }
        assert!(host.is_complete());
        assert_eq!(host.role().map(Role::generation), Some(1));
    }

    #[test]
    fn disconnected_transport_halts_after_recovery() {
        let hub = LoopbackHub::new();
        let (mut orch, mut rx) = orchestrator(&hub);
        hub.disconnect(1);
        orch.start(0.0);
        orch.tick(0.0);
        orch.tick(15.0);
        assert_eq!(orch.phase(), Some(SessionPhase::ErrorRecovery));
        orch.tick(18.0);
        assert_eq!(orch.run_state(), RunState::Halted);
        let errors: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Error(reason) => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("CheckingNetwork"));
        assert_eq!(errors[1], "network lost");
    }

    #[test]
    fn room_time_offset_comes_from_the_transport() {
        let hub = LoopbackHub::with_clock(crate::clock::ManualClock::new(100.0));
        let (mut host, _rx) = orchestrator(&hub);
        assert_eq!(host.room_time(5.0), 5.0);
        host.start(5.0);
        host.tick(5.0);
        assert_eq!(host.room_time(6.0), 101.0);
    }

    #[test]
    fn head_pitch_is_clamped() {
        let hub = LoopbackHub::new();
        let (mut host, _rx) = orchestrator(&hub);
        host.start(0.0);
        let mut t = 0.0;
        for _ in 0..20 {
            host.tick(t);
            t += DT;
        }
        host.set_head_angles(0.0, 120.0);
        let rotation = host.replication().local().unwrap().rotation();
        assert!((rotation.pitch_degrees() - MAX_HEAD_PITCH_DEGREES).abs() < 1e-6);
    }

    #[test]
    fn missing_template_never_reaches_viewpoint() {
        let hub = LoopbackHub::new();
        let events = EventBus::default();
        let mut host = SessionOrchestrator::new(
            SessionConfig::default(),
            hub.connect(),
            HeadlessSpawner::without_template(),
            events,
        );
        host.start(0.0);
        let mut t = 0.0;
        for _ in 0..10 {
            host.tick(t);
            t += DT;
        }
        assert_eq!(host.phase(), Some(SessionPhase::SetupViewpointControl));
        assert!(host.roster().is_empty());
        assert_eq!(host.applied_generation(), Some(1));
    }
}
