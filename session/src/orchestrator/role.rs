use crate::binder::SeatBinder;
use crate::seating::{SeatingError, SeatingSystem};
use crate::transport::Transport;
use classroom_shared::protocol::{ParticipantId, SeatsGeneratedMsg, SessionMsg};

/// What this process does during startup. Seat generation exists only on
/// `HostDuties`, so an observer has no way to run the solver.
#[derive(Debug)]
pub enum Role {
    Host(HostDuties),
    Observer(ObserverDuties),
}

impl Role {
    pub fn is_host(&self) -> bool {
        matches!(self, Role::Host(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::Host(_) => "host",
            Role::Observer(_) => "observer",
        }
    }

    /// Newest seat generation this role produced or accepted.
    pub fn generation(&self) -> u32 {
        match self {
            Role::Host(duties) => duties.generation(),
            Role::Observer(duties) => duties.latest_generation(),
        }
    }
}

#[derive(Debug, Default)]
pub struct HostDuties {
    generation: u32,
    last_generated: Option<SeatsGeneratedMsg>,
}

impl HostDuties {
    /// Generations continue after `generation` so observers see them as newer.
    pub fn new(generation: u32) -> Self {
        Self {
            generation,
            last_generated: None,
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn last_generated(&self) -> Option<&SeatsGeneratedMsg> {
        self.last_generated.as_ref()
    }

    /// Solve seats for everyone in the room and bind participants to them.
    pub fn generate(
        &mut self,
        seating: &mut SeatingSystem,
        binder: &mut SeatBinder,
        participants: &[ParticipantId],
    ) -> Result<SeatsGeneratedMsg, SeatingError> {
        let layout = seating.generate(participants.len())?;
        let seats = layout.to_wire();
        let assignments = binder.assign_seats(participants, seats.len() as u32);

        self.generation += 1;
        let msg = SeatsGeneratedMsg {
            generation: self.generation,
            seats,
            assignments,
        };
        self.last_generated = Some(msg.clone());
        Ok(msg)
    }

    /// Broadcast the last generated seats to every observer.
    pub fn publish<T: Transport>(&self, transport: &mut T) {
        match &self.last_generated {
            Some(msg) => {
                tracing::info!(
                    "Broadcasting seat generation {} ({} seats)",
                    msg.generation,
                    msg.seats.len()
                );
                transport.broadcast(SessionMsg::SeatsGenerated(msg.clone()));
            }
            None => tracing::warn!("No seats generated yet, nothing to broadcast"),
        }
    }
}

#[derive(Debug)]
pub struct ObserverDuties {
    host_id: ParticipantId,
    latest: Option<SeatsGeneratedMsg>,
    /// Generations at or below this are stale. Cleared when the host changes.
    accepted_generation: Option<u32>,
}

impl ObserverDuties {
    pub fn new(host_id: ParticipantId) -> Self {
        Self {
            host_id,
            latest: None,
            accepted_generation: None,
        }
    }

    pub fn host_id(&self) -> ParticipantId {
        self.host_id
    }

    pub fn set_host(&mut self, host_id: ParticipantId) {
        self.host_id = host_id;
        self.accepted_generation = None;
    }

    pub fn latest(&self) -> Option<&SeatsGeneratedMsg> {
        self.latest.as_ref()
    }

    pub fn latest_generation(&self) -> u32 {
        self.latest.as_ref().map_or(0, |m| m.generation)
    }

    /// Keep `msg` if it comes from the host, carries seats and is newer than
    /// anything accepted from that host.
    pub fn accept(&mut self, from: ParticipantId, msg: SeatsGeneratedMsg) -> bool {
        if from != self.host_id {
            tracing::warn!(
                "Ignoring seats from participant {}, host is {}",
                from,
                self.host_id
            );
            return false;
        }
        if msg.seats.is_empty() {
            tracing::warn!("Ignoring empty seat list from host {}", from);
            return false;
        }
        if self
            .accepted_generation
            .is_some_and(|accepted| msg.generation <= accepted)
        {
            tracing::debug!("Ignoring stale seat generation {}", msg.generation);
            return false;
        }
        self.accepted_generation = Some(msg.generation);
        self.latest = Some(msg);
        true
    }
}
