use classroom_shared::config::OrchestratorConfig;
use std::fmt;

/// Startup phases in happy-path order, plus the recovery side state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    CheckingNetwork,
    InitSeatingSystem,
    InitSpawner,
    InitBinder,
    GenerateSeatsAndEntities,
    SyncNetworkData,
    SetupViewpointControl,
    Complete,
    ErrorRecovery,
}

impl SessionPhase {
    pub const STARTUP: [SessionPhase; 8] = [
        SessionPhase::CheckingNetwork,
        SessionPhase::InitSeatingSystem,
        SessionPhase::InitSpawner,
        SessionPhase::InitBinder,
        SessionPhase::GenerateSeatsAndEntities,
        SessionPhase::SyncNetworkData,
        SessionPhase::SetupViewpointControl,
        SessionPhase::Complete,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SessionPhase::CheckingNetwork => "CheckingNetwork",
            SessionPhase::InitSeatingSystem => "InitSeatingSystem",
            SessionPhase::InitSpawner => "InitSpawner",
            SessionPhase::InitBinder => "InitBinder",
            SessionPhase::GenerateSeatsAndEntities => "GenerateSeatsAndEntities",
            SessionPhase::SyncNetworkData => "SyncNetworkData",
            SessionPhase::SetupViewpointControl => "SetupViewpointControl",
            SessionPhase::Complete => "Complete",
            SessionPhase::ErrorRecovery => "ErrorRecovery",
        }
    }

    /// Position in the startup order. None for ErrorRecovery.
    pub fn ordinal(self) -> Option<usize> {
        Self::STARTUP.iter().position(|p| *p == self)
    }

    pub fn next(self) -> Option<SessionPhase> {
        self.ordinal()
            .and_then(|i| Self::STARTUP.get(i + 1))
            .copied()
    }

    pub fn is_after(self, other: SessionPhase) -> bool {
        match (self.ordinal(), other.ordinal()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        }
    }

    /// How long the phase may wait for its readiness predicate.
    pub fn timeout(self, config: &OrchestratorConfig) -> Option<f64> {
        match self {
            SessionPhase::CheckingNetwork => Some(config.network_timeout),
            SessionPhase::InitSeatingSystem
            | SessionPhase::InitSpawner
            | SessionPhase::InitBinder => Some(config.component_timeout),
            SessionPhase::GenerateSeatsAndEntities | SessionPhase::SyncNetworkData => {
                Some(config.seat_sync_timeout)
            }
            SessionPhase::SetupViewpointControl => Some(config.viewpoint_timeout),
            SessionPhase::Complete | SessionPhase::ErrorRecovery => None,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
