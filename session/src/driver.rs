use crate::clock::Clock;
use crate::orchestrator::{RunState, SessionOrchestrator};
use crate::spawner::EntitySpawner;
use crate::transport::Transport;
use classroom_shared::vec3::{Quat, Vec3};
use std::time::Duration;
use tokio::sync::mpsc;

/// Commands from the embedding application to a running session
#[derive(Debug, Clone, Copy)]
pub enum SessionCommand {
    SetLocalTransform { position: Vec3, rotation: Quat },
    /// Head yaw relative to the seat heading and pitch (positive down), in degrees
    SetHeadAngles {
        yaw_offset_degrees: f64,
        pitch_degrees: f64,
    },
    Stop,
}

/// Drive `orchestrator` at its scheduler tick rate until stopped, halted or
/// the command channel closes. Returns the orchestrator for inspection.
pub async fn run_session<T, S, C>(
    mut orchestrator: SessionOrchestrator<T, S>,
    clock: C,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
) -> SessionOrchestrator<T, S>
where
    T: Transport,
    S: EntitySpawner,
    C: Clock,
{
    let tick_rate_hz = orchestrator.config().orchestrator.tick_rate_hz.max(1);
    let tick_duration = Duration::from_secs_f64(1.0 / tick_rate_hz as f64);
    let mut tick_interval = tokio::time::interval(tick_duration);
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    orchestrator.start(clock.now());

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                orchestrator.tick(clock.now());
                if orchestrator.run_state() == RunState::Halted {
                    tracing::warn!("Session halted, leaving driver loop");
                    break;
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SessionCommand::SetLocalTransform { position, rotation }) => {
                        orchestrator.set_local_transform(position, rotation);
                    }
                    Some(SessionCommand::SetHeadAngles { yaw_offset_degrees, pitch_degrees }) => {
                        orchestrator.set_head_angles(yaw_offset_degrees, pitch_degrees);
                    }
                    Some(SessionCommand::Stop) | None => {
                        orchestrator.stop();
                        break;
                    }
                }
            }
        }
    }

    tracing::info!("Session driver ended");
    orchestrator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::events::{EventBus, SessionEvent};
    use crate::replication::Replica;
    use crate::spawner::HeadlessSpawner;
    use crate::transport::LoopbackHub;
    use classroom_shared::config::SessionConfig;

    #[tokio::test(start_paused = true)]
    async fn closing_commands_stops_the_session() {
        let hub = LoopbackHub::new();
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let orchestrator = SessionOrchestrator::new(
            SessionConfig::default(),
            hub.connect(),
            HeadlessSpawner::new(),
            events,
        );
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let task = tokio::spawn(run_session(orchestrator, SystemClock::new(), cmd_rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(cmd_tx);
        let orchestrator = task.await.unwrap();

        assert!(orchestrator.is_complete());
        assert_eq!(orchestrator.run_state(), RunState::Stopped);
        let mut fully_initialized = 0;
        while let Ok(event) = rx.try_recv() {
            if event == SessionEvent::FullyInitialized {
                fully_initialized += 1;
            }
        }
        assert_eq!(fully_initialized, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn head_angles_reach_the_local_replica() {
        let hub = LoopbackHub::new();
        let orchestrator = SessionOrchestrator::new(
            SessionConfig::default(),
            hub.connect(),
            HeadlessSpawner::new(),
            EventBus::default(),
        );
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let task = tokio::spawn(run_session(orchestrator, SystemClock::new(), cmd_rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        cmd_tx
            .send(SessionCommand::SetHeadAngles {
                yaw_offset_degrees: 20.0,
                pitch_degrees: 15.0,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        cmd_tx.send(SessionCommand::Stop).await.unwrap();
        let orchestrator = task.await.unwrap();

        let seat = orchestrator.local_seat().copied().unwrap();
        let rotation = orchestrator.replication().local().unwrap().rotation();
        let yaw = classroom_shared::vec3::wrap_degrees(rotation.yaw_degrees() - seat.heading_degrees);
        assert!((yaw - 20.0).abs() < 1e-3, "yaw offset {}", yaw);
        assert!((rotation.pitch_degrees() - 15.0).abs() < 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn halted_session_ends_the_driver() {
        let hub = LoopbackHub::new();
        let transport = hub.connect();
        hub.disconnect(1);
        let orchestrator = SessionOrchestrator::new(
            SessionConfig::default(),
            transport,
            HeadlessSpawner::new(),
            EventBus::default(),
        );
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let orchestrator = run_session(orchestrator, SystemClock::new(), cmd_rx).await;
        assert_eq!(orchestrator.run_state(), RunState::Halted);
    }
}
