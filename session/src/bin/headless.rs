//! Headless classroom participant.
//!
//! Connects to a relay, runs the startup sequence with an in-memory spawner
//! and turns its head in a seeded random walk so replication has traffic.
//!
//! Environment:
//!   CLASSROOM_RELAY_URL  relay WebSocket URL (default: ws://127.0.0.1:9002/ws)
//!   CLASSROOM_CONFIG     optional path to a JSON session config
//!   CLASSROOM_SEED       random walk seed (default: 42)

use classroom_session::clock::{Clock, SystemClock};
use classroom_session::driver::{run_session, SessionCommand};
use classroom_session::events::{EventBus, SessionEvent};
use classroom_session::net::WsTransport;
use classroom_session::orchestrator::SessionOrchestrator;
use classroom_session::spawner::HeadlessSpawner;
use classroom_shared::config::SessionConfig;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:9002/ws";
/// Largest yaw step per walk tick (degrees)
const MAX_YAW_STEP: f64 = 6.0;
/// Head stays within this many degrees of straight ahead
const MAX_YAW: f64 = 60.0;
const MAX_PITCH_STEP: f64 = 3.0;
/// Looking up or down at most this far
const MAX_PITCH: f64 = 30.0;

fn load_config() -> Result<SessionConfig, String> {
    match std::env::var("CLASSROOM_CONFIG") {
        Ok(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| format!("cannot read {}: {}", path, e))?;
            SessionConfig::from_json_str(&text)
        }
        Err(_) => {
            let config = SessionConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid session configuration: {}", e);
            std::process::exit(1);
        }
    };
    let url = std::env::var("CLASSROOM_RELAY_URL").unwrap_or_else(|_| DEFAULT_RELAY_URL.to_string());
    let seed = std::env::var("CLASSROOM_SEED")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(42);

    let events = EventBus::default();
    let mut event_rx = events.subscribe();
    let orchestrator =
        SessionOrchestrator::new(config, WsTransport::connect(url), HeadlessSpawner::new(), events);

    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(64);
    let clock = SystemClock::new();
    let session = tokio::spawn(run_session(orchestrator, clock, cmd_rx));

    let mut viewpoint_ready = false;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut yaw_offset = 0.0_f64;
    let mut pitch = 0.0_f64;
    let mut walk = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Ok(SessionEvent::ViewpointReady(id)) => {
                        tracing::info!("Viewpoint ready for participant {} at t={:.2}", id, clock.now());
                        viewpoint_ready = true;
                    }
                    Ok(SessionEvent::Error(reason)) => tracing::warn!("Session error: {}", reason),
                    Ok(other) => tracing::info!("Session event: {:?}", other),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Event receiver lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            _ = walk.tick(), if viewpoint_ready => {
                yaw_offset = (yaw_offset + rng.gen_range(-MAX_YAW_STEP..=MAX_YAW_STEP))
                    .clamp(-MAX_YAW, MAX_YAW);
                pitch = (pitch + rng.gen_range(-MAX_PITCH_STEP..=MAX_PITCH_STEP))
                    .clamp(-MAX_PITCH, MAX_PITCH);
                let command = SessionCommand::SetHeadAngles {
                    yaw_offset_degrees: yaw_offset,
                    pitch_degrees: pitch,
                };
                if cmd_tx.send(command).await.is_err() {
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping session");
                let _ = cmd_tx.send(SessionCommand::Stop).await;
                break;
            }
        }
    }

    match session.await {
        Ok(orchestrator) => tracing::info!(
            "Session ended in phase {:?} after {} regenerations",
            orchestrator.phase(),
            orchestrator.regeneration_count()
        ),
        Err(e) => tracing::error!("Session task failed: {}", e),
    }
}
