use axum::routing::get;
use axum::Router;
use classroom_relay::config::RelayConfig;
use classroom_relay::room::{run_room_loop, RoomBroadcast, RoomCommand};
use classroom_relay::ws::{ws_handler, AppState};
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = RelayConfig::from_env();

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid relay configuration: {}", e);
        std::process::exit(1);
    }

    let listen_addr = config.listen_addr.clone();

    let (room_tx, room_rx) = mpsc::channel::<RoomCommand>(256);
    let (broadcast_tx, _) = broadcast::channel::<RoomBroadcast>(256);

    tokio::spawn(async move {
        run_room_loop(room_rx, broadcast_tx, config).await;
    });

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(AppState { room_tx });

    tracing::info!("Starting classroom relay on {}", listen_addr);

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Cannot listen on {}: {}", listen_addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Relay stopped: {}", e);
    }
}
