//! Chat room server binary.
//!
//! Loads configuration from the environment, spawns the room actor,
//! and serves the WebSocket endpoint until SIGINT or SIGTERM.

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_room::auth::Authenticator;
use chat_room::config::Config;
use chat_room::room::{PumpConfig, RoomActor};
use chat_room::ws::{build_routes, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_room=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting chat room server");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        room_id = %config.room_id,
        outbound_queue_capacity = config.outbound_queue_capacity,
        max_frame_bytes = config.max_frame_bytes,
        pong_timeout_seconds = config.pong_timeout_seconds,
        "Configuration loaded successfully"
    );

    let shutdown_token = CancellationToken::new();
    let (room, room_task) = RoomActor::spawn(config.room_id.clone(), shutdown_token.clone());

    let state = AppState {
        room,
        auth: Arc::new(Authenticator::new(&config.jwt_secret)),
        pump: PumpConfig::from(&config),
    };
    let app = build_routes(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Chat room server listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The server has stopped accepting connections; stop the room so
    // remaining outbound pumps flush their close frames and exit.
    shutdown_token.cancel();
    room_task.await?;

    info!("Chat room server shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
