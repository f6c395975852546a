//! webcast-relay demo server.
//!
//! Serves the HTTP/WebSocket surface over a [`SimulatedConnector`], which
//! stands in for a real platform client. A `demo` username is pre-seeded so
//! `POST /connect/demo` works out of the box; swap the connector for a real
//! [`LiveConnector`](webcast_connector::LiveConnector) implementation to
//! relay an actual stream.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use webcast_connector::{ChatEvent, LiveUser, RawEvent, RoomScript, SimulatedConnector};
use webcast_server::{routes, AppState};
use webcast_stream::{Broadcaster, RelayConfig, SessionManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(3000);

    let connector = Arc::new(SimulatedConnector::new());
    seed_demo_room(&connector);

    let broadcaster = Arc::new(Broadcaster::new());
    let manager = Arc::new(SessionManager::new(
        Arc::clone(&connector),
        broadcaster,
        RelayConfig::default(),
    ));

    let state = AppState::new(Arc::clone(&manager), port);
    let (addr, server) =
        warp::serve(routes(state)).try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })?;

    tracing::info!(%addr, "webcast-relay server started");
    tracing::info!("subscribe at ws://localhost:{port}/ws, then POST /connect/demo");
    server.await;

    // Tear down any active session before exiting; the teardown's own error
    // is non-fatal.
    if let Some(outcome) = manager.force_shutdown().await {
        tracing::info!(
            username = %outcome.username,
            success = outcome.success,
            "final session teardown"
        );
    }
    tracing::info!("server shutdown complete");
    Ok(())
}

/// Seed a room for the `demo` username with a couple of greeting events.
fn seed_demo_room(connector: &SimulatedConnector) {
    connector.host_script(
        "demo",
        RoomScript {
            room_id: "demo-room-1".into(),
            on_connect: vec![
                RawEvent::Chat(ChatEvent {
                    user: LiveUser::new(1, "greeter"),
                    comment: "welcome to the demo stream".into(),
                    msg_id: Some("demo-1".into()),
                }),
                RawEvent::Chat(ChatEvent {
                    user: LiveUser::new(2, "lurker"),
                    comment: "hello from the relay".into(),
                    msg_id: Some("demo-2".into()),
                }),
            ],
        },
    );
}
