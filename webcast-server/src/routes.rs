//! HTTP route layer over the relay engine.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use webcast_connector::LiveConnector;
use webcast_stream::{RelayError, SessionManager};

use crate::ws::subscriber_connected;

/// Shared state handed to every route handler.
pub struct AppState<C: LiveConnector> {
    /// The session manager (and, through it, the broadcaster)
    pub manager: Arc<SessionManager<C>>,
    /// The port the server listens on (reported by `/status`)
    pub port: u16,
    /// Server start time, for uptime reporting
    pub started_at: Instant,
}

impl<C: LiveConnector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            port: self.port,
            started_at: self.started_at,
        }
    }
}

impl<C: LiveConnector> AppState<C> {
    /// Create the state for a server listening on `port`.
    pub fn new(manager: Arc<SessionManager<C>>, port: u16) -> Self {
        Self {
            manager,
            port,
            started_at: Instant::now(),
        }
    }
}

fn with_state<C: LiveConnector>(
    state: AppState<C>,
) -> impl Filter<Extract = (AppState<C>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Build the full route tree.
pub fn routes<C: LiveConnector>(
    state: AppState<C>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(health_handler);

    let probe = warp::path!("test" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(probe_handler);

    let connect = warp::path!("connect" / String)
        .and(warp::post())
        .and(with_state(state.clone()))
        .and_then(connect_handler);

    let disconnect = warp::path!("connect" / String)
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and_then(disconnect_handler);

    let status = warp::path!("status")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(status_handler);

    let status_scoped = warp::path!("status" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(status_scoped_handler);

    let shutdown = warp::path!("shutdown")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and_then(shutdown_handler);

    let websocket = warp::path!("ws")
        .and(warp::ws())
        .and(with_state(state))
        .map(|ws: warp::ws::Ws, state: AppState<C>| {
            let broadcaster = Arc::clone(state.manager.broadcaster());
            ws.on_upgrade(move |socket| subscriber_connected(socket, broadcaster))
        });

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "DELETE"]);

    health
        .or(probe)
        .or(connect)
        .or(disconnect)
        .or(status)
        .or(status_scoped)
        .or(shutdown)
        .or(websocket)
        .with(cors)
}

async fn health_handler<C: LiveConnector>(
    state: AppState<C>,
) -> Result<impl Reply, Infallible> {
    let status = state.manager.status();
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({
            "status": "ok",
            "timestamp": Utc::now(),
            "currentUser": status.username,
            "isConnected": status.is_connected(),
            "processedMessages": status.dedup_entries,
        })),
        StatusCode::OK,
    ))
}

async fn probe_handler<C: LiveConnector>(
    username: String,
    state: AppState<C>,
) -> Result<impl Reply, Infallible> {
    tracing::info!(username, "probing username");
    match state.manager.probe(&username).await {
        Ok(room_id) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({
                "success": true,
                "username": username,
                "roomId": room_id,
                "isLive": true,
                "timestamp": Utc::now(),
            })),
            StatusCode::OK,
        )),
        Err(error) => {
            tracing::warn!(username, %error, "probe failed");
            Ok(warp::reply::with_status(
                warp::reply::json(&json!({
                    "success": false,
                    "username": username,
                    "error": error.to_string(),
                    "timestamp": Utc::now(),
                })),
                StatusCode::BAD_REQUEST,
            ))
        }
    }
}

async fn connect_handler<C: LiveConnector>(
    username: String,
    state: AppState<C>,
) -> Result<impl Reply, Infallible> {
    tracing::info!(username, "connect requested");
    match state.manager.connect(&username).await {
        Ok(room_id) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({
                "success": true,
                "username": username,
                "roomId": room_id,
                "message": "Connected successfully",
                "timestamp": Utc::now(),
            })),
            StatusCode::OK,
        )),
        Err(error) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({
                "success": false,
                "username": username,
                "error": error.to_string(),
                "suggestions": error.suggestions(),
                "timestamp": Utc::now(),
            })),
            StatusCode::INTERNAL_SERVER_ERROR,
        )),
    }
}

async fn disconnect_handler<C: LiveConnector>(
    username: String,
    state: AppState<C>,
) -> Result<impl Reply, Infallible> {
    tracing::info!(username, "disconnect requested");
    let reply = match state.manager.disconnect(&username).await {
        Ok(()) => warp::reply::with_status(
            warp::reply::json(&json!({
                "success": true,
                "username": username,
                "message": "Disconnected successfully",
                "timestamp": Utc::now(),
            })),
            StatusCode::OK,
        ),
        Err(RelayError::Conflict { requested, active }) => warp::reply::with_status(
            warp::reply::json(&json!({
                "success": false,
                "requestedUser": requested,
                "currentUser": active,
                "error": "Different user is currently connected",
                "timestamp": Utc::now(),
            })),
            StatusCode::BAD_REQUEST,
        ),
        Err(RelayError::NotFound { .. }) => warp::reply::with_status(
            warp::reply::json(&json!({
                "success": false,
                "username": username,
                "error": "No connection found",
                "timestamp": Utc::now(),
            })),
            StatusCode::NOT_FOUND,
        ),
        Err(error) => warp::reply::with_status(
            warp::reply::json(&json!({
                "success": false,
                "username": username,
                "error": error.to_string(),
                "timestamp": Utc::now(),
            })),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    };
    Ok(reply)
}

async fn status_handler<C: LiveConnector>(
    state: AppState<C>,
) -> Result<impl Reply, Infallible> {
    let status = state.manager.status();
    let current = status.username.as_ref().map(|username| {
        json!({
            "username": username,
            "isConnected": status.is_connected(),
            "processedMessages": status.dedup_entries,
        })
    });
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({
            "server": {
                "port": state.port,
                "uptime": state.started_at.elapsed().as_secs(),
                "timestamp": Utc::now(),
            },
            "currentConnection": current,
            "singleUserMode": true,
        })),
        StatusCode::OK,
    ))
}

async fn status_scoped_handler<C: LiveConnector>(
    username: String,
    state: AppState<C>,
) -> Result<impl Reply, Infallible> {
    let reply = match state.manager.status_for(&username) {
        Ok(status) => warp::reply::with_status(
            warp::reply::json(&json!({
                "username": username,
                "isConnected": status.is_connected(),
                "processedMessages": status.dedup_entries,
                "timestamp": Utc::now(),
            })),
            StatusCode::OK,
        ),
        Err(RelayError::NotFound { active, .. }) => warp::reply::with_status(
            warp::reply::json(&json!({
                "username": username,
                "error": "User not currently connected",
                "currentUser": active,
                "timestamp": Utc::now(),
            })),
            StatusCode::NOT_FOUND,
        ),
        Err(error) => warp::reply::with_status(
            warp::reply::json(&json!({
                "username": username,
                "error": error.to_string(),
                "timestamp": Utc::now(),
            })),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    };
    Ok(reply)
}

async fn shutdown_handler<C: LiveConnector>(
    state: AppState<C>,
) -> Result<impl Reply, Infallible> {
    tracing::info!("force shutdown requested");
    let results: Vec<_> = state.manager.force_shutdown().await.into_iter().collect();
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({
            "success": true,
            "message": "Server shutdown completed",
            "results": results,
            "timestamp": Utc::now(),
        })),
        StatusCode::OK,
    ))
}
