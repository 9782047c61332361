//! Web server and WebSocket logic using axum.
//!
//! A viewer can watch every connection on the server, or narrow the stream
//! to one connection by opening `/ws?connection_id=N`: the socket replays
//! that connection's last known snapshot immediately on connect (so a late
//! viewer isn't stuck waiting for the next state change) and then filters
//! the broadcast stream down to just that connection.

use crate::model::ConnectionSnapshot;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use log::{error, info, trace};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// The shared application state: the broadcast channel fanning snapshots out
/// to every connected WebSocket client, plus the last known snapshot per
/// connection so a newly-opened socket can catch up instantly.
#[derive(Clone)]
pub(super) struct AppState {
    pub(super) snapshot_tx: broadcast::Sender<ConnectionSnapshot>,
    pub(super) last_snapshots: Arc<Mutex<HashMap<u64, ConnectionSnapshot>>>,
}

#[derive(Deserialize)]
struct WatchFilter {
    connection_id: Option<u64>,
}

/// Binds to `addr` and serves the monitor page and its WebSocket endpoint.
pub(super) async fn start_web_server(
    addr: SocketAddr,
    snapshot_tx: broadcast::Sender<ConnectionSnapshot>,
    last_snapshots: Arc<Mutex<HashMap<u64, ConnectionSnapshot>>>,
) {
    let app_state = AppState { snapshot_tx, last_snapshots };

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/ws", get(websocket_handler))
        .with_state(app_state);

    info!("Session monitor listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind monitor web server to {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Monitor web server encountered an error: {}", e);
    }
}

async fn root_handler() -> impl IntoResponse {
    Html(include_str!("web/monitor.html"))
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(filter): Query<WatchFilter>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, filter.connection_id))
}

/// Optionally replays the watched connection's last snapshot, then
/// subscribes to the broadcast channel and forwards each snapshot matching
/// `watched_connection_id` (or every snapshot, if unset) as JSON until the
/// client disconnects.
async fn handle_socket(mut socket: WebSocket, state: AppState, watched_connection_id: Option<u64>) {
    info!("New monitor WebSocket client connected (watching: {:?}).", watched_connection_id);

    if let Some(connection_id) = watched_connection_id {
        let cached = state.last_snapshots.lock().unwrap().get(&connection_id).cloned();
        if let Some(snapshot) = cached {
            if let Ok(json_payload) = serde_json::to_string(&snapshot) {
                if socket.send(Message::Text(json_payload.into())).await.is_err() {
                    info!("Monitor WebSocket client disconnected (send error on replay).");
                    return;
                }
            }
        }
    }

    let mut snapshot_rx = state.snapshot_tx.subscribe();

    loop {
        tokio::select! {
            Ok(snapshot) = snapshot_rx.recv() => {
                if let Some(connection_id) = watched_connection_id {
                    if snapshot.connection_id != connection_id {
                        continue;
                    }
                }
                trace!("Forwarding connection snapshot to WebSocket client.");
                match serde_json::to_string(&snapshot) {
                    Ok(json_payload) => {
                        if socket.send(Message::Text(json_payload.into())).await.is_err() {
                            info!("Monitor WebSocket client disconnected (send error).");
                            break;
                        }
                    }
                    Err(e) => error!("Failed to serialize connection snapshot to JSON: {}", e),
                }
            }
            Some(Ok(msg)) = socket.recv() => {
                if let Message::Close(_) = msg {
                    info!("Monitor WebSocket client disconnected (received close message).");
                    break;
                }
            }
            else => {
                info!("Monitor WebSocket client disconnected (channel closed).");
                break;
            }
        }
    }
}
