//! A web-based session monitor for a running `doip-io-std` server: any
//! application model can push a [`model::ConnectionSnapshot`] over a
//! `crossbeam-channel` whenever its connection's state changes, and this
//! crate bridges those snapshots to every connected WebSocket client.
//!
//! Deliberately decoupled from `doip-io-std` and `doip-core`: this crate
//! takes a plain channel receiver rather than a concrete connection or
//! server type, so a new transport never forces a rewrite here.

pub mod model;
mod server;

use log::{error, info};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use crate::model::ConnectionSnapshot;
use crossbeam_channel::Receiver;
use tokio::sync::broadcast;

/// Default port the session monitor's web UI listens on.
const DEFAULT_MONITOR_PORT: u16 = 3000;
/// Capacity of the broadcast channel fanning snapshots out to WebSocket clients.
const BROADCAST_CHANNEL_CAPACITY: usize = 32;

/// Runs the session monitor to completion: bridges `receiver` (fed by the
/// server's connection threads) into a `tokio::sync::broadcast` channel and
/// serves the web UI and WebSocket endpoint on `port`.
///
/// Intended to run on its own thread/task alongside a server started
/// separately; it owns no part of that server's lifecycle.
pub async fn run(receiver: Receiver<ConnectionSnapshot>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port);
    let (snapshot_tx, _) = broadcast::channel::<ConnectionSnapshot>(BROADCAST_CHANNEL_CAPACITY);
    let last_snapshots: Arc<Mutex<HashMap<u64, ConnectionSnapshot>>> = Arc::new(Mutex::new(HashMap::new()));

    let bridge_tx = snapshot_tx.clone();
    let bridge_last_snapshots = Arc::clone(&last_snapshots);
    tokio::task::spawn_blocking(move || {
        info!("starting connection-snapshot bridge task");
        while let Ok(snapshot) = receiver.recv() {
            bridge_last_snapshots
                .lock()
                .unwrap()
                .insert(snapshot.connection_id, snapshot.clone());
            if let Err(e) = bridge_tx.send(snapshot) {
                error!("failed to broadcast snapshot (no receivers?): {}. stopping bridge", e);
                break;
            }
        }
        info!("connection-snapshot bridge task stopped");
    });

    server::start_web_server(addr, snapshot_tx, last_snapshots).await;
    Ok(())
}

/// Convenience wrapper over [`run`] using [`DEFAULT_MONITOR_PORT`].
pub async fn run_default(receiver: Receiver<ConnectionSnapshot>) -> Result<(), Box<dyn std::error::Error>> {
    run(receiver, DEFAULT_MONITOR_PORT).await
}
