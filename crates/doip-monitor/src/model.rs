//! Data structures passed from a running server's connection threads to the
//! monitor's broadcast task, and serialized to JSON for the web frontend.

use serde::Serialize;

/// A serializable snapshot of one TCP connection's protocol state, pushed by
/// an [`doip_core::ApplicationModel`] implementation whenever it observes a
/// state change worth showing (connection open/close, routing activation,
/// a diagnostic exchange).
#[derive(Serialize, Clone, Debug)]
pub struct ConnectionSnapshot {
    /// Opaque per-connection identifier (e.g. the accept loop's counter).
    pub connection_id: u64,
    /// This entity's logical address on the connection.
    pub server_address: u16,
    /// The tester's source address, once routing activation succeeds.
    pub client_address: Option<u16>,
    /// Human-readable current protocol state (`ServerState`'s `Debug` form).
    pub state: String,
    /// Short description of the most recent event processed.
    pub last_event: String,
    /// Total diagnostic messages acknowledged on this connection so far.
    pub diagnostic_count: u64,
    /// `true` once the connection is closed; carries the close reason.
    pub closed: bool,
    pub close_reason: Option<String>,
}

impl ConnectionSnapshot {
    pub fn opened(connection_id: u64, server_address: u16) -> Self {
        Self {
            connection_id,
            server_address,
            client_address: None,
            state: String::from("WaitRoutingActivation"),
            last_event: String::from("connection opened"),
            diagnostic_count: 0,
            closed: false,
            close_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opened_snapshot_serializes_with_null_client_address() {
        let snapshot = ConnectionSnapshot::opened(1, 0x0E80);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"client_address\":null"));
        assert!(json.contains("\"server_address\":3712"));
    }
}
