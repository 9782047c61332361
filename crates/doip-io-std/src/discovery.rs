//! UDP vehicle discovery and announcement.
//!
//! Two independent sockets: one bound to the discovery port answering
//! unicast `VehicleIdentification*` requests, the other sending the
//! unsolicited announcement burst a newly started entity owes the network.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use doip_core::{DoipAddress, Message, PayloadType, ServerConfig};

const RECV_BUF_LEN: usize = 64;

fn vehicle_announcement(config: &ServerConfig) -> Message {
    Message::make_vehicle_identification_response(
        &config.vin,
        config.logical_address,
        &config.eid,
        &config.gid,
        config.further_action_required,
        None,
    )
}

/// Runs the discovery listener loop until `running` is cleared: replies to
/// any `VehicleIdentificationRequest*` datagram with this entity's
/// `VehicleIdentificationResponse`, unicast back to the sender.
pub fn run_listener(socket: UdpSocket, config: ServerConfig, running: Arc<AtomicBool>) {
    let _ = socket.set_read_timeout(Some(Duration::from_millis(200)));
    let response = vehicle_announcement(&config);
    let mut buf = [0u8; RECV_BUF_LEN];

    while running.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((n, peer)) => {
                if is_vehicle_identification_request(&buf[..n], config.max_message_size) {
                    let _ = socket.send_to(response.as_bytes(), peer);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                continue;
            }
            Err(_) => break,
        }
    }
}

fn is_vehicle_identification_request(bytes: &[u8], max_payload_len: u32) -> bool {
    matches!(
        Message::try_parse_header(bytes, max_payload_len).map(|h| h.payload_type),
        Ok(
            PayloadType::VehicleIdentificationRequest
                | PayloadType::VehicleIdentificationRequestWithEid
                | PayloadType::VehicleIdentificationRequestWithVin
        )
    )
}

/// Sends `announce_count` copies of the `VehicleIdentificationResponse`,
/// `announce_interval_ms` apart, to the broadcast address (or `127.0.0.1`
/// when `config.loopback` is set, for local testing without a broadcast
/// domain).
pub fn run_announcer(socket: UdpSocket, config: ServerConfig) {
    let response = vehicle_announcement(&config);
    let destination: SocketAddr = if config.loopback {
        ([127, 0, 0, 1], config.port).into()
    } else {
        ([255, 255, 255, 255], config.port).into()
    };
    let _ = socket.set_broadcast(!config.loopback);

    for i in 0..config.announce_count {
        let _ = socket.send_to(response.as_bytes(), destination);
        if i + 1 < config.announce_count {
            std::thread::sleep(Duration::from_millis(config.announce_interval_ms));
        }
    }
}

/// Spawns the listener and announcer threads, returning their join handles.
/// `running` is shared with the listener so [`super::server`] can signal
/// shutdown by clearing it and letting its next poll tick observe that.
pub fn spawn(
    listener_socket: UdpSocket,
    announcer_socket: UdpSocket,
    config: ServerConfig,
    running: Arc<AtomicBool>,
) -> (JoinHandle<()>, JoinHandle<()>) {
    let announce_config = config.clone();
    let listener = std::thread::spawn(move || run_listener(listener_socket, config, running));
    let announcer = std::thread::spawn(move || run_announcer(announcer_socket, announce_config));
    (listener, announcer)
}

/// Address to identify this entity by: used by a server's own source
/// address filter when it wants to ignore its own broadcast announcements
/// arriving on a shared loopback socket during local testing.
pub fn is_own_logical_address(config: &ServerConfig, address: DoipAddress) -> bool {
    config.logical_address == address
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_announcement_is_well_formed() {
        let config = ServerConfig::builder().vin("1HGBH41JXMN109186").build();
        let msg = vehicle_announcement(&config);
        assert_eq!(msg.payload_type(), PayloadType::VehicleIdentificationResponse);
    }

    #[test]
    fn request_detection_accepts_all_three_request_variants() {
        let config = ServerConfig::default();
        let plain = Message::make_vehicle_identification_request();
        assert!(is_vehicle_identification_request(
            plain.as_bytes(),
            config.max_message_size
        ));
    }
}
