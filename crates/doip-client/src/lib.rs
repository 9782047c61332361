//! A minimal DoIP tester client: connect, activate routing, exchange
//! diagnostic messages.
//!
//! Follows the expected operation sequence — UDP discovery, then TCP
//! connect, routing activation, diagnostic exchange, close — with a config
//! struct, `Result`-returning methods, and `read_exact`-then-parse framing.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::time::{Duration, Instant};

use doip_core::{
    ClientConfig, DiagnosticNackCode, DoipAddress, DoipError, Message, PayloadType,
    RoutingActivationResult,
};

/// Timeout applied to the announcement-listening socket during vehicle
/// discovery.
const DISCOVERY_TIMEOUT: Duration = Duration::from_millis(200);

/// A connected, routing-activated DoIP tester session.
pub struct DoipClient {
    stream: TcpStream,
    config: ClientConfig,
    max_message_size: u32,
}

impl DoipClient {
    /// Opens a TCP connection to `config.target_host:target_port` and
    /// performs routing activation, returning a ready-to-use client only on
    /// a `RouteActivated` result.
    pub fn connect(config: ClientConfig) -> Result<Self, DoipError> {
        let addr = format!("{}:{}", config.target_host, config.target_port);
        let stream = TcpStream::connect(&addr).map_err(|_| DoipError::IoError)?;
        stream
            .set_read_timeout(Some(Duration::from_millis(config.routing_activation_timeout_ms)))
            .map_err(|_| DoipError::IoError)?;
        stream.set_nodelay(true).map_err(|_| DoipError::IoError)?;

        let mut client = Self {
            stream,
            config,
            max_message_size: doip_core::message::HARD_MAX_PAYLOAD_LEN,
        };
        client.activate_routing()?;
        Ok(client)
    }

    fn activate_routing(&mut self) -> Result<(), DoipError> {
        let request = Message::make_routing_activation_request(
            self.config.source_address,
            doip_core::RoutingActivationType::Default,
            None,
        );
        self.write_message(&request)?;

        let response = self.read_message()?;
        if response.payload_type() != PayloadType::RoutingActivationResponse {
            return Err(DoipError::InternalError("expected RoutingActivationResponse"));
        }
        let result_byte = response.payload().get(4).copied().ok_or(DoipError::BufferTooShort)?;
        let result = RoutingActivationResult::try_from_u8(result_byte).ok_or(DoipError::InvalidEnumValue)?;
        if result != RoutingActivationResult::RouteActivated
            && result != RoutingActivationResult::RouteActivatedConfirmationRequired
        {
            return Err(DoipError::InternalError("routing activation denied"));
        }
        Ok(())
    }

    /// Sends a diagnostic message to `target_address` and waits for the
    /// matching ack/nack, auto-responding to any `AliveCheckRequest` seen
    /// in the meantime (the server may probe liveness while we wait).
    pub fn send_diagnostic(&mut self, target_address: DoipAddress, payload: &[u8]) -> Result<Vec<u8>, DoipError> {
        let request = Message::make_diagnostic_message(self.config.source_address, target_address, payload);
        self.write_message(&request)?;

        self.stream
            .set_read_timeout(Some(Duration::from_millis(self.config.diagnostic_response_timeout_ms)))
            .map_err(|_| DoipError::IoError)?;

        loop {
            let response = self.read_message()?;
            match response.payload_type() {
                PayloadType::AliveCheckRequest => {
                    let ack = Message::make_alive_check_response(self.config.source_address);
                    self.write_message(&ack)?;
                }
                PayloadType::DiagnosticMessageAck => return Ok(response.diagnostic_payload().to_vec()),
                PayloadType::DiagnosticMessageNegativeAck => {
                    let code = response
                        .diagnostic_payload()
                        .first()
                        .and_then(|&b| DiagnosticNackCode::try_from_u8(b));
                    return Err(DoipError::InternalError(nack_description(code)));
                }
                _ => continue,
            }
        }
    }

    /// Closes the TCP connection. Idempotent at the transport level since
    /// `TcpStream::shutdown` tolerates an already-closed socket.
    pub fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    fn write_message(&mut self, msg: &Message) -> Result<(), DoipError> {
        self.stream.write_all(msg.as_bytes()).map_err(|_| DoipError::IoError)
    }

    fn read_message(&mut self) -> Result<Message, DoipError> {
        let mut header = [0u8; doip_core::message::HEADER_SIZE];
        self.stream.read_exact(&mut header).map_err(|_| DoipError::IoError)?;
        let header_info =
            Message::try_parse_header(&header, self.max_message_size).map_err(DoipError::MalformedHeader)?;

        let mut full = Vec::with_capacity(doip_core::message::HEADER_SIZE + header_info.payload_length as usize);
        full.extend_from_slice(&header);
        let mut payload = vec![0u8; header_info.payload_length as usize];
        if !payload.is_empty() {
            self.stream.read_exact(&mut payload).map_err(|_| DoipError::IoError)?;
        }
        full.extend_from_slice(&payload);

        Message::try_parse(&full, self.max_message_size).map_err(DoipError::MalformedHeader)
    }
}

fn nack_description(code: Option<DiagnosticNackCode>) -> &'static str {
    match code {
        Some(DiagnosticNackCode::InvalidSourceAddress) => "diagnostic nack: invalid source address",
        Some(DiagnosticNackCode::UnknownTargetAddress) => "diagnostic nack: unknown target address",
        Some(DiagnosticNackCode::DiagnosticMessageTooLarge) => "diagnostic nack: message too large",
        Some(DiagnosticNackCode::OutOfMemory) => "diagnostic nack: out of memory",
        Some(DiagnosticNackCode::TargetUnreachable) => "diagnostic nack: target unreachable",
        Some(DiagnosticNackCode::UnknownNetwork) => "diagnostic nack: unknown network",
        Some(DiagnosticNackCode::TransportProtocolError) => "diagnostic nack: transport protocol error",
        Some(DiagnosticNackCode::TargetBusy) => "diagnostic nack: target busy",
        None => "diagnostic nack: unrecognized code",
    }
}

/// Broadcasts a `VehicleIdentificationRequest` and collects every
/// `VehicleIdentificationResponse` that arrives within `listen_for`.
pub fn discover_vehicles(broadcast_port: u16, listen_for: Duration) -> Result<Vec<Message>, DoipError> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).map_err(|_| DoipError::IoError)?;
    socket.set_broadcast(true).map_err(|_| DoipError::IoError)?;
    socket.set_read_timeout(Some(DISCOVERY_TIMEOUT)).map_err(|_| DoipError::IoError)?;

    let destination: SocketAddr = ([255, 255, 255, 255], broadcast_port).into();
    let request = Message::make_vehicle_identification_request();
    socket.send_to(request.as_bytes(), destination).map_err(|_| DoipError::IoError)?;

    let deadline = Instant::now() + listen_for;
    let mut responses = Vec::new();
    let mut buf = [0u8; 64];
    while Instant::now() < deadline {
        match socket.recv_from(&mut buf) {
            Ok((n, _peer)) => {
                if let Ok(header) = Message::try_parse_header(&buf[..n], doip_core::message::HARD_MAX_PAYLOAD_LEN) {
                    if header.payload_type == PayloadType::VehicleIdentificationResponse {
                        if let Ok(msg) = Message::try_parse(&buf[..n], doip_core::message::HARD_MAX_PAYLOAD_LEN) {
                            responses.push(msg);
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                continue;
            }
            Err(_) => break,
        }
    }
    Ok(responses)
}
