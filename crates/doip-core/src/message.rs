//! DoIP message codec: header framing, payload construction, parsing, and
//! named factory constructors.

use alloc::vec::Vec;

use crate::address::{
    is_valid_source_address, DoipAddress, NackCode, PayloadType, RoutingActivationResult,
    RoutingActivationType,
};
use crate::bytes::{push_u16_be, push_u32_be, read_u16_be, read_u32_be};
use crate::identifiers::{DoipEid, DoipGid, DoipVin};

/// Size of the fixed DoIP header, in bytes.
pub const HEADER_SIZE: usize = 8;

/// Currently preferred protocol version (Table 16 in ISO 13400-2:2019/Amd1).
pub const PROTOCOL_VERSION: u8 = 0x04;
/// Oldest protocol version this codec still accepts on receive.
const PROTOCOL_VERSION_MIN: u8 = 0x01;
/// Newest protocol version this codec accepts on receive.
const PROTOCOL_VERSION_MAX: u8 = 0x04;

/// Practical cap on payload length regardless of configuration.
pub const HARD_MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

/// A parsed DoIP header's fixed fields, produced by [`try_parse_header`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
    pub payload_type: PayloadType,
    pub payload_length: u32,
}

/// A complete DoIP message: 8-byte header followed by its payload, stored
/// as one contiguous owned buffer so the send path never re-copies it.
///
/// Messages are immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    data: Vec<u8>,
}

impl Message {
    /// Builds a message of the given payload type and bytes. Always
    /// succeeds — length validity is enforced only on parse.
    pub fn build(payload_type: PayloadType, payload: &[u8]) -> Self {
        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len());
        data.push(PROTOCOL_VERSION);
        data.push(!PROTOCOL_VERSION);
        push_u16_be(&mut data, payload_type.as_u16());
        push_u32_be(&mut data, payload.len() as u32);
        data.extend_from_slice(payload);
        Self { data }
    }

    /// Inspects the first 8 bytes, validating in ISO-mandated order:
    /// length, version/complement, enum membership, per-type length rule,
    /// then the configured size cap.
    pub fn try_parse_header(bytes: &[u8], max_payload_len: u32) -> Result<HeaderInfo, NackCode> {
        if bytes.len() < HEADER_SIZE {
            return Err(NackCode::InvalidPayloadLength);
        }

        let version = bytes[0];
        let inverse = bytes[1];
        if !(PROTOCOL_VERSION_MIN..=PROTOCOL_VERSION_MAX).contains(&version)
            || inverse != !version
        {
            return Err(NackCode::IncorrectPatternFormat);
        }

        let type_value = read_u16_be(bytes, 2).ok_or(NackCode::InvalidPayloadLength)?;
        let payload_type =
            PayloadType::try_from_u16(type_value).ok_or(NackCode::UnknownPayloadType)?;

        let payload_length = read_u32_be(bytes, 4).ok_or(NackCode::InvalidPayloadLength)?;

        if !length_is_plausible(payload_type, payload_length) {
            return Err(NackCode::InvalidPayloadLength);
        }

        if payload_length > max_payload_len.min(HARD_MAX_PAYLOAD_LEN) {
            return Err(NackCode::MessageTooLarge);
        }

        Ok(HeaderInfo {
            payload_type,
            payload_length,
        })
    }

    /// Parses a complete message out of `bytes`. Requires
    /// `bytes.len() >= 8 + payload_length`; any excess bytes are left
    /// untouched by this call (framing consumes exactly one message).
    pub fn try_parse(bytes: &[u8], max_payload_len: u32) -> Result<Self, NackCode> {
        let header = Self::try_parse_header(bytes, max_payload_len)?;
        let total = HEADER_SIZE + header.payload_length as usize;
        if bytes.len() < total {
            return Err(NackCode::InvalidPayloadLength);
        }
        Ok(Self {
            data: bytes[..total].to_vec(),
        })
    }

    /// The complete frame (header + payload), borrowed.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn payload_type(&self) -> PayloadType {
        let value = read_u16_be(&self.data, 2).unwrap_or(0);
        PayloadType::try_from_u16(value).expect("constructed from a valid PayloadType")
    }

    /// The payload, without the 8-byte header.
    pub fn payload(&self) -> &[u8] {
        &self.data[HEADER_SIZE..]
    }

    /// The diagnostic payload proper, past the SA/TA fields, for the three
    /// diagnostic-message payload types. Empty slice for anything shorter.
    pub fn diagnostic_payload(&self) -> &[u8] {
        let offset = HEADER_SIZE + 4;
        if self.data.len() <= offset {
            &[]
        } else {
            &self.data[offset..]
        }
    }

    /// Source address, for payload types that carry one.
    pub fn source_address(&self) -> Option<DoipAddress> {
        if self.payload_type().carries_addresses() || self.payload_type() == PayloadType::AliveCheckResponse
        {
            read_u16_be(&self.data, HEADER_SIZE)
        } else {
            None
        }
    }

    /// Target address, for payload types that carry one.
    pub fn target_address(&self) -> Option<DoipAddress> {
        if self.payload_type().carries_addresses() {
            read_u16_be(&self.data, HEADER_SIZE + 2)
        } else {
            None
        }
    }

    // --- Factory constructors ---

    pub fn make_vehicle_identification_request() -> Self {
        Self::build(PayloadType::VehicleIdentificationRequest, &[])
    }

    pub fn make_vehicle_identification_response(
        vin: &DoipVin,
        logical_address: DoipAddress,
        eid: &DoipEid,
        gid: &DoipGid,
        further_action_required: u8,
        sync_status: Option<u8>,
    ) -> Self {
        let mut payload = Vec::with_capacity(33);
        payload.extend_from_slice(vin.as_bytes());
        push_u16_be(&mut payload, logical_address);
        payload.extend_from_slice(eid.as_bytes());
        payload.extend_from_slice(gid.as_bytes());
        payload.push(further_action_required);
        if let Some(sync) = sync_status {
            payload.push(sync);
        }
        Self::build(PayloadType::VehicleIdentificationResponse, &payload)
    }

    pub fn make_routing_activation_request(
        source_address: DoipAddress,
        activation_type: RoutingActivationType,
        oem_specific: Option<[u8; 4]>,
    ) -> Self {
        let mut payload = Vec::with_capacity(11);
        push_u16_be(&mut payload, source_address);
        payload.push(activation_type.as_u8());
        payload.extend_from_slice(&[0u8; 4]);
        if let Some(oem) = oem_specific {
            payload.extend_from_slice(&oem);
        }
        Self::build(PayloadType::RoutingActivationRequest, &payload)
    }

    /// Echoes the request's source address as the client address, then
    /// writes the entity address, result code, and 4 reserved zero bytes.
    pub fn make_routing_activation_response(
        request: &Message,
        entity_address: DoipAddress,
        result: RoutingActivationResult,
    ) -> Self {
        let client_address = request.source_address_field().unwrap_or(0);
        let mut payload = Vec::with_capacity(9);
        push_u16_be(&mut payload, client_address);
        push_u16_be(&mut payload, entity_address);
        payload.push(result.as_u8());
        payload.extend_from_slice(&[0u8; 4]);
        Self::build(PayloadType::RoutingActivationResponse, &payload)
    }

    /// Reads the raw first 16-bit field of a routing-activation-request
    /// payload (its source address), regardless of `payload_type`'s usual
    /// address accessors (routing activation doesn't carry a target address).
    fn source_address_field(&self) -> Option<DoipAddress> {
        read_u16_be(&self.data, HEADER_SIZE)
    }

    /// The requesting client's source address out of a
    /// `RoutingActivationRequest` payload. `None` for any other payload type.
    pub fn routing_activation_source_address(&self) -> Option<DoipAddress> {
        if self.payload_type() == PayloadType::RoutingActivationRequest {
            self.source_address_field()
        } else {
            None
        }
    }

    pub fn make_alive_check_request() -> Self {
        Self::build(PayloadType::AliveCheckRequest, &[])
    }

    pub fn make_alive_check_response(source_address: DoipAddress) -> Self {
        let mut payload = Vec::with_capacity(2);
        push_u16_be(&mut payload, source_address);
        Self::build(PayloadType::AliveCheckResponse, &payload)
    }

    pub fn make_diagnostic_message(sa: DoipAddress, ta: DoipAddress, payload: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(4 + payload.len());
        push_u16_be(&mut buf, sa);
        push_u16_be(&mut buf, ta);
        buf.extend_from_slice(payload);
        Self::build(PayloadType::DiagnosticMessage, &buf)
    }

    pub fn make_diagnostic_message_ack(sa: DoipAddress, ta: DoipAddress, payload: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(4 + payload.len());
        push_u16_be(&mut buf, sa);
        push_u16_be(&mut buf, ta);
        buf.extend_from_slice(payload);
        Self::build(PayloadType::DiagnosticMessageAck, &buf)
    }

    pub fn make_diagnostic_message_nack(
        sa: DoipAddress,
        ta: DoipAddress,
        nack_code: u8,
        echoed_payload: &[u8],
    ) -> Self {
        let mut buf = Vec::with_capacity(5 + echoed_payload.len());
        push_u16_be(&mut buf, sa);
        push_u16_be(&mut buf, ta);
        buf.push(nack_code);
        buf.extend_from_slice(echoed_payload);
        Self::build(PayloadType::DiagnosticMessageNegativeAck, &buf)
    }

    pub fn make_negative_ack(code: NackCode) -> Self {
        Self::build(PayloadType::NegativeAck, &[code.as_u8()])
    }
}

/// Per-payload-type length rule.
fn length_is_plausible(payload_type: PayloadType, len: u32) -> bool {
    match payload_type {
        PayloadType::VehicleIdentificationRequest
        | PayloadType::VehicleIdentificationRequestWithEid
        | PayloadType::VehicleIdentificationRequestWithVin
        | PayloadType::AliveCheckRequest
        | PayloadType::EntityStatusRequest
        | PayloadType::DiagnosticPowerModeRequest => len == 0,
        PayloadType::VehicleIdentificationResponse => len == 32 || len == 33,
        PayloadType::RoutingActivationRequest => len == 7 || len == 11,
        PayloadType::RoutingActivationResponse => len == 9 || len == 13,
        PayloadType::AliveCheckResponse => len == 2,
        PayloadType::DiagnosticMessage
        | PayloadType::DiagnosticMessageAck
        | PayloadType::DiagnosticMessageNegativeAck => len >= 5,
        PayloadType::NegativeAck => len == 1,
        // Entity status / diagnostic power mode responses and periodic
        // diagnostic messages have no length constraint in the core spec;
        // any length is accepted and left to the application layer.
        PayloadType::EntityStatusResponse
        | PayloadType::DiagnosticPowerModeResponse
        | PayloadType::PeriodicDiagnosticMessage => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_payload_round_trips() {
        let payload = [1u8, 2, 3, 4, 5];
        let msg = Message::build(PayloadType::DiagnosticMessage, &payload);
        assert_eq!(msg.payload(), &payload);
        assert_eq!(msg.payload_type(), PayloadType::DiagnosticMessage);
    }

    #[test]
    fn header_invariant_holds() {
        let msg = Message::build(PayloadType::AliveCheckRequest, &[]);
        let bytes = msg.as_bytes();
        assert_eq!(bytes[0] + bytes[1], 0xFF);
        assert_eq!(bytes.len(), HEADER_SIZE + read_u32_be(bytes, 4).unwrap() as usize);
    }

    #[test]
    fn parse_of_built_message_is_identity() {
        let msg = Message::make_diagnostic_message(0xE000, 0x0E80, &[0x3E]);
        let parsed = Message::try_parse(msg.as_bytes(), HARD_MAX_PAYLOAD_LEN).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn header_too_short_is_invalid_length_regardless_of_content() {
        let bytes = [0xAAu8; 7];
        assert_eq!(
            Message::try_parse_header(&bytes, HARD_MAX_PAYLOAD_LEN),
            Err(NackCode::InvalidPayloadLength)
        );
    }

    #[test]
    fn wrong_complement_is_incorrect_pattern() {
        let bytes = [0x04, 0xFC, 0x00, 0x07, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            Message::try_parse_header(&bytes, HARD_MAX_PAYLOAD_LEN),
            Err(NackCode::IncorrectPatternFormat)
        );
    }

    #[test]
    fn unknown_payload_type_rejected() {
        let bytes = [0x04, 0xFB, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            Message::try_parse_header(&bytes, HARD_MAX_PAYLOAD_LEN),
            Err(NackCode::UnknownPayloadType)
        );
    }

    #[test]
    fn oversize_message_rejected() {
        let bytes = [0x04, 0xFB, 0x80, 0x01, 0x00, 0x10, 0x00, 0x00];
        assert_eq!(
            Message::try_parse_header(&bytes, 1024),
            Err(NackCode::MessageTooLarge)
        );
    }

    #[test]
    fn routing_activation_response_matches_scenario() {
        let request = Message::make_routing_activation_request(
            0xE000,
            RoutingActivationType::Default,
            None,
        );
        let response = Message::make_routing_activation_response(
            &request,
            0x0E80,
            RoutingActivationResult::RouteActivated,
        );
        assert_eq!(
            response.as_bytes(),
            &[
                0x04, 0xFB, 0x00, 0x06, 0x00, 0x00, 0x00, 0x09, 0xE0, 0x00, 0x0E, 0x80, 0x10,
                0x00, 0x00, 0x00, 0x00
            ]
        );
    }

    #[test]
    fn diagnostic_ack_matches_scenario() {
        let msg = Message::make_diagnostic_message_ack(0xE000, 0x0E80, &[0x00]);
        assert_eq!(
            msg.as_bytes(),
            &[0x04, 0xFB, 0x80, 0x02, 0x00, 0x00, 0x00, 0x05, 0xE0, 0x00, 0x0E, 0x80, 0x00]
        );
    }

    #[test]
    fn diagnostic_nack_matches_scenario() {
        let msg = Message::make_diagnostic_message_nack(0xE000, 0x1234, 0x03, &[0x3E]);
        assert_eq!(
            msg.as_bytes(),
            &[0x04, 0xFB, 0x80, 0x03, 0x00, 0x00, 0x00, 0x06, 0xE0, 0x00, 0x12, 0x34, 0x03, 0x3E]
        );
    }

    #[test]
    fn vehicle_identification_response_matches_scenario() {
        let vin = DoipVin::new("1HGBH41JXMN109186");
        let eid = DoipEid::new(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let gid = DoipGid::new(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        let msg = Message::make_vehicle_identification_response(&vin, 0x0E80, &eid, &gid, 0x00, None);
        let bytes = msg.as_bytes();
        assert_eq!(&bytes[0..8], &[0x04, 0xFB, 0x00, 0x04, 0x00, 0x00, 0x00, 0x21]);
        assert_eq!(&bytes[8..25], vin.as_bytes());
        assert_eq!(&bytes[25..27], &[0x0E, 0x80]);
        assert_eq!(&bytes[27..33], eid.as_bytes());
        assert_eq!(&bytes[33..39], gid.as_bytes());
        assert_eq!(bytes[39], 0x00);
    }

    #[test]
    fn accessors_return_none_for_non_addressed_types() {
        let msg = Message::make_vehicle_identification_request();
        assert_eq!(msg.source_address(), None);
        assert_eq!(msg.target_address(), None);
    }
}
