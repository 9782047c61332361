//! DoIP address and closed enumerations.

use core::fmt;

/// A 16-bit DoIP logical address. `0x0000` is reserved ("no address").
pub type DoipAddress = u16;

/// Lower bound of the valid external-tester source address range.
pub const SOURCE_ADDRESS_MIN: DoipAddress = 0xE000;
/// Upper bound (inclusive) of the valid external-tester source address range.
pub const SOURCE_ADDRESS_MAX: DoipAddress = 0xE3FF;

/// `true` if `addr` is a valid external-tester source address.
pub fn is_valid_source_address(addr: DoipAddress) -> bool {
    (SOURCE_ADDRESS_MIN..=SOURCE_ADDRESS_MAX).contains(&addr)
}

/// Closed payload-type enumeration (ISO 13400-2 Table 17).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PayloadType {
    NegativeAck = 0x0000,
    VehicleIdentificationRequest = 0x0001,
    VehicleIdentificationRequestWithEid = 0x0002,
    VehicleIdentificationRequestWithVin = 0x0003,
    VehicleIdentificationResponse = 0x0004,
    RoutingActivationRequest = 0x0005,
    RoutingActivationResponse = 0x0006,
    AliveCheckRequest = 0x0007,
    AliveCheckResponse = 0x0008,
    EntityStatusRequest = 0x4001,
    EntityStatusResponse = 0x4002,
    DiagnosticPowerModeRequest = 0x4003,
    DiagnosticPowerModeResponse = 0x4004,
    DiagnosticMessage = 0x8001,
    DiagnosticMessageAck = 0x8002,
    DiagnosticMessageNegativeAck = 0x8003,
    PeriodicDiagnosticMessage = 0x8008,
}

impl PayloadType {
    /// Parses the wire value, rejecting anything outside the closed enum
    /// with `UnknownPayloadType`.
    pub fn try_from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0x0000 => Self::NegativeAck,
            0x0001 => Self::VehicleIdentificationRequest,
            0x0002 => Self::VehicleIdentificationRequestWithEid,
            0x0003 => Self::VehicleIdentificationRequestWithVin,
            0x0004 => Self::VehicleIdentificationResponse,
            0x0005 => Self::RoutingActivationRequest,
            0x0006 => Self::RoutingActivationResponse,
            0x0007 => Self::AliveCheckRequest,
            0x0008 => Self::AliveCheckResponse,
            0x4001 => Self::EntityStatusRequest,
            0x4002 => Self::EntityStatusResponse,
            0x4003 => Self::DiagnosticPowerModeRequest,
            0x4004 => Self::DiagnosticPowerModeResponse,
            0x8001 => Self::DiagnosticMessage,
            0x8002 => Self::DiagnosticMessageAck,
            0x8003 => Self::DiagnosticMessageNegativeAck,
            0x8008 => Self::PeriodicDiagnosticMessage,
            _ => return None,
        })
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// `true` for payload types that carry a source/target address pair.
    pub fn carries_addresses(self) -> bool {
        matches!(
            self,
            Self::DiagnosticMessage | Self::DiagnosticMessageAck | Self::DiagnosticMessageNegativeAck
        )
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Negative acknowledgement codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NackCode {
    IncorrectPatternFormat = 0,
    UnknownPayloadType = 1,
    MessageTooLarge = 2,
    OutOfMemory = 3,
    InvalidPayloadLength = 4,
}

impl NackCode {
    pub fn try_from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::IncorrectPatternFormat,
            1 => Self::UnknownPayloadType,
            2 => Self::MessageTooLarge,
            3 => Self::OutOfMemory,
            4 => Self::InvalidPayloadLength,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for NackCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Diagnostic-message NACK codes, carried in `DiagnosticMessageNegativeAck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiagnosticNackCode {
    InvalidSourceAddress = 2,
    UnknownTargetAddress = 3,
    DiagnosticMessageTooLarge = 4,
    OutOfMemory = 5,
    TargetUnreachable = 6,
    UnknownNetwork = 7,
    TransportProtocolError = 8,
    TargetBusy = 9,
}

impl DiagnosticNackCode {
    pub fn try_from_u8(value: u8) -> Option<Self> {
        Some(match value {
            2 => Self::InvalidSourceAddress,
            3 => Self::UnknownTargetAddress,
            4 => Self::DiagnosticMessageTooLarge,
            5 => Self::OutOfMemory,
            6 => Self::TargetUnreachable,
            7 => Self::UnknownNetwork,
            8 => Self::TransportProtocolError,
            9 => Self::TargetBusy,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for DiagnosticNackCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Routing-activation result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RoutingActivationResult {
    UnknownSourceAddress = 0x00,
    NoMoreRoutingSlotsAvailable = 0x01,
    InvalidAddressOrRoutingType = 0x02,
    SourceAddressAlreadyRegistered = 0x03,
    Unauthorized = 0x04,
    MissingConfirmation = 0x05,
    InvalidRoutingType = 0x06,
    SecuredConnectionRequired = 0x07,
    VehicleNotReadyForRouting = 0x08,
    RouteActivated = 0x10,
    RouteActivatedConfirmationRequired = 0x11,
}

impl RoutingActivationResult {
    pub fn try_from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::UnknownSourceAddress,
            0x01 => Self::NoMoreRoutingSlotsAvailable,
            0x02 => Self::InvalidAddressOrRoutingType,
            0x03 => Self::SourceAddressAlreadyRegistered,
            0x04 => Self::Unauthorized,
            0x05 => Self::MissingConfirmation,
            0x06 => Self::InvalidRoutingType,
            0x07 => Self::SecuredConnectionRequired,
            0x08 => Self::VehicleNotReadyForRouting,
            0x10 => Self::RouteActivated,
            0x11 => Self::RouteActivatedConfirmationRequired,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// `true` if the server must close the TCP connection after sending
    /// this result code.
    pub fn closes_connection(self) -> bool {
        matches!(
            self,
            Self::UnknownSourceAddress
                | Self::NoMoreRoutingSlotsAvailable
                | Self::SourceAddressAlreadyRegistered
                | Self::MissingConfirmation
                | Self::InvalidRoutingType
                | Self::SecuredConnectionRequired
        )
    }
}

impl fmt::Display for RoutingActivationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Routing activation type requested by the tester (spec is Default and
/// DiagnosticCommRequired only; other ISO values are a Non-goal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RoutingActivationType {
    Default = 0x00,
    DiagnosticCommRequired = 0x01,
}

impl RoutingActivationType {
    pub fn try_from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::Default,
            0x01 => Self::DiagnosticCommRequired,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_validity() {
        assert!(is_valid_source_address(0xE000));
        assert!(is_valid_source_address(0xE3FF));
        assert!(is_valid_source_address(0xE180));
        assert!(!is_valid_source_address(0xDFFF));
        assert!(!is_valid_source_address(0xE400));
        assert!(!is_valid_source_address(0x0000));
    }

    #[test]
    fn payload_type_closed_enum_rejects_unknown() {
        assert!(PayloadType::try_from_u16(0x8001).is_some());
        assert!(PayloadType::try_from_u16(0xFFFF).is_none());
    }

    #[test]
    fn routing_activation_close_policy() {
        assert!(RoutingActivationResult::UnknownSourceAddress.closes_connection());
        assert!(RoutingActivationResult::SourceAddressAlreadyRegistered.closes_connection());
        assert!(!RoutingActivationResult::RouteActivated.closes_connection());
        assert!(!RoutingActivationResult::VehicleNotReadyForRouting.closes_connection());
    }
}
