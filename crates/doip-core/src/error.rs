//! Error taxonomy for the DoIP core.
//!
//! A single closed enum, `Display` implemented by hand, `std::error::Error`
//! only under the `std` feature, and narrow `From` conversions at the
//! seams that need them.

use core::fmt;

use crate::address::NackCode;

/// A portable, descriptive error type for the DoIP stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoipError {
    /// The supplied buffer was too short for the operation being attempted.
    BufferTooShort,
    /// An underlying I/O error occurred (read/write/socket failure).
    IoError,
    /// The header failed to parse; carries the specific NACK kind the
    /// codec determined applies.
    MalformedHeader(NackCode),
    /// The payload length did not match the type's length rule.
    InvalidPayloadLength,
    /// The message exceeded the configured maximum size.
    MessageTooLarge,
    /// The payload type byte did not match any known `PayloadType`.
    UnknownPayloadType(u16),
    /// A value in a fixed enum field (NACK code, routing-activation
    /// result, ...) was outside the valid set.
    InvalidEnumValue,
    /// A multi-byte value could not be sliced out of a buffer (wrong length).
    SliceConversion,
    /// The connection is not in a state where the requested operation is valid.
    NotReady,
    /// Internal logic error; carries a short static description.
    InternalError(&'static str),
}

impl fmt::Display for DoipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooShort => write!(f, "buffer is too short"),
            Self::IoError => write!(f, "underlying I/O error"),
            Self::MalformedHeader(code) => write!(f, "malformed DoIP header: {code}"),
            Self::InvalidPayloadLength => write!(f, "payload length invalid for its type"),
            Self::MessageTooLarge => write!(f, "message exceeds the configured maximum size"),
            Self::UnknownPayloadType(v) => write!(f, "unknown payload type: {v:#06x}"),
            Self::InvalidEnumValue => write!(f, "invalid enum value in message"),
            Self::SliceConversion => write!(f, "failed to convert slice to fixed-size array"),
            Self::NotReady => write!(f, "connection not ready for this operation"),
            Self::InternalError(s) => write!(f, "internal error: {s}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DoipError {}

impl From<core::array::TryFromSliceError> for DoipError {
    fn from(_: core::array::TryFromSliceError) -> Self {
        DoipError::SliceConversion
    }
}

impl From<&'static str> for DoipError {
    fn from(s: &'static str) -> Self {
        DoipError::InternalError(s)
    }
}

pub type Result<T> = core::result::Result<T, DoipError>;
