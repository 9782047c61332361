use alloc::format;
use alloc::string::String;

/// Trait for structs that provide metadata for logging.
pub trait LogMetadata {
    fn meta(&self) -> String;
}

/// Logging context for a single TCP connection: connection id plus the
/// currently routed client source address (0 before routing activation).
pub struct ConnLogCtx {
    pub conn_id: u64,
    pub client_address: u16,
}

impl LogMetadata for ConnLogCtx {
    fn meta(&self) -> String {
        format!("conn={}, sa={:#06x}", self.conn_id, self.client_address)
    }
}

// =============================================
// Logging macros (namespaced under crate::log)
// =============================================
//
// The `[conn=.., sa=..]` prefixing rule lives once in `doip_log!`; the five
// level macros below are thin callers rather than five separate copies of
// the same match arms.

macro_rules! doip_log {
    ($level:ident, $ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        log::$level!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($level:ident, $fmt:literal $(, $($arg:tt)+)?) => {{
        log::$level!($fmt $(, $($arg)+)?);
    }};
}

macro_rules! doip_info {
    ($($args:tt)+) => { $crate::log::doip_log!(info, $($args)+) };
}

macro_rules! doip_warn {
    ($($args:tt)+) => { $crate::log::doip_log!(warn, $($args)+) };
}

macro_rules! doip_error {
    ($($args:tt)+) => { $crate::log::doip_log!(error, $($args)+) };
}

macro_rules! doip_debug {
    ($($args:tt)+) => { $crate::log::doip_log!(debug, $($args)+) };
}

macro_rules! doip_trace {
    ($($args:tt)+) => { $crate::log::doip_log!(trace, $($args)+) };
}

/// Logs a diagnostic NACK at `warn` level, annotated with the NACK code's
/// numeric value. Every negative-acknowledge path in the state machine
/// reports through this instead of a bare `doip_warn!`, so NACKs are
/// grep-able by code across the log stream.
macro_rules! doip_nack {
    ($ctx:expr, $code:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        log::warn!(concat!("[{}] nack={:#04x}: ", $fmt), meta, $code as u8 $(, $($arg)+)?);
    }};
    ($code:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        log::warn!(concat!("nack={:#04x}: ", $fmt), $code as u8 $(, $($arg)+)?);
    }};
}

pub(crate) use doip_debug;
pub(crate) use doip_error;
pub(crate) use doip_info;
pub(crate) use doip_log;
pub(crate) use doip_nack;
pub(crate) use doip_trace;
pub(crate) use doip_warn;
