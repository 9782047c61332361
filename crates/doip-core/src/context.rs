//! Connection context: the seam between protocol (state machine), transport,
//! and application.
//!
//! An object-safe, `dyn`-compatible trait owned by the connection and
//! shared by reference with any thread that needs it.

use crate::address::{DiagnosticNackCode, DoipAddress};
use crate::error::Result;
use crate::message::Message;

/// Outcome of handing a diagnostic message to the application: `None` is a
/// positive acknowledgement, `Some(code)` a negative one.
pub type DiagnosticAck = Option<DiagnosticNackCode>;

/// Why a connection was torn down. Recorded once; subsequent `close()`
/// calls are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    InitialInactivityTimeout,
    GeneralInactivityTimeout,
    AliveCheckTimeout,
    RoutingActivationDenied,
    SourceAddressAlreadyRegistered,
    ProtocolError(crate::address::NackCode),
    PeerClosed,
    Requested,
}

/// Disposition returned by the application when handed a diagnostic message
/// that should be routed downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownstreamDisposition {
    /// A response will arrive later via `receive_downstream_response`.
    Pending,
    /// The application already sent a response itself; no further action.
    Handled,
    /// The application could not forward the request.
    Error,
}

/// Abstract interface separating protocol state from transport and
/// application. Implementers must be safe to call from any thread holding
/// a reference; concurrent senders serialise at the transport boundary.
pub trait ConnectionContext: Send + Sync {
    /// Serialises and sends `msg` over the underlying transport.
    fn send_protocol_message(&self, msg: &Message) -> Result<usize>;

    /// Idempotent: the first call records `reason` and tears the connection
    /// down; later calls are no-ops.
    fn close(&self, reason: CloseReason);

    fn is_open(&self) -> bool;

    fn close_reason(&self) -> Option<CloseReason>;

    fn server_address(&self) -> DoipAddress;

    fn client_address(&self) -> Option<DoipAddress>;

    fn set_client_address(&self, addr: DoipAddress);

    /// Hands a diagnostic message to the application for a synchronous ack
    /// decision.
    fn notify_diagnostic_message(&self, msg: &Message) -> DiagnosticAck;

    /// Post-send observation hook; the application cannot change the
    /// outcome here, only observe it.
    fn notify_diagnostic_ack_sent(&self, ack: DiagnosticAck);

    fn has_downstream_handler(&self) -> bool;

    /// Hands a diagnostic message to the downstream forwarder.
    fn notify_downstream_request(&self, msg: &Message) -> DownstreamDisposition;

    /// Injects a downstream response into the state machine's event queue
    /// (called from the provider's completion thread).
    fn receive_downstream_response(&self, response: &Message);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    /// A recording `ConnectionContext` for state-machine unit tests: every
    /// sent message and close reason is captured for assertions, and the
    /// diagnostic/downstream decisions are configured up front.
    pub struct RecordingContext {
        pub server_address: DoipAddress,
        pub client_address: AtomicU16,
        pub open: AtomicBool,
        pub close_reason: Mutex<Option<CloseReason>>,
        pub sent: Mutex<Vec<Message>>,
        pub diagnostic_ack: Mutex<DiagnosticAck>,
        pub downstream_handler: AtomicBool,
        pub downstream_disposition: Mutex<DownstreamDisposition>,
    }

    impl RecordingContext {
        pub fn new(server_address: DoipAddress) -> Arc<Self> {
            Arc::new(Self {
                server_address,
                client_address: AtomicU16::new(0),
                open: AtomicBool::new(true),
                close_reason: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
                diagnostic_ack: Mutex::new(None),
                downstream_handler: AtomicBool::new(false),
                downstream_disposition: Mutex::new(DownstreamDisposition::Handled),
            })
        }

        pub fn with_downstream_handler(self: Arc<Self>, disposition: DownstreamDisposition) -> Arc<Self> {
            self.downstream_handler.store(true, Ordering::SeqCst);
            *self.downstream_disposition.lock().unwrap() = disposition;
            self
        }

        pub fn sent_messages(&self) -> Vec<Message> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ConnectionContext for RecordingContext {
        fn send_protocol_message(&self, msg: &Message) -> Result<usize> {
            self.sent.lock().unwrap().push(msg.clone());
            Ok(msg.as_bytes().len())
        }

        fn close(&self, reason: CloseReason) {
            let mut guard = self.close_reason.lock().unwrap();
            if guard.is_none() {
                *guard = Some(reason);
                self.open.store(false, Ordering::SeqCst);
            }
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn close_reason(&self) -> Option<CloseReason> {
            *self.close_reason.lock().unwrap()
        }

        fn server_address(&self) -> DoipAddress {
            self.server_address
        }

        fn client_address(&self) -> Option<DoipAddress> {
            let addr = self.client_address.load(Ordering::SeqCst);
            if addr == 0 {
                None
            } else {
                Some(addr)
            }
        }

        fn set_client_address(&self, addr: DoipAddress) {
            self.client_address.store(addr, Ordering::SeqCst);
        }

        fn notify_diagnostic_message(&self, _msg: &Message) -> DiagnosticAck {
            *self.diagnostic_ack.lock().unwrap()
        }

        fn notify_diagnostic_ack_sent(&self, _ack: DiagnosticAck) {}

        fn has_downstream_handler(&self) -> bool {
            self.downstream_handler.load(Ordering::SeqCst)
        }

        fn notify_downstream_request(&self, _msg: &Message) -> DownstreamDisposition {
            *self.downstream_disposition.lock().unwrap()
        }

        fn receive_downstream_response(&self, _response: &Message) {}
    }
}
