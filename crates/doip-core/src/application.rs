//! Application model and downstream forwarder.
//!
//! A bundle of per-connection callbacks plus a narrower provider interface
//! for subnet/downstream integrations, with an owned [`DownstreamResume`]
//! handle standing in for a completion callback.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::address::DoipAddress;
use crate::context::{CloseReason, ConnectionContext, DiagnosticAck, DownstreamDisposition};
use crate::message::Message;

/// A one-shot handle to complete a pending downstream request: building the
/// response message (request's source/target swapped) and re-entering the
/// state machine via [`ConnectionContext::receive_downstream_response`].
pub struct DownstreamResume {
    ctx: Arc<dyn ConnectionContext>,
    request_source_address: DoipAddress,
    request_target_address: DoipAddress,
}

impl DownstreamResume {
    pub fn new(ctx: Arc<dyn ConnectionContext>, request: &Message) -> Self {
        Self {
            ctx,
            request_source_address: request.source_address().unwrap_or(0),
            request_target_address: request.target_address().unwrap_or(0),
        }
    }

    /// Completes the pending request with `payload`.
    pub fn complete(self, payload: &[u8]) {
        let response = Message::make_diagnostic_message(
            self.request_source_address,
            self.request_target_address,
            payload,
        );
        self.ctx.receive_downstream_response(&response);
    }
}

/// A bundle of optional callbacks a user supplies per connection. Every
/// method has a harmless default so implementers only override what they
/// need.
pub trait ApplicationModel: Send + Sync {
    fn on_open_connection(&self, _ctx: &dyn ConnectionContext) {}

    fn on_close_connection(&self, _ctx: &dyn ConnectionContext, _reason: CloseReason) {}

    /// Synchronous ack decision for a diagnostic message addressed to this
    /// connection's server address, when no downstream handler applies.
    fn on_diagnostic_message(&self, _ctx: &dyn ConnectionContext, _msg: &Message) -> DiagnosticAck {
        None
    }

    fn on_diagnostic_notification(&self, _ctx: &dyn ConnectionContext, _ack: DiagnosticAck) {}

    /// Declares whether this model wants diagnostic messages routed through
    /// the downstream path instead of `on_diagnostic_message`.
    fn has_downstream_handler(&self) -> bool {
        false
    }

    /// Called for a diagnostic message that should go downstream. The
    /// returned disposition must match how (or whether) `resume` will
    /// eventually be completed: `Pending` promises a later `resume.complete`
    /// call, `Handled` means the implementation already replied on its own,
    /// `Error` means it could not even start.
    fn on_downstream_request(
        &self,
        _ctx: &dyn ConnectionContext,
        _msg: &Message,
        _resume: DownstreamResume,
    ) -> DownstreamDisposition {
        DownstreamDisposition::Error
    }

    fn on_downstream_response(&self, _ctx: &dyn ConnectionContext, _request: &Message, _response: &Message) {}
}

/// Result of a downstream provider's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownstreamStatus {
    Handled,
    Pending,
    Timeout,
    Error,
}

/// A structured downstream response: the raw reply payload, its status,
/// and how long the provider took to produce it.
#[derive(Debug, Clone)]
pub struct DownstreamResponse {
    pub payload: Vec<u8>,
    pub status: DownstreamStatus,
    pub latency_ms: u64,
}

/// Invoked by a provider exactly once per `send_request` call.
pub type DownstreamCallback = Box<dyn FnOnce(DownstreamResponse) + Send>;

/// A narrower interface than [`ApplicationModel`] for subnet/provider
/// integrations (SocketCAN, a UDS mock, ...).
pub trait DownstreamProvider: Send + Sync {
    fn send_request(&self, request: Vec<u8>, callback: DownstreamCallback);
    fn start(&self) {}
    fn stop(&self) {}
}

/// Adapts a [`DownstreamProvider`] into the `resume`-based application
/// model contract: extracts the diagnostic payload, forwards it, and on
/// completion either resumes the state machine (`Handled`/`Pending`) or
/// lets the connection's T_Downstream timer lapse on its own
/// (`Timeout`/`Error`), which already produces the same
/// `DiagnosticMessageNegativeAck{TargetUnreachable}` outcome without a
/// second code path.
pub struct DownstreamForwarder<P> {
    provider: Arc<P>,
}

impl<P: DownstreamProvider + 'static> DownstreamForwarder<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Forwards `msg`'s diagnostic payload downstream, wiring the
    /// provider's eventual callback to `resume`. Always returns `Pending`:
    /// the caller (the connection's downstream handler) has already
    /// committed to waiting when it decided to call this.
    pub fn forward(&self, msg: &Message, resume: DownstreamResume) -> DownstreamDisposition {
        let payload = msg.diagnostic_payload().to_vec();
        self.provider.send_request(
            payload,
            Box::new(move |resp| match resp.status {
                DownstreamStatus::Handled | DownstreamStatus::Pending => resume.complete(&resp.payload),
                DownstreamStatus::Timeout | DownstreamStatus::Error => {
                    crate::log::doip_warn!(
                        "downstream provider reported {:?}; leaving T_Downstream to expire",
                        resp.status
                    );
                }
            }),
        );
        DownstreamDisposition::Pending
    }
}
