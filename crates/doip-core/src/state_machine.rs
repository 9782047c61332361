//! Per-connection server state machine.
//!
//! A `(state, event) => next_state` match table, extended with the side
//! effects (sending messages, arming timers, closing) the DoIP transition
//! table requires — the table below performs those effects inline rather
//! than returning a deferred action list, since each transition calls at
//! most a handful of context/timer operations.

use crate::address::{DiagnosticNackCode, DoipAddress, NackCode, RoutingActivationResult};
use crate::config::ServerConfig;
use crate::context::{CloseReason, ConnectionContext, DownstreamDisposition};
use crate::message::Message;

/// States of the per-connection protocol machine. `SocketInitialized` is
/// the entry state; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    SocketInitialized,
    WaitRoutingActivation,
    RoutingActivated,
    WaitAliveCheckResponse,
    WaitDownstreamResponse,
    Finalize,
    Closed,
}

/// Events that drive the machine: received protocol messages, timer
/// firings, and transport-level signals.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    RoutingActivationReceived {
        source_address: DoipAddress,
    },
    DiagnosticMessageReceived {
        message: Message,
    },
    DiagnosticMessageReceivedDownstream {
        response: Message,
    },
    AliveCheckResponseReceived {
        source_address: DoipAddress,
    },
    CloseRequestReceived,
    InitialInactivityTimeout,
    GeneralInactivityTimeout,
    AliveCheckTimeout,
    DownstreamTimeout,
    InvalidMessage(NackCode),
    SocketError,
}

/// Which protocol timer a [`TimerControl`] operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    InitialInactivity,
    GeneralInactivity,
    AliveCheck,
    Downstream,
}

/// The narrow timer interface the state machine needs, kept separate from
/// the concrete [`crate::timer::TimerManager`] so this module stays usable
/// without the `std` feature (and trivially mockable in unit tests).
pub trait TimerControl {
    fn arm(&self, kind: TimerKind, duration_ms: u64);
    fn cancel(&self, kind: TimerKind);
}

/// Drives one TCP connection's protocol state across its lifetime.
pub struct ServerStateMachine {
    state: ServerState,
    alive_check_retries: u32,
    initial_inactivity_ms: u64,
    general_inactivity_ms: u64,
    alive_check_ms: u64,
    max_alive_check_retries: u32,
    downstream_timeout_ms: u64,
}

impl ServerStateMachine {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            state: ServerState::SocketInitialized,
            alive_check_retries: 0,
            initial_inactivity_ms: config.initial_inactivity_ms,
            general_inactivity_ms: config.general_inactivity_ms,
            alive_check_ms: config.alive_check_ms,
            max_alive_check_retries: config.max_alive_check_retries,
            downstream_timeout_ms: config.downstream_timeout_ms,
        }
    }

    pub fn current_state(&self) -> ServerState {
        self.state
    }

    /// Called once a TCP connection is accepted: arms the initial
    /// inactivity timer and moves to `WaitRoutingActivation`.
    pub fn on_accept(&mut self, timers: &dyn TimerControl) {
        timers.arm(TimerKind::InitialInactivity, self.initial_inactivity_ms);
        self.state = ServerState::WaitRoutingActivation;
    }

    /// Processes one event, performing the transition's side effects
    /// against `ctx`/`timers` and updating internal state.
    pub fn process_event(
        &mut self,
        event: ServerEvent,
        ctx: &dyn ConnectionContext,
        timers: &dyn TimerControl,
    ) {
        match (self.state, event) {
            (ServerState::WaitRoutingActivation, ServerEvent::RoutingActivationReceived { source_address }) => {
                if crate::address::is_valid_source_address(source_address) {
                    timers.cancel(TimerKind::InitialInactivity);
                    ctx.set_client_address(source_address);
                    let request = Message::make_routing_activation_request(
                        source_address,
                        crate::address::RoutingActivationType::Default,
                        None,
                    );
                    let response = Message::make_routing_activation_response(
                        &request,
                        ctx.server_address(),
                        RoutingActivationResult::RouteActivated,
                    );
                    let _ = ctx.send_protocol_message(&response);
                    timers.arm(TimerKind::GeneralInactivity, self.general_inactivity_ms);
                    self.state = ServerState::RoutingActivated;
                } else {
                    let request = Message::make_routing_activation_request(
                        source_address,
                        crate::address::RoutingActivationType::Default,
                        None,
                    );
                    let response = Message::make_routing_activation_response(
                        &request,
                        ctx.server_address(),
                        RoutingActivationResult::UnknownSourceAddress,
                    );
                    let _ = ctx.send_protocol_message(&response);
                    ctx.close(CloseReason::RoutingActivationDenied);
                    self.state = ServerState::Closed;
                }
            }

            (ServerState::WaitRoutingActivation, ServerEvent::InitialInactivityTimeout) => {
                ctx.close(CloseReason::InitialInactivityTimeout);
                self.state = ServerState::Closed;
            }

            (ServerState::RoutingActivated, ServerEvent::RoutingActivationReceived { source_address }) => {
                let request = Message::make_routing_activation_request(
                    source_address,
                    crate::address::RoutingActivationType::Default,
                    None,
                );
                if ctx.client_address() == Some(source_address) {
                    let response = Message::make_routing_activation_response(
                        &request,
                        ctx.server_address(),
                        RoutingActivationResult::RouteActivated,
                    );
                    let _ = ctx.send_protocol_message(&response);
                    timers.cancel(TimerKind::GeneralInactivity);
                    timers.arm(TimerKind::GeneralInactivity, self.general_inactivity_ms);
                } else {
                    let response = Message::make_routing_activation_response(
                        &request,
                        ctx.server_address(),
                        RoutingActivationResult::SourceAddressAlreadyRegistered,
                    );
                    let _ = ctx.send_protocol_message(&response);
                    ctx.close(CloseReason::SourceAddressAlreadyRegistered);
                    self.state = ServerState::Closed;
                }
            }

            (ServerState::RoutingActivated, ServerEvent::DiagnosticMessageReceived { message }) => {
                self.handle_diagnostic_message(&message, ctx, timers);
            }

            (ServerState::RoutingActivated, ServerEvent::GeneralInactivityTimeout) => {
                let _ = ctx.send_protocol_message(&Message::make_alive_check_request());
                self.alive_check_retries = 0;
                timers.arm(TimerKind::AliveCheck, self.alive_check_ms);
                self.state = ServerState::WaitAliveCheckResponse;
            }

            (ServerState::WaitAliveCheckResponse, ServerEvent::AliveCheckResponseReceived { .. }) => {
                timers.cancel(TimerKind::AliveCheck);
                self.alive_check_retries = 0;
                timers.arm(TimerKind::GeneralInactivity, self.general_inactivity_ms);
                self.state = ServerState::RoutingActivated;
            }

            (ServerState::WaitAliveCheckResponse, ServerEvent::AliveCheckTimeout) => {
                self.alive_check_retries += 1;
                if self.alive_check_retries < self.max_alive_check_retries {
                    let _ = ctx.send_protocol_message(&Message::make_alive_check_request());
                    timers.arm(TimerKind::AliveCheck, self.alive_check_ms);
                } else {
                    ctx.close(CloseReason::AliveCheckTimeout);
                    self.state = ServerState::Closed;
                }
            }

            (ServerState::WaitDownstreamResponse, ServerEvent::DiagnosticMessageReceivedDownstream { response }) => {
                timers.cancel(TimerKind::Downstream);
                let sa = response.source_address().unwrap_or(ctx.server_address());
                let ta = response.target_address().unwrap_or(0);
                let ack = Message::make_diagnostic_message_ack(sa, ta, response.diagnostic_payload());
                let _ = ctx.send_protocol_message(&ack);
                ctx.notify_diagnostic_ack_sent(None);
                timers.arm(TimerKind::GeneralInactivity, self.general_inactivity_ms);
                self.state = ServerState::RoutingActivated;
            }

            (ServerState::WaitDownstreamResponse, ServerEvent::DownstreamTimeout) => {
                let server_addr = ctx.server_address();
                let client_addr = ctx.client_address().unwrap_or(0);
                crate::log::doip_nack!(
                    DiagnosticNackCode::TargetUnreachable,
                    "downstream provider timed out responding to {:#06x}",
                    client_addr
                );
                let nack = Message::make_diagnostic_message_nack(
                    client_addr,
                    server_addr,
                    DiagnosticNackCode::TargetUnreachable.as_u8(),
                    &[],
                );
                let _ = ctx.send_protocol_message(&nack);
                ctx.notify_diagnostic_ack_sent(Some(DiagnosticNackCode::TargetUnreachable));
                timers.arm(TimerKind::GeneralInactivity, self.general_inactivity_ms);
                self.state = ServerState::RoutingActivated;
            }

            (_, ServerEvent::DiagnosticMessageReceivedDownstream { .. }) => {
                crate::log::doip_warn!(
                    "DiagnosticMessageReceivedDownstream received outside WaitDownstreamResponse; discarding"
                );
            }

            (_, ServerEvent::CloseRequestReceived) => {
                ctx.close(CloseReason::Requested);
                self.state = ServerState::Closed;
            }

            (_, ServerEvent::InvalidMessage(code)) => {
                let _ = ctx.send_protocol_message(&Message::make_negative_ack(code));
                ctx.close(CloseReason::ProtocolError(code));
                self.state = ServerState::Closed;
            }

            (_, ServerEvent::SocketError) => {
                ctx.close(CloseReason::PeerClosed);
                self.state = ServerState::Closed;
            }

            // Any other (state, event) pair is a no-op: the event does not
            // apply to the current state, so it is silently ignored.
            (current, _) => {
                self.state = current;
            }
        }
    }

    fn handle_diagnostic_message(
        &mut self,
        message: &Message,
        ctx: &dyn ConnectionContext,
        timers: &dyn TimerControl,
    ) {
        let sa = ctx.server_address();
        let ta = message.target_address().unwrap_or(0);
        let requester = message.source_address().unwrap_or(0);

        if ta != sa {
            crate::log::doip_nack!(
                DiagnosticNackCode::UnknownTargetAddress,
                "diagnostic message addressed to unknown target {:#06x}",
                ta
            );
            let nack = Message::make_diagnostic_message_nack(
                requester,
                ta,
                DiagnosticNackCode::UnknownTargetAddress.as_u8(),
                &message.diagnostic_payload()[..message.diagnostic_payload().len().min(1)],
            );
            let _ = ctx.send_protocol_message(&nack);
            ctx.notify_diagnostic_ack_sent(Some(DiagnosticNackCode::UnknownTargetAddress));
            timers.cancel(TimerKind::GeneralInactivity);
            timers.arm(TimerKind::GeneralInactivity, self.general_inactivity_ms);
            return;
        }

        if ctx.has_downstream_handler() {
            match ctx.notify_downstream_request(message) {
                DownstreamDisposition::Pending => {
                    timers.arm(TimerKind::Downstream, self.downstream_timeout_ms);
                    self.state = ServerState::WaitDownstreamResponse;
                }
                DownstreamDisposition::Handled => {
                    timers.cancel(TimerKind::GeneralInactivity);
                    timers.arm(TimerKind::GeneralInactivity, self.general_inactivity_ms);
                }
                DownstreamDisposition::Error => {
                    crate::log::doip_nack!(
                        DiagnosticNackCode::TargetUnreachable,
                        "downstream provider rejected request from {:#06x}",
                        requester
                    );
                    let nack = Message::make_diagnostic_message_nack(
                        requester,
                        ta,
                        DiagnosticNackCode::TargetUnreachable.as_u8(),
                        &[],
                    );
                    let _ = ctx.send_protocol_message(&nack);
                    ctx.notify_diagnostic_ack_sent(Some(DiagnosticNackCode::TargetUnreachable));
                    timers.cancel(TimerKind::GeneralInactivity);
                    timers.arm(TimerKind::GeneralInactivity, self.general_inactivity_ms);
                }
            }
            return;
        }

        let ack = ctx.notify_diagnostic_message(message);
        let response = match ack {
            None => Message::make_diagnostic_message_ack(requester, ta, &[0x00]),
            Some(code) => {
                crate::log::doip_nack!(code, "application rejected diagnostic message from {:#06x}", requester);
                Message::make_diagnostic_message_nack(
                    requester,
                    ta,
                    code.as_u8(),
                    &message.diagnostic_payload()[..message.diagnostic_payload().len().min(1)],
                )
            }
        };
        let _ = ctx.send_protocol_message(&response);
        ctx.notify_diagnostic_ack_sent(ack);
        timers.cancel(TimerKind::GeneralInactivity);
        timers.arm(TimerKind::GeneralInactivity, self.general_inactivity_ms);
    }
}
