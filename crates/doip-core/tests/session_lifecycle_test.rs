//! Drives a [`ServerStateMachine`] through a full connection lifecycle —
//! accept, routing activation, a diagnostic exchange, an alive-check round
//! trip, and an operator-requested close.
//!
//! `RecordingContext`/`MockTimers` live in `doip_core::context::test_support`
//! but that module is crate-private, so this test keeps its own minimal
//! stand-ins built entirely against the public API.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Mutex;

use doip_core::{
    CloseReason, ConnectionContext, DiagnosticAck, DoipAddress, DownstreamDisposition, Message,
    ServerConfig, ServerEvent, ServerState, ServerStateMachine, TimerControl, TimerKind,
};

struct TestHarnessContext {
    server_address: DoipAddress,
    client_address: Mutex<Option<DoipAddress>>,
    open: Mutex<bool>,
    close_reason: Mutex<Option<CloseReason>>,
    sent: Mutex<Vec<Message>>,
}

impl TestHarnessContext {
    fn new(server_address: DoipAddress) -> Self {
        Self {
            server_address,
            client_address: Mutex::new(None),
            open: Mutex::new(true),
            close_reason: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn sent_messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

impl ConnectionContext for TestHarnessContext {
    fn send_protocol_message(&self, msg: &Message) -> doip_core::error::Result<usize> {
        self.sent.lock().unwrap().push(msg.clone());
        Ok(msg.as_bytes().len())
    }

    fn close(&self, reason: CloseReason) {
        let mut guard = self.close_reason.lock().unwrap();
        if guard.is_none() {
            *guard = Some(reason);
            *self.open.lock().unwrap() = false;
        }
    }

    fn is_open(&self) -> bool {
        *self.open.lock().unwrap()
    }

    fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock().unwrap()
    }

    fn server_address(&self) -> DoipAddress {
        self.server_address
    }

    fn client_address(&self) -> Option<DoipAddress> {
        *self.client_address.lock().unwrap()
    }

    fn set_client_address(&self, addr: DoipAddress) {
        *self.client_address.lock().unwrap() = Some(addr);
    }

    fn notify_diagnostic_message(&self, _msg: &Message) -> DiagnosticAck {
        None
    }

    fn notify_diagnostic_ack_sent(&self, _ack: DiagnosticAck) {}

    fn has_downstream_handler(&self) -> bool {
        false
    }

    fn notify_downstream_request(&self, _msg: &Message) -> DownstreamDisposition {
        DownstreamDisposition::Error
    }

    fn receive_downstream_response(&self, _response: &Message) {}
}

struct TestHarnessTimers {
    armed: RefCell<HashMap<TimerKind, u64>>,
}

impl TestHarnessTimers {
    fn new() -> Self {
        Self { armed: RefCell::new(HashMap::new()) }
    }

    fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.borrow().contains_key(&kind)
    }
}

impl TimerControl for TestHarnessTimers {
    fn arm(&self, kind: TimerKind, duration_ms: u64) {
        self.armed.borrow_mut().insert(kind, duration_ms);
    }

    fn cancel(&self, kind: TimerKind) {
        self.armed.borrow_mut().remove(&kind);
    }
}

const SERVER_ADDRESS: DoipAddress = 0x0E80;
const TESTER_ADDRESS: DoipAddress = 0xE000;

#[test]
fn connection_reaches_routing_activated_and_survives_an_alive_check() {
    let config = ServerConfig::builder().logical_address(SERVER_ADDRESS).build();
    let mut sm = ServerStateMachine::new(&config);
    let timers = TestHarnessTimers::new();
    let ctx = TestHarnessContext::new(SERVER_ADDRESS);

    sm.on_accept(&timers);
    assert_eq!(sm.current_state(), ServerState::WaitRoutingActivation);

    sm.process_event(
        ServerEvent::RoutingActivationReceived { source_address: TESTER_ADDRESS },
        &ctx,
        &timers,
    );
    assert_eq!(sm.current_state(), ServerState::RoutingActivated);
    assert_eq!(ctx.client_address(), Some(TESTER_ADDRESS));

    let diagnostic = Message::make_diagnostic_message(TESTER_ADDRESS, SERVER_ADDRESS, &[0x3E]);
    sm.process_event(ServerEvent::DiagnosticMessageReceived { message: diagnostic }, &ctx, &timers);
    assert_eq!(sm.current_state(), ServerState::RoutingActivated);

    let diagnostic_ack = ctx
        .sent_messages()
        .into_iter()
        .find(|m| m.payload_type() == doip_core::PayloadType::DiagnosticMessageAck)
        .expect("a DiagnosticMessageAck was sent");
    assert_eq!(diagnostic_ack.source_address(), Some(TESTER_ADDRESS));
    assert_eq!(diagnostic_ack.target_address(), Some(SERVER_ADDRESS));

    sm.process_event(ServerEvent::GeneralInactivityTimeout, &ctx, &timers);
    assert_eq!(sm.current_state(), ServerState::WaitAliveCheckResponse);
    assert!(timers.is_armed(TimerKind::AliveCheck));

    sm.process_event(
        ServerEvent::AliveCheckResponseReceived { source_address: TESTER_ADDRESS },
        &ctx,
        &timers,
    );
    assert_eq!(sm.current_state(), ServerState::RoutingActivated);
    assert!(ctx.is_open());

    sm.process_event(ServerEvent::CloseRequestReceived, &ctx, &timers);
    assert_eq!(sm.current_state(), ServerState::Closed);
    assert_eq!(ctx.close_reason(), Some(CloseReason::Requested));

    let responses = ctx.sent_messages();
    assert!(responses.iter().any(|m| m.payload_type() == doip_core::PayloadType::RoutingActivationResponse));
    assert!(responses.iter().any(|m| m.payload_type() == doip_core::PayloadType::DiagnosticMessageAck));
    assert!(responses.iter().any(|m| m.payload_type() == doip_core::PayloadType::AliveCheckRequest));
}

#[test]
fn diagnostic_message_to_unknown_target_nacks_with_the_unknown_address_echoed() {
    const UNKNOWN_TARGET: DoipAddress = 0x1234;

    let config = ServerConfig::builder().logical_address(SERVER_ADDRESS).build();
    let mut sm = ServerStateMachine::new(&config);
    let timers = TestHarnessTimers::new();
    let ctx = TestHarnessContext::new(SERVER_ADDRESS);

    sm.on_accept(&timers);
    sm.process_event(
        ServerEvent::RoutingActivationReceived { source_address: TESTER_ADDRESS },
        &ctx,
        &timers,
    );

    let diagnostic = Message::make_diagnostic_message(TESTER_ADDRESS, UNKNOWN_TARGET, &[0x3E]);
    sm.process_event(ServerEvent::DiagnosticMessageReceived { message: diagnostic }, &ctx, &timers);

    let nack = ctx
        .sent_messages()
        .into_iter()
        .find(|m| m.payload_type() == doip_core::PayloadType::DiagnosticMessageNegativeAck)
        .expect("a DiagnosticMessageNegativeAck was sent");
    assert_eq!(nack.source_address(), Some(TESTER_ADDRESS));
    assert_eq!(nack.target_address(), Some(UNKNOWN_TARGET));
}

#[test]
fn unactivated_connection_times_out_and_closes() {
    let config = ServerConfig::default();
    let mut sm = ServerStateMachine::new(&config);
    let timers = TestHarnessTimers::new();
    let ctx = TestHarnessContext::new(SERVER_ADDRESS);

    sm.on_accept(&timers);
    sm.process_event(ServerEvent::InitialInactivityTimeout, &ctx, &timers);

    assert_eq!(sm.current_state(), ServerState::Closed);
    assert_eq!(ctx.close_reason(), Some(CloseReason::InitialInactivityTimeout));
    assert!(!ctx.is_open());
}
