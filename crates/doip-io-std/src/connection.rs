//! TCP session runtime: one thread per accepted connection, running the
//! framed receive loop against a [`doip_core::ServerStateMachine`].
//!
//! A mutex-guarded socket handle, with a read timeout treated as "nothing
//! arrived, keep polling" rather than an error.

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use doip_core::{
    ApplicationModel, CloseReason, ConnectionContext, DiagnosticAck, DoipAddress,
    DownstreamDisposition, DownstreamResume, Message, NackCode, PayloadType, ServerConfig,
    ServerEvent, ServerStateMachine, TimerControl, TimerId, TimerKind, TimerManager,
};

/// How long a single blocking read waits before the connection worker gets
/// a chance to drain timer/downstream events and check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A `ConnectionContext` implementation backed by a `TcpStream`. Diagnostic
/// and downstream decisions are delegated to an [`ApplicationModel`].
pub struct TcpConnection<A: ApplicationModel + 'static> {
    stream: Mutex<TcpStream>,
    server_address: DoipAddress,
    client_address: AtomicU16,
    open: AtomicBool,
    close_reason: Mutex<Option<CloseReason>>,
    app: Arc<A>,
    event_tx: Sender<ServerEvent>,
    self_weak: Mutex<Weak<TcpConnection<A>>>,
}

impl<A: ApplicationModel + 'static> TcpConnection<A> {
    fn new(stream: TcpStream, server_address: DoipAddress, app: Arc<A>, event_tx: Sender<ServerEvent>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            stream: Mutex::new(stream),
            server_address,
            client_address: AtomicU16::new(0),
            open: AtomicBool::new(true),
            close_reason: Mutex::new(None),
            app,
            event_tx,
            self_weak: Mutex::new(weak.clone()),
        })
    }

    fn as_dyn(&self) -> Arc<dyn ConnectionContext> {
        self.self_weak
            .lock()
            .unwrap()
            .upgrade()
            .expect("context outlives any call made on itself")
    }
}

impl<A: ApplicationModel + 'static> ConnectionContext for TcpConnection<A> {
    fn send_protocol_message(&self, msg: &Message) -> doip_core::error::Result<usize> {
        let mut stream = self.stream.lock().unwrap();
        stream
            .write_all(msg.as_bytes())
            .map_err(|_| doip_core::DoipError::IoError)?;
        Ok(msg.as_bytes().len())
    }

    fn close(&self, reason: CloseReason) {
        let mut guard = self.close_reason.lock().unwrap();
        if guard.is_none() {
            *guard = Some(reason);
            self.open.store(false, Ordering::SeqCst);
            let stream = self.stream.lock().unwrap();
            let _ = stream.shutdown(Shutdown::Both);
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

    fn notify_diagnostic_message(&self, msg: &Message) -> DiagnosticAck {
        self.app.on_diagnostic_message(self, msg)
    }

    fn notify_diagnostic_ack_sent(&self, ack: DiagnosticAck) {
        self.app.on_diagnostic_notification(self, ack);
    }

    fn has_downstream_handler(&self) -> bool {
        self.app.has_downstream_handler()
    }

    fn notify_downstream_request(&self, msg: &Message) -> DownstreamDisposition {
        let resume = DownstreamResume::new(self.as_dyn(), msg);
        self.app.on_downstream_request(self, msg, resume)
    }

    fn receive_downstream_response(&self, response: &Message) {
        let _ = self.event_tx.send(ServerEvent::DiagnosticMessageReceivedDownstream {
            response: response.clone(),
        });
    }
}

/// Adapts `doip_core`'s per-timer-kind [`TimerControl`] interface onto a
/// shared [`TimerManager`], re-injecting fired timers as events on
/// `event_tx` for the connection worker loop to pick up.
struct ConnectionTimers {
    manager: Arc<TimerManager>,
    event_tx: Sender<ServerEvent>,
    active: Mutex<HashMap<TimerKind, TimerId>>,
}

impl ConnectionTimers {
    fn new(manager: Arc<TimerManager>, event_tx: Sender<ServerEvent>) -> Self {
        Self {
            manager,
            event_tx,
            active: Mutex::new(HashMap::new()),
        }
    }

    fn event_for(kind: TimerKind) -> ServerEvent {
        match kind {
            TimerKind::InitialInactivity => ServerEvent::InitialInactivityTimeout,
            TimerKind::GeneralInactivity => ServerEvent::GeneralInactivityTimeout,
            TimerKind::AliveCheck => ServerEvent::AliveCheckTimeout,
            TimerKind::Downstream => ServerEvent::DownstreamTimeout,
        }
    }
}

impl TimerControl for ConnectionTimers {
    fn arm(&self, kind: TimerKind, duration_ms: u64) {
        let mut active = self.active.lock().unwrap();
        if let Some(id) = active.remove(&kind) {
            self.manager.remove(id);
        }
        let tx = self.event_tx.clone();
        let event = Self::event_for(kind);
        let id = self.manager.add(Duration::from_millis(duration_ms), false, move || {
            let _ = tx.send(event.clone());
        });
        active.insert(kind, id);
    }

    fn cancel(&self, kind: TimerKind) {
        let mut active = self.active.lock().unwrap();
        if let Some(id) = active.remove(&kind) {
            self.manager.remove(id);
        }
    }
}

/// Maps a parsed message to the `ServerEvent` the state machine expects for
/// the state-independent payload types (routing activation and alive-check
/// response carry their own address payload; diagnostic messages carry the
/// whole message).
fn event_for_message(msg: Message) -> ServerEvent {
    match msg.payload_type() {
        PayloadType::RoutingActivationRequest => ServerEvent::RoutingActivationReceived {
            source_address: msg.routing_activation_source_address().unwrap_or(0),
        },
        PayloadType::AliveCheckResponse => ServerEvent::AliveCheckResponseReceived {
            source_address: msg.source_address().unwrap_or(0),
        },
        PayloadType::DiagnosticMessage => ServerEvent::DiagnosticMessageReceived { message: msg },
        _ => ServerEvent::InvalidMessage(NackCode::UnknownPayloadType),
    }
}

/// Reads exactly `buf.len()` bytes, polling `events` between timeouts so
/// timer/downstream events keep getting dispatched while no data has
/// arrived. Returns `false` if the peer closed the connection.
fn read_exact_polling(
    stream: &Mutex<TcpStream>,
    buf: &mut [u8],
    sm: &mut ServerStateMachine,
    ctx: &dyn ConnectionContext,
    timers: &dyn TimerControl,
    events: &Receiver<ServerEvent>,
) -> bool {
    let mut filled = 0;
    while filled < buf.len() {
        if !ctx.is_open() {
            return false;
        }
        let read_result = {
            let mut guard = stream.lock().unwrap();
            guard.read(&mut buf[filled..])
        };
        match read_result {
            Ok(0) => return false,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                drain_events(sm, ctx, timers, events);
            }
            Err(_) => return false,
        }
    }
    true
}

fn drain_events(
    sm: &mut ServerStateMachine,
    ctx: &dyn ConnectionContext,
    timers: &dyn TimerControl,
    events: &Receiver<ServerEvent>,
) {
    while let Ok(event) = events.try_recv() {
        sm.process_event(event, ctx, timers);
    }
}

/// Runs one accepted TCP connection to completion: constructs the
/// connection context, drives the framed receive loop, and tears down the
/// per-connection timers when the state machine reaches `Closed`.
pub fn run_connection<A: ApplicationModel + 'static>(
    stream: TcpStream,
    config: &ServerConfig,
    app: Arc<A>,
) {
    let _ = stream.set_read_timeout(Some(POLL_INTERVAL));
    let (event_tx, event_rx) = mpsc::channel();
    let ctx = TcpConnection::new(stream, config.logical_address, app, event_tx.clone());
    let timer_manager = Arc::new(TimerManager::new());
    let timers = ConnectionTimers::new(timer_manager, event_tx);

    let mut sm = ServerStateMachine::new(config);
    ctx.app.on_open_connection(ctx.as_ref());
    sm.on_accept(&timers);

    let mut header = [0u8; doip_core::message::HEADER_SIZE];
    loop {
        if !ctx.is_open() {
            break;
        }
        if !read_exact_polling(&ctx.stream, &mut header, &mut sm, ctx.as_ref(), &timers, &event_rx) {
            sm.process_event(ServerEvent::SocketError, ctx.as_ref(), &timers);
            break;
        }

        let header_info = match Message::try_parse_header(&header, config.max_message_size) {
            Ok(info) => info,
            Err(code) => {
                sm.process_event(ServerEvent::InvalidMessage(code), ctx.as_ref(), &timers);
                break;
            }
        };

        let mut full = Vec::with_capacity(doip_core::message::HEADER_SIZE + header_info.payload_length as usize);
        full.extend_from_slice(&header);
        let mut payload = alloc_payload_buf(header_info.payload_length as usize);
        if !payload.is_empty()
            && !read_exact_polling(&ctx.stream, &mut payload, &mut sm, ctx.as_ref(), &timers, &event_rx)
        {
            sm.process_event(ServerEvent::SocketError, ctx.as_ref(), &timers);
            break;
        }
        full.extend_from_slice(&payload);

        match Message::try_parse(&full, config.max_message_size) {
            Ok(msg) => sm.process_event(event_for_message(msg), ctx.as_ref(), &timers),
            Err(code) => sm.process_event(ServerEvent::InvalidMessage(code), ctx.as_ref(), &timers),
        }

        drain_events(&mut sm, ctx.as_ref(), &timers, &event_rx);

        if sm.current_state() == doip_core::ServerState::Closed {
            break;
        }
    }

    ctx.app.on_close_connection(ctx.as_ref(), ctx.close_reason().unwrap_or(CloseReason::PeerClosed));
}

fn alloc_payload_buf(len: usize) -> Vec<u8> {
    let mut v = Vec::with_capacity(len);
    v.resize(len, 0);
    v
}
