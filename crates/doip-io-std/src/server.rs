//! Server orchestrator: binds sockets, spawns the UDP discovery pair and a
//! TCP accept loop, and hands each accepted connection its own worker
//! thread.

use std::io;
use std::net::{TcpListener, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use doip_core::{ApplicationModel, ServerConfig};

use crate::connection::run_connection;
use crate::discovery;

/// Produces a fresh [`ApplicationModel`] for each accepted connection. A
/// plain closure suffices for stateless models; stateful ones close over
/// shared state themselves.
pub trait ApplicationModelFactory: Send + Sync + 'static {
    type Model: ApplicationModel + 'static;

    fn create(&self) -> Self::Model;
}

impl<F, M> ApplicationModelFactory for F
where
    F: Fn() -> M + Send + Sync + 'static,
    M: ApplicationModel + 'static,
{
    type Model = M;

    fn create(&self) -> M {
        (self)()
    }
}

/// Owns the running server's threads and shutdown flag. Dropping it does
/// not stop the server — call [`Server::stop`] explicitly; lifecycle for a
/// top-level resource like this should never be implicit in a drop.
pub struct Server {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Server {
    /// Binds the discovery and TCP sockets and spawns all server threads:
    /// one UDP listener, one UDP announcer, one TCP accept loop (itself
    /// spawning one worker thread per accepted connection).
    pub fn start<F>(config: ServerConfig, app_factory: F) -> io::Result<Self>
    where
        F: ApplicationModelFactory,
    {
        let running = Arc::new(AtomicBool::new(true));

        let discovery_listener = UdpSocket::bind(("0.0.0.0", config.port))?;
        let discovery_announcer = UdpSocket::bind(("0.0.0.0", 0))?;
        let tcp_listener = TcpListener::bind(("0.0.0.0", config.port))?;
        tcp_listener.set_nonblocking(true)?;

        let (udp_listener_handle, udp_announcer_handle) = discovery::spawn(
            discovery_listener,
            discovery_announcer,
            config.clone(),
            Arc::clone(&running),
        );

        let app_factory = Arc::new(app_factory);
        let accept_running = Arc::clone(&running);
        let accept_config = config;
        let accept_handle = std::thread::spawn(move || {
            Self::accept_loop(tcp_listener, accept_config, app_factory, accept_running)
        });

        Ok(Self {
            running,
            handles: vec![udp_listener_handle, udp_announcer_handle, accept_handle],
        })
    }

    fn accept_loop<F>(
        listener: TcpListener,
        config: ServerConfig,
        app_factory: Arc<F>,
        running: Arc<AtomicBool>,
    ) where
        F: ApplicationModelFactory,
    {
        while running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _peer)) => {
                    let _ = stream.set_nodelay(true);
                    let conn_config = config.clone();
                    let app = Arc::new(app_factory.create());
                    std::thread::spawn(move || run_connection(stream, &conn_config, app));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(_) => break,
            }
        }
    }

    /// Signals every server thread to stop and joins them. Existing TCP
    /// connections run to their own natural completion (close, timeout, or
    /// protocol error); this only stops accepting new ones and the UDP
    /// discovery threads.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
