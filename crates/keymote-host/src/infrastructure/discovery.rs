//! UDP LAN discovery responder.
//!
//! The host binds a UDP socket on the discovery port (default 8766) and
//! answers every `discover` request with an `announce` naming its WebSocket
//! address.  Remotes broadcast the request to find hosts without typing an IP.
//!
//! The responder runs on a dedicated thread with a 500 ms read timeout so the
//! blocking `recv_from` never ties up a tokio worker; on each timeout it
//! re-checks its stop flag.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use keymote_core::protocol::discovery::DiscoveryMessage;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Error type for discovery operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The responder thread could not be started.
    #[error("failed to spawn discovery thread: {0}")]
    Spawn(std::io::Error),
}

/// What the host advertises to remotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub ip: IpAddr,
    pub port: u16,
}

/// A LAN advertiser.
pub trait Discovery: Send {
    /// Starts advertising and returns the advertised address.
    fn start(&mut self) -> Result<Advertisement, DiscoveryError>;

    /// Stops advertising.  Idempotent.
    fn stop(&mut self);
}

/// [`Discovery`] answering JSON discover requests on a UDP port.
pub struct UdpDiscovery {
    name: String,
    discovery_port: u16,
    ws_port: u16,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    local_port: Option<u16>,
}

impl UdpDiscovery {
    /// `name` is the computer name; `ws_port` the WebSocket port to announce.
    pub fn new(name: impl Into<String>, discovery_port: u16, ws_port: u16) -> Self {
        Self {
            name: name.into(),
            discovery_port,
            ws_port,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            local_port: None,
        }
    }

    /// The UDP port actually bound, once started.  Differs from the
    /// configured port only when that was 0.
    pub fn local_port(&self) -> Option<u16> {
        self.local_port
    }
}

impl Discovery for UdpDiscovery {
    fn start(&mut self) -> Result<Advertisement, DiscoveryError> {
        let ip = local_ip();
        let advertisement = Advertisement {
            ip,
            port: self.ws_port,
        };
        if self.running.load(Ordering::SeqCst) {
            return Ok(advertisement);
        }

        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.discovery_port));
        let socket =
            UdpSocket::bind(addr).map_err(|source| DiscoveryError::BindFailed { addr, source })?;
        if let Err(e) = socket.set_read_timeout(Some(READ_TIMEOUT)) {
            warn!("discovery: could not set read timeout: {e}");
        }
        self.local_port = socket.local_addr().ok().map(|a| a.port());

        let reply = DiscoveryMessage::Announce {
            name: self.name.clone(),
            ip: ip.to_string(),
            port: self.ws_port,
        }
        .to_datagram();

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let handle = std::thread::Builder::new()
            .name("keymote-discovery".to_string())
            .spawn(move || discovery_loop(socket, reply, running))
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                DiscoveryError::Spawn(e)
            })?;
        self.thread = Some(handle);

        info!(
            "discovery responder on UDP {addr} announcing {}:{}",
            advertisement.ip, advertisement.port
        );
        Ok(advertisement)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("discovery thread panicked");
            }
        }
    }
}

impl Drop for UdpDiscovery {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The receive loop executed on the discovery thread.
fn discovery_loop(socket: UdpSocket, reply: Vec<u8>, running: Arc<AtomicBool>) {
    let mut buf = [0u8; 1024];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                error!("discovery recv error: {e}");
                continue;
            }
        };

        match DiscoveryMessage::from_datagram(&buf[..len]) {
            Some(DiscoveryMessage::Discover) => {
                debug!("discovery request from {src}");
                if let Err(e) = socket.send_to(&reply, src) {
                    warn!("failed to answer discovery request from {src}: {e}");
                }
            }
            Some(DiscoveryMessage::Announce { .. }) => {}
            None => debug!("ignoring non-discovery datagram from {src}"),
        }
    }

    info!("discovery responder stopped");
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// The IPv4 address of the interface holding the default route.
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick a source
/// address.  Falls back to loopback when there is no route.
pub fn local_ip() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
