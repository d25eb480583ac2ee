//! WebSocket transport: accept loop and per-session tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting connections and upgrading each one to a WebSocket.
//! 3. Registering the session with the [`MessageRouter`] (which greets it).
//! 4. Running two halves per session:
//!    - **Reader**: text frames → `router.on_text`, pong frames → liveness.
//!    - **Writer**: drains an unbounded channel fed by [`SocketSession`],
//!      so `send()` never waits on the network.
//! 5. Telling the router when the session ends, however it ends.
//!
//! Shutdown is triggered by the shared `running` flag, polled every 200 ms by
//! the accept loop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use keymote_core::protocol::codec::encode_message;
use keymote_core::protocol::messages::ServerMessage;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, error, info, warn};

use crate::application::registry::{SessionLink, TransportError};
use crate::application::router::MessageRouter;
use crate::domain::session::TransportKind;

/// How often the accept loop re-checks the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `addr` and serves WebSocket sessions until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_server(
    addr: SocketAddr,
    router: Arc<MessageRouter>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {addr}"))?;
    info!("WebSocket server listening on {addr}");
    serve(listener, router, running).await;
    Ok(())
}

/// Accept loop over an already-bound listener.
pub async fn serve(listener: TcpListener, router: Arc<MessageRouter>, running: Arc<AtomicBool>) {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping WebSocket accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new connection from {peer_addr}");
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    handle_socket_session(stream, peer_addr, router).await;
                });
            }
            Ok(Err(e)) => error!("accept error: {e}"),
            Err(_) => {}
        }
    }
}

// ── Session link ──────────────────────────────────────────────────────────────

/// Frames queued for the writer task.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Ping,
    Close,
}

/// The socket half of a session, as seen by the registry.
pub struct SocketSession {
    tx: mpsc::UnboundedSender<Outbound>,
    open: AtomicBool,
}

impl SocketSession {
    fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            tx,
            open: AtomicBool::new(true),
        }
    }

    fn queue(&self, frame: Outbound) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }
}

impl SessionLink for SocketSession {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn send(&self, msg: &ServerMessage) -> Result<(), TransportError> {
        let text = encode_message(msg)?;
        self.queue(Outbound::Text(text))
    }

    fn ping(&self) -> Result<(), TransportError> {
        self.queue(Outbound::Ping)
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.tx.send(Outbound::Close);
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_socket_session(stream: TcpStream, peer_addr: SocketAddr, router: Arc<MessageRouter>) {
    match run_session(stream, peer_addr, router).await {
        Ok(()) => debug!("connection {peer_addr} closed"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    router: Arc<MessageRouter>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let link = Arc::new(SocketSession::new(tx));

    // ── Writer ────────────────────────────────────────────────────────────────
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let result = match frame {
                Outbound::Text(text) => ws_tx.send(WsMessage::Text(text)).await,
                Outbound::Ping => ws_tx.send(WsMessage::Ping(Vec::new())).await,
                Outbound::Close => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            };
            if let Err(e) = result {
                debug!("WebSocket write failed: {e}");
                break;
            }
        }
    });

    let id = router.connect(link.clone()).await;
    info!("session {id} connected from {peer_addr}");

    // ── Reader ────────────────────────────────────────────────────────────────
    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            _ = &mut writer => {
                debug!("session {id}: writer finished");
                break;
            }
        };

        match frame {
            Some(Ok(WsMessage::Text(text))) => router.on_text(id, &text).await,
            Some(Ok(WsMessage::Pong(_))) => router.on_transport_pong(id).await,
            Some(Ok(WsMessage::Close(_))) => {
                debug!("session {id}: close frame received");
                break;
            }
            Some(Ok(WsMessage::Binary(_))) => {
                warn!("session {id}: unexpected binary frame (ignored)");
            }
            // Pings are answered by tungstenite on the next write.
            Some(Ok(WsMessage::Ping(_) | WsMessage::Frame(_))) => {}
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) | None => {
                debug!("session {id}: stream ended");
                break;
            }
            Some(Err(e)) => {
                warn!("session {id}: WebSocket error: {e}");
                break;
            }
        }
    }

    router.disconnect(id).await;
    link.close();
    writer.abort();
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
