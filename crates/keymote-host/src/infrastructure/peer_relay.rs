//! Local relay for an external peer-to-peer (WebRTC) sidecar.
//!
//! The sidecar terminates WebRTC and opens one loopback TCP connection per
//! data channel.  On that connection each message is one JSON value per
//! line, in both directions:
//!
//! ```text
//! sidecar → host:  {"type":"auth","token":"...","deviceId":"phone"}\n
//! host → sidecar:  {"type":"auth_result","success":true}\n
//! ```
//!
//! Each connection becomes one peer session via [`attach_peer`].  Closing the
//! session (for example after a missed heartbeat) closes the connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::application::registry::TransportError;
use crate::application::router::MessageRouter;
use crate::infrastructure::peer::{attach_peer, PeerChannel};

const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Binds `addr` and relays peer sessions until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_relay(
    addr: SocketAddr,
    router: Arc<MessageRouter>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind peer relay on {addr}"))?;
    info!("peer relay listening on {addr}");
    serve_relay(listener, router, running).await;
    Ok(())
}

/// Accept loop over an already-bound listener.
pub async fn serve_relay(
    listener: TcpListener,
    router: Arc<MessageRouter>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("peer relay connection from {peer_addr}");
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    run_relay_connection(stream, router).await;
                    debug!("peer relay connection {peer_addr} closed");
                });
            }
            Ok(Err(e)) => error!("peer relay accept error: {e}"),
            Err(_) => {}
        }
    }
    info!("shutdown flag set; stopping peer relay");
}

/// [`PeerChannel`] over one relay connection.
struct RelayChannel {
    /// `None` asks the writer to shut the connection down.
    tx: mpsc::UnboundedSender<Option<Value>>,
    open: AtomicBool,
    closed: Notify,
}

impl PeerChannel for RelayChannel {
    fn send(&self, value: Value) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.tx.send(Some(value)).map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.tx.send(None);
            self.closed.notify_one();
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

async fn run_relay_connection(stream: TcpStream, router: Arc<MessageRouter>) {
    let (read_half, mut write_half) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Option<Value>>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<Value>();
    let channel = Arc::new(RelayChannel {
        tx: out_tx,
        open: AtomicBool::new(true),
        closed: Notify::new(),
    });

    let writer = tokio::spawn(async move {
        while let Some(Some(value)) = out_rx.recv().await {
            let mut line = value.to_string();
            line.push('\n');
            if let Err(e) = write_half.write_all(line.as_bytes()).await {
                debug!("peer relay write failed: {e}");
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let reader_channel = Arc::clone(&channel);
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = reader_channel.closed.notified() => break,
            };
            match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<Value>(&line) {
                    Ok(value) => {
                        if in_tx.send(value).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("peer relay: dropping malformed message: {e}"),
                },
                Ok(None) => break,
                Err(e) => {
                    debug!("peer relay read failed: {e}");
                    break;
                }
            }
        }
        // Dropping `in_tx` here ends the session.
    });

    attach_peer(router, channel.clone(), in_rx).await;
    channel.close();
    reader.abort();
    let _ = writer.await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_channel_close_queues_shutdown_once() {
        // Arrange
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = RelayChannel {
            tx,
            open: AtomicBool::new(true),
            closed: Notify::new(),
        };

        // Act
        channel.send(Value::from(1)).unwrap();
        channel.close();
        channel.close();

        // Assert
        assert_eq!(rx.try_recv().unwrap(), Some(Value::from(1)));
        assert_eq!(rx.try_recv().unwrap(), None);
        assert!(rx.try_recv().is_err());
        assert!(channel.send(Value::Null).is_err());
    }
}
