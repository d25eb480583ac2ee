//! Peer transport: sessions carried by a peer-to-peer data channel.
//!
//! The WebRTC stack itself lives outside the host.  All the host needs from
//! it is an object-framed channel ([`PeerChannel`]) plus a stream of inbound
//! JSON values.  [`attach_peer`] turns that pair into a routed session that
//! behaves exactly like a WebSocket session.
//!
//! Unlike WebSockets, a data channel has no protocol-level ping, so the
//! heartbeat is an application `ping` message; the remote answers with
//! `pong`, which the router counts as a liveness reply.

use std::sync::Arc;

use keymote_core::protocol::codec::ProtocolError;
use keymote_core::protocol::messages::{timestamp_ms, ServerMessage};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::application::registry::{SessionLink, TransportError};
use crate::application::router::MessageRouter;
use crate::domain::session::{SessionId, TransportKind};

/// An open data channel that carries one JSON value per message.
pub trait PeerChannel: Send + Sync {
    /// Queues one value for the remote.
    fn send(&self, value: Value) -> Result<(), TransportError>;

    /// Closes the channel.  Idempotent.
    fn close(&self);

    fn is_open(&self) -> bool;
}

/// The peer half of a session, as seen by the registry.
pub struct PeerSession {
    channel: Arc<dyn PeerChannel>,
}

impl PeerSession {
    pub fn new(channel: Arc<dyn PeerChannel>) -> Self {
        Self { channel }
    }
}

impl SessionLink for PeerSession {
    fn kind(&self) -> TransportKind {
        TransportKind::Peer
    }

    fn send(&self, msg: &ServerMessage) -> Result<(), TransportError> {
        let value = serde_json::to_value(msg).map_err(ProtocolError::Encode)?;
        self.channel.send(value)
    }

    fn ping(&self) -> Result<(), TransportError> {
        self.send(&ServerMessage::Ping {
            time: timestamp_ms(),
        })
    }

    fn close(&self) {
        self.channel.close();
    }

    fn is_open(&self) -> bool {
        self.channel.is_open()
    }
}

/// Drives one peer session until `inbound` ends or the channel closes.
///
/// Registers the session (the greeting goes out on `channel`), routes every
/// inbound value, and disconnects the session on the way out.  Returns the
/// session id it ran under.
pub async fn attach_peer(
    router: Arc<MessageRouter>,
    channel: Arc<dyn PeerChannel>,
    mut inbound: mpsc::UnboundedReceiver<Value>,
) -> SessionId {
    let link = Arc::new(PeerSession::new(Arc::clone(&channel)));
    let id = router.connect(link).await;
    info!("peer session {id} attached");

    while let Some(value) = inbound.recv().await {
        if !channel.is_open() {
            break;
        }
        router.on_message(id, value).await;
    }

    debug!("peer session {id} detached");
    router.disconnect(id).await;
    channel.close();
    id
}

// ── Tests ─────────────────────────────────────────────────────────────────────
