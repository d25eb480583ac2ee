//! In-memory [`SessionLink`] for tests.
//!
//! A [`RecordingLink`] stands in for either transport: every message the host
//! sends is delivered, already typed, to the receiver returned by
//! [`RecordingLink::new`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use keymote_core::protocol::messages::ServerMessage;
use tokio::sync::mpsc;

use crate::application::registry::{SessionLink, TransportError};
use crate::domain::session::TransportKind;

/// A session link that records what was sent to it.
pub struct RecordingLink {
    kind: TransportKind,
    tx: mpsc::UnboundedSender<ServerMessage>,
    open: AtomicBool,
    pings: AtomicUsize,
}

impl RecordingLink {
    /// Creates an open link and the receiver of everything sent on it.
    pub fn new(kind: TransportKind) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                kind,
                tx,
                open: AtomicBool::new(true),
                pings: AtomicUsize::new(0),
            }),
            rx,
        )
    }

    /// Number of liveness pings sent.
    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

impl SessionLink for RecordingLink {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn send(&self, msg: &ServerMessage) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.tx.send(msg.clone()).map_err(|_| TransportError::Closed)
    }

    fn ping(&self) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
