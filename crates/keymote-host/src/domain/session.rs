//! Session identity and state types.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Opaque identifier generated when a transport connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The short form is enough to tell sessions apart in logs.
        let text = self.0.simple().to_string();
        f.write_str(&text[..8])
    }
}

impl SessionId {
    /// Full hyphenated form, used as the `clientId` on the wire.
    pub fn to_wire(&self) -> String {
        self.0.to_string()
    }
}

/// Which physical carrier a session arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Persistent WebSocket.
    Socket,
    /// Peer-to-peer data channel.
    Peer,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket => f.write_str("socket"),
            Self::Peer => f.write_str("peer"),
        }
    }
}

/// Authentication state of one session.
///
/// ```text
/// Connecting ──► AwaitingAuth ──► Authenticated
///      │
///      └──► (no PIN configured) Authenticated
/// ```
///
/// `Connecting` and `Rejected` are transport-level states: a session only
/// exists in the registry once its transport is up, and a rejected transport
/// never reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    AwaitingAuth,
    Authenticated,
}

/// One authenticated client as reported by `connection_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: SessionId,
    pub alive: bool,
    pub transport: TransportKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Snapshot of the authenticated sessions, published on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub connected: bool,
    pub client_count: usize,
    pub clients: Vec<ClientInfo>,
}

impl ConnectionInfo {
    /// Builds a snapshot from the authenticated clients.
    pub fn from_clients(clients: Vec<ClientInfo>) -> Self {
        Self {
            connected: !clients.is_empty(),
            client_count: clients.len(),
            clients,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
