//! Session Registry: every connected session, whatever its transport.
//!
//! The registry is the only owner of session state.  Transports hold a
//! [`SessionId`] and an `Arc<dyn SessionLink>`; everything else (auth state,
//! bound device, liveness, mute hold) lives here behind one `RwLock`.
//!
//! # Broadcast set
//!
//! Only `Authenticated` sessions receive [`broadcast`](SessionRegistry::broadcast)
//! messages and appear in [`ConnectionInfo`].  A new snapshot is published on
//! a `watch` channel whenever that set (or a member's liveness) changes, so a
//! UI can follow connections without polling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use keymote_core::protocol::codec::ProtocolError;
use keymote_core::protocol::messages::ServerMessage;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::domain::session::{AuthState, ClientInfo, ConnectionInfo, SessionId, TransportKind};

/// Errors from sending to a session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("session transport is closed")]
    Closed,

    #[error("no open session for {0}")]
    UnknownSession(String),

    #[error("failed to serialize message: {0}")]
    Serialize(#[from] ProtocolError),
}

/// One transport's half of a session: how to reach the remote.
///
/// Sends are fire-and-forget: an implementation queues the message and
/// returns without waiting for the network.
pub trait SessionLink: Send + Sync {
    /// Which carrier this link uses.
    fn kind(&self) -> TransportKind;

    /// Queues one message for the remote.
    fn send(&self, msg: &ServerMessage) -> Result<(), TransportError>;

    /// Sends a liveness ping the remote must answer with a pong.
    fn ping(&self) -> Result<(), TransportError>;

    /// Closes the transport.  Idempotent.
    fn close(&self);

    /// Returns `false` once the transport has closed.
    fn is_open(&self) -> bool;
}

struct Entry {
    link: Arc<dyn SessionLink>,
    auth: AuthState,
    device_id: Option<String>,
    last_seen_at: Instant,
    alive: bool,
    holds_mute: bool,
}

/// What the registry knew about a session when it was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedSession {
    pub id: SessionId,
    pub device_id: Option<String>,
    pub was_authenticated: bool,
    /// The session held a mute reference that the caller must release.
    pub held_mute: bool,
}

/// Thread-safe registry of live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Entry>>,
    info: watch::Sender<ConnectionInfo>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (info, _) = watch::channel(ConnectionInfo::default());
        Self {
            sessions: RwLock::new(HashMap::new()),
            info,
        }
    }

    /// Adds a session for a freshly connected transport.
    ///
    /// With `auth_required == false` the session starts `Authenticated` and
    /// joins the broadcast set immediately.
    pub async fn register(&self, link: Arc<dyn SessionLink>, auth_required: bool) -> SessionId {
        let id = SessionId::new();
        let auth = if auth_required {
            AuthState::AwaitingAuth
        } else {
            AuthState::Authenticated
        };
        let transport = link.kind();
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            id,
            Entry {
                link,
                auth,
                device_id: None,
                last_seen_at: Instant::now(),
                alive: true,
                holds_mute: false,
            },
        );
        info!("session {id} connected over {transport} ({} total)", sessions.len());
        if auth == AuthState::Authenticated {
            self.publish(&sessions);
        }
        id
    }

    /// Removes a session.  Returns `None` if it was already gone.
    pub async fn remove(&self, id: SessionId) -> Option<RemovedSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.remove(&id)?;
        info!("session {id} disconnected ({} remaining)", sessions.len());
        let removed = removed_from(id, entry);
        if removed.was_authenticated {
            self.publish(&sessions);
        }
        Some(removed)
    }

    /// Auth state of a session, `None` if unknown.
    pub async fn auth_state(&self, id: SessionId) -> Option<AuthState> {
        self.sessions.read().await.get(&id).map(|e| e.auth)
    }

    pub async fn is_authenticated(&self, id: SessionId) -> bool {
        self.auth_state(id).await == Some(AuthState::Authenticated)
    }

    /// Device the session is bound to, if any.
    pub async fn device_id(&self, id: SessionId) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(&id)
            .and_then(|e| e.device_id.clone())
    }

    /// Moves a session to `Authenticated`, binding `device_id` when given.
    /// Returns `false` if the session is gone.
    pub async fn authenticate(&self, id: SessionId, device_id: Option<String>) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(&id) else {
            return false;
        };
        entry.auth = AuthState::Authenticated;
        if device_id.is_some() {
            entry.device_id = device_id;
        }
        debug!("session {id} authenticated (device {:?})", entry.device_id);
        self.publish(&sessions);
        true
    }

    /// Returns every session bound to `device_id` to `AwaitingAuth`.
    ///
    /// Returns the affected sessions and whether each held a mute reference
    /// (which is cleared here and must be released by the caller).
    pub async fn deauthenticate_device(&self, device_id: &str) -> Vec<(SessionId, bool)> {
        let mut sessions = self.sessions.write().await;
        let mut affected = Vec::new();
        for (id, entry) in sessions.iter_mut() {
            if entry.device_id.as_deref() == Some(device_id)
                && entry.auth == AuthState::Authenticated
            {
                entry.auth = AuthState::AwaitingAuth;
                affected.push((*id, std::mem::take(&mut entry.holds_mute)));
            }
        }
        if !affected.is_empty() {
            self.publish(&sessions);
        }
        affected
    }

    /// Records a liveness reply.
    pub async fn mark_alive(&self, id: SessionId) {
        if let Some(entry) = self.sessions.write().await.get_mut(&id) {
            entry.alive = true;
            entry.last_seen_at = Instant::now();
        }
    }

    /// Records that a message arrived, without counting it as a heartbeat reply.
    pub async fn touch(&self, id: SessionId) {
        if let Some(entry) = self.sessions.write().await.get_mut(&id) {
            entry.last_seen_at = Instant::now();
        }
    }

    /// Sets whether a session holds a mute reference.
    ///
    /// Returns `true` only if the flag changed, i.e. the caller should acquire
    /// or release one hold.
    pub async fn set_mute_hold(&self, id: SessionId, hold: bool) -> bool {
        match self.sessions.write().await.get_mut(&id) {
            Some(entry) if entry.holds_mute != hold => {
                entry.holds_mute = hold;
                true
            }
            _ => false,
        }
    }

    /// Sends one message to one session.
    pub async fn send(&self, id: SessionId, msg: &ServerMessage) -> Result<(), TransportError> {
        let link = self
            .sessions
            .read()
            .await
            .get(&id)
            .map(|e| Arc::clone(&e.link))
            .ok_or_else(|| TransportError::UnknownSession(id.to_string()))?;
        link.send(msg)
    }

    /// Sends to the session bound to `device_id`, preferring an open peer
    /// session over an open socket session.
    pub async fn send_to_device(
        &self,
        device_id: &str,
        msg: &ServerMessage,
    ) -> Result<SessionId, TransportError> {
        let (id, link) = {
            let sessions = self.sessions.read().await;
            let mut candidates: Vec<(SessionId, &Entry)> = sessions
                .iter()
                .filter(|(_, e)| e.device_id.as_deref() == Some(device_id) && e.link.is_open())
                .map(|(id, e)| (*id, e))
                .collect();
            candidates.sort_by_key(|(_, e)| match e.link.kind() {
                TransportKind::Peer => 0,
                TransportKind::Socket => 1,
            });
            candidates
                .first()
                .map(|(id, e)| (*id, Arc::clone(&e.link)))
                .ok_or_else(|| TransportError::UnknownSession(device_id.to_string()))?
        };
        link.send(msg)?;
        Ok(id)
    }

    /// Sends `msg` to every authenticated session.  Returns how many links
    /// accepted it.
    pub async fn broadcast(&self, msg: &ServerMessage) -> usize {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|e| e.auth == AuthState::Authenticated)
            .filter(|e| e.link.send(msg).is_ok())
            .count()
    }

    /// Number of authenticated sessions.
    pub async fn authenticated_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|e| e.auth == AuthState::Authenticated)
            .count()
    }

    /// Number of sessions in any state.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// One heartbeat pass under a single write lock.
    ///
    /// Sessions that have not answered since the previous sweep are closed
    /// and removed; every other session is marked not-alive and pinged.
    pub async fn sweep(&self) -> Vec<RemovedSession> {
        let mut sessions = self.sessions.write().await;

        let dead: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, e)| !e.alive || !e.link.is_open())
            .map(|(id, _)| *id)
            .collect();

        let mut removed = Vec::with_capacity(dead.len());
        for id in dead {
            if let Some(entry) = sessions.remove(&id) {
                info!(
                    "session {id} missed its heartbeat (last seen {:?} ago); terminating",
                    entry.last_seen_at.elapsed()
                );
                entry.link.close();
                removed.push(removed_from(id, entry));
            }
        }

        for (id, entry) in sessions.iter_mut() {
            entry.alive = false;
            if let Err(e) = entry.link.ping() {
                debug!("heartbeat ping to session {id} failed: {e}");
            }
        }

        if removed.iter().any(|r| r.was_authenticated) {
            self.publish(&sessions);
        }
        removed
    }

    /// Snapshot of the authenticated sessions.
    pub async fn connection_info(&self) -> ConnectionInfo {
        snapshot(&*self.sessions.read().await)
    }

    /// Watches [`ConnectionInfo`] snapshots.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionInfo> {
        self.info.subscribe()
    }

    /// Closes every transport and empties the registry.
    pub async fn close_all(&self) -> Vec<RemovedSession> {
        let mut sessions = self.sessions.write().await;
        let removed: Vec<RemovedSession> = sessions
            .drain()
            .map(|(id, entry)| {
                entry.link.close();
                removed_from(id, entry)
            })
            .collect();
        self.publish(&sessions);
        removed
    }

    fn publish(&self, sessions: &HashMap<SessionId, Entry>) {
        let next = snapshot(sessions);
        self.info.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

fn snapshot(sessions: &HashMap<SessionId, Entry>) -> ConnectionInfo {
    let mut clients: Vec<ClientInfo> = sessions
        .iter()
        .filter(|(_, e)| e.auth == AuthState::Authenticated)
        .map(|(id, e)| ClientInfo {
            id: *id,
            alive: e.alive,
            transport: e.link.kind(),
            device_id: e.device_id.clone(),
        })
        .collect();
    clients.sort_by_key(|c| c.id);
    ConnectionInfo::from_clients(clients)
}

fn removed_from(id: SessionId, entry: Entry) -> RemovedSession {
    RemovedSession {
        id,
        device_id: entry.device_id,
        was_authenticated: entry.auth == AuthState::Authenticated,
        held_mute: entry.holds_mute,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
