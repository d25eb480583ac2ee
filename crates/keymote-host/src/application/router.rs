//! Transport Router: one entry point for messages from either transport.
//!
//! The WebSocket server and the peer-channel driver both hand every inbound
//! JSON value to [`MessageRouter::on_message`].  From here on nothing knows
//! or cares which carrier a session uses.
//!
//! # Routing table
//!
//! | Type                                   | Before auth            | After auth                          |
//! |----------------------------------------|------------------------|-------------------------------------|
//! | `ping`                                 | `pong` (echo `time`)   | `pong` (echo `time`)                |
//! | `pong`                                 | mark alive             | mark alive                          |
//! | `auth`                                 | Auth Gate              | Auth Gate                           |
//! | `text` `char` `key` `shortcut` `mouse` | `error` (no side effect)| translate → worker → `ack`         |
//! | `screen`                               | `error`                | broadcaster start / stop            |
//! | `audio`                                | `error`                | acquire / release one mute hold     |
//! | unknown type                           | logged, dropped        | logged, dropped                     |
//!
//! # Acks
//!
//! An input message is submitted to its worker *before* the next message is
//! read, which keeps per-worker order equal to arrival order.  The worker's
//! reply is awaited on a separate task that then sends `ack{id, success}`,
//! so a slow worker never stalls the session's read loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use keymote_core::protocol::codec::{decode_client_value, parse_value, ProtocolError};
use keymote_core::protocol::messages::{timestamp_ms, ClientMessage, ServerMessage, StreamAction};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::application::auth::{AuthFailure, AuthGate, AuthRequest};
use crate::application::broadcaster::FrameBroadcaster;
use crate::application::credentials::TokenStoreError;
use crate::application::mute::MuteController;
use crate::application::registry::{RemovedSession, SessionLink, SessionRegistry, TransportError};
use crate::application::translate::InputPipeline;
use crate::domain::input::InputEvent;
use crate::domain::session::{ConnectionInfo, SessionId};

/// Message types an unauthenticated session may send.
const PRE_AUTH_TYPES: &[&str] = &["auth", "ping", "pong"];

/// Routes inbound messages and owns the host's use cases.
pub struct MessageRouter {
    registry: Arc<SessionRegistry>,
    auth: AuthGate,
    input: InputPipeline,
    mute: Arc<MuteController>,
    frames: Arc<FrameBroadcaster>,
    /// Ack ids for input messages that carry no `id`.
    ack_counter: AtomicU64,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        auth: AuthGate,
        input: InputPipeline,
        mute: Arc<MuteController>,
        frames: Arc<FrameBroadcaster>,
    ) -> Self {
        Self {
            registry,
            auth,
            input,
            mute,
            frames,
            ack_counter: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<FrameBroadcaster> {
        &self.frames
    }

    pub fn mute(&self) -> &Arc<MuteController> {
        &self.mute
    }

    pub fn auth_gate(&self) -> &AuthGate {
        &self.auth
    }

    // ── Session lifecycle ─────────────────────────────────────────────────────

    /// Registers a freshly connected transport and sends the greeting.
    pub async fn connect(&self, link: Arc<dyn SessionLink>) -> SessionId {
        let auth_required = self.auth.auth_required();
        let id = self.registry.register(link, auth_required).await;
        let greeting = ServerMessage::Connected {
            client_id: id.to_wire(),
            server_time: timestamp_ms(),
            auth_required,
            computer_name: self.auth.computer_name().to_string(),
        };
        if let Err(e) = self.registry.send(id, &greeting).await {
            warn!("could not greet session {id}: {e}");
        }
        id
    }

    /// Forgets a session whose transport closed, releasing its mute hold.
    /// The screen stream stops once no authenticated session is left.
    pub async fn disconnect(&self, id: SessionId) {
        if let Some(removed) = self.registry.remove(id).await {
            self.release_holds(std::slice::from_ref(&removed)).await;
            self.stop_stream_if_unwatched().await;
        }
    }

    /// A transport-level pong (WebSocket pong frame) arrived.
    pub async fn on_transport_pong(&self, id: SessionId) {
        self.registry.mark_alive(id).await;
    }

    // ── Inbound messages ──────────────────────────────────────────────────────

    /// Handles one text frame.  Malformed JSON is logged and dropped.
    pub async fn on_text(&self, id: SessionId, text: &str) {
        match parse_value(text) {
            Ok(value) => self.on_message(id, value).await,
            Err(e) => warn!("session {id}: dropping malformed message: {e}"),
        }
    }

    /// Handles one inbound JSON message from either transport.
    pub async fn on_message(&self, id: SessionId, value: Value) {
        self.registry.touch(id).await;

        let msg = match decode_client_value(value) {
            Ok(msg) => msg,
            Err(ProtocolError::UnknownMessageType(kind)) => {
                warn!("session {id}: ignoring unknown message type {kind:?}");
                return;
            }
            Err(ProtocolError::InvalidPayload { kind, source }) => {
                debug!("session {id}: invalid {kind} message: {source}");
                let reply = if PRE_AUTH_TYPES.contains(&kind.as_str())
                    || self.registry.is_authenticated(id).await
                {
                    ServerMessage::Error {
                        error: format!("Invalid {kind} message"),
                    }
                } else {
                    ServerMessage::not_authenticated()
                };
                self.reply(id, &reply).await;
                return;
            }
            Err(e) => {
                warn!("session {id}: dropping message: {e}");
                return;
            }
        };

        match &msg {
            ClientMessage::Ping { time } => {
                self.reply(id, &ServerMessage::Pong { time: *time }).await;
                return;
            }
            ClientMessage::Pong { .. } => {
                self.registry.mark_alive(id).await;
                return;
            }
            ClientMessage::Auth { .. } => {
                if let Some(request) = AuthRequest::from_message(&msg) {
                    self.auth.handle_auth(&self.registry, id, &request).await;
                }
                return;
            }
            _ => {}
        }

        if !self.registry.is_authenticated(id).await {
            debug!("session {id}: {} rejected before auth", msg.kind());
            self.reply(id, &ServerMessage::not_authenticated()).await;
            return;
        }

        match &msg {
            ClientMessage::Screen { action } => match action {
                StreamAction::Start => self.frames.start().await,
                StreamAction::Stop => self.frames.stop().await,
            },
            ClientMessage::Audio { action } => {
                let hold = matches!(action, StreamAction::Start);
                if self.registry.set_mute_hold(id, hold).await {
                    // Submitted here to keep hold order; errors are logged by
                    // the mute controller.
                    let done = self.mute.change(hold);
                    tokio::spawn(async move {
                        let _ = done.await;
                    });
                }
            }
            _ => self.dispatch_input(id, &msg),
        }
    }

    fn dispatch_input(&self, id: SessionId, msg: &ClientMessage) {
        let Some(event) = InputEvent::from_message(msg) else {
            return;
        };
        let ack_id = msg
            .ack_id()
            .unwrap_or_else(|| self.ack_counter.fetch_add(1, Ordering::Relaxed) + 1);
        let registry = Arc::clone(&self.registry);

        match self.input.dispatch(&event) {
            Ok(done) => {
                tokio::spawn(async move {
                    let success = match done.await {
                        Ok(()) => true,
                        Err(e) => {
                            debug!("session {id}: input {ack_id} failed: {e}");
                            false
                        }
                    };
                    let _ = registry
                        .send(id, &ServerMessage::Ack { id: ack_id, success })
                        .await;
                });
            }
            Err(e) => {
                warn!("session {id}: {e}");
                tokio::spawn(async move {
                    let _ = registry
                        .send(id, &ServerMessage::Ack { id: ack_id, success: false })
                        .await;
                });
            }
        }
    }

    async fn reply(&self, id: SessionId, msg: &ServerMessage) {
        if let Err(e) = self.registry.send(id, msg).await {
            debug!("session {id}: could not send {}: {e}", msg.kind());
        }
    }

    // ── Outbound / admin ──────────────────────────────────────────────────────

    /// Sends one message to one session.
    pub async fn send(&self, id: SessionId, msg: &ServerMessage) -> Result<(), TransportError> {
        self.registry.send(id, msg).await
    }

    /// Sends to a device, preferring its peer session over its socket session.
    pub async fn send_to_device(
        &self,
        device_id: &str,
        msg: &ServerMessage,
    ) -> Result<SessionId, TransportError> {
        self.registry.send_to_device(device_id, msg).await
    }

    /// Deletes a device's token and drops its live sessions back to
    /// `AwaitingAuth`.  Returns whether a token existed.
    pub async fn revoke_device(&self, device_id: &str) -> Result<bool, TokenStoreError> {
        let existed = self.auth.revoke(device_id)?;
        let affected = self.sign_out_device(device_id).await;
        info!("revoked device {device_id} (token existed: {existed}, sessions affected: {affected})");
        Ok(existed)
    }

    /// Signs out the live sessions of devices whose token was deleted by
    /// another process.  Returns how many sessions were affected.
    pub async fn sync_revocations(&self) -> Result<usize, TokenStoreError> {
        let mut affected = 0;
        for device_id in self.auth.take_external_removals()? {
            let sessions = self.sign_out_device(&device_id).await;
            info!("token of device {device_id} was revoked elsewhere (sessions affected: {sessions})");
            affected += sessions;
        }
        Ok(affected)
    }

    /// Returns the device's sessions to `AwaitingAuth` with a `Token revoked`
    /// notice.  Returns how many sessions that was.
    async fn sign_out_device(&self, device_id: &str) -> usize {
        let affected = self.registry.deauthenticate_device(device_id).await;
        for (id, held_mute) in &affected {
            self.reply(*id, &AuthFailure::Revoked.to_message()).await;
            if *held_mute {
                let _ = self.mute.set_mute(false).await;
            }
        }
        if !affected.is_empty() {
            self.stop_stream_if_unwatched().await;
        }
        affected.len()
    }

    pub async fn connection_info(&self) -> ConnectionInfo {
        self.registry.connection_info().await
    }

    /// One heartbeat sweep; releases the mute holds of pruned sessions.
    /// Returns how many sessions were terminated.
    pub async fn heartbeat_sweep(&self) -> usize {
        let removed = self.registry.sweep().await;
        self.release_holds(&removed).await;
        if !removed.is_empty() {
            self.stop_stream_if_unwatched().await;
        }
        removed.len()
    }

    /// Stops streaming, closes every session, stops the input workers, and
    /// leaves the speakers unmuted.
    pub async fn shutdown(&self) {
        self.frames.stop().await;
        let removed = self.registry.close_all().await;
        info!("closed {} session(s)", removed.len());
        self.input.stop().await;
        self.mute.cleanup().await;
    }

    async fn stop_stream_if_unwatched(&self) {
        if !self.registry.connection_info().await.connected {
            self.frames.stop().await;
        }
    }

    async fn release_holds(&self, removed: &[RemovedSession]) {
        for session in removed.iter().filter(|r| r.held_mute) {
            debug!("releasing mute hold of session {}", session.id);
            let _ = self.mute.set_mute(false).await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::application::auth::AuthPolicy;
    use crate::application::broadcaster::{CaptureError, CapturedFrame, ScreenCapture};
    use crate::application::credentials::MemoryCredentialStore;
    use crate::application::worker::{WorkerLauncher, WorkerProcessManager};
    use crate::domain::command::WorkerKind;
    use crate::domain::config::WorkerTimings;
    use crate::domain::session::TransportKind;
    use crate::infrastructure::mock_link::RecordingLink;
    use crate::infrastructure::worker::mock::{MockLauncher, ScriptedLauncher};

    struct NoFrames;

    #[async_trait::async_trait]
    impl ScreenCapture for NoFrames {
        async fn capture(&self) -> Result<Option<CapturedFrame>, CaptureError> {
            Ok(None)
        }
    }

    struct Harness {
        router: MessageRouter,
        launcher: Arc<ScriptedLauncher>,
    }

    fn harness(pin: Option<&str>) -> Harness {
        harness_with_mute(pin, None)
    }

    /// `mute` replaces the self-answering mute worker.
    fn harness_with_mute(pin: Option<&str>, mute: Option<Arc<dyn WorkerLauncher>>) -> Harness {
        let launcher = ScriptedLauncher::ok();
        let timings = WorkerTimings {
            ready_timeout: Duration::from_millis(500),
            response_timeout: Duration::from_millis(500),
        };
        let worker =
            |kind| WorkerProcessManager::new(kind, launcher.clone(), timings);
        let registry = Arc::new(SessionRegistry::new());
        let router = MessageRouter::new(
            Arc::clone(&registry),
            AuthGate::new(
                AuthPolicy {
                    pin: pin.map(str::to_string),
                    computer_name: "Desk".to_string(),
                },
                Arc::new(MemoryCredentialStore::new()),
            ),
            InputPipeline::new(worker(WorkerKind::Keyboard), worker(WorkerKind::Mouse)),
            Arc::new(MuteController::new(match mute {
                Some(mute) => WorkerProcessManager::new(WorkerKind::Mute, mute, timings),
                None => worker(WorkerKind::Mute),
            })),
            Arc::new(FrameBroadcaster::new(registry, Arc::new(NoFrames), 5)),
        );
        Harness { router, launcher }
    }

    async fn connect(router: &MessageRouter) -> (SessionId, UnboundedReceiver<ServerMessage>) {
        let (link, mut rx) = RecordingLink::new(TransportKind::Socket);
        let id = router.connect(link).await;
        let greeting = rx.recv().await.unwrap();
        assert_eq!(greeting.kind(), "connected");
        (id, rx)
    }

    #[tokio::test]
    async fn test_greeting_reports_auth_requirement_and_name() {
        let h = harness(Some("1234"));
        let (link, mut rx) = RecordingLink::new(TransportKind::Peer);

        let id = h.router.connect(link).await;

        match rx.recv().await.unwrap() {
            ServerMessage::Connected {
                client_id,
                auth_required,
                computer_name,
                ..
            } => {
                assert_eq!(client_id, id.to_wire());
                assert!(auth_required);
                assert_eq!(computer_name, "Desk");
            }
            other => panic!("expected connected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ping_is_answered_before_auth_with_echoed_time() {
        let h = harness(Some("1234"));
        let (id, mut rx) = connect(&h.router).await;

        h.router
            .on_message(id, json!({"type": "ping", "time": 42}))
            .await;

        assert_eq!(rx.recv().await.unwrap(), ServerMessage::Pong { time: 42 });
    }

    #[tokio::test]
    async fn test_input_before_auth_is_rejected_without_side_effects() {
        // Arrange
        let h = harness(Some("1234"));
        let (id, mut rx) = connect(&h.router).await;

        // Act
        for msg in [
            json!({"type": "key", "key": "Enter"}),
            json!({"type": "text", "text": "hi"}),
            json!({"type": "mouse", "action": "left"}),
            json!({"type": "screen", "action": "start"}),
            json!({"type": "audio", "action": "start"}),
        ] {
            h.router.on_message(id, msg).await;
        }

        // Assert
        for _ in 0..5 {
            assert_eq!(
                rx.recv().await.unwrap(),
                ServerMessage::not_authenticated()
            );
        }
        assert_eq!(h.launcher.launch_count(), 0, "no worker was touched");
        assert!(!h.router.broadcaster().status().await.streaming);
        assert!(!h.router.mute().is_muted());
    }

    #[tokio::test]
    async fn test_authenticated_input_reaches_worker_and_is_acked() {
        // Arrange
        let h = harness(None);
        let (id, mut rx) = connect(&h.router).await;

        // Act
        h.router
            .on_message(id, json!({"type": "key", "key": "Enter", "id": 7}))
            .await;

        // Assert
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::Ack { id: 7, success: true }
        );
        assert_eq!(h.launcher.commands(), vec!["key,13"]);
    }

    #[tokio::test]
    async fn test_ack_ids_come_from_counter_when_absent() {
        let h = harness(None);
        let (id, mut rx) = connect(&h.router).await;

        h.router
            .on_message(id, json!({"type": "mouse", "action": "left"}))
            .await;
        let first = rx.recv().await.unwrap();
        h.router
            .on_message(id, json!({"type": "mouse", "action": "right"}))
            .await;
        let second = rx.recv().await.unwrap();

        assert_eq!(first, ServerMessage::Ack { id: 1, success: true });
        assert_eq!(second, ServerMessage::Ack { id: 2, success: true });
    }

    #[tokio::test]
    async fn test_unknown_key_acks_failure_without_submitting() {
        let h = harness(None);
        let (id, mut rx) = connect(&h.router).await;

        h.router
            .on_message(id, json!({"type": "key", "key": "Hyper", "id": 3}))
            .await;

        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::Ack { id: 3, success: false }
        );
        assert_eq!(h.launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_pin_auth_then_input_flows() {
        // Arrange
        let h = harness(Some("1234"));
        let (id, mut rx) = connect(&h.router).await;

        // Act
        h.router
            .on_message(id, json!({"type": "auth", "pin": "1234"}))
            .await;
        let auth = rx.recv().await.unwrap();
        h.router
            .on_message(id, json!({"type": "text", "text": "ok", "id": 1}))
            .await;
        let ack = rx.recv().await.unwrap();

        // Assert
        assert!(matches!(auth, ServerMessage::AuthResult { success: true, .. }));
        assert_eq!(ack, ServerMessage::Ack { id: 1, success: true });
        assert_eq!(h.launcher.commands(), vec![r#"text,"ok""#]);
    }

    #[tokio::test]
    async fn test_unknown_type_is_dropped_silently() {
        let h = harness(None);
        let (id, mut rx) = connect(&h.router).await;

        h.router
            .on_message(id, json!({"type": "teleport", "to": "mars"}))
            .await;
        h.router.on_text(id, "{not json").await;
        h.router
            .on_message(id, json!({"type": "ping", "time": 1}))
            .await;

        assert_eq!(rx.recv().await.unwrap(), ServerMessage::Pong { time: 1 });
    }

    #[tokio::test]
    async fn test_invalid_payload_of_known_type_is_reported() {
        let h = harness(None);
        let (id, mut rx) = connect(&h.router).await;

        h.router
            .on_message(id, json!({"type": "mouse", "action": "wiggle"}))
            .await;

        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::Error {
                error: "Invalid mouse message".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_audio_hold_is_released_on_disconnect() {
        // Arrange
        let h = harness(None);
        let (id, _rx) = connect(&h.router).await;
        h.router
            .on_message(id, json!({"type": "audio", "action": "start"}))
            .await;
        h.router
            .on_message(id, json!({"type": "audio", "action": "start"}))
            .await;
        let muted = h.router.mute().hold_count();

        // Act
        h.router.disconnect(id).await;

        // Assert
        assert_eq!(muted, 1, "one session holds at most one reference");
        assert!(!h.router.mute().is_muted());
        assert_eq!(h.launcher.commands(), vec!["MUTE", "UNMUTE"]);
    }

    #[tokio::test]
    async fn test_screen_start_and_stop_drive_broadcaster() {
        let h = harness(None);
        let (id, _rx) = connect(&h.router).await;

        h.router
            .on_message(id, json!({"type": "screen", "action": "start"}))
            .await;
        let started = h.router.broadcaster().status().await.streaming;
        h.router
            .on_message(id, json!({"type": "screen", "action": "stop"}))
            .await;

        assert!(started);
        assert!(!h.router.broadcaster().status().await.streaming);
    }

    #[tokio::test]
    async fn test_revoke_device_returns_sessions_to_awaiting_auth() {
        // Arrange
        let h = harness(Some("1234"));
        let (id, mut rx) = connect(&h.router).await;
        h.router
            .on_message(
                id,
                json!({"type": "auth", "pin": "1234", "deviceId": "phone", "rememberMe": true}),
            )
            .await;
        rx.recv().await.unwrap();

        // Act
        let existed = h.router.revoke_device("phone").await.unwrap();
        h.router
            .on_message(id, json!({"type": "key", "key": "A"}))
            .await;

        // Assert
        assert!(existed);
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::auth_failure("Token revoked", true)
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::not_authenticated()
        );
    }

    #[tokio::test]
    async fn test_heartbeat_sweep_prunes_silent_session() {
        let h = harness(None);
        let (silent, _rx1) = connect(&h.router).await;
        let (chatty, _rx2) = connect(&h.router).await;

        h.router.heartbeat_sweep().await;
        h.router
            .on_message(chatty, json!({"type": "pong", "time": 0}))
            .await;
        let pruned = h.router.heartbeat_sweep().await;

        let info = h.router.connection_info().await;
        assert_eq!(pruned, 1);
        assert_eq!(info.client_count, 1);
        assert_ne!(info.clients[0].id, silent);
    }

    #[tokio::test]
    async fn test_shutdown_unmutes_and_closes_sessions() {
        let h = harness(None);
        let (id, _rx) = connect(&h.router).await;
        h.router
            .on_message(id, json!({"type": "audio", "action": "start"}))
            .await;

        h.router.shutdown().await;

        assert!(h.router.registry().is_empty().await);
        assert!(!h.router.mute().is_muted());
        assert_eq!(h.launcher.commands(), vec!["MUTE", "UNMUTE"]);
    }

    #[tokio::test]
    async fn test_slow_mute_worker_does_not_block_the_session() {
        // Arrange: a mute worker that never becomes ready
        let (mute, _workers) = MockLauncher::new();
        let h = harness_with_mute(None, Some(mute as Arc<dyn WorkerLauncher>));
        let (id, mut rx) = connect(&h.router).await;

        // Act
        let audio = tokio::time::timeout(
            Duration::from_millis(200),
            h.router
                .on_message(id, json!({"type": "audio", "action": "start"})),
        )
        .await;
        h.router
            .on_message(id, json!({"type": "key", "key": "Enter", "id": 5}))
            .await;
        let ack = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;

        // Assert
        assert!(audio.is_ok(), "audio handling waited for the mute worker");
        assert!(h.router.mute().is_muted());
        assert_eq!(
            ack.unwrap(),
            Some(ServerMessage::Ack { id: 5, success: true })
        );
    }

    #[tokio::test]
    async fn test_stream_stops_when_last_viewer_disconnects() {
        // Arrange
        let h = harness(None);
        let (first, _rx1) = connect(&h.router).await;
        let (second, _rx2) = connect(&h.router).await;
        h.router
            .on_message(first, json!({"type": "screen", "action": "start"}))
            .await;

        // Act
        h.router.disconnect(first).await;
        let after_first = h.router.broadcaster().status().await.streaming;
        h.router.disconnect(second).await;

        // Assert
        assert!(after_first, "one viewer is still connected");
        assert!(!h.router.broadcaster().status().await.streaming);
    }

    #[tokio::test]
    async fn test_stream_stops_when_sweep_removes_last_viewer() {
        let h = harness(None);
        let (id, _rx) = connect(&h.router).await;
        h.router
            .on_message(id, json!({"type": "screen", "action": "start"}))
            .await;

        h.router.heartbeat_sweep().await;
        h.router.heartbeat_sweep().await;

        assert!(h.router.registry().is_empty().await);
        assert!(!h.router.broadcaster().status().await.streaming);
    }

    #[tokio::test]
    async fn test_stream_stops_when_only_viewer_is_revoked() {
        // Arrange
        let h = harness(Some("1234"));
        let (id, mut rx) = connect(&h.router).await;
        h.router
            .on_message(
                id,
                json!({"type": "auth", "pin": "1234", "deviceId": "phone", "rememberMe": true}),
            )
            .await;
        rx.recv().await.unwrap();
        h.router
            .on_message(id, json!({"type": "screen", "action": "start"}))
            .await;

        // Act
        h.router.revoke_device("phone").await.unwrap();

        // Assert
        assert!(!h.router.broadcaster().status().await.streaming);
    }
}
