//! WebSocket connection to the host with automatic reconnect.
//!
//! [`RemoteClient::start`] spawns one task that owns the socket and the
//! [`RemoteSession`].  The task:
//!
//! 1. Dials the host URL.  On success the reconnect counter is reset and a
//!    [`RemoteEvent::Connected`] is emitted.
//! 2. Feeds every host message through the session and performs the
//!    resulting [`Action`]s (auth replies, pong answers, events).
//! 3. Sends a latency `ping` every `ping_interval` while connected.
//! 4. When the socket closes, waits the next [`ReconnectBackoff`] delay and
//!    dials again.  Once the budget is spent it emits
//!    [`RemoteEvent::GaveUp`] and waits for a manual reconnect.
//!
//! The caller drives the task through a [`ClientHandle`]: send input, force
//! a reconnect (which skips and resets the backoff), or shut down.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use keymote_core::protocol::codec::{decode_server_message, encode_message};
use keymote_core::protocol::messages::{timestamp_ms, ClientMessage};
use keymote_core::{BackoffPolicy, ReconnectBackoff};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::application::session::{Action, Credentials, RemoteEvent, RemoteSession};

/// Default host URL.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8765";

/// Default interval between latency pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(5);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection task has exited.
    #[error("the connection task is no longer running")]
    Closed,
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Settings for one [`RemoteClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the host, e.g. `ws://192.168.1.20:8765`.
    pub url: String,
    pub ping_interval: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            ping_interval: DEFAULT_PING_INTERVAL,
            backoff: BackoffPolicy::default(),
        }
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Control {
    Send(ClientMessage),
    Reconnect,
    Shutdown,
}

/// Cloneable handle to a running [`RemoteClient`].
#[derive(Debug, Clone)]
pub struct ClientHandle {
    control: mpsc::UnboundedSender<Control>,
}

impl ClientHandle {
    /// Sends `msg` on the current connection.  Input messages without an id
    /// get the next acknowledgement id.  Dropped if no connection is open.
    pub fn send(&self, msg: ClientMessage) -> Result<(), ClientError> {
        self.control
            .send(Control::Send(msg))
            .map_err(|_| ClientError::Closed)
    }

    /// Drops the current connection (if any) and dials again immediately,
    /// resetting the backoff counter.
    pub fn reconnect(&self) -> Result<(), ClientError> {
        self.control
            .send(Control::Reconnect)
            .map_err(|_| ClientError::Closed)
    }

    /// Closes the connection and ends the task.  The event channel closes
    /// once the task has exited.
    pub fn shutdown(&self) {
        let _ = self.control.send(Control::Shutdown);
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// The remote's connection manager.
pub struct RemoteClient {
    config: ClientConfig,
    session: RemoteSession,
}

/// How one connected period ended.
enum Ended {
    Closed,
    Reconnect,
    Shutdown,
}

/// What interrupted a backoff wait.
enum Wake {
    Elapsed,
    Reconnect,
    Shutdown,
}

impl RemoteClient {
    pub fn new(config: ClientConfig, credentials: Credentials) -> Self {
        Self {
            config,
            session: RemoteSession::new(credentials),
        }
    }

    /// Spawns the connection task.
    ///
    /// Returns the control handle and the receiver of [`RemoteEvent`]s.
    pub fn start(self) -> (ClientHandle, mpsc::Receiver<RemoteEvent>) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(128);
        tokio::spawn(self.run(control_rx, event_tx));
        (ClientHandle { control: control_tx }, event_rx)
    }

    async fn run(
        mut self,
        mut control: mpsc::UnboundedReceiver<Control>,
        events: mpsc::Sender<RemoteEvent>,
    ) {
        let mut backoff = ReconnectBackoff::new(self.config.backoff);

        loop {
            match connect_async(self.config.url.as_str()).await {
                Ok((socket, _)) => {
                    info!("connected to {}", self.config.url);
                    backoff.reset();
                    self.session.on_transport_open();
                    let _ = events.send(RemoteEvent::Connected).await;

                    let ended = self.drive(socket, &mut control, &events).await;

                    self.session.on_transport_closed();
                    let _ = events.send(RemoteEvent::Disconnected).await;
                    match ended {
                        Ended::Shutdown => break,
                        Ended::Reconnect => {
                            backoff.reset();
                            continue;
                        }
                        Ended::Closed => info!("connection to {} closed", self.config.url),
                    }
                }
                Err(e) => warn!("could not connect to {}: {e}", self.config.url),
            }

            match backoff.next_delay() {
                Some(delay) => {
                    debug!("reconnect attempt {} in {delay:?}", backoff.attempts());
                    match wait(delay, &mut control).await {
                        Wake::Elapsed => {}
                        Wake::Reconnect => backoff.reset(),
                        Wake::Shutdown => break,
                    }
                }
                None => {
                    warn!(
                        "giving up on {} after {} attempts",
                        self.config.url,
                        backoff.attempts()
                    );
                    let _ = events
                        .send(RemoteEvent::GaveUp {
                            attempts: backoff.attempts(),
                        })
                        .await;
                    match wait_for_reconnect(&mut control).await {
                        Wake::Shutdown => break,
                        _ => backoff.reset(),
                    }
                }
            }
        }
        debug!("connection task exiting");
    }

    /// Runs one connected period until the socket closes or the caller asks
    /// to reconnect or shut down.
    async fn drive(
        &mut self,
        socket: Socket,
        control: &mut mpsc::UnboundedReceiver<Control>,
        events: &mpsc::Sender<RemoteEvent>,
    ) -> Ended {
        let (mut sink, mut stream) = socket.split();
        let period = self.config.ping_interval;
        let mut ping = time::interval_at(Instant::now() + period, period);

        loop {
            let outgoing: Vec<ClientMessage> = tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match decode_server_message(&text) {
                            Ok(msg) => {
                                let mut outgoing = Vec::new();
                                for action in self.session.handle(msg, timestamp_ms()) {
                                    match action {
                                        Action::Send(reply) => outgoing.push(reply),
                                        Action::Emit(event) => {
                                            let _ = events.send(event).await;
                                        }
                                    }
                                }
                                outgoing
                            }
                            Err(e) => {
                                warn!("ignoring undecodable host message: {e}");
                                Vec::new()
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ended::Closed,
                    Some(Ok(_)) => Vec::new(),
                    Some(Err(e)) => {
                        warn!("websocket error: {e}");
                        return Ended::Closed;
                    }
                },

                _ = ping.tick() => vec![self.session.ping(timestamp_ms())],

                request = control.recv() => match request {
                    Some(Control::Send(msg)) => vec![self.session.stamp(msg)],
                    Some(Control::Reconnect) => {
                        info!("manual reconnect requested");
                        let _ = sink.close().await;
                        return Ended::Reconnect;
                    }
                    Some(Control::Shutdown) | None => {
                        let _ = sink.close().await;
                        return Ended::Shutdown;
                    }
                },
            };

            for msg in outgoing {
                let text = match encode_message(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("could not encode {}: {e}", msg.kind());
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!("send failed: {e}");
                    return Ended::Closed;
                }
            }
        }
    }
}

/// Sleeps for `delay` unless the caller reconnects or shuts down first.
/// Input sent while disconnected is dropped.
async fn wait(delay: Duration, control: &mut mpsc::UnboundedReceiver<Control>) -> Wake {
    let deadline = Instant::now() + delay;
    loop {
        tokio::select! {
            _ = time::sleep_until(deadline) => return Wake::Elapsed,
            request = control.recv() => match request {
                Some(Control::Reconnect) => return Wake::Reconnect,
                Some(Control::Shutdown) | None => return Wake::Shutdown,
                Some(Control::Send(msg)) => debug!("not connected; dropping {}", msg.kind()),
            },
        }
    }
}

async fn wait_for_reconnect(control: &mut mpsc::UnboundedReceiver<Control>) -> Wake {
    loop {
        match control.recv().await {
            Some(Control::Reconnect) => return Wake::Reconnect,
            Some(Control::Shutdown) | None => return Wake::Shutdown,
            Some(Control::Send(msg)) => debug!("not connected; dropping {}", msg.kind()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            device_id: "phone-1".to_string(),
            ..Credentials::default()
        }
    }

    #[test]
    fn test_client_config_default_targets_local_host() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.url, "ws://127.0.0.1:8765");
        assert_eq!(cfg.ping_interval, Duration::from_secs(5));
        assert_eq!(cfg.backoff.max_attempts, 10);
    }

    #[tokio::test]
    async fn test_unreachable_host_gives_up_after_budget() {
        // Arrange: nothing listens on port 1 and every delay is tiny
        let config = ClientConfig {
            url: "ws://127.0.0.1:1".to_string(),
            ping_interval: DEFAULT_PING_INTERVAL,
            backoff: BackoffPolicy {
                base: Duration::from_millis(1),
                growth: 1.0,
                cap: Duration::from_millis(1),
                max_attempts: 3,
            },
        };
        let (handle, mut events) = RemoteClient::new(config, credentials()).start();

        // Act
        let event = time::timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap();

        // Assert
        assert_eq!(event, Some(RemoteEvent::GaveUp { attempts: 3 }));
        handle.shutdown();
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_manual_reconnect_after_giving_up_retries_with_fresh_budget() {
        // Arrange
        let config = ClientConfig {
            url: "ws://127.0.0.1:1".to_string(),
            ping_interval: DEFAULT_PING_INTERVAL,
            backoff: BackoffPolicy {
                base: Duration::from_millis(1),
                growth: 1.0,
                cap: Duration::from_millis(1),
                max_attempts: 2,
            },
        };
        let (handle, mut events) = RemoteClient::new(config, credentials()).start();
        let first = events.recv().await;

        // Act
        handle.reconnect().unwrap();
        let second = time::timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap();

        // Assert
        assert_eq!(first, Some(RemoteEvent::GaveUp { attempts: 2 }));
        assert_eq!(second, Some(RemoteEvent::GaveUp { attempts: 2 }));
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_handle_reports_closed_after_task_exits() {
        let config = ClientConfig {
            url: "ws://127.0.0.1:1".to_string(),
            ..ClientConfig::default()
        };
        let (handle, mut events) = RemoteClient::new(config, credentials()).start();

        handle.shutdown();
        while events.recv().await.is_some() {}

        assert!(matches!(handle.reconnect(), Err(ClientError::Closed)));
    }
}
