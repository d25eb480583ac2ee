//! The remote's side of one host connection.
//!
//! [`RemoteSession`] turns every [`ServerMessage`] into a list of
//! [`Action`]s: messages to send back and [`RemoteEvent`]s to report.  It
//! never touches a socket, so the whole auth dance is testable without one.
//!
//! # Authentication
//!
//! ```text
//! connected{authRequired:false}          → Authenticated
//! connected{authRequired:true}
//!     token held                         → auth{token, deviceId}
//!     PIN held                           → auth{pin, deviceId, computerName, rememberMe}
//!     neither                            → PinRequired
//! auth_result{success, token?}           → TokenIssued (if any), Authenticated
//! auth_result{!success, requirePin}      → AuthFailed, TokenCleared,
//!                                          then a PIN retry if the token was tried
//! ```

use keymote_core::protocol::messages::{ClientMessage, ServerMessage};
use keymote_core::LatencyWindow;

/// What the remote presents to the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Stable identifier of this remote; device tokens are bound to it.
    pub device_id: String,
    /// Device token from an earlier `rememberMe` pairing.
    pub token: Option<String>,
    pub pin: Option<String>,
    /// Name of the host the user expects to reach.
    pub computer_name: Option<String>,
    /// Ask the host for a device token on PIN login.
    pub remember_me: bool,
}

/// Something the caller of the connection loop should know about.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// A transport to the host is open.
    Connected,
    /// The host accepted this remote.
    Authenticated { computer_name: Option<String> },
    /// The host refused an `auth` request.
    AuthFailed { error: String, require_pin: bool },
    /// Authentication needs a PIN and none was supplied.
    PinRequired,
    /// The host minted a device token; persist it.
    TokenIssued(String),
    /// The saved device token is no longer valid; forget it.
    TokenCleared,
    /// One latency ping completed.
    Latency { rtt_ms: u64, average_ms: u64 },
    /// Any other host message (acks, errors, screen frames).
    Message(ServerMessage),
    /// The transport closed.
    Disconnected,
    /// The reconnect budget is spent; only a manual reconnect will retry.
    GaveUp { attempts: u32 },
}

/// One step the connection loop must perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send(ClientMessage),
    Emit(RemoteEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthAttempt {
    None,
    Token,
    Pin,
}

/// Per-remote protocol state that outlives individual connections.
#[derive(Debug)]
pub struct RemoteSession {
    credentials: Credentials,
    authenticated: bool,
    attempt: AuthAttempt,
    latency: LatencyWindow,
    host_name: Option<String>,
    next_id: u64,
}

impl RemoteSession {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            authenticated: false,
            attempt: AuthAttempt::None,
            latency: LatencyWindow::default(),
            host_name: None,
            next_id: 0,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn latency(&self) -> &LatencyWindow {
        &self.latency
    }

    /// Computer name announced by the host on the current connection.
    pub fn host_name(&self) -> Option<&str> {
        self.host_name.as_deref()
    }

    /// Clears per-connection state when a new transport opens.
    pub fn on_transport_open(&mut self) {
        self.authenticated = false;
        self.attempt = AuthAttempt::None;
        self.latency.clear();
    }

    pub fn on_transport_closed(&mut self) {
        self.authenticated = false;
        self.attempt = AuthAttempt::None;
    }

    /// Reacts to one message from the host.
    ///
    /// `now_ms` is the current time in milliseconds since the Unix epoch and
    /// is only used to turn a `pong` into a round-trip sample.
    pub fn handle(&mut self, msg: ServerMessage, now_ms: i64) -> Vec<Action> {
        match msg {
            ServerMessage::Connected {
                auth_required,
                computer_name,
                ..
            } => {
                self.host_name = Some(computer_name.clone());
                if auth_required {
                    self.auth_request()
                } else {
                    self.authenticated = true;
                    vec![Action::Emit(RemoteEvent::Authenticated {
                        computer_name: Some(computer_name),
                    })]
                }
            }

            ServerMessage::AuthResult {
                success: true,
                token,
                computer_name,
                ..
            } => {
                self.authenticated = true;
                self.attempt = AuthAttempt::None;
                if computer_name.is_some() {
                    self.host_name = computer_name;
                }
                let mut actions = Vec::new();
                if let Some(token) = token {
                    self.credentials.token = Some(token.clone());
                    actions.push(Action::Emit(RemoteEvent::TokenIssued(token)));
                }
                actions.push(Action::Emit(RemoteEvent::Authenticated {
                    computer_name: self.host_name.clone(),
                }));
                actions
            }

            ServerMessage::AuthResult {
                success: false,
                error,
                require_pin,
                ..
            } => self.auth_failed(error, require_pin.unwrap_or(false)),

            ServerMessage::Ping { time } => vec![Action::Send(ClientMessage::Pong { time })],

            ServerMessage::Pong { time } => {
                let rtt_ms = now_ms.saturating_sub(time).max(0) as u64;
                self.latency.record(rtt_ms);
                let average_ms = self.latency.average().unwrap_or(rtt_ms);
                vec![Action::Emit(RemoteEvent::Latency { rtt_ms, average_ms })]
            }

            other => vec![Action::Emit(RemoteEvent::Message(other))],
        }
    }

    /// The latency ping sent on every ping tick.
    pub fn ping(&self, now_ms: i64) -> ClientMessage {
        ClientMessage::Ping { time: now_ms }
    }

    /// Gives an input message the next acknowledgement id unless it already
    /// carries one.
    pub fn stamp(&mut self, mut msg: ClientMessage) -> ClientMessage {
        match &mut msg {
            ClientMessage::Text { id, .. }
            | ClientMessage::Char { id, .. }
            | ClientMessage::Key { id, .. }
            | ClientMessage::Shortcut { id, .. }
            | ClientMessage::Mouse { id, .. } => {
                if id.is_none() {
                    self.next_id += 1;
                    *id = Some(self.next_id);
                }
            }
            _ => {}
        }
        msg
    }

    fn auth_request(&mut self) -> Vec<Action> {
        if let Some(token) = self.credentials.token.clone() {
            self.attempt = AuthAttempt::Token;
            vec![Action::Send(ClientMessage::Auth {
                pin: None,
                token: Some(token),
                device_id: Some(self.credentials.device_id.clone()),
                computer_name: None,
                remember_me: false,
            })]
        } else if self.credentials.pin.is_some() {
            self.attempt = AuthAttempt::Pin;
            vec![Action::Send(self.pin_auth())]
        } else {
            self.attempt = AuthAttempt::None;
            vec![Action::Emit(RemoteEvent::PinRequired)]
        }
    }

    fn pin_auth(&self) -> ClientMessage {
        ClientMessage::Auth {
            pin: self.credentials.pin.clone(),
            token: None,
            device_id: Some(self.credentials.device_id.clone()),
            computer_name: self.credentials.computer_name.clone(),
            remember_me: self.credentials.remember_me,
        }
    }

    fn auth_failed(&mut self, error: Option<String>, require_pin: bool) -> Vec<Action> {
        self.authenticated = false;
        let tried = std::mem::replace(&mut self.attempt, AuthAttempt::None);
        let mut actions = vec![Action::Emit(RemoteEvent::AuthFailed {
            error: error.unwrap_or_else(|| "Authentication failed".to_string()),
            require_pin,
        })];

        if tried == AuthAttempt::Token {
            self.credentials.token = None;
        }
        if require_pin {
            self.credentials.token = None;
            actions.push(Action::Emit(RemoteEvent::TokenCleared));
        }

        if tried == AuthAttempt::Token && self.credentials.pin.is_some() {
            self.attempt = AuthAttempt::Pin;
            actions.push(Action::Send(self.pin_auth()));
        } else if require_pin {
            actions.push(Action::Emit(RemoteEvent::PinRequired));
        }
        actions
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use keymote_core::protocol::messages::Modifiers;

    fn credentials() -> Credentials {
        Credentials {
            device_id: "phone-1".to_string(),
            token: None,
            pin: Some("482913".to_string()),
            computer_name: Some("Desk".to_string()),
            remember_me: true,
        }
    }

    fn connected(auth_required: bool) -> ServerMessage {
        ServerMessage::Connected {
            client_id: "c1".to_string(),
            server_time: 0,
            auth_required,
            computer_name: "Desk".to_string(),
        }
    }

    fn sent(actions: &[Action]) -> Vec<&ClientMessage> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send(msg) => Some(msg),
                Action::Emit(_) => None,
            })
            .collect()
    }

    fn emitted(actions: &[Action]) -> Vec<&RemoteEvent> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Emit(event) => Some(event),
                Action::Send(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_open_host_authenticates_without_sending_auth() {
        // Arrange
        let mut session = RemoteSession::new(credentials());

        // Act
        let actions = session.handle(connected(false), 0);

        // Assert
        assert!(sent(&actions).is_empty());
        assert_eq!(
            emitted(&actions),
            vec![&RemoteEvent::Authenticated {
                computer_name: Some("Desk".to_string())
            }]
        );
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_pin_auth_carries_device_name_and_remember_flag() {
        // Arrange
        let mut session = RemoteSession::new(credentials());

        // Act
        let actions = session.handle(connected(true), 0);

        // Assert
        assert_eq!(
            sent(&actions),
            vec![&ClientMessage::Auth {
                pin: Some("482913".to_string()),
                token: None,
                device_id: Some("phone-1".to_string()),
                computer_name: Some("Desk".to_string()),
                remember_me: true,
            }]
        );
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_held_token_is_tried_before_pin() {
        let mut session = RemoteSession::new(Credentials {
            token: Some("abc".to_string()),
            ..credentials()
        });

        let actions = session.handle(connected(true), 0);

        match sent(&actions).as_slice() {
            [ClientMessage::Auth {
                token: Some(token),
                pin: None,
                device_id: Some(device),
                ..
            }] => assert_eq!((token.as_str(), device.as_str()), ("abc", "phone-1")),
            other => panic!("expected a token auth, got {other:?}"),
        }
    }

    #[test]
    fn test_no_credentials_reports_pin_required() {
        let mut session = RemoteSession::new(Credentials {
            pin: None,
            ..credentials()
        });

        let actions = session.handle(connected(true), 0);

        assert_eq!(actions, vec![Action::Emit(RemoteEvent::PinRequired)]);
    }

    #[test]
    fn test_issued_token_is_kept_and_reported() {
        // Arrange
        let mut session = RemoteSession::new(credentials());
        session.handle(connected(true), 0);

        // Act
        let actions = session.handle(
            ServerMessage::AuthResult {
                success: true,
                token: Some("f00d".to_string()),
                computer_name: Some("Desk".to_string()),
                error: None,
                require_pin: None,
            },
            0,
        );

        // Assert
        assert_eq!(
            emitted(&actions),
            vec![
                &RemoteEvent::TokenIssued("f00d".to_string()),
                &RemoteEvent::Authenticated {
                    computer_name: Some("Desk".to_string())
                },
            ]
        );
        assert_eq!(session.credentials().token.as_deref(), Some("f00d"));
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_rejected_token_is_cleared_and_pin_retried() {
        // Arrange
        let mut session = RemoteSession::new(Credentials {
            token: Some("stale".to_string()),
            ..credentials()
        });
        session.handle(connected(true), 0);

        // Act
        let actions = session.handle(
            ServerMessage::auth_failure("Token expired or invalid", true),
            0,
        );

        // Assert
        assert_eq!(
            emitted(&actions),
            vec![
                &RemoteEvent::AuthFailed {
                    error: "Token expired or invalid".to_string(),
                    require_pin: true
                },
                &RemoteEvent::TokenCleared,
            ]
        );
        assert!(matches!(
            sent(&actions).as_slice(),
            [ClientMessage::Auth { pin: Some(_), token: None, .. }]
        ));
        assert_eq!(session.credentials().token, None);
    }

    #[test]
    fn test_rejected_token_without_pin_asks_for_one() {
        let mut session = RemoteSession::new(Credentials {
            token: Some("stale".to_string()),
            pin: None,
            ..credentials()
        });
        session.handle(connected(true), 0);

        let actions = session.handle(
            ServerMessage::auth_failure("Token expired or invalid", true),
            0,
        );

        assert!(sent(&actions).is_empty());
        assert_eq!(emitted(&actions).last(), Some(&&RemoteEvent::PinRequired));
    }

    #[test]
    fn test_wrong_pin_is_not_retried() {
        let mut session = RemoteSession::new(credentials());
        session.handle(connected(true), 0);

        let actions = session.handle(ServerMessage::auth_failure("Invalid PIN", false), 0);

        assert_eq!(
            actions,
            vec![Action::Emit(RemoteEvent::AuthFailed {
                error: "Invalid PIN".to_string(),
                require_pin: false
            })]
        );
    }

    #[test]
    fn test_revocation_deauthenticates_live_session() {
        // Arrange
        let mut session = RemoteSession::new(Credentials {
            pin: None,
            ..credentials()
        });
        session.handle(connected(true), 0);
        session.handle(
            ServerMessage::AuthResult {
                success: true,
                token: Some("t".to_string()),
                computer_name: None,
                error: None,
                require_pin: None,
            },
            0,
        );

        // Act
        let actions = session.handle(ServerMessage::auth_failure("Token revoked", true), 0);

        // Assert
        assert!(!session.is_authenticated());
        assert!(emitted(&actions).contains(&&RemoteEvent::TokenCleared));
        assert!(emitted(&actions).contains(&&RemoteEvent::PinRequired));
    }

    #[test]
    fn test_host_ping_is_answered_with_same_time() {
        let mut session = RemoteSession::new(credentials());

        let actions = session.handle(ServerMessage::Ping { time: 77 }, 0);

        assert_eq!(actions, vec![Action::Send(ClientMessage::Pong { time: 77 })]);
    }

    #[test]
    fn test_pong_records_round_trip_and_average() {
        // Arrange
        let mut session = RemoteSession::new(credentials());

        // Act
        session.handle(ServerMessage::Pong { time: 1_000 }, 1_040);
        let actions = session.handle(ServerMessage::Pong { time: 2_000 }, 2_021);

        // Assert: (40 + 21) / 2 = 30.5 rounds to 31
        assert_eq!(
            actions,
            vec![Action::Emit(RemoteEvent::Latency {
                rtt_ms: 21,
                average_ms: 31
            })]
        );
    }

    #[test]
    fn test_pong_from_the_future_counts_as_zero() {
        let mut session = RemoteSession::new(credentials());
        session.handle(ServerMessage::Pong { time: 500 }, 400);
        assert_eq!(session.latency().latest(), Some(0));
    }

    #[test]
    fn test_other_messages_are_passed_through() {
        let mut session = RemoteSession::new(credentials());
        let ack = ServerMessage::Ack {
            id: 3,
            success: true,
        };

        let actions = session.handle(ack.clone(), 0);

        assert_eq!(actions, vec![Action::Emit(RemoteEvent::Message(ack))]);
    }

    #[test]
    fn test_stamp_assigns_increasing_ids_and_keeps_explicit_ones() {
        // Arrange
        let mut session = RemoteSession::new(credentials());
        let key = ClientMessage::Key {
            key: "Enter".to_string(),
            modifiers: Modifiers::default(),
            id: None,
        };

        // Act
        let first = session.stamp(key.clone());
        let second = session.stamp(key);
        let explicit = session.stamp(ClientMessage::Text {
            text: "x".to_string(),
            id: Some(99),
        });
        let ping = session.stamp(ClientMessage::Ping { time: 1 });

        // Assert
        assert_eq!(first.ack_id(), Some(1));
        assert_eq!(second.ack_id(), Some(2));
        assert_eq!(explicit.ack_id(), Some(99));
        assert_eq!(ping, ClientMessage::Ping { time: 1 });
    }

    #[test]
    fn test_transport_open_resets_auth_and_latency() {
        let mut session = RemoteSession::new(credentials());
        session.handle(connected(false), 0);
        session.handle(ServerMessage::Pong { time: 0 }, 10);

        session.on_transport_open();

        assert!(!session.is_authenticated());
        assert!(session.latency().is_empty());
    }
}
