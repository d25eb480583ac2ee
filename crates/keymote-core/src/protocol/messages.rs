//! JSON message types for the Keymote wire protocol.
//!
//! Both transports (WebSocket and peer data channel) carry the same JSON
//! objects.  Every message has a `"type"` field naming the variant; all other
//! fields sit in the same object:
//!
//! ```json
//! {"type":"key","key":"Enter","modifiers":{"ctrl":true},"id":7}
//! ```
//!
//! Serde's `#[serde(tag = "type")]` attribute handles this automatically.
//!
//! # Message flow
//!
//! ```text
//! Remote → Host:  auth, ping, pong, text, char, key, shortcut, mouse, screen, audio
//! Host → Remote:  connected, auth_result, ping, pong, ack, error, screen-frame
//! ```
//!
//! Two distinct enums make it a compile-time error to send a host-only message
//! from the remote, and vice versa.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Every `"type"` value the host understands from a remote.
pub const CLIENT_MESSAGE_TYPES: &[&str] = &[
    "auth", "ping", "pong", "text", "char", "key", "shortcut", "mouse", "screen", "audio",
];

/// Error string sent to sessions that have not completed authentication.
pub const NOT_AUTHENTICATED: &str = "Not authenticated";

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
///
/// This is the unit of every `time`, `serverTime` and `timestamp` field.
pub fn timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ── Shared payload types ──────────────────────────────────────────────────────

/// Modifier keys held while a key is pressed.
///
/// Missing fields default to `false`, so `{"ctrl":true}` is a valid value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    /// The Windows / Super / Command key.
    pub win: bool,
}

impl Modifiers {
    /// Returns `true` if none of the modifiers is held.
    pub fn is_empty(&self) -> bool {
        !(self.ctrl || self.alt || self.shift || self.win)
    }

    /// Returns `true` if Ctrl, Alt or Shift is held.  The meta key is ignored.
    pub fn has_non_meta(&self) -> bool {
        self.ctrl || self.alt || self.shift
    }
}

/// The `action` field of a `mouse` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseAction {
    Left,
    Right,
    Middle,
    /// Relative move by `dx`, `dy`.
    Move,
    /// Absolute move to `x`, `y`.
    #[serde(rename = "moveto")]
    MoveTo,
    /// Wheel scroll by `delta`.
    Scroll,
}

/// The `action` field of `screen` and `audio` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamAction {
    Start,
    Stop,
}

// ── Remote → Host messages ────────────────────────────────────────────────────

/// All messages that a remote can send to the host.
///
/// # Serde representation
///
/// ```json
/// {"type":"auth","pin":"123456","deviceId":"phone-1","rememberMe":true}
/// {"type":"text","text":"hello","id":3}
/// {"type":"mouse","action":"move","dx":4,"dy":-2}
/// {"type":"screen","action":"start"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Authentication request, by PIN or by a previously issued device token.
    #[serde(rename = "auth", rename_all = "camelCase")]
    Auth {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pin: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_id: Option<String>,
        /// Host name the remote expects to reach.  Compared case-insensitively.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        computer_name: Option<String>,
        /// Ask the host to mint a device token for PIN-free reconnects.
        #[serde(default)]
        remember_me: bool,
    },

    /// Application-level latency ping.  Answered with `pong` echoing `time`.
    #[serde(rename = "ping")]
    Ping {
        #[serde(default)]
        time: i64,
    },

    /// Answer to a host-initiated `ping` (peer transport heartbeat).
    #[serde(rename = "pong")]
    Pong {
        #[serde(default)]
        time: i64,
    },

    /// Type a string of text.
    #[serde(rename = "text")]
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },

    /// Type a single character.  Handled exactly like `text`.
    #[serde(rename = "char")]
    Char {
        #[serde(rename = "char")]
        character: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },

    /// Press a named key, optionally with modifiers.
    #[serde(rename = "key")]
    Key {
        key: String,
        #[serde(default)]
        modifiers: Modifiers,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },

    /// Press a key combination, either as a combo string (`"Ctrl+Shift+T"`)
    /// or as a key name plus modifiers.
    #[serde(rename = "shortcut")]
    Shortcut {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        combo: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default)]
        modifiers: Modifiers,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },

    /// Pointer action.  Which coordinate fields matter depends on `action`.
    #[serde(rename = "mouse")]
    Mouse {
        action: MouseAction,
        #[serde(default)]
        dx: f64,
        #[serde(default)]
        dy: f64,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default)]
        delta: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },

    /// Start or stop the screen-frame stream.
    #[serde(rename = "screen")]
    Screen { action: StreamAction },

    /// Start or stop sharing host audio; the host mutes its speakers while shared.
    #[serde(rename = "audio")]
    Audio { action: StreamAction },
}

impl ClientMessage {
    /// Returns the wire `"type"` string of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Text { .. } => "text",
            Self::Char { .. } => "char",
            Self::Key { .. } => "key",
            Self::Shortcut { .. } => "shortcut",
            Self::Mouse { .. } => "mouse",
            Self::Screen { .. } => "screen",
            Self::Audio { .. } => "audio",
        }
    }

    /// Returns the client-chosen acknowledgement id of an input message.
    pub fn ack_id(&self) -> Option<u64> {
        match self {
            Self::Text { id, .. }
            | Self::Char { id, .. }
            | Self::Key { id, .. }
            | Self::Shortcut { id, .. }
            | Self::Mouse { id, .. } => *id,
            _ => None,
        }
    }
}

// ── Host → Remote messages ────────────────────────────────────────────────────

/// All messages that the host sends to a remote.
///
/// # Serde representation
///
/// ```json
/// {"type":"connected","clientId":"...","serverTime":1700000000000,"authRequired":true,"computerName":"DESK"}
/// {"type":"auth_result","success":false,"error":"Invalid PIN"}
/// {"type":"ack","id":3,"success":true}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Greeting sent as soon as a transport connects.
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected {
        client_id: String,
        server_time: i64,
        auth_required: bool,
        computer_name: String,
    },

    /// Outcome of an `auth` request.
    #[serde(rename = "auth_result", rename_all = "camelCase")]
    AuthResult {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        computer_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        require_pin: Option<bool>,
    },

    /// Host-initiated heartbeat (peer transport only).
    #[serde(rename = "ping")]
    Ping { time: i64 },

    /// Answer to a remote `ping`, echoing its `time`.
    #[serde(rename = "pong")]
    Pong { time: i64 },

    /// Result of one input message.
    #[serde(rename = "ack")]
    Ack { id: u64, success: bool },

    /// A request was rejected.
    #[serde(rename = "error")]
    Error { error: String },

    /// One encoded screen frame.  `data` is opaque to the protocol.
    #[serde(rename = "screen-frame", rename_all = "camelCase")]
    ScreenFrame {
        data: String,
        width: u32,
        height: u32,
        cursor_x: i32,
        cursor_y: i32,
        timestamp: i64,
    },
}

impl ServerMessage {
    /// The reply to any non-auth, non-ping message from an unauthenticated session.
    pub fn not_authenticated() -> Self {
        Self::Error {
            error: NOT_AUTHENTICATED.to_string(),
        }
    }

    /// A failed `auth_result` carrying `error`.
    pub fn auth_failure(error: impl Into<String>, require_pin: bool) -> Self {
        Self::AuthResult {
            success: false,
            token: None,
            computer_name: None,
            error: Some(error.into()),
            require_pin: require_pin.then_some(true),
        }
    }

    /// Returns the wire `"type"` string of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::AuthResult { .. } => "auth_result",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Ack { .. } => "ack",
            Self::Error { .. } => "error",
            Self::ScreenFrame { .. } => "screen-frame",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
