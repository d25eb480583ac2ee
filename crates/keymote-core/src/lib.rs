//! # keymote-core
//!
//! Shared library for Keymote containing the JSON wire protocol, the symbolic
//! key-name table, and the client-side liveness maths.
//!
//! This crate is used by both the host and the remote applications.
//! It has zero dependencies on OS APIs, async runtimes, or network sockets.
//!
//! # Architecture overview
//!
//! Keymote lets a paired phone drive the keyboard, mouse, and screen of a
//! desktop host.  The phone (the "remote") talks to the desktop (the "host")
//! with one JSON object per message, over either a WebSocket or a
//! peer-to-peer data channel.
//!
//! This crate (`keymote-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – The JSON messages exchanged by host and remote, and a
//!   decode step that turns the `"type"` string into a typed enum (an unknown
//!   type is an explicit error, never a silent fallthrough).
//!
//! - **`keymap`** – The table that resolves symbolic key names such as
//!   `"Enter"`, `"F5"` or `"NumpadAdd"` into Windows virtual-key codes.
//!
//! - **`domain`** – Reconnect backoff and the rolling latency window used by
//!   the remote to keep its connection healthy.

pub mod domain;
pub mod keymap;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `keymote_core::ClientMessage` instead of the full module path.
pub use domain::backoff::{BackoffPolicy, ReconnectBackoff};
pub use domain::latency::LatencyWindow;
pub use keymap::{resolve_key, KeyCode};
pub use protocol::codec::{
    decode_client_message, decode_client_value, decode_server_message, encode_message,
    message_type, parse_value, ProtocolError,
};
pub use protocol::messages::{ClientMessage, ServerMessage};
