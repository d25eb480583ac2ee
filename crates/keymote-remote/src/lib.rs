//! keymote-remote library crate.
//!
//! A terminal stand-in for the phone app.  It dials a host, authenticates
//! with a saved device token or a PIN, keeps the link alive with a reconnect
//! schedule and a latency ping, and turns typed commands into input
//! messages.
//!
//! # Architecture
//!
//! ```text
//! stdin ──► application::commands ──► ClientHandle ──┐
//!                                                     ▼
//!                         infrastructure::connection (tokio-tungstenite)
//!                                                     │
//!                         application::session  ◄─────┘  auth, ping/pong
//!                                                     │
//! main ◄───────────────────────── RemoteEvent ◄───────┘
//! ```
//!
//! - `application` is pure: it decides what to send and what to report, but
//!   performs no I/O.
//! - `infrastructure` owns the socket, the identity file and LAN discovery.

/// Application layer: the remote session state machine and command parsing.
pub mod application;

/// Infrastructure layer: WebSocket connection loop, identity file, discovery request.
pub mod infrastructure;
