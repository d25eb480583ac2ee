//! keymote-host library crate.
//!
//! The host accepts connections from paired phones, authenticates each
//! session by PIN or device token, and turns the phone's input messages into
//! commands for long-lived worker processes that actually press keys, move
//! the pointer, and mute the speakers.  It also streams screen frames back to
//! every authenticated session.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Phone (JSON over WebSocket or peer data channel)
//!         ↕
//! [keymote-host]
//!   ├── domain/            Pure types: config, sessions, input events, worker commands
//!   ├── application/
//!   │     ├── worker       Worker Process Manager (one per actuator)
//!   │     ├── translate    Command Translator + InputPipeline
//!   │     ├── mute         Reference-counted speaker mute
//!   │     ├── registry     Session Registry + SessionLink trait
//!   │     ├── credentials  Device-token store trait
//!   │     ├── auth         Auth Gate (PIN / token)
//!   │     ├── router       Transport Router: one entry point for both carriers
//!   │     ├── liveness     Heartbeat sweep, revocation polling
//!   │     └── broadcaster  Frame Broadcaster
//!   └── infrastructure/
//!         ├── ws_server    WebSocket accept loop (tokio-tungstenite)
//!         ├── peer         Peer data-channel sessions
//!         ├── peer_relay   Local relay for an external WebRTC sidecar
//!         ├── worker/      Child-process launcher + mock workers
//!         ├── storage/     TOML config + JSON device tokens
//!         ├── discovery    UDP LAN discovery responder
//!         ├── capture      Screenshot command capture
//!         └── tunnel       Tailscale CLI helper
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `keymote-core`; it reaches the
//!   outside world only through traits (`WorkerLauncher`, `SessionLink`,
//!   `CredentialStore`, `ScreenCapture`).
//! - `infrastructure` implements those traits with tokio, tungstenite and the
//!   file system.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: session, auth, routing and worker pipeline logic.
pub mod application;

/// Infrastructure layer: transports, child processes, storage, collaborators.
pub mod infrastructure;
