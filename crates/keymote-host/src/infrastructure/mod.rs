//! Infrastructure layer for the host.
//!
//! Contains OS-facing adapters: the WebSocket listener, the peer data-channel
//! sessions and their local relay, child worker processes, file-system
//! storage, LAN discovery, the screenshot command and the tunnel CLI.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `keymote_core`, but MUST NOT be imported by the `application` or domain
//! layers (test-only mocks excepted).

pub mod capture;
pub mod discovery;
pub mod mock_link;
pub mod peer;
pub mod peer_relay;
pub mod storage;
pub mod tunnel;
pub mod worker;
pub mod ws_server;
