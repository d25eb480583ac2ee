//! Infrastructure layer for the remote.
//!
//! - `connection`: tokio-tungstenite client with reconnect backoff and latency ping
//! - `identity`: device id and token file
//! - `discovery`: UDP broadcast request for hosts on the LAN

pub mod connection;
pub mod discovery;
pub mod identity;

pub use connection::{ClientConfig, ClientError, ClientHandle, RemoteClient};
pub use discovery::{discover_hosts, DiscoveredHost};
pub use identity::{Identity, IdentityError, IdentityFile};
