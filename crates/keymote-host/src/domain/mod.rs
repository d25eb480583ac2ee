//! Domain layer for keymote-host.
//!
//! Pure types with no dependency on I/O, tokio, or the file system:
//!
//! - Runtime configuration ([`HostConfig`], [`WorkerSpec`])
//! - Session identity and state ([`SessionId`], [`TransportKind`], [`AuthState`])
//! - Typed input events produced from wire messages ([`InputEvent`])
//! - Worker identities, line protocols and commands ([`WorkerKind`], [`WorkerCommand`])
//! - Persisted device credentials ([`CredentialRecord`])

pub mod command;
pub mod config;
pub mod credential;
pub mod input;
pub mod session;

pub use command::{WorkerCommand, WorkerKind, WorkerProfile};
pub use config::{HostConfig, WorkerSpec, WorkerTimings};
pub use credential::CredentialRecord;
pub use input::{InputEvent, MouseButton};
pub use session::{AuthState, ClientInfo, ConnectionInfo, SessionId, TransportKind};
