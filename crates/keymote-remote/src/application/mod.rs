//! Application layer for the remote.

pub mod commands;
pub mod session;

pub use commands::{parse_line, Command, CommandError};
pub use session::{Action, Credentials, RemoteEvent, RemoteSession};
