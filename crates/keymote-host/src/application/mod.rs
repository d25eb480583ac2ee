//! Application layer for the host.
//!
//! Use cases in this layer orchestrate the domain types and reach the outside
//! world only through traits, so every one of them can be driven in tests by
//! the mocks in `infrastructure`.
//!
//! # Sub-modules
//!
//! - **`worker`** – One persistent actuator process per [`WorkerKind`]:
//!   ordered, one-in-flight delivery with self-healing restarts.
//!
//! - **`translate`** – Turns typed input events into one worker command line
//!   each, and owns the keyboard and mouse workers.
//!
//! - **`mute`** – Reference-counted speaker mute on top of the mute worker.
//!
//! - **`registry`** / **`credentials`** / **`auth`** – Who is connected,
//!   which device tokens exist, and whether a session may send input.
//!
//! - **`router`** – The single entry point for messages from either
//!   transport.  This is the most critical use case: every tap on the phone
//!   passes through it.
//!
//! - **`liveness`** – Periodic heartbeat sweep and revocation polling.
//!
//! - **`broadcaster`** – Fixed-rate screen frame loop.
//!
//! [`WorkerKind`]: crate::domain::WorkerKind

pub mod auth;
pub mod broadcaster;
pub mod credentials;
pub mod liveness;
pub mod mute;
pub mod registry;
pub mod router;
pub mod translate;
pub mod worker;
