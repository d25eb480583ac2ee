//! Application layer: backend traits, the three workers, and the command loop.
//!
//! - [`backend`] – `KeyboardBackend`, `MouseBackend`, `MuteBackend`.
//! - [`worker`] – Parses one line and drives a backend.
//! - [`serve`] – `READY`, then one reply per command until `EXIT`.

pub mod backend;
pub mod serve;
pub mod worker;
