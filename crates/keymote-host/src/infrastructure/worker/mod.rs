//! Worker process infrastructure.
//!
//! - [`process`]: the production launcher, spawning each worker as a child
//!   process with piped stdin/stdout.
//! - [`mock`]: in-memory workers for tests.

pub mod mock;
pub mod process;

pub use process::ChildProcessLauncher;
