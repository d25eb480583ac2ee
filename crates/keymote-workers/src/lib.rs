//! # keymote-workers
//!
//! The three worker processes the Keymote host drives: keyboard, mouse and
//! mute.  Each binary reads one command per line on stdin and answers one
//! line on stdout; logs go to stderr so they never mix with replies.
//!
//! ```text
//! src/
//! ├── domain/
//! │   └── command      Protocol lines and typed command parsing
//! ├── application/
//! │   ├── backend      OS actuator traits
//! │   ├── worker       Line → backend call → reply
//! │   └── serve        READY / command loop / EXIT
//! ├── infrastructure/
//! │   ├── windows      SendInput and Core Audio
//! │   ├── helper       xdotool, pactl, osascript
//! │   └── dry_run      Logs instead of injecting
//! └── bin/             keymote-{keyboard,mouse,mute}-worker
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

use std::io;

use tracing_subscriber::EnvFilter;

use application::serve::{serve, ServeReport};
use application::worker::LineWorker;

/// Logs to stderr; `RUST_LOG` overrides the `info` default.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Runs `worker` on the process's stdin and stdout.
pub fn run_stdio(worker: &mut dyn LineWorker) -> io::Result<ServeReport> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(stdin.lock(), stdout.lock(), worker)
}
