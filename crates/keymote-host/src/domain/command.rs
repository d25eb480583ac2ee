//! Worker identities, their line protocols, and translated commands.
//!
//! Every worker process speaks the same shape of protocol on stdin/stdout:
//!
//! ```text
//! worker → host:  READY                 (once, after start-up)
//! host → worker:  <one command line>
//! worker → host:  <one reply line>      (OK / MUTED / UNMUTED on success, ERR otherwise)
//! host → worker:  EXIT                  (asks the worker to terminate)
//! ```

use std::fmt;

/// Line a worker prints once it can accept commands.
pub const READY_LINE: &str = "READY";

/// Line asking a worker to exit.
pub const EXIT_LINE: &str = "EXIT";

/// Mute worker commands.
pub const MUTE_COMMAND: &str = "MUTE";
pub const UNMUTE_COMMAND: &str = "UNMUTE";

/// The three actuators the host drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    Keyboard,
    Mouse,
    Mute,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Keyboard => "keyboard",
            Self::Mouse => "mouse",
            Self::Mute => "mute",
        };
        f.write_str(name)
    }
}

/// Line protocol details for one worker kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerProfile {
    pub kind: WorkerKind,
    pub ready_line: &'static str,
    pub success_lines: &'static [&'static str],
    pub exit_line: &'static str,
}

impl WorkerProfile {
    /// Profile for `kind`.
    pub fn for_kind(kind: WorkerKind) -> Self {
        let success_lines: &'static [&'static str] = match kind {
            WorkerKind::Keyboard | WorkerKind::Mouse => &["OK"],
            WorkerKind::Mute => &["MUTED", "UNMUTED"],
        };
        Self {
            kind,
            ready_line: READY_LINE,
            success_lines,
            exit_line: EXIT_LINE,
        }
    }

    /// Returns `true` if `line` is a recognized success reply.
    pub fn is_success(&self, line: &str) -> bool {
        self.success_lines.contains(&line.trim())
    }

    /// Returns `true` if `line` is the ready signal.
    pub fn is_ready(&self, line: &str) -> bool {
        line.trim() == self.ready_line
    }
}

/// A translated input event, addressed to the worker that executes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    Keyboard(String),
    Mouse(String),
}

impl WorkerCommand {
    /// The worker this command is for.
    pub fn target(&self) -> WorkerKind {
        match self {
            Self::Keyboard(_) => WorkerKind::Keyboard,
            Self::Mouse(_) => WorkerKind::Mouse,
        }
    }

    /// The command line sent to the worker.
    pub fn payload(&self) -> &str {
        match self {
            Self::Keyboard(line) | Self::Mouse(line) => line,
        }
    }

    /// Consumes the command, returning its line.
    pub fn into_payload(self) -> String {
        match self {
            Self::Keyboard(line) | Self::Mouse(line) => line,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
