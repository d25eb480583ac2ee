//! The command loop every worker runs on its stdin/stdout.
//!
//! ```text
//! worker → host:  READY
//! host → worker:  <command>     worker → host:  OK | MUTED | UNMUTED | ERR
//! host → worker:  EXIT          (or end of input)
//! ```
//!
//! Exactly one reply line follows each command line, flushed immediately,
//! because the host matches replies to commands by order.  Blank lines get no
//! reply.

use std::io::{self, BufRead, Write};

use tracing::{debug, info, warn};

use crate::application::worker::LineWorker;
use crate::domain::command::{ERR_LINE, EXIT_LINE, READY_LINE};

/// How the command loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// The host sent `EXIT`.
    Exit,
    /// Input closed without `EXIT`.
    EndOfInput,
}

/// Summary of one run of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeReport {
    pub outcome: ServeOutcome,
    pub handled: u64,
    pub failed: u64,
}

/// Prints `READY`, then executes lines from `input` until `EXIT` or end of
/// input.  [`LineWorker::finish`] runs on either exit path.
///
/// # Errors
///
/// Only I/O errors on `input` or `output`.  A command that fails to parse or
/// execute is answered with `ERR` and the loop continues.
pub fn serve<R, W>(
    mut input: R,
    mut output: W,
    worker: &mut dyn LineWorker,
) -> io::Result<ServeReport>
where
    R: BufRead,
    W: Write,
{
    reply(&mut output, READY_LINE)?;
    info!(worker = worker.name(), "worker ready");

    let mut report = ServeReport {
        outcome: ServeOutcome::EndOfInput,
        handled: 0,
        failed: 0,
    };
    let mut line = String::new();
    let result = loop {
        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => break Ok(()),
            Ok(_) => {}
            Err(e) => break Err(e),
        }
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if command == EXIT_LINE {
            report.outcome = ServeOutcome::Exit;
            break Ok(());
        }

        report.handled += 1;
        let answer = match worker.execute(command) {
            Ok(success) => {
                debug!(worker = worker.name(), command, "done");
                success
            }
            Err(e) => {
                report.failed += 1;
                warn!(worker = worker.name(), command, error = %e, "command failed");
                ERR_LINE
            }
        };
        if let Err(e) = reply(&mut output, answer) {
            break Err(e);
        }
    };

    worker.finish();
    result?;
    info!(
        worker = worker.name(),
        outcome = ?report.outcome,
        handled = report.handled,
        failed = report.failed,
        "worker stopping"
    );
    Ok(report)
}

fn reply<W: Write>(output: &mut W, line: &str) -> io::Result<()> {
    output.write_all(line.as_bytes())?;
    output.write_all(b"\n")?;
    output.flush()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
