//! Child-process worker launcher.
//!
//! Each worker is started as `program args...` with stdin and stdout piped.
//! Stdout is read line by line; stderr lines are forwarded to the log at
//! `debug` level so a misbehaving worker can be diagnosed with
//! `RUST_LOG=keymote_host=debug`.
//!
//! Children are spawned with `kill_on_drop(true)`: if the driver task holding
//! the process is aborted, the OS process goes with it.

use std::collections::HashMap;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::application::worker::{WorkerIo, WorkerLauncher};
use crate::domain::command::WorkerKind;
use crate::domain::config::{HostConfig, WorkerSpec};

/// How long `kill` waits for the process to be reaped.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Launches workers as child processes.
#[derive(Debug, Clone)]
pub struct ChildProcessLauncher {
    specs: HashMap<WorkerKind, WorkerSpec>,
}

impl ChildProcessLauncher {
    /// Creates a launcher with one spec per worker kind.
    pub fn new(specs: HashMap<WorkerKind, WorkerSpec>) -> Self {
        Self { specs }
    }

    /// Takes the three worker specs from the host configuration.
    pub fn from_config(config: &HostConfig) -> Self {
        let specs = [WorkerKind::Keyboard, WorkerKind::Mouse, WorkerKind::Mute]
            .into_iter()
            .map(|kind| (kind, config.worker_spec(kind).clone()))
            .collect();
        Self::new(specs)
    }
}

#[async_trait]
impl WorkerLauncher for ChildProcessLauncher {
    async fn launch(&self, kind: WorkerKind) -> io::Result<Box<dyn WorkerIo>> {
        let spec = self.specs.get(&kind).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no program configured for the {kind} worker"),
            )
        })?;

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker stdin not captured"))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "worker stdout not captured")
        })?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("{kind} worker stderr: {line}");
                }
            });
        }

        info!(
            "spawned {kind} worker: {} (pid {:?})",
            spec.program,
            child.id()
        );

        Ok(Box::new(ChildWorkerIo {
            kind,
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        }))
    }
}

/// Stdio of one running child worker.
struct ChildWorkerIo {
    kind: WorkerKind,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

#[async_trait]
impl WorkerIo for ChildWorkerIo {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.stdin.write_all(&buf).await?;
        self.stdin.flush().await
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        // `Lines::next_line` is cancel safe.
        self.stdout.next_line().await
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!("{} worker already gone: {e}", self.kind);
            return;
        }
        match timeout(REAP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => debug!("{} worker exited: {status}", self.kind),
            Ok(Err(e)) => warn!("failed to reap {} worker: {e}", self.kind),
            Err(_) => warn!("{} worker not reaped within {REAP_TIMEOUT:?}", self.kind),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
