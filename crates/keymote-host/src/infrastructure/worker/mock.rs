//! Mock worker processes for unit and integration testing.
//!
//! Real workers inject keystrokes and mute the speakers of the machine running
//! the tests, so the worker pipeline is exercised against in-memory processes
//! instead.  Two launchers are provided:
//!
//! - [`MockLauncher`] hands each "spawned" process to the test as a
//!   [`MockWorker`], which reads the host's command lines and writes replies
//!   by hand.  Use it to script READY, crashes, slow replies and `ERR`s.
//! - [`ScriptedLauncher`] runs a tiny fake worker that answers every command
//!   automatically and records what it received.  Use it when the worker is
//!   just plumbing for the behavior under test.
//!
//! # Usage in tests
//!
//! ```ignore
//! let (launcher, mut workers) = MockLauncher::new();
//! let manager = WorkerProcessManager::new(WorkerKind::Mouse, launcher, timings);
//! let done = manager.submit("left");
//!
//! let mut worker = workers.recv().await.unwrap();
//! worker.reply("READY");
//! assert_eq!(worker.next_line().await.as_deref(), Some("left"));
//! worker.reply("OK");
//! assert!(done.await.is_ok());
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::application::worker::{WorkerIo, WorkerLauncher};
use crate::domain::command::{WorkerKind, EXIT_LINE, MUTE_COMMAND, READY_LINE, UNMUTE_COMMAND};

/// Host side of an in-memory worker process.
pub struct MockWorkerIo {
    to_worker: mpsc::UnboundedSender<String>,
    from_worker: mpsc::UnboundedReceiver<String>,
    killed: Arc<AtomicBool>,
}

#[async_trait]
impl WorkerIo for MockWorkerIo {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.to_worker
            .send(line.to_string())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "mock worker stdin closed"))
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.from_worker.recv().await)
    }

    async fn kill(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
        self.from_worker.close();
    }
}

/// Creates a connected (host side, worker side) pair.
fn pipe_pair() -> (MockWorkerIo, MockWorker) {
    let (to_worker, lines) = mpsc::unbounded_channel();
    let (replies, from_worker) = mpsc::unbounded_channel();
    let killed = Arc::new(AtomicBool::new(false));
    (
        MockWorkerIo {
            to_worker,
            from_worker,
            killed: Arc::clone(&killed),
        },
        MockWorker {
            lines,
            replies: Some(replies),
            killed,
        },
    )
}

// ── Hand-driven workers ───────────────────────────────────────────────────────

/// Test side of one in-memory worker process.
pub struct MockWorker {
    lines: mpsc::UnboundedReceiver<String>,
    replies: Option<mpsc::UnboundedSender<String>>,
    killed: Arc<AtomicBool>,
}

impl MockWorker {
    /// Next command line the host wrote, or `None` once the host side is gone.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Writes one line to the host, as the worker's stdout would.
    pub fn reply(&self, line: &str) {
        if let Some(replies) = &self.replies {
            let _ = replies.send(line.to_string());
        }
    }

    /// Simulates the process exiting: the host sees EOF on stdout.
    pub fn crash(&mut self) {
        self.replies = None;
    }

    /// Returns `true` once the host has killed this process.
    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

/// Launcher that hands every new process to the test.
pub struct MockLauncher {
    workers: mpsc::UnboundedSender<MockWorker>,
    launches: AtomicUsize,
    fail: AtomicBool,
}

impl MockLauncher {
    /// Creates the launcher and the receiver on which spawned workers appear.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockWorker>) {
        let (workers, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                workers,
                launches: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }),
            rx,
        )
    }

    /// When `true`, every launch fails as if the program did not exist.
    pub fn fail_launches(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of launch attempts so far.
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerLauncher for MockLauncher {
    async fn launch(&self, _kind: WorkerKind) -> io::Result<Box<dyn WorkerIo>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "mock launch failure"));
        }
        let (io, worker) = pipe_pair();
        let _ = self.workers.send(worker);
        Ok(Box::new(io))
    }
}

// ── Self-answering workers ────────────────────────────────────────────────────

type Responder = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Launcher whose workers say READY at once and answer every command.
pub struct ScriptedLauncher {
    responder: Arc<Responder>,
    log: Arc<Mutex<Vec<String>>>,
    launches: AtomicUsize,
}

impl ScriptedLauncher {
    /// Workers that answer like healthy real ones: `MUTED`/`UNMUTED` for the
    /// mute commands and `OK` for everything else.
    pub fn ok() -> Arc<Self> {
        Self::with_responder(|line| {
            let reply = match line {
                MUTE_COMMAND => "MUTED",
                UNMUTE_COMMAND => "UNMUTED",
                _ => "OK",
            };
            Some(reply.to_string())
        })
    }

    /// Workers that answer each command with `responder(line)`; `None` means
    /// stay silent.
    pub fn with_responder(
        responder: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Arc::new(responder),
            log: Arc::new(Mutex::new(Vec::new())),
            launches: AtomicUsize::new(0),
        })
    }

    /// Every command received by any worker from this launcher, in order.
    /// The exit line is not recorded.
    pub fn commands(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of processes launched.
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerLauncher for ScriptedLauncher {
    async fn launch(&self, _kind: WorkerKind) -> io::Result<Box<dyn WorkerIo>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let (io, mut worker) = pipe_pair();
        let responder = Arc::clone(&self.responder);
        let log = Arc::clone(&self.log);

        tokio::spawn(async move {
            worker.reply(READY_LINE);
            while let Some(line) = worker.next_line().await {
                if line == EXIT_LINE {
                    break;
                }
                log.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(line.clone());
                if let Some(reply) = responder(&line) {
                    worker.reply(&reply);
                }
            }
        });

        Ok(Box::new(io))
    }
}
