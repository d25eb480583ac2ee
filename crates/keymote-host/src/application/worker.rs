//! Worker Process Manager: ordered, one-in-flight delivery to an actuator process.
//!
//! Each actuator (keyboard, mouse, mute) is a long-lived external process that
//! reads one command line on stdin and answers with one reply line on stdout.
//! A [`WorkerProcessManager`] owns one such process and its FIFO queue.
//!
//! # State machine
//!
//! ```text
//! NotStarted ──start()──► Starting ──READY──► Ready
//!                            │                  │
//!                            │ exit / timeout   │ exit / reply timeout / stop()
//!                            ▼                  ▼
//!                          Closed ◄─────────────┘
//!                            │
//!                            └──submit()──► Starting (new process incarnation)
//! ```
//!
//! # How delivery works
//!
//! Every incarnation of the process is driven by exactly one tokio task (the
//! *driver*), which owns the process I/O.  [`submit`](WorkerProcessManager::submit)
//! pushes the command onto the shared queue and wakes the driver; the driver
//! pops one command, writes it, waits for its reply, resolves the caller's
//! future, and only then pops the next.  Because the driver is the only
//! writer and it never pops before it is `Ready`, ordering and the
//! one-in-flight rule hold without any extra flags.
//!
//! # Failure handling
//!
//! | Event                               | In-flight command     | Queued commands              |
//! |-------------------------------------|-----------------------|------------------------------|
//! | `ERR` or unrecognized reply         | `ActuatorFault`       | continue on same process     |
//! | no reply within `response_timeout`  | `ActuatorFault`       | process recycled, kept       |
//! | process exits after `READY`         | `WorkerUnavailable`   | kept, immediate respawn      |
//! | launch fails / exits before `READY` | n/a                   | all `WorkerUnavailable`      |
//! | `stop()`                            | `Stopped`             | all `Stopped`                |

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::domain::command::{WorkerKind, WorkerProfile};
use crate::domain::config::WorkerTimings;

/// How long `stop()` waits for the driver to write `EXIT` and kill the process.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// How long the driver waits for the `EXIT` line to be written before killing.
const EXIT_WRITE_GRACE: Duration = Duration::from_millis(500);

/// Errors resolved into a submitted command's future.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// The process could not be started, or died while the command was in flight.
    #[error("{0} worker is unavailable")]
    WorkerUnavailable(WorkerKind),

    /// The process answered with something other than a success line, or not at all.
    #[error("{kind} worker fault: {detail}")]
    ActuatorFault { kind: WorkerKind, detail: String },

    /// The manager was stopped before the command completed.
    #[error("{0} worker was stopped")]
    Stopped(WorkerKind),
}

/// Lifecycle state of the current worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    NotStarted,
    Starting,
    Ready,
    Closed,
}

// ── Process abstraction ───────────────────────────────────────────────────────

/// Line-oriented I/O with one running worker process.
#[async_trait]
pub trait WorkerIo: Send {
    /// Writes `line` followed by a newline to the worker's stdin.
    async fn write_line(&mut self, line: &str) -> std::io::Result<()>;

    /// Reads the next stdout line without its terminator; `Ok(None)` at EOF.
    ///
    /// Must be cancel safe: the driver races it against other events.
    async fn read_line(&mut self) -> std::io::Result<Option<String>>;

    /// Forcibly terminates the process.
    async fn kill(&mut self);
}

/// Starts worker processes.
///
/// The production implementation spawns child processes
/// (`infrastructure::worker::ChildProcessLauncher`); tests use the channel
/// backed launchers in `infrastructure::worker::mock`.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, kind: WorkerKind) -> std::io::Result<Box<dyn WorkerIo>>;
}

// ── Manager ───────────────────────────────────────────────────────────────────

/// One command waiting for (or undergoing) its round trip.
struct PendingCommand {
    payload: String,
    submitted_at: Instant,
    reply: oneshot::Sender<Result<(), WorkerError>>,
}

/// State shared between the manager handle and the driver task.
struct Shared {
    state: WorkerState,
    queue: VecDeque<PendingCommand>,
    /// Bumped for every new process and on `stop()`; a driver whose number
    /// no longer matches has been superseded and must not touch the queue.
    incarnation: u64,
    stop_tx: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
}

struct Core {
    profile: WorkerProfile,
    launcher: Arc<dyn WorkerLauncher>,
    timings: WorkerTimings,
    shared: Mutex<Shared>,
    wake: Notify,
}

/// Owns one actuator process and its command queue.
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct WorkerProcessManager {
    core: Arc<Core>,
}

impl WorkerProcessManager {
    /// Creates a manager in `NotStarted`; no process is spawned until the
    /// first [`submit`](Self::submit) or [`start`](Self::start).
    pub fn new(kind: WorkerKind, launcher: Arc<dyn WorkerLauncher>, timings: WorkerTimings) -> Self {
        Self {
            core: Arc::new(Core {
                profile: WorkerProfile::for_kind(kind),
                launcher,
                timings,
                shared: Mutex::new(Shared {
                    state: WorkerState::NotStarted,
                    queue: VecDeque::new(),
                    incarnation: 0,
                    stop_tx: None,
                    driver: None,
                }),
                wake: Notify::new(),
            }),
        }
    }

    /// Which actuator this manager drives.
    pub fn kind(&self) -> WorkerKind {
        self.core.profile.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.core.lock().state
    }

    /// Number of commands not yet handed to the process.
    pub fn queued(&self) -> usize {
        self.core.lock().queue.len()
    }

    /// Spawns the worker if no process exists.  Idempotent.
    pub fn start(&self) {
        let mut shared = self.core.lock();
        if matches!(shared.state, WorkerState::NotStarted | WorkerState::Closed) {
            self.core.start_locked(&mut shared);
        }
    }

    /// Enqueues `payload` and returns a future resolving to its outcome.
    ///
    /// The command is placed in the queue when `submit` is *called*, not when
    /// the future is first polled, so the submission order is the call order
    /// even if the futures are awaited on different tasks.  A manager that is
    /// `NotStarted` or `Closed` is (re)started here.
    pub fn submit(
        &self,
        payload: impl Into<String>,
    ) -> impl Future<Output = Result<(), WorkerError>> + Send + 'static {
        let kind = self.kind();
        let (reply, rx) = oneshot::channel();
        {
            let mut shared = self.core.lock();
            shared.queue.push_back(PendingCommand {
                payload: payload.into(),
                submitted_at: Instant::now(),
                reply,
            });
            if matches!(shared.state, WorkerState::NotStarted | WorkerState::Closed) {
                self.core.start_locked(&mut shared);
            }
        }
        self.core.wake.notify_one();

        async move { rx.await.unwrap_or(Err(WorkerError::WorkerUnavailable(kind))) }
    }

    /// Writes the exit line, kills the process, and fails every pending
    /// command with [`WorkerError::Stopped`].  Always ends in `Closed`.
    pub async fn stop(&self) {
        let kind = self.kind();
        let (stop_tx, driver, drained) = {
            let mut shared = self.core.lock();
            shared.state = WorkerState::Closed;
            shared.incarnation += 1;
            let drained: Vec<PendingCommand> = shared.queue.drain(..).collect();
            (shared.stop_tx.take(), shared.driver.take(), drained)
        };

        if !drained.is_empty() {
            debug!("{kind} worker stopping with {} queued command(s)", drained.len());
        }
        for pending in drained {
            let _ = pending.reply.send(Err(WorkerError::Stopped(kind)));
        }

        if let Some(tx) = stop_tx {
            let _ = tx.send(());
        }
        if let Some(handle) = driver {
            let abort = handle.abort_handle();
            if timeout(STOP_GRACE, handle).await.is_err() {
                warn!("{kind} worker did not shut down within {STOP_GRACE:?}; aborting driver");
                abort.abort();
            }
        }
        info!("{kind} worker stopped");
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// What the driver should do next.
enum Next {
    Run(PendingCommand),
    Idle,
    Superseded,
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns a new incarnation.  Caller holds the lock and has checked that
    /// no process is live.
    fn start_locked(self: &Arc<Self>, shared: &mut Shared) {
        shared.incarnation += 1;
        shared.state = WorkerState::Starting;
        let (stop_tx, stop_rx) = oneshot::channel();
        shared.stop_tx = Some(stop_tx);
        let core = Arc::clone(self);
        let incarnation = shared.incarnation;
        shared.driver = Some(tokio::spawn(drive(core, incarnation, stop_rx)));
        debug!("{} worker starting (incarnation {incarnation})", self.profile.kind);
    }

    fn mark_ready(&self, incarnation: u64) -> bool {
        let mut shared = self.lock();
        if shared.incarnation != incarnation {
            return false;
        }
        shared.state = WorkerState::Ready;
        true
    }

    fn next(&self, incarnation: u64) -> Next {
        let mut shared = self.lock();
        if shared.incarnation != incarnation {
            return Next::Superseded;
        }
        match shared.queue.pop_front() {
            Some(pending) => Next::Run(pending),
            None => Next::Idle,
        }
    }

    /// The process never became ready: fail everything queued.
    fn fail_startup(&self, incarnation: u64) {
        let drained: Vec<PendingCommand> = {
            let mut shared = self.lock();
            if shared.incarnation != incarnation {
                return;
            }
            shared.state = WorkerState::Closed;
            shared.stop_tx = None;
            shared.driver = None;
            shared.queue.drain(..).collect()
        };
        let kind = self.profile.kind;
        for pending in drained {
            let _ = pending.reply.send(Err(WorkerError::WorkerUnavailable(kind)));
        }
    }

    /// A ready process went away: close, and respawn if work is waiting.
    fn on_exit(self: &Arc<Self>, incarnation: u64) {
        let mut shared = self.lock();
        if shared.incarnation != incarnation {
            return;
        }
        shared.state = WorkerState::Closed;
        shared.stop_tx = None;
        shared.driver = None;
        if !shared.queue.is_empty() {
            info!(
                "{} worker respawning for {} queued command(s)",
                self.profile.kind,
                shared.queue.len()
            );
            self.start_locked(&mut shared);
        }
    }
}

/// Body of one driver task: launch, wait for ready, then serve the queue.
async fn drive(core: Arc<Core>, incarnation: u64, mut stop_rx: oneshot::Receiver<()>) {
    let kind = core.profile.kind;

    let mut io = match core.launcher.launch(kind).await {
        Ok(io) => io,
        Err(e) => {
            error!("failed to launch {kind} worker: {e}");
            core.fail_startup(incarnation);
            return;
        }
    };

    // ── Starting: wait for the ready line ─────────────────────────────────────
    let ready = tokio::select! {
        _ = &mut stop_rx => {
            terminate(io.as_mut(), &core.profile).await;
            return;
        }
        ready = timeout(core.timings.ready_timeout, wait_for_ready(io.as_mut(), &core.profile)) => ready,
    };
    match ready {
        Ok(Ok(true)) => {}
        Ok(Ok(false)) => {
            warn!("{kind} worker exited before reporting ready");
            core.fail_startup(incarnation);
            return;
        }
        Ok(Err(e)) => {
            warn!("{kind} worker I/O error during start-up: {e}");
            io.kill().await;
            core.fail_startup(incarnation);
            return;
        }
        Err(_) => {
            warn!(
                "{kind} worker did not report ready within {:?}",
                core.timings.ready_timeout
            );
            io.kill().await;
            core.fail_startup(incarnation);
            return;
        }
    }
    if !core.mark_ready(incarnation) {
        terminate(io.as_mut(), &core.profile).await;
        return;
    }
    info!("{kind} worker ready");

    // ── Ready: one command at a time ──────────────────────────────────────────
    loop {
        let pending = match core.next(incarnation) {
            Next::Run(pending) => pending,
            Next::Superseded => {
                terminate(io.as_mut(), &core.profile).await;
                return;
            }
            Next::Idle => {
                tokio::select! {
                    _ = &mut stop_rx => {
                        terminate(io.as_mut(), &core.profile).await;
                        return;
                    }
                    _ = core.wake.notified() => continue,
                    line = io.read_line() => match line {
                        Ok(Some(line)) => {
                            debug!("{kind} worker: ignoring unsolicited output {line:?}");
                            continue;
                        }
                        Ok(None) | Err(_) => {
                            warn!("{kind} worker exited while idle");
                            core.on_exit(incarnation);
                            return;
                        }
                    },
                }
            }
        };

        debug!(
            "{kind} worker <- {:?} (queued {:?})",
            pending.payload,
            pending.submitted_at.elapsed()
        );

        if let Err(e) = io.write_line(&pending.payload).await {
            warn!("{kind} worker stdin closed: {e}");
            let _ = pending.reply.send(Err(WorkerError::WorkerUnavailable(kind)));
            io.kill().await;
            core.on_exit(incarnation);
            return;
        }

        let reply = tokio::select! {
            _ = &mut stop_rx => {
                let _ = pending.reply.send(Err(WorkerError::Stopped(kind)));
                terminate(io.as_mut(), &core.profile).await;
                return;
            }
            reply = timeout(core.timings.response_timeout, io.read_line()) => reply,
        };

        match reply {
            Ok(Ok(Some(line))) => {
                let outcome = if core.profile.is_success(&line) {
                    Ok(())
                } else {
                    warn!("{kind} worker rejected {:?}: {line:?}", pending.payload);
                    Err(WorkerError::ActuatorFault {
                        kind,
                        detail: line.trim().to_string(),
                    })
                };
                let _ = pending.reply.send(outcome);
            }
            Ok(Ok(None)) | Ok(Err(_)) => {
                warn!("{kind} worker exited with a command in flight");
                let _ = pending.reply.send(Err(WorkerError::WorkerUnavailable(kind)));
                core.on_exit(incarnation);
                return;
            }
            Err(_) => {
                // A late reply must never be read as the next command's answer.
                warn!(
                    "{kind} worker gave no reply within {:?}; recycling process",
                    core.timings.response_timeout
                );
                let _ = pending.reply.send(Err(WorkerError::ActuatorFault {
                    kind,
                    detail: "no reply".to_string(),
                }));
                io.kill().await;
                core.on_exit(incarnation);
                return;
            }
        }
    }
}

/// Reads lines until the ready line.  `Ok(false)` if the process exits first.
async fn wait_for_ready(io: &mut dyn WorkerIo, profile: &WorkerProfile) -> std::io::Result<bool> {
    while let Some(line) = io.read_line().await? {
        if profile.is_ready(&line) {
            return Ok(true);
        }
        debug!("{} worker start-up output: {line:?}", profile.kind);
    }
    Ok(false)
}

/// Asks the process to exit, then kills it regardless.
async fn terminate(io: &mut dyn WorkerIo, profile: &WorkerProfile) {
    let _ = timeout(EXIT_WRITE_GRACE, io.write_line(profile.exit_line)).await;
    io.kill().await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
