//! Reference-counted speaker mute.
//!
//! Several sessions may want the host's speakers muted at once (each one
//! streaming audio to its phone).  The controller keeps a count of holds and
//! only talks to the mute worker on the edges:
//!
//! ```text
//! count: 0 ──set_mute(true)──► 1 ──set_mute(true)──► 2
//!        ▲  (MUTE sent)          ▲                   │
//!        │                       └──set_mute(false)──┘
//!        └──set_mute(false)── 1
//!           (UNMUTE sent)
//! ```
//!
//! The count never goes below zero, so an extra release is harmless.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::application::worker::{WorkerError, WorkerProcessManager};
use crate::domain::command::{MUTE_COMMAND, UNMUTE_COMMAND};

/// Mute controller on top of the mute worker.
pub struct MuteController {
    worker: WorkerProcessManager,
    count: Mutex<u32>,
}

impl MuteController {
    pub fn new(worker: WorkerProcessManager) -> Self {
        Self {
            worker,
            count: Mutex::new(0),
        }
    }

    /// Adds (`true`) or releases (`false`) one hold and waits for the
    /// worker's result on an edge.  `Ok` when the count did not cross zero.
    pub async fn set_mute(&self, mute: bool) -> Result<(), WorkerError> {
        self.change(mute).await
    }

    /// Adds or releases one hold now and returns a future for the worker's
    /// result.
    ///
    /// The worker command for an edge is submitted while the count is locked,
    /// so two racing calls can never reach the worker out of order, even when
    /// the returned futures are awaited on different tasks.
    pub fn change(&self, mute: bool) -> impl Future<Output = Result<(), WorkerError>> + Send + 'static {
        let pending = {
            let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
            if mute {
                *count += 1;
                debug!("mute hold acquired (count {})", *count);
                (*count == 1).then(|| self.worker.submit(MUTE_COMMAND))
            } else if *count == 0 {
                debug!("mute release ignored: no holds");
                None
            } else {
                *count -= 1;
                debug!("mute hold released (count {})", *count);
                (*count == 0).then(|| self.worker.submit(UNMUTE_COMMAND))
            }
        };

        async move {
            let Some(done) = pending else {
                return Ok(());
            };
            let result = done.await;
            match &result {
                Ok(()) => info!("speakers {}", if mute { "muted" } else { "unmuted" }),
                Err(e) => warn!("mute worker failed: {e}"),
            }
            result
        }
    }

    /// Returns `true` while at least one hold exists.
    pub fn is_muted(&self) -> bool {
        self.hold_count() > 0
    }

    /// Current number of holds.
    pub fn hold_count(&self) -> u32 {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops every hold, unmutes, and stops the mute worker.
    ///
    /// `UNMUTE` is sent even when the count is already zero, so the speakers
    /// end up unmuted whatever state the worker was left in.
    pub async fn cleanup(&self) {
        let done = {
            let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
            *count = 0;
            self.worker.submit(UNMUTE_COMMAND)
        };
        if let Err(e) = done.await {
            warn!("failed to unmute during cleanup: {e}");
        }
        self.worker.stop().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
