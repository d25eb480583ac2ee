//! Periodic liveness tasks.
//!
//! [`HeartbeatMonitor`]: every `interval` the monitor runs one registry
//! sweep.  A session survives a sweep only if it answered the previous
//! sweep's ping (a WebSocket pong frame or a `pong` message), so a dead peer
//! is dropped within two intervals.
//!
//! [`RevocationWatch`]: polls the credential store for tokens deleted by
//! `keymote-host tokens revoke` and signs the affected sessions out.
//!
//! Both loops exit as soon as `true` is sent on their shutdown channel (or
//! the sender is dropped), without waiting for the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::router::MessageRouter;

/// Default polling period of [`RevocationWatch`].
pub const DEFAULT_REVOCATION_POLL: Duration = Duration::from_secs(2);

/// Periodic heartbeat sweeps over the router's registry.
pub struct HeartbeatMonitor {
    router: Arc<MessageRouter>,
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(router: Arc<MessageRouter>, interval: Duration) -> Self {
        Self { router, interval }
    }

    /// Runs a single sweep now.  Returns the number of sessions terminated.
    pub async fn sweep_once(&self) -> usize {
        let pruned = self.router.heartbeat_sweep().await;
        if pruned > 0 {
            info!("heartbeat: terminated {pruned} silent session(s)");
        } else {
            debug!("heartbeat: all sessions alive");
        }
        pruned
    }

    /// Spawns the sweep loop.  The first sweep happens one interval after
    /// start.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let interval = self.interval;
        tokio::spawn(async move {
            run_every(interval, shutdown, || self.sweep_once()).await;
            debug!("heartbeat monitor stopped");
        })
    }
}

/// Applies token revocations made outside the host process.
pub struct RevocationWatch {
    router: Arc<MessageRouter>,
    interval: Duration,
}

impl RevocationWatch {
    pub fn new(router: Arc<MessageRouter>, interval: Duration) -> Self {
        Self { router, interval }
    }

    /// Checks the store once.  Returns the number of sessions signed out.
    pub async fn check_once(&self) -> usize {
        match self.router.sync_revocations().await {
            Ok(affected) => affected,
            Err(e) => {
                warn!("could not check the token store for revocations: {e}");
                0
            }
        }
    }

    /// Spawns the polling loop.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let interval = self.interval;
        tokio::spawn(async move {
            run_every(interval, shutdown, || self.check_once()).await;
            debug!("revocation watch stopped");
        })
    }
}

/// Runs `tick` every `period` (first run one period from now) until shutdown.
async fn run_every<F, Fut>(period: Duration, mut shutdown: watch::Receiver<bool>, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = usize>,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        if *shutdown.borrow_and_update() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                tick().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
