//! Host runtime configuration types.
//!
//! [`HostConfig`] is the single source of truth for runtime settings.  The
//! binary builds it from the TOML config file overlaid with CLI arguments;
//! tests build it from [`HostConfig::default`] and tweak fields.

use std::net::SocketAddr;
use std::time::Duration;

use super::command::WorkerKind;

/// All runtime configuration for the host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Address the WebSocket transport binds to.
    pub ws_bind_addr: SocketAddr,

    /// Address the peer-relay listener binds to (loopback only by default,
    /// since the relay sidecar runs on the same machine).
    pub peer_relay_addr: Option<SocketAddr>,

    /// UDP port answering LAN discovery requests.  `None` disables discovery.
    pub discovery_port: Option<u16>,

    /// Shared PIN.  `None` means every session is authenticated on connect.
    pub pin: Option<String>,

    /// Name reported in the greeting and checked against the remote's hint.
    pub computer_name: String,

    /// Interval between heartbeat sweeps.
    pub heartbeat_interval: Duration,

    /// Initial screen-frame rate.
    pub fps: u32,

    /// How to launch each worker process.
    pub keyboard_worker: WorkerSpec,
    pub mouse_worker: WorkerSpec,
    pub mute_worker: WorkerSpec,

    /// Reply and readiness deadlines shared by all workers.
    pub worker_timings: WorkerTimings,
}

impl HostConfig {
    /// Returns the launch spec for one worker kind.
    pub fn worker_spec(&self, kind: WorkerKind) -> &WorkerSpec {
        match kind {
            WorkerKind::Keyboard => &self.keyboard_worker,
            WorkerKind::Mouse => &self.mouse_worker,
            WorkerKind::Mute => &self.mute_worker,
        }
    }
}

impl Default for HostConfig {
    /// | Field              | Default            |
    /// |--------------------|--------------------|
    /// | ws_bind_addr       | `0.0.0.0:8765`     |
    /// | peer_relay_addr    | none               |
    /// | discovery_port     | 8766               |
    /// | pin                | none               |
    /// | heartbeat_interval | 30 seconds         |
    /// | fps                | 5                  |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], 8765)),
            peer_relay_addr: None,
            discovery_port: Some(8766),
            pin: None,
            computer_name: "keymote-host".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            fps: 5,
            keyboard_worker: WorkerSpec::new("keymote-keyboard-worker"),
            mouse_worker: WorkerSpec::new("keymote-mouse-worker"),
            mute_worker: WorkerSpec::new("keymote-mute-worker"),
            worker_timings: WorkerTimings::default(),
        }
    }
}

/// Program and arguments that start one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerSpec {
    /// A spec running `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

/// Deadlines applied to every worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTimings {
    /// How long a freshly spawned worker may take to print its ready line.
    pub ready_timeout: Duration,
    /// How long one command may wait for its reply line.
    pub response_timeout: Duration,
}

impl Default for WorkerTimings {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(5),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
