//! Remote-access tunnel helper backed by the Tailscale CLI.
//!
//! With `--tailscale` the host brings the tailnet up at start so that a phone
//! outside the LAN can reach the WebSocket listener on the host's `100.x`
//! address.  The host never parses Tailscale traffic; it only drives the CLI:
//!
//! ```text
//! tailscale up
//! tailscale down
//! tailscale status --json   → BackendState, Self.TailscaleIPs[0], Self.HostName
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Time given to the daemon to finish connecting after `tailscale up`.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Error type for tunnel operations.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The CLI could not be started (usually: not installed).
    #[error("could not run {program}: {source}")]
    NotInstalled {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The CLI ran but reported failure.
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// `status --json` printed something that is not a status document.
    #[error("unreadable tunnel status: {0}")]
    BadStatus(#[from] serde_json::Error),
}

/// Snapshot of the tunnel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TunnelStatus {
    pub running: bool,
    pub ip: Option<String>,
    pub hostname: Option<String>,
}

/// Brings a remote-access tunnel up and down.
#[async_trait]
pub trait TunnelHelper: Send + Sync {
    /// Connects and returns the resulting status.
    async fn connect(&self) -> Result<TunnelStatus, TunnelError>;

    async fn disconnect(&self) -> Result<(), TunnelError>;

    async fn status(&self) -> Result<TunnelStatus, TunnelError>;
}

/// [`TunnelHelper`] over the `tailscale` command-line tool.
#[derive(Debug, Clone)]
pub struct TailscaleCli {
    program: String,
}

impl Default for TailscaleCli {
    fn default() -> Self {
        Self::new("tailscale")
    }
}

impl TailscaleCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, TunnelError> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!("running {command}");
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TunnelError::NotInstalled {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(TunnelError::CommandFailed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TunnelHelper for TailscaleCli {
    async fn connect(&self) -> Result<TunnelStatus, TunnelError> {
        self.run(&["up"]).await?;
        tokio::time::sleep(SETTLE_DELAY).await;
        let status = self.status().await?;
        info!(
            "tailscale connected: ip={}",
            status.ip.as_deref().unwrap_or("unknown")
        );
        Ok(status)
    }

    async fn disconnect(&self) -> Result<(), TunnelError> {
        self.run(&["down"]).await?;
        info!("tailscale disconnected");
        Ok(())
    }

    async fn status(&self) -> Result<TunnelStatus, TunnelError> {
        let json = self.run(&["status", "--json"]).await?;
        parse_status(&json)
    }
}

// ── Status document ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusDocument {
    #[serde(default)]
    backend_state: String,
    #[serde(rename = "Self", default)]
    self_node: Option<SelfNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SelfNode {
    #[serde(default)]
    host_name: Option<String>,
    #[serde(rename = "TailscaleIPs", default)]
    tailscale_ips: Vec<String>,
}

/// Reduces `tailscale status --json` output to a [`TunnelStatus`].
pub fn parse_status(json: &str) -> Result<TunnelStatus, TunnelError> {
    let doc: StatusDocument = serde_json::from_str(json)?;
    let node = doc.self_node.unwrap_or_default();
    Ok(TunnelStatus {
        running: doc.backend_state == "Running",
        ip: node.tailscale_ips.into_iter().next(),
        hostname: node.host_name.filter(|h| !h.is_empty()),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
