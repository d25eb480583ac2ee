//! Keymote remote entry point.
//!
//! A terminal remote for a Keymote host: lines typed on stdin become text,
//! key, mouse and screen messages (see `/help`).
//!
//! # Usage
//!
//! ```text
//! keymote-remote [--url ws://HOST:8765] [--pin 123456] [--remember]
//! keymote-remote --discover
//! ```
//!
//! The device id and any token the host issues are kept in `remote.json` in
//! the platform config directory, so a remembered remote reconnects without
//! the PIN.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use keymote_core::protocol::discovery::DEFAULT_DISCOVERY_PORT;
use keymote_core::protocol::messages::ServerMessage;
use keymote_remote::application::commands::{parse_line, Command, HELP};
use keymote_remote::application::session::{Credentials, RemoteEvent};
use keymote_remote::infrastructure::connection::{ClientConfig, ClientHandle, RemoteClient, DEFAULT_URL};
use keymote_remote::infrastructure::discovery::{broadcast_target, discover_hosts};
use keymote_remote::infrastructure::identity::IdentityFile;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Keymote remote: drive a Keymote host from the terminal.
#[derive(Debug, Parser)]
#[command(name = "keymote-remote", version)]
struct Cli {
    /// WebSocket URL of the host [default: ws://127.0.0.1:8765, or the first
    /// host found with --discover].
    #[arg(long, env = "KEYMOTE_URL")]
    url: Option<String>,

    /// Pairing PIN shown by the host.
    #[arg(long, env = "KEYMOTE_PIN")]
    pin: Option<String>,

    /// Device id to present instead of the saved one.
    #[arg(long, env = "KEYMOTE_DEVICE_ID")]
    device_id: Option<String>,

    /// Computer name the host must have; a PIN login to any other host is refused.
    #[arg(long, env = "KEYMOTE_COMPUTER_NAME")]
    computer_name: Option<String>,

    /// Ask the host for a device token so later runs skip the PIN.
    #[arg(long)]
    remember: bool,

    /// Look for hosts on the local network before connecting.
    #[arg(long)]
    discover: bool,

    /// UDP port hosts answer discovery requests on.
    #[arg(long, default_value_t = DEFAULT_DISCOVERY_PORT)]
    discovery_port: u16,

    /// How long to wait for discovery answers, in milliseconds.
    #[arg(long, default_value_t = 1500)]
    discover_wait_ms: u64,

    /// Path of the identity file holding the device id and token.
    #[arg(long, env = "KEYMOTE_IDENTITY")]
    identity: Option<PathBuf>,

    /// Seconds between latency pings.
    #[arg(long, default_value_t = 5)]
    ping_secs: u64,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let identity_file = match &cli.identity {
        Some(path) => IdentityFile::new(path),
        None => IdentityFile::default_location().context("locating the identity file")?,
    };
    let identity = identity_file
        .load_or_create()
        .with_context(|| format!("loading {}", identity_file.path().display()))?;

    let url = resolve_url(&cli).await?;
    let credentials = Credentials {
        device_id: cli.device_id.clone().unwrap_or(identity.device_id),
        token: identity.token,
        pin: cli.pin.clone(),
        computer_name: cli.computer_name.clone(),
        remember_me: cli.remember,
    };

    info!("Keymote remote connecting to {url} as device {}", credentials.device_id);
    let config = ClientConfig {
        url,
        ping_interval: Duration::from_secs(cli.ping_secs.max(1)),
        ..ClientConfig::default()
    };
    let (handle, mut events) = RemoteClient::new(config, credentials).start();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => on_event(event, &identity_file),
                None => break,
            },

            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => on_line(&line, &handle),
                Ok(None) | Err(_) => {
                    debug!("stdin closed");
                    stdin_open = false;
                    handle.shutdown();
                }
            },

            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                handle.shutdown();
            }
        }
    }

    info!("Keymote remote stopped");
    Ok(())
}

/// `--url`, else the first discovered host when `--discover` is set, else
/// the local default.
async fn resolve_url(cli: &Cli) -> anyhow::Result<String> {
    if !cli.discover {
        return Ok(cli.url.clone().unwrap_or_else(|| DEFAULT_URL.to_string()));
    }

    let hosts = discover_hosts(
        broadcast_target(cli.discovery_port),
        Duration::from_millis(cli.discover_wait_ms),
    )
    .await
    .context("sending the discovery request")?;

    if hosts.is_empty() {
        warn!("no hosts answered on UDP port {}", cli.discovery_port);
    }
    for host in &hosts {
        info!("found {} at {}", host.name, host.url());
    }

    match (&cli.url, hosts.first()) {
        (Some(url), _) => Ok(url.clone()),
        (None, Some(host)) => Ok(host.url()),
        (None, None) => anyhow::bail!("no Keymote host found; pass --url"),
    }
}

fn on_line(line: &str, handle: &ClientHandle) {
    let result = match parse_line(line) {
        Ok(Some(Command::Send(msg))) => handle.send(msg),
        Ok(Some(Command::Reconnect)) => handle.reconnect(),
        Ok(Some(Command::Quit)) => {
            handle.shutdown();
            Ok(())
        }
        Ok(Some(Command::Help)) => {
            println!("{HELP}");
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            println!("{e}");
            Ok(())
        }
    };
    if let Err(e) = result {
        warn!("{e}");
    }
}

fn on_event(event: RemoteEvent, identity_file: &IdentityFile) {
    match event {
        RemoteEvent::Connected => info!("connected"),
        RemoteEvent::Authenticated { computer_name } => info!(
            "authenticated with {}; type /help for commands",
            computer_name.as_deref().unwrap_or("host")
        ),
        RemoteEvent::AuthFailed { error, .. } => warn!("authentication failed: {error}"),
        RemoteEvent::PinRequired => warn!("the host requires a PIN; run again with --pin"),
        RemoteEvent::TokenIssued(token) => match identity_file.store_token(Some(&token)) {
            Ok(()) => info!("device remembered; later runs skip the PIN"),
            Err(e) => error!("could not save the device token: {e}"),
        },
        RemoteEvent::TokenCleared => {
            if let Err(e) = identity_file.store_token(None) {
                error!("could not clear the device token: {e}");
            }
        }
        RemoteEvent::Latency { rtt_ms, average_ms } => {
            debug!("latency {rtt_ms} ms (average {average_ms} ms)")
        }
        RemoteEvent::Message(ServerMessage::Ack { id, success }) => {
            if success {
                debug!("ack {id}");
            } else {
                warn!("host could not perform input {id}");
            }
        }
        RemoteEvent::Message(ServerMessage::Error { error }) => warn!("host error: {error}"),
        RemoteEvent::Message(ServerMessage::ScreenFrame { width, height, .. }) => {
            debug!("screen frame {width}x{height}")
        }
        RemoteEvent::Message(other) => debug!("host sent {}", other.kind()),
        RemoteEvent::Disconnected => warn!("disconnected; reconnecting"),
        RemoteEvent::GaveUp { attempts } => {
            error!("host unreachable after {attempts} attempts; type /reconnect to try again")
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
