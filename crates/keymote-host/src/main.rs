//! Keymote host entry point.
//!
//! Accepts phone sessions over WebSocket (and, optionally, a local relay for
//! a WebRTC sidecar), authenticates them, and forwards their input to the
//! keyboard, mouse and mute worker processes.
//!
//! # Usage
//!
//! ```text
//! keymote-host [OPTIONS] [COMMAND]
//!
//! Commands:
//!   serve                   Run the host (default)
//!   tokens list             Show paired devices
//!   tokens revoke <DEVICE>  Forget one device's token
//! ```
//!
//! # Configuration layering
//!
//! Every option is resolved in this order, first match wins:
//!
//! 1. the command-line flag,
//! 2. its `KEYMOTE_*` environment variable,
//! 3. `config.toml` in the platform config directory (or `--config`),
//! 4. the built-in default.
//!
//! | Variable                 | Default        | Description                    |
//! |--------------------------|----------------|--------------------------------|
//! | `KEYMOTE_BIND`           | `0.0.0.0`      | Listener address               |
//! | `KEYMOTE_PORT`           | `8765`         | WebSocket port                 |
//! | `KEYMOTE_DISCOVERY_PORT` | `8766`         | UDP discovery port             |
//! | `KEYMOTE_PIN`            | random PIN     | Pairing PIN                    |
//! | `KEYMOTE_COMPUTER_NAME`  | OS host name   | Name shown to phones           |
//! | `KEYMOTE_HEARTBEAT_SECS` | `30`           | Heartbeat sweep interval       |
//! | `KEYMOTE_FPS`            | `5`            | Initial screen frame rate      |

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use keymote_host::application::auth::{generate_pin, AuthGate, AuthPolicy};
use keymote_host::application::broadcaster::{FrameBroadcaster, ScreenCapture};
use keymote_host::application::credentials::CredentialStore;
use keymote_host::application::liveness::{
    HeartbeatMonitor, RevocationWatch, DEFAULT_REVOCATION_POLL,
};
use keymote_host::application::mute::MuteController;
use keymote_host::application::registry::SessionRegistry;
use keymote_host::application::router::MessageRouter;
use keymote_host::application::translate::InputPipeline;
use keymote_host::application::worker::WorkerProcessManager;
use keymote_host::domain::{HostConfig, WorkerKind, WorkerSpec, WorkerTimings};
use keymote_host::infrastructure::capture::{CommandCapture, NullCapture};
use keymote_host::infrastructure::discovery::{Discovery, UdpDiscovery};
use keymote_host::infrastructure::peer_relay::run_relay;
use keymote_host::infrastructure::storage::{
    config_dir, load_config_from, HostFileConfig, JsonFileCredentialStore, TOKEN_FILE_NAME,
};
use keymote_host::infrastructure::tunnel::{TailscaleCli, TunnelHelper};
use keymote_host::infrastructure::worker::ChildProcessLauncher;
use keymote_host::infrastructure::ws_server::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Keymote host: drive this computer from a paired phone.
#[derive(Debug, Parser)]
#[command(name = "keymote-host", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the host (the default when no command is given).
    Serve,

    /// Manage remembered device tokens.
    Tokens {
        #[command(subcommand)]
        action: TokensCommand,
    },
}

#[derive(Debug, Subcommand)]
enum TokensCommand {
    /// List paired devices.
    List,

    /// Delete one device's token; the device must enter the PIN again.
    Revoke {
        /// Device id as shown by `tokens list`.
        device: String,
    },
}

/// Options for the host.  Unset options fall back to `config.toml`.
#[derive(Debug, Args)]
struct ServeArgs {
    /// Path of the TOML config file.  Device tokens live next to it.
    #[arg(long, global = true, env = "KEYMOTE_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to listen on.
    #[arg(long, env = "KEYMOTE_BIND")]
    bind: Option<String>,

    /// WebSocket port [default: 8765].
    #[arg(long, env = "KEYMOTE_PORT")]
    port: Option<u16>,

    /// UDP port answering LAN discovery requests [default: 8766].
    #[arg(long, env = "KEYMOTE_DISCOVERY_PORT")]
    discovery_port: Option<u16>,

    /// Do not answer LAN discovery requests.
    #[arg(long)]
    no_discovery: bool,

    /// Loopback address for the WebRTC sidecar relay, e.g. `127.0.0.1:8767`.
    #[arg(long, env = "KEYMOTE_PEER_RELAY")]
    peer_relay: Option<String>,

    /// Pairing PIN.  Without it a random PIN is generated and logged.
    #[arg(long, env = "KEYMOTE_PIN", conflicts_with = "no_pin")]
    pin: Option<String>,

    /// Accept every session without authentication.
    #[arg(long)]
    no_pin: bool,

    /// Name shown to phones and checked against their hint.
    #[arg(long, env = "KEYMOTE_COMPUTER_NAME")]
    computer_name: Option<String>,

    /// Seconds between heartbeat sweeps [default: 30].
    #[arg(long, env = "KEYMOTE_HEARTBEAT_SECS")]
    heartbeat_secs: Option<u64>,

    /// Initial screen frame rate, 1 to 30 [default: 5].
    #[arg(long, env = "KEYMOTE_FPS")]
    fps: Option<u32>,

    /// Command printing one JPEG screenshot to stdout, e.g. "grim -t jpeg -".
    #[arg(long, env = "KEYMOTE_CAPTURE_COMMAND")]
    capture_command: Option<String>,

    /// Command printing the cursor position as "X Y".
    #[arg(long, env = "KEYMOTE_CURSOR_COMMAND")]
    cursor_command: Option<String>,

    /// Keyboard worker command line.
    #[arg(long, env = "KEYMOTE_KEYBOARD_WORKER")]
    keyboard_worker: Option<String>,

    /// Mouse worker command line.
    #[arg(long, env = "KEYMOTE_MOUSE_WORKER")]
    mouse_worker: Option<String>,

    /// Mute worker command line.
    #[arg(long, env = "KEYMOTE_MUTE_WORKER")]
    mute_worker: Option<String>,

    /// Milliseconds a worker may take to print its ready line [default: 10000].
    #[arg(long)]
    ready_timeout_ms: Option<u64>,

    /// Milliseconds a worker may take to answer one command [default: 5000].
    #[arg(long)]
    response_timeout_ms: Option<u64>,

    /// Bring Tailscale up at start and down at exit.
    #[arg(long, env = "KEYMOTE_TAILSCALE")]
    tailscale: bool,
}

/// Everything `serve` needs, after layering CLI over the config file.
#[derive(Debug)]
struct Settings {
    host: HostConfig,
    /// `true` when the PIN was generated for this run.
    generated_pin: bool,
    capture_command: Option<Vec<String>>,
    cursor_command: Option<Vec<String>>,
    tailscale: bool,
}

impl ServeArgs {
    /// Path of the config file in use.
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()
                .context("cannot locate the config directory; pass --config")?
                .join("config.toml")),
        }
    }

    /// Layers these arguments over `file` into the runtime settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the bind or relay address does not parse.
    fn into_settings(self, file: HostFileConfig) -> anyhow::Result<Settings> {
        let bind = self.bind.unwrap_or(file.network.bind_address);
        let port = self.port.unwrap_or(file.network.port);
        let ws_bind_addr: SocketAddr = format!("{bind}:{port}")
            .parse()
            .with_context(|| format!("invalid bind address: '{bind}:{port}'"))?;

        let peer_relay_addr = self
            .peer_relay
            .or(file.network.peer_relay)
            .map(|addr| {
                addr.parse::<SocketAddr>()
                    .with_context(|| format!("invalid peer relay address: '{addr}'"))
            })
            .transpose()?;

        let discovery_port = (!self.no_discovery && file.network.discovery_enabled)
            .then(|| self.discovery_port.unwrap_or(file.network.discovery_port));

        let require_pin = !self.no_pin && file.host.require_pin;
        let mut generated_pin = false;
        let pin = if require_pin {
            Some(self.pin.or(file.host.pin).unwrap_or_else(|| {
                generated_pin = true;
                generate_pin()
            }))
        } else {
            None
        };

        let computer_name = self
            .computer_name
            .or(file.host.computer_name)
            .unwrap_or_else(default_computer_name);

        let worker = |cli: Option<String>, file: WorkerSpec| -> WorkerSpec {
            cli.and_then(|line| split_command(&line))
                .map(|mut argv| WorkerSpec {
                    program: argv.remove(0),
                    args: argv,
                })
                .unwrap_or(file)
        };

        Ok(Settings {
            host: HostConfig {
                ws_bind_addr,
                peer_relay_addr,
                discovery_port,
                pin,
                computer_name,
                heartbeat_interval: Duration::from_secs(
                    self.heartbeat_secs.unwrap_or(file.network.heartbeat_secs).max(1),
                ),
                fps: self.fps.unwrap_or(file.screen.fps),
                keyboard_worker: worker(self.keyboard_worker, file.workers.keyboard.into()),
                mouse_worker: worker(self.mouse_worker, file.workers.mouse.into()),
                mute_worker: worker(self.mute_worker, file.workers.mute.into()),
                worker_timings: WorkerTimings {
                    ready_timeout: Duration::from_millis(
                        self.ready_timeout_ms.unwrap_or(file.workers.ready_timeout_ms),
                    ),
                    response_timeout: Duration::from_millis(
                        self.response_timeout_ms
                            .unwrap_or(file.workers.response_timeout_ms),
                    ),
                },
            },
            generated_pin,
            capture_command: self
                .capture_command
                .and_then(|line| split_command(&line))
                .or(file.screen.capture_command),
            cursor_command: self
                .cursor_command
                .and_then(|line| split_command(&line))
                .or(file.screen.cursor_command),
            tailscale: self.tailscale,
        })
    }
}

/// Splits a command line on whitespace.  Empty input is `None`.
fn split_command(line: &str) -> Option<Vec<String>> {
    let argv: Vec<String> = line.split_whitespace().map(str::to_string).collect();
    (!argv.is_empty()).then_some(argv)
}

/// The OS host name from the environment, or a fixed fallback.
fn default_computer_name() -> String {
    ["COMPUTERNAME", "HOSTNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| "keymote-host".to_string())
}

fn token_store_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(|dir| dir.join(TOKEN_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(TOKEN_FILE_NAME))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.serve.config_path()?;
    let file = load_config_from(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    // `RUST_LOG` wins over the config file's level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&file.host.log_level)),
        )
        .init();

    let tokens_path = token_store_path(&config_path);
    match cli.command {
        Some(Command::Tokens { action }) => run_tokens(action, &tokens_path),
        Some(Command::Serve) | None => {
            let settings = cli.serve.into_settings(file)?;
            serve(settings, &tokens_path).await
        }
    }
}

fn run_tokens(action: TokensCommand, tokens_path: &Path) -> anyhow::Result<()> {
    let store = JsonFileCredentialStore::open(tokens_path)
        .with_context(|| format!("failed to open {}", tokens_path.display()))?;
    match action {
        TokensCommand::List => {
            let devices = store.list()?;
            if devices.is_empty() {
                println!("no paired devices");
            }
            for (device_id, record) in devices {
                println!("{device_id}\tcreated={}", record.created);
            }
        }
        TokensCommand::Revoke { device } => {
            if store.remove(&device)? {
                println!(
                    "revoked {device}; a running host signs it out within {}s",
                    DEFAULT_REVOCATION_POLL.as_secs()
                );
            } else {
                println!("no token for {device}");
            }
        }
    }
    Ok(())
}

async fn serve(settings: Settings, tokens_path: &Path) -> anyhow::Result<()> {
    let config = settings.host;
    info!(
        "Keymote host starting: ws={}, name={}",
        config.ws_bind_addr, config.computer_name
    );
    match (&config.pin, settings.generated_pin) {
        (Some(pin), true) => info!("pairing PIN for this session: {pin}"),
        (Some(_), false) => info!("pairing PIN loaded from configuration"),
        (None, _) => warn!("PIN disabled: every connection is trusted"),
    }

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let tunnel = settings.tailscale.then(TailscaleCli::default);
    if let Some(tunnel) = &tunnel {
        match tunnel.connect().await {
            Ok(status) if status.running => info!(
                "reachable over Tailscale at {}:{}",
                status.ip.as_deref().unwrap_or("?"),
                config.ws_bind_addr.port()
            ),
            Ok(_) => warn!("tailscale did not reach the Running state"),
            Err(e) => warn!("tailscale unavailable: {e}"),
        }
    }

    // ── Use cases ──────────────────────────────────────────────────────────────
    let store = Arc::new(
        JsonFileCredentialStore::open(tokens_path)
            .with_context(|| format!("failed to open {}", tokens_path.display()))?,
    );
    let launcher = Arc::new(ChildProcessLauncher::from_config(&config));
    let manager = |kind| WorkerProcessManager::new(kind, launcher.clone(), config.worker_timings);
    let input = InputPipeline::new(manager(WorkerKind::Keyboard), manager(WorkerKind::Mouse));
    input.warm_up();
    let mute = Arc::new(MuteController::new(manager(WorkerKind::Mute)));

    let capture: Arc<dyn ScreenCapture> = match settings
        .capture_command
        .and_then(|argv| CommandCapture::new(argv, settings.cursor_command))
    {
        Some(capture) => Arc::new(capture),
        None => {
            info!("no capture command configured; screen streaming sends no frames");
            Arc::new(NullCapture)
        }
    };

    let registry = Arc::new(SessionRegistry::new());
    let frames = Arc::new(FrameBroadcaster::new(
        Arc::clone(&registry),
        capture,
        config.fps,
    ));
    let auth = AuthGate::new(
        AuthPolicy {
            pin: config.pin.clone(),
            computer_name: config.computer_name.clone(),
        },
        store,
    );
    let router = Arc::new(MessageRouter::new(
        Arc::clone(&registry),
        auth,
        input,
        mute,
        frames,
    ));

    // Log every change in the set of authenticated phones.
    let mut info_rx = registry.subscribe();
    tokio::spawn(async move {
        while info_rx.changed().await.is_ok() {
            let snapshot = info_rx.borrow_and_update().clone();
            info!("authenticated clients: {}", snapshot.client_count);
        }
    });

    let (stop_tasks, shutdown) = watch::channel(false);
    let heartbeat = HeartbeatMonitor::new(Arc::clone(&router), config.heartbeat_interval)
        .spawn(shutdown.clone());
    let revocations =
        RevocationWatch::new(Arc::clone(&router), DEFAULT_REVOCATION_POLL).spawn(shutdown);

    // ── Collaborators ──────────────────────────────────────────────────────────
    let mut discovery = config.discovery_port.map(|port| {
        UdpDiscovery::new(
            config.computer_name.clone(),
            port,
            config.ws_bind_addr.port(),
        )
    });
    if let Some(d) = discovery.as_mut() {
        if let Err(e) = d.start() {
            warn!("LAN discovery disabled: {e}");
        }
    }

    let relay = config.peer_relay_addr.map(|addr| {
        let router = Arc::clone(&router);
        let running = Arc::clone(&running);
        tokio::spawn(async move {
            if let Err(e) = run_relay(addr, router, running).await {
                error!("peer relay stopped: {e:#}");
            }
        })
    });

    // ── Main server loop ───────────────────────────────────────────────────────
    let result = run_server(config.ws_bind_addr, Arc::clone(&router), Arc::clone(&running)).await;

    running.store(false, Ordering::Relaxed);
    let _ = stop_tasks.send(true);
    let _ = heartbeat.await;
    let _ = revocations.await;
    router.shutdown().await;
    if let Some(d) = discovery.as_mut() {
        d.stop();
    }
    if let Some(relay) = relay {
        let _ = relay.await;
    }
    if let Some(tunnel) = &tunnel {
        if let Err(e) = tunnel.disconnect().await {
            warn!("tailscale disconnect failed: {e}");
        }
    }

    result?;
    info!("Keymote host stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(args: &[&str]) -> Settings {
        let mut argv = vec!["keymote-host"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
            .serve
            .into_settings(HostFileConfig::default())
            .unwrap()
    }

    #[test]
    fn test_cli_without_command_serves() {
        let cli = Cli::parse_from(["keymote-host"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_tokens_revoke_parses_device() {
        // Arrange / Act
        let cli = Cli::parse_from(["keymote-host", "tokens", "revoke", "phone-1"]);

        // Assert
        match cli.command {
            Some(Command::Tokens {
                action: TokensCommand::Revoke { device },
            }) => assert_eq!(device, "phone-1"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_defaults_listen_on_8765_with_discovery_on_8766() {
        let s = settings(&[]);
        assert_eq!(s.host.ws_bind_addr.to_string(), "0.0.0.0:8765");
        assert_eq!(s.host.discovery_port, Some(8766));
        assert_eq!(s.host.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(s.host.fps, 5);
        assert!(s.host.peer_relay_addr.is_none());
    }

    #[test]
    fn test_default_pin_is_generated() {
        // Arrange / Act
        let s = settings(&[]);

        // Assert
        assert!(s.generated_pin);
        let pin = s.host.pin.unwrap();
        assert_eq!(pin.len(), 6);
        assert!(pin.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_explicit_pin_is_used() {
        let s = settings(&["--pin", "1234"]);
        assert_eq!(s.host.pin.as_deref(), Some("1234"));
        assert!(!s.generated_pin);
    }

    #[test]
    fn test_no_pin_disables_auth() {
        let s = settings(&["--no-pin"]);
        assert!(s.host.pin.is_none());
    }

    #[test]
    fn test_no_discovery_disables_responder() {
        let s = settings(&["--no-discovery"]);
        assert!(s.host.discovery_port.is_none());
    }

    #[test]
    fn test_worker_command_line_is_split() {
        // Arrange / Act
        let s = settings(&["--mouse-worker", "python3 mouse.py --fast"]);

        // Assert
        assert_eq!(s.host.mouse_worker.program, "python3");
        assert_eq!(s.host.mouse_worker.args, vec!["mouse.py", "--fast"]);
        assert_eq!(s.host.keyboard_worker.program, "keymote-keyboard-worker");
    }

    #[test]
    fn test_cli_overrides_config_file() {
        // Arrange
        let mut file = HostFileConfig::default();
        file.network.port = 9000;
        file.host.pin = Some("111111".to_string());
        file.screen.fps = 12;
        let cli = Cli::parse_from(["keymote-host", "--port", "9100"]);

        // Act
        let s = cli.serve.into_settings(file).unwrap();

        // Assert
        assert_eq!(s.host.ws_bind_addr.port(), 9100);
        assert_eq!(s.host.pin.as_deref(), Some("111111"));
        assert_eq!(s.host.fps, 12);
    }

    #[test]
    fn test_invalid_relay_address_is_an_error() {
        let cli = Cli::parse_from(["keymote-host", "--peer-relay", "nowhere"]);
        assert!(cli.serve.into_settings(HostFileConfig::default()).is_err());
    }

    #[test]
    fn test_tokens_live_next_to_config() {
        let path = token_store_path(Path::new("/etc/keymote/config.toml"));
        assert_eq!(path, PathBuf::from("/etc/keymote/device-tokens.json"));
    }
}
