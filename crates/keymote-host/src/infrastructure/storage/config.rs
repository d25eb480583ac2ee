//! TOML configuration for the host.
//!
//! Reads and writes [`HostFileConfig`] at the platform-appropriate path:
//! - Windows:  `%APPDATA%\Keymote\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/keymote/config.toml` or `~/.config/keymote/config.toml`
//! - macOS:    `~/Library/Application Support/Keymote/config.toml`
//!
//! Example:
//!
//! ```toml
//! [host]
//! computer_name = "DESK"
//! pin = "482913"
//!
//! [network]
//! port = 8765
//! discovery_port = 8766
//!
//! [screen]
//! fps = 10
//! capture_command = ["grim", "-t", "jpeg", "-"]
//!
//! [workers.mouse]
//! program = "/usr/local/bin/keymote-mouse-worker"
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section and
//! a missing key all fall back to the built-in defaults.  CLI arguments are
//! layered on top of this file by the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::WorkerSpec;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level host configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostFileConfig {
    #[serde(default)]
    pub host: HostSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub screen: ScreenSection,
    #[serde(default)]
    pub workers: WorkersSection,
}

/// Identity and authentication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostSection {
    /// Name shown to remotes.  Defaults to the OS host name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computer_name: Option<String>,
    /// Fixed PIN.  When absent and `require_pin` is set, a random PIN is
    /// generated at every start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default = "default_true")]
    pub require_pin: bool,
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Listener and liveness settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    #[serde(default = "default_true")]
    pub discovery_enabled: bool,
    /// Loopback address for the peer-channel sidecar.  Absent disables it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_relay: Option<String>,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

/// Screen streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenSection {
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Command printing one JPEG image to stdout.  Absent disables capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_command: Option<Vec<String>>,
    /// Command printing the cursor position as `X Y`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_command: Option<Vec<String>>,
}

/// Worker programs and deadlines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkersSection {
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    #[serde(default = "default_keyboard_worker")]
    pub keyboard: WorkerEntry,
    #[serde(default = "default_mouse_worker")]
    pub mouse: WorkerEntry,
    #[serde(default = "default_mute_worker")]
    pub mute: WorkerEntry,
}

/// How to start one worker process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerEntry {
    pub program: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl From<WorkerEntry> for WorkerSpec {
    fn from(entry: WorkerEntry) -> Self {
        WorkerSpec {
            program: entry.program,
            args: entry.args,
        }
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8765
}
fn default_discovery_port() -> u16 {
    8766
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_fps() -> u32 {
    5
}
fn default_ready_timeout_ms() -> u64 {
    10_000
}
fn default_response_timeout_ms() -> u64 {
    5_000
}
fn worker(program: &str) -> WorkerEntry {
    WorkerEntry {
        program: program.to_string(),
        args: Vec::new(),
    }
}
fn default_keyboard_worker() -> WorkerEntry {
    worker("keymote-keyboard-worker")
}
fn default_mouse_worker() -> WorkerEntry {
    worker("keymote-mouse-worker")
}
fn default_mute_worker() -> WorkerEntry {
    worker("keymote-mute-worker")
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            computer_name: None,
            pin: None,
            require_pin: default_true(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            discovery_port: default_discovery_port(),
            discovery_enabled: default_true(),
            peer_relay: None,
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl Default for ScreenSection {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            capture_command: None,
            cursor_command: None,
        }
    }
}

impl Default for WorkersSection {
    fn default() -> Self {
        Self {
            ready_timeout_ms: default_ready_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
            keyboard: default_keyboard_worker(),
            mouse: default_mouse_worker(),
            mute: default_mute_worker(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the host's files.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the base directory cannot
/// be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to `config.toml`.
///
/// # Errors
///
/// See [`config_dir`].
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the platform path, or defaults if it does not exist.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<HostFileConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads the config from `path`, returning defaults if the file is missing.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<HostFileConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HostFileConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` at the platform path.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &HostFileConfig) -> Result<(), ConfigError> {
    save_config_to(&config_file_path()?, config)
}

/// Persists `config` at `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &HostFileConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `Keymote` part.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Keymote"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Keymote")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("keymote"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_expected_ports() {
        let cfg = HostFileConfig::default();
        assert_eq!(cfg.network.port, 8765);
        assert_eq!(cfg.network.discovery_port, 8766);
        assert_eq!(cfg.network.heartbeat_secs, 30);
        assert_eq!(cfg.screen.fps, 5);
        assert!(cfg.host.require_pin);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: HostFileConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, HostFileConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        // Arrange
        let text = r#"
[screen]
fps = 12

[workers.mouse]
program = "/opt/mouse"
args = ["--fast"]
"#;

        // Act
        let cfg: HostFileConfig = toml::from_str(text).unwrap();

        // Assert
        assert_eq!(cfg.screen.fps, 12);
        assert_eq!(cfg.workers.mouse.program, "/opt/mouse");
        assert_eq!(cfg.workers.mouse.args, vec!["--fast"]);
        assert_eq!(cfg.workers.keyboard.program, "keymote-keyboard-worker");
        assert_eq!(cfg.workers.response_timeout_ms, 5_000);
    }

    #[test]
    fn test_screen_section_without_fps_defaults_to_five() {
        let cfg: HostFileConfig = toml::from_str("[screen]\n").unwrap();
        assert_eq!(cfg.screen.fps, 5);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, HostFileConfig::default());
    }

    #[test]
    fn test_save_then_load_preserves_pin_and_commands() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = HostFileConfig::default();
        cfg.host.pin = Some("000111".to_string());
        cfg.screen.capture_command = Some(vec!["grim".into(), "-".into()]);

        // Act
        save_config_to(&path, &cfg).unwrap();
        let loaded = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[[ nope").unwrap();

        let err = load_config_from(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
