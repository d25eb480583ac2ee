//! Storage infrastructure: files under the host's config directory.
//!
//! - `config`: the TOML settings file, with defaults on first run.
//! - `tokens`: the JSON device-token file behind the Auth Gate.

pub mod config;
pub mod tokens;

pub use config::{config_dir, load_config, load_config_from, ConfigError, HostFileConfig};
pub use tokens::{JsonFileCredentialStore, TOKEN_FILE_NAME};
