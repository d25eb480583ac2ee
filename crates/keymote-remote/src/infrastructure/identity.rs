//! The remote's identity file: its device id and the token a host issued.
//!
//! ```json
//! { "deviceId": "0b6c…", "token": "9f2e…" }
//! ```
//!
//! The file lives in the platform config directory under `remote.json`.  A
//! missing file means a first run: a random device id is generated and
//! written back.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// File name of the identity inside the config directory.
pub const IDENTITY_FILE_NAME: &str = "remote.json";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("could not determine the platform configuration directory")]
    NoPlatformConfigDir,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialize identity: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What the remote remembers between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Identity {
    /// A fresh identity with a random device id.
    pub fn generate() -> Self {
        Self {
            device_id: Uuid::new_v4().to_string(),
            token: None,
        }
    }
}

/// Reads and writes one [`Identity`] file.
#[derive(Debug, Clone)]
pub struct IdentityFile {
    path: PathBuf,
}

impl IdentityFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `remote.json` in the platform config directory.
    pub fn default_location() -> Result<Self, IdentityError> {
        let dir = platform_config_dir().ok_or(IdentityError::NoPlatformConfigDir)?;
        Ok(Self::new(dir.join(IDENTITY_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the identity, creating and saving a new one when the file is
    /// missing or unreadable as JSON.
    pub fn load_or_create(&self) -> Result<Identity, IdentityError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str::<Identity>(&text) {
                Ok(identity) => return Ok(identity),
                Err(e) => warn!("identity file {} is corrupt ({e}); starting fresh", self.path.display()),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(IdentityError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        }
        let identity = Identity::generate();
        self.save(&identity)?;
        Ok(identity)
    }

    /// Writes `identity`, creating the parent directory if needed.
    pub fn save(&self, identity: &Identity) -> Result<(), IdentityError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| IdentityError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = serde_json::to_string_pretty(identity)?;
        std::fs::write(&self.path, text).map_err(|source| IdentityError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Replaces the stored token, keeping the device id.
    pub fn store_token(&self, token: Option<&str>) -> Result<(), IdentityError> {
        let mut identity = self.load_or_create()?;
        identity.token = token.map(str::to_string);
        self.save(&identity)
    }
}

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
