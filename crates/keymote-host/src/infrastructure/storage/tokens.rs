//! JSON file-backed device-token store.
//!
//! The file holds one object keyed by device id:
//!
//! ```json
//! {
//!   "phone-1": { "token": "3fa9…", "created": 1700000000000 }
//! }
//! ```
//!
//! The file is the only copy of the map: every operation reads it, and every
//! change is a read-modify-write under one lock, so records deleted by
//! another process (the `tokens revoke` command) are neither served nor
//! written back.  Writes go to a sibling temp file first and are then renamed
//! over the original, so a crash mid-write never leaves a truncated file
//! behind.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::application::credentials::{CredentialStore, TokenStoreError};
use crate::domain::credential::CredentialRecord;

/// File name used inside the host's config directory.
pub const TOKEN_FILE_NAME: &str = "device-tokens.json";

type Records = BTreeMap<String, CredentialRecord>;

/// [`CredentialStore`] persisted to a pretty-printed JSON file.
#[derive(Debug)]
pub struct JsonFileCredentialStore {
    path: PathBuf,
    /// Device ids this handle last saw on disk or wrote itself.  Ids missing
    /// from the file later were removed by someone else.
    known: Mutex<BTreeSet<String>>,
}

impl JsonFileCredentialStore {
    /// Opens the store at `path`.
    ///
    /// A missing file is an empty store.  A file that is not valid JSON is
    /// logged and treated as empty; it is overwritten on the next change.
    ///
    /// # Errors
    ///
    /// Returns [`TokenStoreError::Io`] if the file exists but cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TokenStoreError> {
        let path = path.into();
        let records = load(&path)?;
        debug!("loaded {} device token(s) from {}", records.len(), path.display());
        Ok(Self {
            path,
            known: Mutex::new(records.into_keys().collect()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.known.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, records: &Records) -> Result<(), TokenStoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Reads the whole map.  Missing means empty; unreadable JSON is logged and
/// treated as empty.
fn load(path: &Path) -> Result<Records, TokenStoreError> {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!("ignoring unreadable token file {}: {e}", path.display());
                Ok(Records::new())
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Records::new()),
        Err(e) => Err(e.into()),
    }
}

impl CredentialStore for JsonFileCredentialStore {
    fn get(&self, device_id: &str) -> Result<Option<CredentialRecord>, TokenStoreError> {
        let _known = self.lock();
        Ok(load(&self.path)?.remove(device_id))
    }

    fn put(&self, device_id: &str, record: CredentialRecord) -> Result<(), TokenStoreError> {
        let mut known = self.lock();
        let mut records = load(&self.path)?;
        records.insert(device_id.to_string(), record);
        self.persist(&records)?;
        known.insert(device_id.to_string());
        Ok(())
    }

    fn remove(&self, device_id: &str) -> Result<bool, TokenStoreError> {
        let mut known = self.lock();
        known.remove(device_id);
        let mut records = load(&self.path)?;
        if records.remove(device_id).is_none() {
            return Ok(false);
        }
        self.persist(&records)?;
        Ok(true)
    }

    fn list(&self) -> Result<Vec<(String, CredentialRecord)>, TokenStoreError> {
        let _known = self.lock();
        Ok(load(&self.path)?.into_iter().collect())
    }

    fn take_external_removals(&self) -> Result<Vec<String>, TokenStoreError> {
        let mut known = self.lock();
        let on_disk: BTreeSet<String> = load(&self.path)?.into_keys().collect();
        let removed: Vec<String> = known.difference(&on_disk).cloned().collect();
        *known = on_disk;
        Ok(removed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(token: &str) -> CredentialRecord {
        CredentialRecord {
            token: token.to_string(),
            created: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCredentialStore::open(dir.path().join(TOKEN_FILE_NAME)).unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_records_survive_reopen() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TOKEN_FILE_NAME);
        let store = JsonFileCredentialStore::open(&path).unwrap();

        // Act
        store.put("phone", record("abc")).unwrap();
        drop(store);
        let reopened = JsonFileCredentialStore::open(&path).unwrap();

        // Assert
        assert_eq!(reopened.get("phone").unwrap(), Some(record("abc")));
    }

    #[test]
    fn test_file_uses_device_keyed_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TOKEN_FILE_NAME);
        let store = JsonFileCredentialStore::open(&path).unwrap();

        store.put("tablet", record("ff00")).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["tablet"]["token"], "ff00");
        assert_eq!(json["tablet"]["created"], 1_700_000_000_000_i64);
    }

    #[test]
    fn test_remove_persists_deletion() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TOKEN_FILE_NAME);
        let store = JsonFileCredentialStore::open(&path).unwrap();
        store.put("a", record("1")).unwrap();
        store.put("b", record("2")).unwrap();

        // Act
        let removed = store.remove("a").unwrap();
        let missing = store.remove("a").unwrap();

        // Assert
        assert!(removed);
        assert!(!missing);
        let reopened = JsonFileCredentialStore::open(&path).unwrap();
        let ids: Vec<String> = reopened.list().unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_corrupt_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TOKEN_FILE_NAME);
        std::fs::write(&path, "not json").unwrap();

        let store = JsonFileCredentialStore::open(&path).unwrap();

        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_removal_by_second_handle_is_seen_and_not_written_back() {
        // Arrange: the host's handle and the CLI's handle on one file
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TOKEN_FILE_NAME);
        let host = JsonFileCredentialStore::open(&path).unwrap();
        host.put("phone", record("secret")).unwrap();
        let cli = JsonFileCredentialStore::open(&path).unwrap();

        // Act
        let removed = cli.remove("phone").unwrap();
        let seen_by_host = host.get("phone").unwrap();
        host.put("tablet", record("other")).unwrap();

        // Assert
        assert!(removed);
        assert_eq!(seen_by_host, None);
        let reopened = JsonFileCredentialStore::open(&path).unwrap();
        assert_eq!(reopened.get("phone").unwrap(), None);
        assert_eq!(reopened.get("tablet").unwrap(), Some(record("other")));
    }

    #[test]
    fn test_external_removals_are_reported_once() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TOKEN_FILE_NAME);
        let host = JsonFileCredentialStore::open(&path).unwrap();
        host.put("phone", record("1")).unwrap();
        host.put("tablet", record("2")).unwrap();
        let cli = JsonFileCredentialStore::open(&path).unwrap();

        // Act
        cli.remove("phone").unwrap();
        host.put("laptop", record("3")).unwrap();
        let first = host.take_external_removals().unwrap();
        let second = host.take_external_removals().unwrap();

        // Assert
        assert_eq!(first, vec!["phone"]);
        assert!(second.is_empty());
    }

    #[test]
    fn test_own_removal_is_not_reported_as_external() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCredentialStore::open(dir.path().join(TOKEN_FILE_NAME)).unwrap();
        store.put("phone", record("1")).unwrap();

        store.remove("phone").unwrap();

        assert!(store.take_external_removals().unwrap().is_empty());
    }
}
