//! Device-token storage abstraction.
//!
//! The Auth Gate only needs four operations on the `device_id → record` map,
//! so the store is a trait.  Production uses the JSON file store in
//! `infrastructure::storage::tokens`; tests use [`MemoryCredentialStore`] or
//! the `mockall`-generated `MockCredentialStore`.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::domain::credential::CredentialRecord;

/// Errors from a credential store backend.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("token store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("token store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistent `device_id → CredentialRecord` map.
///
/// Records are replaced or deleted, never edited in place.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore: Send + Sync {
    /// Returns the record for `device_id`, if any.
    fn get(&self, device_id: &str) -> Result<Option<CredentialRecord>, TokenStoreError>;

    /// Stores `record` for `device_id`, replacing any previous one.
    fn put(&self, device_id: &str, record: CredentialRecord) -> Result<(), TokenStoreError>;

    /// Deletes the record for `device_id`.  Returns `true` if one existed.
    fn remove(&self, device_id: &str) -> Result<bool, TokenStoreError>;

    /// All `(device_id, record)` pairs, sorted by device id.
    fn list(&self) -> Result<Vec<(String, CredentialRecord)>, TokenStoreError>;

    /// Device ids whose records were deleted by another process (for example
    /// `keymote-host tokens revoke`) since the previous call.
    ///
    /// Stores nothing else can write have nothing to report.
    fn take_external_removals(&self) -> Result<Vec<String>, TokenStoreError> {
        Ok(Vec::new())
    }
}

/// In-memory store.  Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: Mutex<HashMap<String, CredentialRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, device_id: &str) -> Result<Option<CredentialRecord>, TokenStoreError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(device_id).cloned())
    }

    fn put(&self, device_id: &str, record: CredentialRecord) -> Result<(), TokenStoreError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(device_id.to_string(), record);
        Ok(())
    }

    fn remove(&self, device_id: &str) -> Result<bool, TokenStoreError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.remove(device_id).is_some())
    }

    fn list(&self) -> Result<Vec<(String, CredentialRecord)>, TokenStoreError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = records
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
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
    fn test_put_replaces_previous_record() {
        let store = MemoryCredentialStore::new();

        store.put("phone", record("old")).unwrap();
        store.put("phone", record("new")).unwrap();

        assert_eq!(store.get("phone").unwrap(), Some(record("new")));
    }

    #[test]
    fn test_remove_reports_whether_a_record_existed() {
        let store = MemoryCredentialStore::new();
        store.put("phone", record("t")).unwrap();

        assert!(store.remove("phone").unwrap());
        assert!(!store.remove("phone").unwrap());
        assert_eq!(store.get("phone").unwrap(), None);
    }

    #[test]
    fn test_list_is_sorted_by_device() {
        let store = MemoryCredentialStore::new();
        store.put("zeta", record("z")).unwrap();
        store.put("alpha", record("a")).unwrap();

        let ids: Vec<String> = store.list().unwrap().into_iter().map(|(id, _)| id).collect();

        assert_eq!(ids, vec!["alpha", "zeta"]);
    }
}
