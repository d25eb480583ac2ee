//! Persisted per-device credential.

use serde::{Deserialize, Serialize};

/// A device token and when it was issued.
///
/// Records are never edited: a token is invalidated by deleting its record,
/// and a new login mints a fresh record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// 64 lowercase hex characters (32 random bytes).
    pub token: String,
    /// Issue time, milliseconds since the Unix epoch.
    pub created: i64,
}
