//! Auth Gate: decides whether a session may send input.
//!
//! # Decision order
//!
//! 1. No PIN configured on the host: every request succeeds.
//! 2. A `token` is present: it must equal the stored token for `deviceId`.
//!    A mismatch deletes the stored record and asks for the PIN again
//!    (`requirePin: true`).
//! 3. A `pin` is present: it must equal the host PIN, and a computer-name
//!    hint, if supplied, must match the host name case-insensitively.  With
//!    `rememberMe` and a `deviceId`, a fresh device token is minted.
//! 4. Neither: `"PIN required"`.
//!
//! A failed attempt leaves the session `AwaitingAuth`; the remote may retry
//! as often as it likes.  There is no lockout.

use std::sync::Arc;

use keymote_core::protocol::messages::{timestamp_ms, ClientMessage, ServerMessage};
use thiserror::Error;
use tracing::{info, warn};

use crate::application::credentials::{CredentialStore, TokenStoreError};
use crate::application::registry::SessionRegistry;
use crate::domain::credential::CredentialRecord;
use crate::domain::session::SessionId;

/// Why an auth request was refused.  The `Display` text is the wire `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("PIN required")]
    PinRequired,

    #[error("Token expired or invalid")]
    TokenInvalid,

    #[error("Invalid PIN")]
    InvalidPin,

    #[error("Computer name mismatch")]
    ComputerNameMismatch,

    #[error("Token revoked")]
    Revoked,
}

impl AuthFailure {
    /// Whether the remote should fall back to asking the user for the PIN.
    pub fn requires_pin(&self) -> bool {
        matches!(self, Self::PinRequired | Self::TokenInvalid | Self::Revoked)
    }

    /// The `auth_result` reporting this failure.
    pub fn to_message(self) -> ServerMessage {
        ServerMessage::auth_failure(self.to_string(), self.requires_pin())
    }
}

/// The credential fields of an `auth` message.  Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRequest {
    pub pin: Option<String>,
    pub token: Option<String>,
    pub device_id: Option<String>,
    pub computer_name: Option<String>,
    pub remember_me: bool,
}

impl AuthRequest {
    /// Extracts the request from an `auth` message.
    pub fn from_message(msg: &ClientMessage) -> Option<Self> {
        match msg {
            ClientMessage::Auth {
                pin,
                token,
                device_id,
                computer_name,
                remember_me,
            } => Some(Self {
                pin: non_empty(pin),
                token: non_empty(token),
                device_id: non_empty(device_id),
                computer_name: non_empty(computer_name),
                remember_me: *remember_me,
            }),
            _ => None,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

/// Result of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted {
        /// Device to bind the session to.
        device_id: Option<String>,
        /// Newly minted device token, when one was requested.
        token: Option<String>,
    },
    Denied(AuthFailure),
}

/// Host-side settings the gate checks against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPolicy {
    pub pin: Option<String>,
    pub computer_name: String,
}

/// PIN and device-token authentication.
pub struct AuthGate {
    policy: AuthPolicy,
    store: Arc<dyn CredentialStore>,
}

impl AuthGate {
    pub fn new(policy: AuthPolicy, store: Arc<dyn CredentialStore>) -> Self {
        Self { policy, store }
    }

    /// `true` when a PIN is configured, i.e. sessions start `AwaitingAuth`.
    pub fn auth_required(&self) -> bool {
        self.policy.pin.is_some()
    }

    /// Host name reported to remotes.
    pub fn computer_name(&self) -> &str {
        &self.policy.computer_name
    }

    /// Decides one request.  Token records are deleted or created here; no
    /// session state is touched.
    pub fn evaluate(&self, request: &AuthRequest) -> AuthOutcome {
        let Some(pin) = self.policy.pin.as_deref() else {
            return AuthOutcome::Granted {
                device_id: request.device_id.clone(),
                token: None,
            };
        };

        if let Some(token) = request.token.as_deref() {
            return self.check_token(token, request.device_id.as_deref());
        }

        let Some(offered) = request.pin.as_deref() else {
            return AuthOutcome::Denied(AuthFailure::PinRequired);
        };
        if !constant_time_eq(offered.as_bytes(), pin.as_bytes()) {
            return AuthOutcome::Denied(AuthFailure::InvalidPin);
        }
        if let Some(hint) = request.computer_name.as_deref() {
            if hint.to_lowercase() != self.policy.computer_name.to_lowercase() {
                return AuthOutcome::Denied(AuthFailure::ComputerNameMismatch);
            }
        }

        let token = match (&request.device_id, request.remember_me) {
            (Some(device_id), true) => self.mint(device_id),
            _ => None,
        };
        AuthOutcome::Granted {
            device_id: request.device_id.clone(),
            token,
        }
    }

    fn check_token(&self, token: &str, device_id: Option<&str>) -> AuthOutcome {
        let Some(device_id) = device_id else {
            return AuthOutcome::Denied(AuthFailure::TokenInvalid);
        };
        let stored = match self.store.get(device_id) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("token lookup for device {device_id} failed: {e}");
                None
            }
        };
        match stored {
            Some(record) if constant_time_eq(record.token.as_bytes(), token.as_bytes()) => {
                AuthOutcome::Granted {
                    device_id: Some(device_id.to_string()),
                    token: None,
                }
            }
            stale => {
                if stale.is_some() {
                    if let Err(e) = self.store.remove(device_id) {
                        warn!("failed to delete stale token for device {device_id}: {e}");
                    }
                }
                AuthOutcome::Denied(AuthFailure::TokenInvalid)
            }
        }
    }

    /// Creates and stores a new token for `device_id`.  A storage failure is
    /// logged and yields no token; the PIN login itself still succeeds.
    fn mint(&self, device_id: &str) -> Option<String> {
        let record = CredentialRecord {
            token: generate_token(),
            created: timestamp_ms(),
        };
        let token = record.token.clone();
        match self.store.put(device_id, record) {
            Ok(()) => {
                info!("issued device token for {device_id}");
                Some(token)
            }
            Err(e) => {
                warn!("failed to store device token for {device_id}: {e}");
                None
            }
        }
    }

    /// Evaluates `request` for session `id`, updates the registry, and sends
    /// the `auth_result`.
    pub async fn handle_auth(
        &self,
        registry: &SessionRegistry,
        id: SessionId,
        request: &AuthRequest,
    ) -> AuthOutcome {
        let outcome = self.evaluate(request);
        let reply = match &outcome {
            AuthOutcome::Granted { device_id, token } => {
                registry.authenticate(id, device_id.clone()).await;
                info!(
                    "session {id} authenticated via {}",
                    if request.token.is_some() { "token" } else { "PIN" }
                );
                ServerMessage::AuthResult {
                    success: true,
                    token: token.clone(),
                    computer_name: Some(self.policy.computer_name.clone()),
                    error: None,
                    require_pin: None,
                }
            }
            AuthOutcome::Denied(failure) => {
                info!("session {id} auth failed: {failure}");
                failure.to_message()
            }
        };
        if let Err(e) = registry.send(id, &reply).await {
            warn!("could not deliver auth_result to session {id}: {e}");
        }
        outcome
    }

    /// Deletes the token for `device_id`.  Returns `true` if one existed.
    pub fn revoke(&self, device_id: &str) -> Result<bool, TokenStoreError> {
        self.store.remove(device_id)
    }

    /// Devices whose token another process deleted since the last call.
    pub fn take_external_removals(&self) -> Result<Vec<String>, TokenStoreError> {
        self.store.take_external_removals()
    }

    /// Every stored device token.
    pub fn devices(&self) -> Result<Vec<(String, CredentialRecord)>, TokenStoreError> {
        self.store.list()
    }
}

/// 32 random bytes as 64 lowercase hex characters.
pub fn generate_token() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

/// A random six-digit PIN, zero-padded.
pub fn generate_pin() -> String {
    use rand::Rng;
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::credentials::{MemoryCredentialStore, MockCredentialStore};
    use crate::domain::session::{AuthState, TransportKind};
    use crate::infrastructure::mock_link::RecordingLink;

    fn gate_with(pin: Option<&str>, store: Arc<dyn CredentialStore>) -> AuthGate {
        AuthGate::new(
            AuthPolicy {
                pin: pin.map(str::to_string),
                computer_name: "Desk-PC".to_string(),
            },
            store,
        )
    }

    fn gate(pin: Option<&str>) -> (AuthGate, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        (gate_with(pin, store.clone()), store)
    }

    fn pin_request(pin: &str) -> AuthRequest {
        AuthRequest {
            pin: Some(pin.to_string()),
            ..AuthRequest::default()
        }
    }

    #[test]
    fn test_no_pin_configured_grants_anything() {
        let (gate, _) = gate(None);
        let outcome = gate.evaluate(&pin_request("wrong"));
        assert!(matches!(outcome, AuthOutcome::Granted { .. }));
        assert!(!gate.auth_required());
    }

    #[test]
    fn test_correct_pin_without_name_hint_is_granted() {
        let (gate, _) = gate(Some("123456"));
        let outcome = gate.evaluate(&pin_request("123456"));
        assert_eq!(
            outcome,
            AuthOutcome::Granted {
                device_id: None,
                token: None
            }
        );
    }

    #[test]
    fn test_wrong_pin_is_denied() {
        let (gate, _) = gate(Some("123456"));
        let outcome = gate.evaluate(&pin_request("654321"));
        assert_eq!(outcome, AuthOutcome::Denied(AuthFailure::InvalidPin));
    }

    #[test]
    fn test_correct_pin_with_wrong_computer_name_is_mismatch() {
        // Arrange
        let (gate, _) = gate(Some("123456"));
        let request = AuthRequest {
            computer_name: Some("Laptop".to_string()),
            ..pin_request("123456")
        };

        // Act
        let outcome = gate.evaluate(&request);

        // Assert
        assert_eq!(
            outcome,
            AuthOutcome::Denied(AuthFailure::ComputerNameMismatch)
        );
    }

    #[test]
    fn test_computer_name_hint_is_case_insensitive() {
        let (gate, _) = gate(Some("123456"));
        let request = AuthRequest {
            computer_name: Some("desk-pc".to_string()),
            ..pin_request("123456")
        };
        assert!(matches!(gate.evaluate(&request), AuthOutcome::Granted { .. }));
    }

    #[test]
    fn test_missing_credentials_require_pin() {
        let (gate, _) = gate(Some("123456"));
        let outcome = gate.evaluate(&AuthRequest::default());
        assert_eq!(outcome, AuthOutcome::Denied(AuthFailure::PinRequired));
        assert!(AuthFailure::PinRequired.requires_pin());
    }

    #[test]
    fn test_remember_me_mints_and_stores_token() {
        // Arrange
        let (gate, store) = gate(Some("123456"));
        let request = AuthRequest {
            device_id: Some("phone".to_string()),
            remember_me: true,
            ..pin_request("123456")
        };

        // Act
        let outcome = gate.evaluate(&request);

        // Assert
        let AuthOutcome::Granted {
            token: Some(token), ..
        } = outcome.clone()
        else {
            panic!("expected a minted token, got {outcome:?}");
        };
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(store.get("phone").unwrap().unwrap().token, token);
    }

    #[test]
    fn test_remember_me_without_device_mints_nothing() {
        let (gate, store) = gate(Some("123456"));
        let request = AuthRequest {
            remember_me: true,
            ..pin_request("123456")
        };

        let outcome = gate.evaluate(&request);

        assert!(matches!(outcome, AuthOutcome::Granted { token: None, .. }));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_matching_token_is_granted_without_pin() {
        // Arrange
        let (gate, store) = gate(Some("123456"));
        store
            .put(
                "phone",
                CredentialRecord {
                    token: "abc".to_string(),
                    created: 0,
                },
            )
            .unwrap();
        let request = AuthRequest {
            token: Some("abc".to_string()),
            device_id: Some("phone".to_string()),
            ..AuthRequest::default()
        };

        // Act
        let outcome = gate.evaluate(&request);

        // Assert
        assert_eq!(
            outcome,
            AuthOutcome::Granted {
                device_id: Some("phone".to_string()),
                token: None
            }
        );
    }

    #[test]
    fn test_mismatched_token_deletes_record_and_requires_pin() {
        // Arrange
        let (gate, store) = gate(Some("123456"));
        store
            .put(
                "phone",
                CredentialRecord {
                    token: "abc".to_string(),
                    created: 0,
                },
            )
            .unwrap();
        let request = AuthRequest {
            token: Some("xyz".to_string()),
            device_id: Some("phone".to_string()),
            ..AuthRequest::default()
        };

        // Act
        let outcome = gate.evaluate(&request);

        // Assert
        assert_eq!(outcome, AuthOutcome::Denied(AuthFailure::TokenInvalid));
        assert!(AuthFailure::TokenInvalid.requires_pin());
        assert_eq!(store.get("phone").unwrap(), None);
    }

    #[test]
    fn test_token_is_checked_before_pin() {
        let (gate, _) = gate(Some("123456"));
        let request = AuthRequest {
            token: Some("nope".to_string()),
            device_id: Some("phone".to_string()),
            ..pin_request("123456")
        };
        assert_eq!(
            gate.evaluate(&request),
            AuthOutcome::Denied(AuthFailure::TokenInvalid)
        );
    }

    #[test]
    fn test_unknown_device_token_does_not_touch_store() {
        // Arrange: a store that must never be asked to delete anything
        let mut store = MockCredentialStore::new();
        store.expect_get().returning(|_| Ok(None));
        store.expect_remove().never();
        let gate = gate_with(Some("123456"), Arc::new(store));
        let request = AuthRequest {
            token: Some("abc".to_string()),
            device_id: Some("tablet".to_string()),
            ..AuthRequest::default()
        };

        // Act
        let outcome = gate.evaluate(&request);

        // Assert
        assert_eq!(outcome, AuthOutcome::Denied(AuthFailure::TokenInvalid));
    }

    #[test]
    fn test_store_failure_on_mint_still_grants_pin_login() {
        let mut store = MockCredentialStore::new();
        store.expect_put().returning(|_, _| {
            Err(TokenStoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        });
        let gate = gate_with(Some("123456"), Arc::new(store));
        let request = AuthRequest {
            device_id: Some("phone".to_string()),
            remember_me: true,
            ..pin_request("123456")
        };

        let outcome = gate.evaluate(&request);

        assert!(matches!(outcome, AuthOutcome::Granted { token: None, .. }));
    }

    #[test]
    fn test_empty_strings_count_as_absent() {
        let msg = ClientMessage::Auth {
            pin: Some(String::new()),
            token: Some(String::new()),
            device_id: None,
            computer_name: Some(String::new()),
            remember_me: false,
        };
        assert_eq!(
            AuthRequest::from_message(&msg),
            Some(AuthRequest::default())
        );
    }

    #[test]
    fn test_generated_pin_is_six_digits() {
        for _ in 0..50 {
            let pin = generate_pin();
            assert_eq!(pin.len(), 6);
            assert!(pin.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_handle_auth_failure_keeps_session_waiting_and_replies() {
        // Arrange
        let (gate, _) = gate(Some("123456"));
        let registry = SessionRegistry::new();
        let (link, mut rx) = RecordingLink::new(TransportKind::Socket);
        let id = registry.register(link, true).await;

        // Act
        gate.handle_auth(&registry, id, &pin_request("000000")).await;

        // Assert
        assert_eq!(registry.auth_state(id).await, Some(AuthState::AwaitingAuth));
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerMessage::auth_failure("Invalid PIN", false)
        );
    }

    #[tokio::test]
    async fn test_handle_auth_success_binds_device_and_reports_name() {
        let (gate, _) = gate(Some("123456"));
        let registry = SessionRegistry::new();
        let (link, mut rx) = RecordingLink::new(TransportKind::Peer);
        let id = registry.register(link, true).await;
        let request = AuthRequest {
            device_id: Some("phone".to_string()),
            ..pin_request("123456")
        };

        gate.handle_auth(&registry, id, &request).await;

        assert!(registry.is_authenticated(id).await);
        assert_eq!(registry.device_id(id).await.as_deref(), Some("phone"));
        match rx.try_recv().unwrap() {
            ServerMessage::AuthResult {
                success,
                computer_name,
                ..
            } => {
                assert!(success);
                assert_eq!(computer_name.as_deref(), Some("Desk-PC"));
            }
            other => panic!("expected auth_result, got {other:?}"),
        }
    }
}
