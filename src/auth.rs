//! Signature-based authentication and session issuance.
//!
//! A connecting agent proves control of a wallet by signing a canonical
//! message over `(address, tokenId, timestamp)` with an Ethereum-style
//! personal-message signature. Ownership of the claimed token is then
//! confirmed by an ordered chain of verifier strategies; the first one to
//! confirm wins. Success mints a 256-bit bearer session token.
//!
//! Authentication never returns `Err`: every failure is a typed denial so
//! the handshake layer can retry with fresh credentials.

use crate::{
    config::AuthConfig,
    error::{A2aError, Result},
    external::FederatedDirectory,
    model::{AgentCredentials, Session},
    registry::IdentityRegistryClient,
    TokenId,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use ethers::types::{Address, Signature};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Canonical authentication message. The client signs exactly these bytes;
/// any formatting drift between implementations breaks recovery.
pub fn canonical_auth_message(address: &str, token_id: TokenId, timestamp: i64) -> String {
    format!(
        "A2A Authentication\n\nAddress: {}\nToken ID: {}\nTimestamp: {}",
        address, token_id, timestamp
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// Credential timestamp outside the replay window.
    TimestampExpired,
    /// Signature malformed, unrecoverable, or recovered to a different signer.
    InvalidSignature,
    /// No configured ownership path confirmed the claimed token.
    TokenNotOwned,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            DenialReason::TimestampExpired => "Timestamp expired",
            DenialReason::InvalidSignature => "Invalid signature",
            DenialReason::TokenNotOwned => "Agent does not own the specified token ID",
        };
        f.write_str(message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Granted { session_token: String },
    Denied { reason: DenialReason },
}

impl AuthOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, AuthOutcome::Granted { .. })
    }

    pub fn session_token(&self) -> Option<&str> {
        match self {
            AuthOutcome::Granted { session_token } => Some(session_token),
            AuthOutcome::Denied { .. } => None,
        }
    }
}

/// One strategy for confirming that an address owns a token.
#[async_trait]
pub trait OwnershipVerifier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn verify(&self, address: &str, token_id: TokenId) -> Result<bool>;
}

/// Confirms ownership against the on-chain identity registry.
pub struct RegistryOwnership {
    registry: Arc<IdentityRegistryClient>,
}

impl RegistryOwnership {
    pub fn new(registry: Arc<IdentityRegistryClient>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl OwnershipVerifier for RegistryOwnership {
    fn name(&self) -> &'static str {
        "registry"
    }

    async fn verify(&self, address: &str, token_id: TokenId) -> Result<bool> {
        self.registry.verify_agent(address, token_id).await
    }
}

/// Confirms ownership against the federated directory's wallet-on-file.
pub struct DirectoryOwnership {
    directory: Arc<dyn FederatedDirectory>,
}

impl DirectoryOwnership {
    pub fn new(directory: Arc<dyn FederatedDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl OwnershipVerifier for DirectoryOwnership {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn verify(&self, address: &str, token_id: TokenId) -> Result<bool> {
        let agent_id = format!("agent0-{}", token_id);
        let Some(profile) = self.directory.get_agent(&agent_id).await? else {
            return Ok(false);
        };
        Ok(profile
            .wallet_address
            .map(|wallet| wallet.eq_ignore_ascii_case(address))
            .unwrap_or(false))
    }
}

/// Accepts every claim. Only installed through the explicit
/// `insecure_allow_unverified` configuration, never by default.
struct PermissiveOwnership;

#[async_trait]
impl OwnershipVerifier for PermissiveOwnership {
    fn name(&self) -> &'static str {
        "permissive"
    }

    async fn verify(&self, address: &str, token_id: TokenId) -> Result<bool> {
        warn!(
            address,
            token_id, "ownership verification BYPASSED - insecure mode, do not run in production"
        );
        Ok(true)
    }
}

pub struct SessionAuthenticator {
    verifiers: Vec<Arc<dyn OwnershipVerifier>>,
    sessions: Mutex<HashMap<String, Session>>,
    session_ttl: Duration,
    max_timestamp_skew_ms: i64,
}

impl SessionAuthenticator {
    /// Build an authenticator over an ordered list of ownership verifiers.
    ///
    /// An empty list is a configuration error unless
    /// `auth.insecure_allow_unverified` is set, in which case a permissive
    /// verifier is installed and loudly logged.
    pub fn new(config: &AuthConfig, mut verifiers: Vec<Arc<dyn OwnershipVerifier>>) -> Result<Self> {
        if verifiers.is_empty() {
            if !config.insecure_allow_unverified {
                return Err(A2aError::Config(
                    "no ownership verifier configured; set auth.insecure_allow_unverified \
                     to run without one (dev/test only)"
                        .to_string(),
                ));
            }
            warn!("no ownership verifier configured - all token claims will be accepted");
            verifiers.push(Arc::new(PermissiveOwnership));
        }

        Ok(Self {
            verifiers,
            sessions: Mutex::new(HashMap::new()),
            session_ttl: Duration::hours(config.session_ttl_hours),
            max_timestamp_skew_ms: config.max_timestamp_skew_ms,
        })
    }

    /// Verify a signed credential envelope and mint a session.
    pub async fn authenticate(&self, credentials: &AgentCredentials) -> AuthOutcome {
        let now_ms = Utc::now().timestamp_millis();
        if (now_ms - credentials.timestamp).abs() > self.max_timestamp_skew_ms {
            return AuthOutcome::Denied {
                reason: DenialReason::TimestampExpired,
            };
        }

        let message =
            canonical_auth_message(&credentials.address, credentials.token_id, credentials.timestamp);

        let Ok(signature) = credentials.signature.parse::<Signature>() else {
            return AuthOutcome::Denied {
                reason: DenialReason::InvalidSignature,
            };
        };
        let Ok(claimed) = credentials.address.parse::<Address>() else {
            return AuthOutcome::Denied {
                reason: DenialReason::InvalidSignature,
            };
        };
        // recover() hashes with the EIP-191 personal-message prefix, and
        // Address comparison is over raw bytes, so checksum casing in the
        // claimed address cannot cause a mismatch.
        let recovered = match signature.recover(message.as_str()) {
            Ok(address) => address,
            Err(_) => {
                return AuthOutcome::Denied {
                    reason: DenialReason::InvalidSignature,
                }
            }
        };
        if recovered != claimed {
            return AuthOutcome::Denied {
                reason: DenialReason::InvalidSignature,
            };
        }

        if !self.verify_ownership(&credentials.address, credentials.token_id).await {
            return AuthOutcome::Denied {
                reason: DenialReason::TokenNotOwned,
            };
        }

        let session_token = mint_token();
        let session = Session {
            session_token: session_token.clone(),
            address: credentials.address.clone(),
            token_id: credentials.token_id,
            expires_at: Utc::now() + self.session_ttl,
        };
        self.sessions.lock().insert(session_token.clone(), session);

        info!(
            address = %credentials.address,
            token_id = credentials.token_id,
            "session issued"
        );
        AuthOutcome::Granted { session_token }
    }

    async fn verify_ownership(&self, address: &str, token_id: TokenId) -> bool {
        for verifier in &self.verifiers {
            match verifier.verify(address, token_id).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        verifier = verifier.name(),
                        error = %e,
                        "ownership verifier failed; trying next"
                    );
                }
            }
        }
        false
    }

    /// True while the session exists and has not expired. An expired
    /// session is removed on this path.
    pub fn verify_session(&self, token: &str) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(token) {
            None => false,
            Some(session) if session.is_expired(Utc::now()) => {
                sessions.remove(token);
                false
            }
            Some(_) => true,
        }
    }

    /// Look up a session without the removal side effect: an expired entry
    /// yields `None` but stays in the store until `verify_session` or the
    /// sweep touches it. Kept asymmetric deliberately; see DESIGN.md.
    pub fn get_session(&self, token: &str) -> Option<Session> {
        let sessions = self.sessions.lock();
        sessions
            .get(token)
            .filter(|session| !session.is_expired(Utc::now()))
            .cloned()
    }

    /// Invalidate a session immediately. Returns whether it existed.
    pub fn revoke_session(&self, token: &str) -> bool {
        self.sessions.lock().remove(token).is_some()
    }

    /// Bulk-remove expired sessions. Invoked on the host's schedule, not
    /// from within this component.
    pub fn cleanup_expired_sessions(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        before - sessions.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

fn mint_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
