//! Wallet authentication backend.
//!
//! A wallet session is additive to an existing user identity. The
//! [`WalletAuthenticator`] reports that identity and fronts the backend's
//! `connect` (proof verification) and `disconnect` endpoints. Verifying the
//! signature itself is the backend's job.

mod http;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpAuthenticator;

use crate::error::WalletSessionError;
use crate::Result;

/// The signed-in user a wallet session is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Backend user id, stored as `user_id` on the session row.
    pub user_id: String,
    /// Bearer token for backend calls, if the backend needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

/// Body sent to the connect endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub wallet_address: String,
    pub chain_id: u64,
    pub signature: String,
}

/// Client for the backend's wallet endpoints.
#[async_trait]
pub trait WalletAuthenticator: Send + Sync {
    /// The current user identity, if any.
    fn identity(&self) -> Option<UserIdentity>;

    /// Ask the backend to verify a wallet proof.
    ///
    /// Returns `ConnectRejected` when the backend refuses it.
    async fn connect(&self, request: &ConnectRequest) -> Result<()>;

    /// Best-effort logout notification.
    async fn disconnect(&self) -> Result<()>;
}

/// In-process authenticator with a fixed identity.
///
/// Accepts every non-empty signature unless switched to rejecting.
#[derive(Debug)]
pub struct StaticAuthenticator {
    identity: RwLock<Option<UserIdentity>>,
    accepting: AtomicBool,
    connects: AtomicU64,
    disconnects: AtomicU64,
}

impl StaticAuthenticator {
    /// Authenticator for a signed-in user.
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self::with_identity(Some(UserIdentity::new(user_id)))
    }

    /// Authenticator with no user identity; every session attempt fails with `AuthRequired`.
    pub fn anonymous() -> Self {
        Self::with_identity(None)
    }

    fn with_identity(identity: Option<UserIdentity>) -> Self {
        Self {
            identity: RwLock::new(identity),
            accepting: AtomicBool::new(true),
            connects: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
        }
    }

    /// Replace the identity.
    pub fn set_identity(&self, identity: Option<UserIdentity>) {
        if let Ok(mut slot) = self.identity.write() {
            *slot = identity;
        }
    }

    /// Accept or reject subsequent proofs.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Number of connect calls received.
    pub fn connect_calls(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of disconnect calls received.
    pub fn disconnect_calls(&self) -> u64 {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletAuthenticator for StaticAuthenticator {
    fn identity(&self) -> Option<UserIdentity> {
        self.identity.read().ok().and_then(|id| id.clone())
    }

    async fn connect(&self, request: &ConnectRequest) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if request.signature.trim().is_empty() {
            return Err(WalletSessionError::ConnectRejected(
                "empty signature".to_string(),
            ));
        }
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(WalletSessionError::ConnectRejected(
                "signature not accepted".to_string(),
            ));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
