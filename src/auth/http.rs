//! HTTP authenticator.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::debug;

use super::{ConnectRequest, UserIdentity, WalletAuthenticator};
use crate::error::WalletSessionError;
use crate::Result;

/// Authenticator calling `POST {base}/connect` and `POST {base}/disconnect`.
#[derive(Debug)]
pub struct HttpAuthenticator {
    client: Client,
    base_url: String,
    identity: RwLock<Option<UserIdentity>>,
    timeout: Duration,
}

impl HttpAuthenticator {
    /// Create an authenticator with no identity yet.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identity: RwLock::new(None),
            timeout: Duration::from_secs(10),
        }
    }

    /// Set the signed-in identity.
    pub fn with_identity(self, identity: UserIdentity) -> Self {
        self.set_identity(Some(identity));
        self
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the identity, e.g. after the user signs in or out.
    pub fn set_identity(&self, identity: Option<UserIdentity>) {
        if let Ok(mut slot) = self.identity.write() {
            *slot = identity;
        }
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .timeout(self.timeout);
        if let Some(token) = self.identity().and_then(|id| id.access_token) {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[async_trait]
impl WalletAuthenticator for HttpAuthenticator {
    fn identity(&self) -> Option<UserIdentity> {
        self.identity.read().ok().and_then(|id| id.clone())
    }

    async fn connect(&self, request: &ConnectRequest) -> Result<()> {
        let response = self
            .post("connect")
            .json(request)
            .send()
            .await
            .map_err(|e| WalletSessionError::Remote(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(wallet = %request.wallet_address, "wallet proof accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(WalletSessionError::ConnectRejected(format!("{status}: {body}")))
        } else {
            Err(WalletSessionError::Remote(format!("{status}: {body}")))
        }
    }

    async fn disconnect(&self) -> Result<()> {
        let response = self
            .post("disconnect")
            .send()
            .await
            .map_err(|e| WalletSessionError::Remote(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(()),
            // Already logged out server-side.
            StatusCode::UNAUTHORIZED => Ok(()),
            s => Err(WalletSessionError::Remote(format!("disconnect responded {s}"))),
        }
    }
}
