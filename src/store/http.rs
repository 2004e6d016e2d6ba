//! HTTP durable store.
//!
//! Talks to a PostgREST-style REST endpoint:
//!
//! - `POST   {base}/{table}` inserts a row
//! - `PATCH  {base}/{table}?session_id=eq.{id}` updates a row
//! - `GET    {base}/{table}?session_id=eq.{id}` fetches a row

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::debug;

use super::{to_wire, DurableStore, SessionPatch, SessionRecord};
use crate::error::WalletSessionError;
use crate::session::SessionId;
use crate::Result;

/// Default table name.
pub const DEFAULT_TABLE: &str = "wallet_sessions";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// REST-backed session rows.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
    table: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpStore {
    /// Create a store rooted at `base_url`, e.g. `https://db.example.com/rest/v1`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            table: DEFAULT_TABLE.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Use a different table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Send `apikey` and bearer headers with every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn table_url(&self) -> String {
        format!("{}/{}", self.base_url, self.table)
    }

    fn request(&self, method: Method) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, self.table_url())
            .timeout(self.timeout);
        if let Some(ref key) = self.api_key {
            builder = builder.header("apikey", key).bearer_auth(key);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                WalletSessionError::store_timeout(self.timeout)
            } else {
                WalletSessionError::StoreWriteFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(WalletSessionError::StoreWriteFailed(format!(
            "{} responded {}: {}",
            self.table, status, body
        )))
    }

    async fn rows(&self, response: Response) -> Result<Vec<Value>> {
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| WalletSessionError::StoreWriteFailed(format!("bad response body: {e}")))
    }
}

#[async_trait]
impl DurableStore for HttpStore {
    async fn insert(&self, record: &SessionRecord) -> Result<()> {
        let builder = self
            .request(Method::POST)
            .header("Prefer", "return=minimal")
            .json(record);
        self.send(builder).await?;
        debug!(session_id = %record.session_id, "session row inserted");
        Ok(())
    }

    async fn update(&self, id: &SessionId, patch: &SessionPatch) -> Result<()> {
        let builder = self
            .request(Method::PATCH)
            .query(&[
                ("session_id", format!("eq.{id}")),
                ("is_active", "eq.true".to_string()),
            ])
            .header("Prefer", "return=representation")
            .json(patch);
        let response = self.send(builder).await?;
        if self.rows(response).await?.is_empty() {
            return Err(WalletSessionError::StoreWriteFailed(format!(
                "no active session row {id}"
            )));
        }
        Ok(())
    }

    async fn deactivate(&self, id: &SessionId) -> Result<()> {
        let builder = self
            .request(Method::PATCH)
            .query(&[("session_id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(&json!({ "is_active": false }));
        self.send(builder).await?;
        Ok(())
    }

    async fn fetch(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        let builder = self.request(Method::GET).query(&[
            ("session_id", format!("eq.{id}")),
            ("select", "*".to_string()),
        ]);
        let response = self
            .send(builder)
            .await
            .map_err(|e| WalletSessionError::StoreReadFailed(e.to_string()))?;
        let mut records: Vec<SessionRecord> = response
            .json()
            .await
            .map_err(|e| WalletSessionError::StoreReadFailed(format!("bad response body: {e}")))?;
        Ok(records.pop())
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let builder = self
            .request(Method::PATCH)
            .query(&[
                ("is_active", "eq.true".to_string()),
                ("expires_at", format!("lt.{}", to_wire(now))),
            ])
            .header("Prefer", "return=representation")
            .json(&json!({ "is_active": false }));
        let response = self.send(builder).await?;
        Ok(self.rows(response).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url_trims_slash() {
        let store = HttpStore::new("http://localhost:54321/rest/v1/");
        assert_eq!(
            store.table_url(),
            "http://localhost:54321/rest/v1/wallet_sessions"
        );
    }

    #[test]
    fn test_custom_table() {
        let store = HttpStore::new("http://db").with_table("sessions");
        assert_eq!(store.table_url(), "http://db/sessions");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_write_failure() {
        // Port 9 (discard) on localhost is essentially never listening.
        let store = HttpStore::new("http://127.0.0.1:9").with_timeout(Duration::from_secs(2));
        let record = SessionRecord::from_session(
            &crate::session::Session::new("0xabc", 1, 0, Duration::from_secs(60)),
            "user-1",
        )
        .unwrap();
        let err = store.insert(&record).await.unwrap_err();
        assert!(matches!(err, WalletSessionError::StoreWriteFailed(_)));
    }
}
