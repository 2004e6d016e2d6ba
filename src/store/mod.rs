//! Durable session store.
//!
//! The durable store keeps one row per session and is the authority on whether
//! a session still exists server-side. Rows use ISO-8601 timestamps on the wire;
//! the rest of the crate works in epoch milliseconds.
//!
//! Identity columns (`session_id`, `user_id`, `wallet_address`, `chain_id`,
//! `connected_at`) are written once by [`DurableStore::insert`]. Later writes go
//! through [`SessionPatch`], which cannot carry them.

mod http;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub use http::HttpStore;
pub use memory::MemoryStore;

use crate::error::WalletSessionError;
use crate::session::{Session, SessionId};
use crate::Result;

/// One durable session row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub user_id: String,
    pub wallet_address: String,
    pub chain_id: u64,
    pub connected_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub is_active: bool,
}

impl SessionRecord {
    /// Build the row for a freshly created session owned by `user_id`.
    ///
    /// Fails with `InvalidInput` when a timestamp cannot be represented.
    pub fn from_session(session: &Session, user_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            session_id: session.id,
            user_id: user_id.into(),
            wallet_address: session.wallet_address.clone(),
            chain_id: session.chain_id,
            connected_at: to_datetime(session.connected_at)?,
            expires_at: to_datetime(session.expires_at)?,
            last_active: to_datetime(session.last_active)?,
            is_active: session.is_active,
        })
    }

    /// Convert back into the client-side entity.
    pub fn to_session(&self) -> Session {
        Session {
            id: self.session_id,
            wallet_address: self.wallet_address.clone(),
            chain_id: self.chain_id,
            connected_at: self.connected_at.timestamp_millis(),
            expires_at: self.expires_at.timestamp_millis(),
            last_active: self.last_active.timestamp_millis(),
            is_active: self.is_active,
        }
    }

    /// Whether this row is still flagged active but already past its expiry.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at < now
    }

    /// Apply a patch in place.
    pub fn apply(&mut self, patch: &SessionPatch) {
        if let Some(expires_at) = patch.expires_at {
            self.expires_at = expires_at;
        }
        if let Some(last_active) = patch.last_active {
            self.last_active = last_active;
        }
    }
}

/// Mutable columns of a session row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
}

impl SessionPatch {
    /// Activity-only update.
    pub fn touch(last_active: i64) -> Result<Self> {
        Ok(Self {
            expires_at: None,
            last_active: Some(to_datetime(last_active)?),
        })
    }

    /// Expiry push-forward, which also counts as activity.
    pub fn extend(expires_at: i64, last_active: i64) -> Result<Self> {
        Ok(Self {
            expires_at: Some(to_datetime(expires_at)?),
            last_active: Some(to_datetime(last_active)?),
        })
    }
}

/// Server-side session persistence.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Insert a new row. Fails if the id already exists.
    async fn insert(&self, record: &SessionRecord) -> Result<()>;

    /// Patch a row that is still active.
    ///
    /// Fails when no active row with this id exists, so a session revoked
    /// elsewhere cannot be extended.
    async fn update(&self, id: &SessionId, patch: &SessionPatch) -> Result<()>;

    /// Flag a row inactive. Idempotent.
    async fn deactivate(&self, id: &SessionId) -> Result<()>;

    /// Fetch a row.
    async fn fetch(&self, id: &SessionId) -> Result<Option<SessionRecord>>;

    /// Flag every active row whose expiry is before `now` inactive.
    ///
    /// Returns the number of rows changed.
    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Epoch milliseconds to a UTC timestamp.
///
/// Fails with `InvalidInput` outside the range chrono can represent.
pub fn to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        WalletSessionError::InvalidInput(format!("timestamp {millis}ms is out of range"))
    })
}

/// Wire form used in query filters.
pub fn to_wire(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
