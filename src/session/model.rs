//! The wallet session entity.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::SessionId;
use crate::clock::duration_millis;

/// A time-bounded session binding this client to a connected wallet.
///
/// Timestamps are epoch milliseconds. The serialized form is the shape kept in
/// the local cache, so field names are camelCase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique identifier, never reused.
    pub id: SessionId,
    /// Connected wallet account.
    pub wallet_address: String,
    /// Connected network.
    pub chain_id: u64,
    /// Creation time.
    pub connected_at: i64,
    /// Time after which the session is no longer valid.
    pub expires_at: i64,
    /// Most recent confirmed activity.
    pub last_active: i64,
    /// Cleared once terminated or superseded.
    pub is_active: bool,
}

impl Session {
    /// Create a fresh session starting at `now` and lasting `duration`.
    pub fn new(
        wallet_address: impl Into<String>,
        chain_id: u64,
        now: i64,
        duration: Duration,
    ) -> Self {
        Self {
            id: SessionId::new(),
            wallet_address: wallet_address.into(),
            chain_id,
            connected_at: now,
            expires_at: now.saturating_add(duration_millis(duration)),
            last_active: now,
            is_active: true,
        }
    }

    /// Whether `now` is past the expiry time.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.expires_at
    }

    /// Whether the session may be handed out as valid at `now`.
    ///
    /// An inactive session is never valid, whatever its expiry.
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    /// Record activity.
    pub fn touch(&mut self, now: i64) {
        self.last_active = now;
    }

    /// Push the expiry to `now + duration`. Never moves it backwards.
    pub fn extend(&mut self, now: i64, duration: Duration) {
        let candidate = now.saturating_add(duration_millis(duration));
        self.expires_at = self.expires_at.max(candidate);
        self.last_active = now;
    }

    /// Mark the session as terminated.
    pub fn invalidate(&mut self) {
        self.is_active = false;
    }

    /// Time left until expiry, zero once expired.
    pub fn remaining(&self, now: i64) -> Duration {
        let left = self.expires_at.saturating_sub(now).max(0);
        Duration::from_millis(left as u64)
    }
}
