//! In-memory durable store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{DurableStore, SessionPatch, SessionRecord};
use crate::error::WalletSessionError;
use crate::session::SessionId;
use crate::Result;

/// Thread-safe in-memory session rows.
///
/// Besides serving single-process deployments, the store can be switched
/// offline or slowed down to exercise degraded-network behaviour.
#[derive(Debug)]
pub struct MemoryStore {
    records: RwLock<HashMap<SessionId, SessionRecord>>,
    available: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Take the store on- or offline. Offline calls fail immediately.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether calls currently succeed.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Snapshot a row without going through the async interface.
    pub fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        self.records.read().ok()?.get(id).cloned()
    }

    /// Get the number of rows in the store.
    pub fn count(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Get the number of rows still flagged active.
    pub fn active_count(&self) -> usize {
        self.records
            .read()
            .map(|r| r.values().filter(|rec| rec.is_active).count())
            .unwrap_or(0)
    }

    /// List all session IDs.
    pub fn list_ids(&self) -> Result<Vec<SessionId>> {
        let records = self
            .records
            .read()
            .map_err(|_| WalletSessionError::LockPoisoned)?;
        Ok(records.keys().copied().collect())
    }

    async fn gate(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.is_available() {
            return Err(WalletSessionError::StoreWriteFailed(
                "store unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn insert(&self, record: &SessionRecord) -> Result<()> {
        self.gate().await?;
        let mut records = self
            .records
            .write()
            .map_err(|_| WalletSessionError::LockPoisoned)?;

        if records.contains_key(&record.session_id) {
            return Err(WalletSessionError::StoreWriteFailed(format!(
                "session {} already exists",
                record.session_id
            )));
        }
        records.insert(record.session_id, record.clone());
        Ok(())
    }

    async fn update(&self, id: &SessionId, patch: &SessionPatch) -> Result<()> {
        self.gate().await?;
        let mut records = self
            .records
            .write()
            .map_err(|_| WalletSessionError::LockPoisoned)?;

        match records.get_mut(id) {
            Some(record) if record.is_active => {
                record.apply(patch);
                Ok(())
            }
            Some(_) => Err(WalletSessionError::StoreWriteFailed(format!(
                "session {id} is no longer active"
            ))),
            None => Err(WalletSessionError::StoreWriteFailed(format!(
                "session {id} not found"
            ))),
        }
    }

    async fn deactivate(&self, id: &SessionId) -> Result<()> {
        self.gate().await?;
        let mut records = self
            .records
            .write()
            .map_err(|_| WalletSessionError::LockPoisoned)?;

        if let Some(record) = records.get_mut(id) {
            record.is_active = false;
        }
        Ok(())
    }

    async fn fetch(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        self.gate()
            .await
            .map_err(|e| WalletSessionError::StoreReadFailed(e.to_string()))?;
        let records = self
            .records
            .read()
            .map_err(|_| WalletSessionError::LockPoisoned)?;
        Ok(records.get(id).cloned())
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.gate().await?;
        let mut records = self
            .records
            .write()
            .map_err(|_| WalletSessionError::LockPoisoned)?;

        let mut changed = 0;
        for record in records.values_mut().filter(|r| r.is_stale_at(now)) {
            record.is_active = false;
            changed += 1;
        }
        Ok(changed)
    }
}
