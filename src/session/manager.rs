//! Session lifecycle manager.
//!
//! Owns the single local session slot and reconciles it with the durable store:
//!
//! - `create` writes the durable row first and the cache only after the row is
//!   acknowledged, so a failed create leaves nothing behind.
//! - `extend` writes the cache first and rolls it back if the durable store
//!   refuses the update.
//! - `touch`, `terminate` and lazy expiry send their durable update from a
//!   detached task. Failures there are logged and never reach the caller.
//!
//! All operations serialize on one async lock, so the slot is never mutated
//! concurrently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Session, SessionId};
use crate::auth::{ConnectRequest, WalletAuthenticator};
use crate::cache::SessionCache;
use crate::clock::{Clock, SystemClock};
use crate::error::WalletSessionError;
use crate::events::{SessionEvent, SessionObserver};
use crate::store::{DurableStore, SessionPatch, SessionRecord};
use crate::Result;

/// Default session lifetime.
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(4 * 60 * 60);

/// Default deadline for a single durable store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables for [`SessionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Lifetime of a new or extended session.
    pub session_duration: Duration,
    /// Deadline for each durable store and authenticator call.
    pub store_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_duration: DEFAULT_SESSION_DURATION,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// Creates, reads, extends and terminates the wallet session.
pub struct SessionManager {
    cache: SessionCache,
    store: Arc<dyn DurableStore>,
    authenticator: Arc<dyn WalletAuthenticator>,
    clock: Arc<dyn Clock>,
    observers: Vec<Arc<dyn SessionObserver>>,
    settings: SessionSettings,
    slot: Mutex<()>,
}

impl SessionManager {
    /// Create a manager with default settings and the system clock.
    pub fn new(
        cache: SessionCache,
        store: Arc<dyn DurableStore>,
        authenticator: Arc<dyn WalletAuthenticator>,
    ) -> Self {
        Self {
            cache,
            store,
            authenticator,
            clock: Arc::new(SystemClock),
            observers: Vec::new(),
            settings: SessionSettings::default(),
            slot: Mutex::new(()),
        }
    }

    /// Replace the settings.
    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register an observer.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Current settings.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Current time according to the manager's clock.
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Verify a wallet proof with the backend, then create a session.
    ///
    /// Nothing is written when the backend rejects the proof.
    pub async fn connect(
        &self,
        wallet_address: &str,
        chain_id: u64,
        signature: &str,
    ) -> Result<Session> {
        let wallet_address = validate_address(wallet_address)?;
        if self.authenticator.identity().is_none() {
            return Err(WalletSessionError::AuthRequired);
        }

        let request = ConnectRequest {
            wallet_address: wallet_address.to_string(),
            chain_id,
            signature: signature.to_string(),
        };
        let verdict =
            tokio::time::timeout(self.settings.store_timeout, self.authenticator.connect(&request))
                .await;
        match verdict {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(wallet = %wallet_address, chain_id, error = %e, "wallet connect failed");
                return Err(e);
            }
            Err(_) => {
                warn!(wallet = %wallet_address, chain_id, "wallet connect timed out");
                return Err(WalletSessionError::Remote(format!(
                    "connect timed out after {}ms",
                    self.settings.store_timeout.as_millis()
                )));
            }
        }

        self.create(wallet_address, chain_id).await
    }

    /// Create a new session for an already verified wallet.
    ///
    /// Fails with `AuthRequired` without a user identity, or `StoreWriteFailed`
    /// when the durable insert fails or times out. On failure the cache is left
    /// exactly as it was.
    pub async fn create(&self, wallet_address: &str, chain_id: u64) -> Result<Session> {
        let wallet_address = validate_address(wallet_address)?;
        let identity = self
            .authenticator
            .identity()
            .ok_or(WalletSessionError::AuthRequired)?;

        let _slot = self.slot.lock().await;

        let session = Session::new(
            wallet_address,
            chain_id,
            self.clock.now_millis(),
            self.settings.session_duration,
        );
        let record = match SessionRecord::from_session(&session, &identity.user_id) {
            Ok(record) => record,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "session row not representable");
                return Err(e);
            }
        };

        if let Err(e) = self.bounded(self.store.insert(&record)).await {
            warn!(session_id = %session.id, error = %e, "session insert failed");
            return Err(e);
        }

        let previous = self.load_slot();
        if let Err(e) = self.cache.save(&session) {
            warn!(session_id = %session.id, error = %e, "cache write failed after insert");
            self.spawn_deactivate(session.id, "orphaned insert");
            return Err(e);
        }
        if let Some(prev) = previous.filter(|p| p.is_active) {
            debug!(previous = %prev.id, "superseding cached session");
            self.spawn_deactivate(prev.id, "superseded");
        }

        info!(
            session_id = %session.id,
            wallet = %session.wallet_address,
            chain_id,
            "wallet session created"
        );
        self.notify(SessionEvent::Connected {
            session_id: session.id,
            wallet_address: session.wallet_address.clone(),
            chain_id,
        });
        Ok(session)
    }

    /// Return the cached session if it is still valid.
    ///
    /// An expired or inactive entry is purged here and its durable row flagged
    /// inactive in the background.
    pub async fn read(&self) -> Option<Session> {
        let _slot = self.slot.lock().await;
        self.read_locked()
    }

    /// Whether a valid session is held.
    pub async fn is_valid(&self) -> bool {
        self.read().await.is_some()
    }

    /// Record user activity.
    ///
    /// The cache is updated immediately; the durable update is best-effort.
    pub async fn touch(&self) {
        let _slot = self.slot.lock().await;
        let Some(mut session) = self.read_locked() else {
            return;
        };

        let now = self.clock.now_millis();
        session.touch(now);
        if let Err(e) = self.cache.save(&session) {
            warn!(session_id = %session.id, error = %e, "failed to record activity locally");
            return;
        }

        let patch = match SessionPatch::touch(now) {
            Ok(patch) => patch,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "activity not sent to store");
                return;
            }
        };
        let store = Arc::clone(&self.store);
        let id = session.id;
        self.spawn_remote("touch", id, async move { store.update(&id, &patch).await });
    }

    /// Push the expiry to `now + session_duration`.
    ///
    /// Returns the extended session, or `None` when there is no valid session or
    /// the durable store refused the update. In the latter case the cache is
    /// restored to its previous value.
    pub async fn extend(&self) -> Option<Session> {
        let _slot = self.slot.lock().await;
        let previous = self.read_locked()?;

        let mut extended = previous.clone();
        extended.extend(self.clock.now_millis(), self.settings.session_duration);
        let patch = match SessionPatch::extend(extended.expires_at, extended.last_active) {
            Ok(patch) => patch,
            Err(e) => {
                warn!(session_id = %extended.id, error = %e, "extension not representable");
                self.notify(SessionEvent::ExtendFailed {
                    session_id: previous.id,
                    reason: e.to_string(),
                });
                return None;
            }
        };
        if let Err(e) = self.cache.save(&extended) {
            warn!(session_id = %extended.id, error = %e, "failed to write extension locally");
            return None;
        }

        match self.bounded(self.store.update(&extended.id, &patch)).await {
            Ok(()) => {
                info!(
                    session_id = %extended.id,
                    expires_at = extended.expires_at,
                    "session extended"
                );
                self.notify(SessionEvent::Extended {
                    session_id: extended.id,
                    expires_at: extended.expires_at,
                });
                Some(extended)
            }
            Err(e) => {
                warn!(session_id = %extended.id, error = %e, "extension refused, rolling back");
                if let Err(e) = self.cache.save(&previous) {
                    warn!(session_id = %previous.id, error = %e, "rollback write failed");
                }
                self.notify(SessionEvent::ExtendFailed {
                    session_id: previous.id,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    /// End the current session.
    ///
    /// Always succeeds locally; the durable row is flagged inactive in the
    /// background. Without a valid session this does nothing.
    pub async fn terminate(&self) {
        let _slot = self.slot.lock().await;
        self.terminate_locked();
    }

    /// Terminate the session and notify the backend's disconnect endpoint.
    pub async fn disconnect(&self) {
        let _slot = self.slot.lock().await;
        let Some(id) = self.terminate_locked() else {
            return;
        };

        let authenticator = Arc::clone(&self.authenticator);
        self.spawn_remote("disconnect", id, async move { authenticator.disconnect().await });
    }

    fn terminate_locked(&self) -> Option<SessionId> {
        let mut session = self.read_locked()?;

        session.invalidate();
        if let Err(e) = self.cache.save(&session) {
            warn!(session_id = %session.id, error = %e, "failed to flag session inactive locally");
        }
        self.purge();
        self.spawn_deactivate(session.id, "terminate");

        info!(session_id = %session.id, "wallet session terminated");
        self.notify(SessionEvent::Disconnected {
            session_id: session.id,
        });
        Some(session.id)
    }

    fn read_locked(&self) -> Option<Session> {
        let session = self.load_slot()?;
        let now = self.clock.now_millis();
        if session.is_valid_at(now) {
            return Some(session);
        }

        self.purge();
        self.spawn_deactivate(session.id, "expired");
        if session.is_active {
            info!(session_id = %session.id, expires_at = session.expires_at, "session expired");
            self.notify(SessionEvent::Expired {
                session_id: session.id,
            });
        }
        None
    }

    /// Load the slot, purging anything that does not parse.
    fn load_slot(&self) -> Option<Session> {
        match self.cache.load() {
            Ok(session) => session,
            Err(WalletSessionError::MalformedCacheEntry(reason)) => {
                warn!(%reason, "discarding malformed cache entry");
                self.purge();
                None
            }
            Err(e) => {
                warn!(error = %e, "cache read failed");
                None
            }
        }
    }

    fn purge(&self) {
        if let Err(e) = self.cache.clear() {
            warn!(error = %e, "failed to clear session cache");
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.settings.store_timeout, fut)
            .await
            .unwrap_or_else(|_| Err(WalletSessionError::store_timeout(self.settings.store_timeout)))
    }

    fn spawn_deactivate(&self, id: SessionId, reason: &'static str) {
        let store = Arc::clone(&self.store);
        self.spawn_remote(reason, id, async move { store.deactivate(&id).await });
    }

    /// Run a remote call in a detached task, logging its outcome.
    fn spawn_remote<F>(&self, op: &'static str, id: SessionId, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let timeout = self.settings.store_timeout;
        let task = async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(Ok(())) => debug!(session_id = %id, op, "remote update applied"),
                Ok(Err(e)) => warn!(session_id = %id, op, error = %e, "remote update failed"),
                Err(_) => warn!(session_id = %id, op, "remote update timed out"),
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(_) => warn!(session_id = %id, op, "no async runtime, remote update skipped"),
        }
    }

    fn notify(&self, event: SessionEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("cache", &self.cache)
            .field("settings", &self.settings)
            .field("observers", &self.observers.len())
            .finish()
    }
}

fn validate_address(wallet_address: &str) -> Result<&str> {
    let trimmed = wallet_address.trim();
    if trimmed.is_empty() {
        return Err(WalletSessionError::InvalidInput(
            "wallet address is empty".to_string(),
        ));
    }
    Ok(trimmed)
}
