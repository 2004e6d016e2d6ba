//! Consumer facade.
//!
//! [`WalletSession`] is what UI code holds: a reactive snapshot of the
//! connection plus `connect`, `disconnect` and `refresh`. It owns the heartbeat
//! for as long as it lives.

use std::sync::Arc;

use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::debug;

use crate::heartbeat::{HeartbeatConfig, HeartbeatScheduler};
use crate::session::{Session, SessionManager, SessionState, Transition};
use crate::Result;

/// Connection state as seen by consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub connected: bool,
    pub wallet_address: Option<String>,
    pub chain_id: Option<u64>,
    pub expires_at: Option<i64>,
}

impl SessionSnapshot {
    /// Snapshot of `session`, or the disconnected snapshot for `None`.
    pub fn from_session(session: Option<&Session>) -> Self {
        match session {
            Some(s) => Self {
                connected: true,
                wallet_address: Some(s.wallet_address.clone()),
                chain_id: Some(s.chain_id),
                expires_at: Some(s.expires_at),
            },
            None => Self::default(),
        }
    }

    /// Slot state this snapshot represents.
    pub fn state(&self) -> SessionState {
        if self.connected {
            SessionState::Active
        } else {
            SessionState::Absent
        }
    }
}

/// Published connection state.
///
/// Every manager call whose result is published runs under [`Self::lock`], so a
/// heartbeat tick can never publish a result older than one already published.
/// Lock order is this lock first, then the manager's slot lock.
#[derive(Debug)]
pub struct SnapshotChannel {
    tx: watch::Sender<SessionSnapshot>,
    order: Mutex<()>,
}

impl SnapshotChannel {
    /// Channel starting at `initial`.
    pub fn new(initial: SessionSnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx,
            order: Mutex::new(()),
        }
    }

    /// Current snapshot.
    pub fn current(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    /// Whether the current snapshot is connected.
    pub fn connected(&self) -> bool {
        self.tx.borrow().connected
    }

    /// Receive every subsequent snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Hold while calling the manager and publishing what it returned.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.order.lock().await
    }

    /// Publish a new snapshot if it differs from the current one.
    ///
    /// Returns whether subscribers were notified.
    pub(crate) fn publish(&self, session: Option<&Session>, transition: Transition) -> bool {
        let next = SessionSnapshot::from_session(session);
        self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            let mut slot = current.state();
            match slot.apply(transition) {
                Some(reached) if reached == next.state() => {
                    debug!(?transition, state = ?reached, "session state changed")
                }
                _ => debug!(
                    ?transition,
                    from = ?current.state(),
                    to = ?next.state(),
                    "session state resynchronized"
                ),
            }
            *current = next;
            true
        })
    }
}

/// Reactive wallet session handle.
#[derive(Debug)]
pub struct WalletSession {
    manager: Arc<SessionManager>,
    state: Arc<SnapshotChannel>,
    heartbeat: HeartbeatScheduler,
}

impl WalletSession {
    /// Hydrate from the cache, then start the heartbeat.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(manager: Arc<SessionManager>, config: HeartbeatConfig) -> Self {
        let initial = manager.read().await;
        let state = Arc::new(SnapshotChannel::new(SessionSnapshot::from_session(
            initial.as_ref(),
        )));
        let heartbeat = HeartbeatScheduler::start(Arc::clone(&manager), Arc::clone(&state), config);

        Self {
            manager,
            state,
            heartbeat,
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> SessionSnapshot {
        self.state.current()
    }

    /// Whether a session is held.
    pub fn connected(&self) -> bool {
        self.state.connected()
    }

    /// Connected wallet address.
    pub fn wallet_address(&self) -> Option<String> {
        self.state.current().wallet_address
    }

    /// Connected chain.
    pub fn chain_id(&self) -> Option<u64> {
        self.state.current().chain_id
    }

    /// Expiry of the current session in epoch milliseconds.
    pub fn expires_at(&self) -> Option<i64> {
        self.state.current().expires_at
    }

    /// Receive every subsequent snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// The underlying manager.
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Verify `proof` for the wallet and start a session.
    ///
    /// On failure the published state is whatever the cache still holds.
    pub async fn connect(
        &self,
        wallet_address: &str,
        chain_id: u64,
        proof: &str,
    ) -> Result<Session> {
        let _order = self.state.lock().await;
        match self.manager.connect(wallet_address, chain_id, proof).await {
            Ok(session) => {
                self.state.publish(Some(&session), Transition::Create);
                Ok(session)
            }
            Err(e) => {
                self.resync().await;
                Err(e)
            }
        }
    }

    /// End the session.
    pub async fn disconnect(&self) {
        let _order = self.state.lock().await;
        self.manager.disconnect().await;
        self.state.publish(None, Transition::Terminate);
    }

    /// Extend the session.
    ///
    /// Returns `None` when there is nothing to extend or the extension was
    /// refused; the published expiry is then left as it was.
    pub async fn refresh(&self) -> Option<Session> {
        let _order = self.state.lock().await;
        match self.manager.extend().await {
            Some(session) => {
                self.state.publish(Some(&session), Transition::Extend);
                Some(session)
            }
            None => {
                self.resync().await;
                None
            }
        }
    }

    /// Stop the heartbeat. Dropping the handle does the same.
    pub fn shutdown(&self) {
        self.heartbeat.stop();
    }

    /// Whether the heartbeat is still running.
    pub fn is_running(&self) -> bool {
        self.heartbeat.is_running()
    }

    /// Republish from the cache. The caller holds the order lock.
    async fn resync(&self) {
        let session = self.manager.read().await;
        let transition = if session.is_some() {
            Transition::Extend
        } else {
            Transition::Expire
        };
        self.state.publish(session.as_ref(), transition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_snapshot_from_session() {
        let session = Session::new("0xabc", 137, 0, Duration::from_secs(60));
        let snapshot = SessionSnapshot::from_session(Some(&session));

        assert!(snapshot.connected);
        assert_eq!(snapshot.wallet_address.as_deref(), Some("0xabc"));
        assert_eq!(snapshot.chain_id, Some(137));
        assert_eq!(snapshot.expires_at, Some(60_000));
        assert_eq!(snapshot.state(), SessionState::Active);
    }

    #[test]
    fn test_disconnected_snapshot() {
        let snapshot = SessionSnapshot::from_session(None);
        assert_eq!(snapshot, SessionSnapshot::default());
        assert_eq!(snapshot.state(), SessionState::Absent);
    }

    #[test]
    fn test_publish_only_on_change() {
        let channel = SnapshotChannel::new(SessionSnapshot::default());
        let rx = channel.subscribe();
        assert!(!channel.publish(None, Transition::Expire));

        let session = Session::new("0xabc", 1, 0, Duration::from_secs(60));
        assert!(channel.publish(Some(&session), Transition::Create));
        assert!(!channel.publish(Some(&session), Transition::Extend));
        assert!(rx.borrow().connected);

        assert!(channel.publish(None, Transition::Terminate));
        assert!(!rx.borrow().connected);
        assert!(!channel.connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_wait_for_order_lock() {
        use crate::auth::StaticAuthenticator;
        use crate::cache::SessionCache;
        use crate::store::MemoryStore;

        let manager = Arc::new(SessionManager::new(
            SessionCache::in_memory(),
            Arc::new(MemoryStore::new()),
            Arc::new(StaticAuthenticator::signed_in("user-1")),
        ));
        let facade = Arc::new(WalletSession::start(manager, HeartbeatConfig::default()).await);

        let held = facade.state.lock().await;
        let pending = tokio::spawn({
            let facade = Arc::clone(&facade);
            async move { facade.connect("0xabc", 1, "0xsig").await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!pending.is_finished());
        assert!(facade.manager().read().await.is_none());

        drop(held);
        pending.await.unwrap().unwrap();
        assert!(facade.connected());
    }
}
