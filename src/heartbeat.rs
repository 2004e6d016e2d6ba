//! Session heartbeat scheduler.
//!
//! Two independent repeating tasks, owned by a [`crate::WalletSession`]:
//!
//! - the validity tick calls [`SessionManager::read`] so expiry is noticed even
//!   when nothing else reads the session, and publishes any state change;
//! - the activity tick calls [`SessionManager::touch`] while connected.
//!
//! Both tasks are aborted when the scheduler is stopped or dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::facade::SnapshotChannel;
use crate::session::{SessionManager, Transition};

/// Default period of the validity tick.
pub const DEFAULT_VALIDITY_INTERVAL: Duration = Duration::from_secs(60);

/// Default period of the activity tick.
pub const DEFAULT_ACTIVITY_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Tick periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub validity_interval: Duration,
    pub activity_interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            validity_interval: DEFAULT_VALIDITY_INTERVAL,
            activity_interval: DEFAULT_ACTIVITY_INTERVAL,
        }
    }
}

/// Handle to the two running heartbeat tasks.
#[derive(Debug)]
pub struct HeartbeatScheduler {
    validity: JoinHandle<()>,
    activity: JoinHandle<()>,
}

impl HeartbeatScheduler {
    /// Spawn both ticks. The first of each fires one full period from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        manager: Arc<SessionManager>,
        state: Arc<SnapshotChannel>,
        config: HeartbeatConfig,
    ) -> Self {
        let validity = tokio::spawn(validity_loop(
            Arc::clone(&manager),
            Arc::clone(&state),
            config.validity_interval,
        ));
        let activity = tokio::spawn(activity_loop(manager, state, config.activity_interval));
        debug!(
            validity_secs = config.validity_interval.as_secs(),
            activity_secs = config.activity_interval.as_secs(),
            "heartbeat started"
        );
        Self { validity, activity }
    }

    /// Abort both ticks. Idempotent.
    pub fn stop(&self) {
        self.validity.abort();
        self.activity.abort();
    }

    /// Whether either tick is still scheduled.
    pub fn is_running(&self) -> bool {
        !self.validity.is_finished() || !self.activity.is_finished()
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn validity_loop(
    manager: Arc<SessionManager>,
    state: Arc<SnapshotChannel>,
    period: Duration,
) {
    let mut ticker = ticker(period);
    loop {
        ticker.tick().await;
        let _order = state.lock().await;
        let session = manager.read().await;
        let transition = if session.is_some() {
            Transition::Extend
        } else {
            Transition::Expire
        };
        if state.publish(session.as_ref(), transition) {
            debug!(connected = session.is_some(), "validity tick changed session state");
        } else {
            trace!("validity tick");
        }
    }
}

async fn activity_loop(
    manager: Arc<SessionManager>,
    state: Arc<SnapshotChannel>,
    period: Duration,
) {
    let mut ticker = ticker(period);
    loop {
        ticker.tick().await;
        if state.connected() {
            trace!("activity tick");
            manager.touch().await;
        }
    }
}
