//! Backend expiry sweep.
//!
//! Clients flag expired rows inactive on a best-effort basis only. The sweeper
//! is the backstop: it periodically deactivates every row still marked active
//! after its `expires_at`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::store::{to_datetime, DurableStore};
use crate::Result;

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Run one sweep. Returns the number of rows deactivated.
pub async fn sweep_once(store: &dyn DurableStore, clock: &dyn Clock) -> Result<usize> {
    let now = to_datetime(clock.now_millis())?;
    store.deactivate_expired(now).await
}

/// Periodic sweep task.
#[derive(Debug)]
pub struct ExpirySweeper {
    handle: JoinHandle<()>,
}

impl ExpirySweeper {
    /// Spawn the sweep loop. The first sweep runs immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let period = interval.max(Duration::from_secs(1));
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now(), period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match sweep_once(store.as_ref(), clock.as_ref()).await {
                    Ok(0) => {}
                    Ok(n) => info!(deactivated = n, "expired sessions swept"),
                    Err(e) => warn!(error = %e, "expiry sweep failed"),
                }
            }
        });
        Self { handle }
    }

    /// Stop sweeping. Idempotent.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
