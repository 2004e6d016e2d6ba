//! Session lifecycle notifications.
//!
//! Observers receive events after the fact. They are called inline and must not
//! block; anything slow (analytics upload and the like) belongs on the other end
//! of a channel, for which [`SessionObserver`] is implemented directly.

use tokio::sync::mpsc;
use tracing::info;

use crate::session::SessionId;

/// Something that happened to the session slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new session was created.
    Connected {
        session_id: SessionId,
        wallet_address: String,
        chain_id: u64,
    },
    /// The expiry was pushed forward.
    Extended { session_id: SessionId, expires_at: i64 },
    /// An extension was rolled back because the durable store refused it.
    ExtendFailed { session_id: SessionId, reason: String },
    /// The session was terminated explicitly.
    Disconnected { session_id: SessionId },
    /// The session was found expired and purged.
    Expired { session_id: SessionId },
}

impl SessionEvent {
    /// Stable event name, suitable as an analytics event key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "wallet_connected",
            Self::Extended { .. } => "session_extended",
            Self::ExtendFailed { .. } => "session_extend_failed",
            Self::Disconnected { .. } => "wallet_disconnected",
            Self::Expired { .. } => "session_expired",
        }
    }

    /// The session the event refers to.
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Connected { session_id, .. }
            | Self::Extended { session_id, .. }
            | Self::ExtendFailed { session_id, .. }
            | Self::Disconnected { session_id }
            | Self::Expired { session_id } => *session_id,
        }
    }
}

/// Receiver of session events.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

/// Logs every event at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent) {
        info!(event = event.name(), session_id = %event.session_id(), "session event");
    }
}

/// Forward events into a channel. A closed receiver is ignored.
impl SessionObserver for mpsc::UnboundedSender<SessionEvent> {
    fn on_event(&self, event: &SessionEvent) {
        let _ = self.send(event.clone());
    }
}
