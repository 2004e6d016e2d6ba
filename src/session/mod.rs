//! Session management module.
//!
//! This module provides the session entity, its identifier, the slot state
//! machine, and the [`SessionManager`] that keeps the local cache and the
//! durable store in step.

mod id;
mod manager;
mod model;
mod state;

pub use id::SessionId;
pub use manager::{
    SessionManager, SessionSettings, DEFAULT_SESSION_DURATION, DEFAULT_STORE_TIMEOUT,
};
pub use model::Session;
pub use state::{SessionState, Transition};
