//! # wallet-session
//!
//! Time-bounded wallet session lifecycle management.
//!
//! A wallet session binds this client to a connected wallet address and chain
//! for a fixed duration. Two copies of it are kept: a single-slot local cache
//! for fast validity checks, and a durable server-side row that is
//! authoritative for existence and cross-device revocation.
//!
//! ## Features
//!
//! - **Lifecycle manager**: create, read, touch, extend, terminate with
//!   store-first creation and rollback on refused extension
//! - **Lazy expiry**: expired sessions are purged the next time they are read
//! - **Heartbeat**: owned validity and activity ticks, stopped with their owner
//! - **Reactive facade**: `watch`-based connection snapshot for UI code
//! - **Pluggable backends**: in-memory or file cache, in-memory or REST store
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use wallet_session::{Config, WalletSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     wallet_session::logging::try_init_with_filter(config.log_filter()).ok();
//!
//!     let manager = Arc::new(config.build_manager()?);
//!     let session = WalletSession::start(manager, config.heartbeat_config()).await;
//!
//!     session.connect("0xabc", 1, "0xsignature").await?;
//!     assert!(session.connected());
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod facade;
pub mod heartbeat;
pub mod logging;
pub mod session;
pub mod store;
pub mod sweep;

// Re-export commonly used types
pub use auth::{
    ConnectRequest, HttpAuthenticator, StaticAuthenticator, UserIdentity, WalletAuthenticator,
};
pub use cache::{CacheBackend, FileCache, MemoryCache, SessionCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError};
pub use error::{Result, WalletSessionError};
pub use events::{SessionEvent, SessionObserver, TracingObserver};
pub use facade::{SessionSnapshot, SnapshotChannel, WalletSession};
pub use heartbeat::{HeartbeatConfig, HeartbeatScheduler};
pub use session::{Session, SessionId, SessionManager, SessionSettings, SessionState};
pub use store::{DurableStore, HttpStore, MemoryStore, SessionPatch, SessionRecord};
pub use sweep::ExpirySweeper;
