//! Error types for wallet-session.

use std::time::Duration;

use thiserror::Error;

/// Main error type for wallet session operations.
#[derive(Error, Debug)]
pub enum WalletSessionError {
    /// A wallet session was requested without an underlying user identity.
    #[error("authentication required: no signed-in user identity")]
    AuthRequired,

    /// The durable store was unreachable or rejected the write.
    #[error("durable store write failed: {0}")]
    StoreWriteFailed(String),

    /// The durable store could not be queried.
    #[error("durable store read failed: {0}")]
    StoreReadFailed(String),

    /// The local cache held data that does not parse as a session.
    ///
    /// Never returned from public manager operations; the entry is purged instead.
    #[error("malformed cache entry: {0}")]
    MalformedCacheEntry(String),

    /// The connect endpoint refused the wallet proof.
    #[error("wallet connect rejected: {0}")]
    ConnectRejected(String),

    /// The authentication backend could not be reached.
    #[error("auth backend error: {0}")]
    Remote(String),

    /// Caller supplied an unusable argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The local cache backend failed to read or write.
    #[error("local cache error: {0}")]
    Cache(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl WalletSessionError {
    /// Build the error reported when a durable store call exceeds its deadline.
    pub fn store_timeout(after: Duration) -> Self {
        Self::StoreWriteFailed(format!("timed out after {}ms", after.as_millis()))
    }
}

/// Convenience Result type for wallet session operations.
pub type Result<T> = std::result::Result<T, WalletSessionError>;
