//! Local session cache.
//!
//! A [`CacheBackend`] is a small string key-value store, comparable to browser
//! local storage. [`SessionCache`] uses exactly one key of it to hold the
//! current [`Session`] as a JSON blob, which gives the single-slot semantics
//! the manager relies on.

mod file;
mod memory;

use std::sync::Arc;

pub use file::FileCache;
pub use memory::MemoryCache;

use crate::error::WalletSessionError;
use crate::session::Session;
use crate::Result;

/// Well-known key the session blob is stored under.
pub const SESSION_CACHE_KEY: &str = "wallet_session";

/// String key-value storage local to this process or device.
pub trait CacheBackend: Send + Sync {
    /// Read the value for `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value for `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Single-slot session cache on top of a [`CacheBackend`].
#[derive(Clone)]
pub struct SessionCache {
    backend: Arc<dyn CacheBackend>,
    key: String,
}

impl SessionCache {
    /// Create a cache using the default key.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self::with_key(backend, SESSION_CACHE_KEY)
    }

    /// Create a cache storing its slot under a custom key.
    pub fn with_key(backend: Arc<dyn CacheBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// In-memory cache, mostly useful for tests and server-side use.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    /// The key this cache uses.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the cached session.
    ///
    /// Returns `Err(MalformedCacheEntry)` when the slot holds something that is
    /// not a session; callers decide whether to purge it.
    pub fn load(&self) -> Result<Option<Session>> {
        match self.backend.get(&self.key)? {
            None => Ok(None),
            Some(raw) => decode(&raw).map(Some),
        }
    }

    /// Replace the slot with `session`.
    pub fn save(&self, session: &Session) -> Result<()> {
        self.backend.set(&self.key, &encode(session)?)
    }

    /// Empty the slot.
    pub fn clear(&self) -> Result<()> {
        self.backend.remove(&self.key)
    }
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache").field("key", &self.key).finish()
    }
}

fn encode(session: &Session) -> Result<String> {
    serde_json::to_string(session).map_err(|e| WalletSessionError::Cache(e.to_string()))
}

fn decode(raw: &str) -> Result<Session> {
    let session: Session = serde_json::from_str(raw)
        .map_err(|e| WalletSessionError::MalformedCacheEntry(e.to_string()))?;

    if session.wallet_address.trim().is_empty() {
        return Err(WalletSessionError::MalformedCacheEntry(
            "empty wallet address".to_string(),
        ));
    }
    if session.expires_at < session.connected_at {
        return Err(WalletSessionError::MalformedCacheEntry(format!(
            "expires_at {} precedes connected_at {}",
            session.expires_at, session.connected_at
        )));
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_slot_loads_none() {
        let cache = SessionCache::in_memory();
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_slot() {
        let cache = SessionCache::in_memory();
        let first = Session::new("0xabc", 1, 0, Duration::from_secs(60));
        let second = Session::new("0xdef", 10, 0, Duration::from_secs(60));

        cache.save(&first).unwrap();
        cache.save(&second).unwrap();

        assert_eq!(cache.load().unwrap(), Some(second));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let cache = SessionCache::in_memory();
        cache
            .save(&Session::new("0xabc", 1, 0, Duration::from_secs(60)))
            .unwrap();
        cache.clear().unwrap();
        cache.clear().unwrap();
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_garbage_is_malformed() {
        let backend = Arc::new(MemoryCache::new());
        backend.set(SESSION_CACHE_KEY, "{not json").unwrap();
        let cache = SessionCache::new(backend);

        let err = cache.load().unwrap_err();
        assert!(matches!(err, WalletSessionError::MalformedCacheEntry(_)));
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let backend = Arc::new(MemoryCache::new());
        backend
            .set(SESSION_CACHE_KEY, r#"{"walletAddress":"0xabc"}"#)
            .unwrap();
        let cache = SessionCache::new(backend);

        assert!(matches!(
            cache.load(),
            Err(WalletSessionError::MalformedCacheEntry(_))
        ));
    }

    #[test]
    fn test_inconsistent_session_is_malformed() {
        let backend = Arc::new(MemoryCache::new());
        let cache = SessionCache::new(backend.clone());

        let mut backwards = Session::new("0xabc", 1, 10_000, Duration::from_secs(60));
        backwards.expires_at = 5_000;
        backend
            .set(SESSION_CACHE_KEY, &serde_json::to_string(&backwards).unwrap())
            .unwrap();
        assert!(matches!(
            cache.load(),
            Err(WalletSessionError::MalformedCacheEntry(_))
        ));

        let nameless = Session::new("  ", 1, 0, Duration::from_secs(60));
        backend
            .set(SESSION_CACHE_KEY, &serde_json::to_string(&nameless).unwrap())
            .unwrap();
        assert!(matches!(
            cache.load(),
            Err(WalletSessionError::MalformedCacheEntry(_))
        ));
    }

    #[test]
    fn test_custom_key_isolated() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());
        let a = SessionCache::with_key(Arc::clone(&backend), "a");
        let b = SessionCache::with_key(backend, "b");

        a.save(&Session::new("0xabc", 1, 0, Duration::from_secs(60)))
            .unwrap();
        assert!(a.load().unwrap().is_some());
        assert!(b.load().unwrap().is_none());
        assert_eq!(b.key(), "b");
    }
}
