//! Configuration management for wallet-session.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables (`WALLET_SESSION_*`)
//! 2. Configuration file (JSON)
//! 3. Default values

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::{HttpAuthenticator, StaticAuthenticator, UserIdentity, WalletAuthenticator};
use crate::cache::{CacheBackend, FileCache, MemoryCache, SessionCache, SESSION_CACHE_KEY};
use crate::events::TracingObserver;
use crate::heartbeat::HeartbeatConfig;
use crate::session::{SessionManager, SessionSettings};
use crate::store::{DurableStore, HttpStore, MemoryStore};

/// Longest accepted session lifetime, one year.
pub const MAX_SESSION_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session lifetime and heartbeat timing.
    pub session: SessionSection,
    /// Durable store settings.
    pub store: StoreSection,
    /// Wallet authentication backend.
    pub auth: AuthSection,
    /// Local cache settings.
    pub cache: CacheSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Session timing section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Session lifetime in seconds.
    pub duration_secs: u64,
    /// Validity tick period in seconds.
    pub validity_interval_secs: u64,
    /// Activity tick period in seconds.
    pub activity_interval_secs: u64,
    /// Deadline for a remote call in milliseconds.
    pub store_timeout_ms: u64,
    /// Backend expiry sweep period in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            duration_secs: 4 * 60 * 60,
            validity_interval_secs: 60,
            activity_interval_secs: 5 * 60,
            store_timeout_ms: 10_000,
            sweep_interval_secs: 15 * 60,
        }
    }
}

/// Durable store section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// REST base URL. Without one an in-memory store is used.
    pub url: Option<String>,
    /// Table holding session rows.
    pub table: String,
    /// API key sent with every request.
    pub api_key: Option<String>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            url: None,
            table: "wallet_sessions".to_string(),
            api_key: None,
        }
    }
}

/// Authentication backend section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Base URL of the connect/disconnect endpoints. Without one every
    /// non-empty proof is accepted locally.
    pub url: Option<String>,
    /// Signed-in user id.
    pub user_id: Option<String>,
    /// Bearer token for the backend.
    pub access_token: Option<String>,
}

/// Local cache section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Directory for the file cache. Without one the cache lives in memory.
    pub dir: Option<PathBuf>,
    /// Key the session blob is stored under.
    pub key: String,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            dir: None,
            key: SESSION_CACHE_KEY.to_string(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source (for testing).
    pub fn apply_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let secs = |name: &str| var(name).and_then(|v| v.parse::<u64>().ok());

        if let Some(v) = secs("WALLET_SESSION_DURATION_SECS") {
            self.session.duration_secs = v;
        }
        if let Some(v) = secs("WALLET_SESSION_VALIDITY_INTERVAL_SECS") {
            self.session.validity_interval_secs = v;
        }
        if let Some(v) = secs("WALLET_SESSION_ACTIVITY_INTERVAL_SECS") {
            self.session.activity_interval_secs = v;
        }
        if let Some(v) = secs("WALLET_SESSION_STORE_TIMEOUT_MS") {
            self.session.store_timeout_ms = v;
        }
        if let Some(v) = secs("WALLET_SESSION_SWEEP_INTERVAL_SECS") {
            self.session.sweep_interval_secs = v;
        }
        if let Some(url) = var("WALLET_SESSION_STORE_URL").filter(|v| !v.is_empty()) {
            self.store.url = Some(url);
        }
        if let Some(key) = var("WALLET_SESSION_STORE_API_KEY").filter(|v| !v.is_empty()) {
            self.store.api_key = Some(key);
        }
        if let Some(url) = var("WALLET_SESSION_AUTH_URL").filter(|v| !v.is_empty()) {
            self.auth.url = Some(url);
        }
        if let Some(user) = var("WALLET_SESSION_USER_ID").filter(|v| !v.is_empty()) {
            self.auth.user_id = Some(user);
        }
        if let Some(token) = var("WALLET_SESSION_ACCESS_TOKEN").filter(|v| !v.is_empty()) {
            self.auth.access_token = Some(token);
        }
        if let Some(dir) = var("WALLET_SESSION_CACHE_DIR").filter(|v| !v.is_empty()) {
            self.cache.dir = Some(PathBuf::from(dir));
        }

        if let Some(level) = var("WALLET_SESSION_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: env vars > config file > defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make sessions unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.session;
        if s.duration_secs == 0 {
            return Err(ConfigError::Invalid("session.duration_secs must be > 0".into()));
        }
        if s.duration_secs > MAX_SESSION_DURATION_SECS {
            return Err(ConfigError::Invalid(format!(
                "session.duration_secs must be <= {MAX_SESSION_DURATION_SECS}"
            )));
        }
        if s.validity_interval_secs == 0 || s.activity_interval_secs == 0 {
            return Err(ConfigError::Invalid("heartbeat intervals must be > 0".into()));
        }
        if s.store_timeout_ms == 0 {
            return Err(ConfigError::Invalid("session.store_timeout_ms must be > 0".into()));
        }
        if self.cache.key.is_empty() {
            return Err(ConfigError::Invalid("cache.key must not be empty".into()));
        }
        Ok(())
    }

    /// Manager settings.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            session_duration: Duration::from_secs(self.session.duration_secs),
            store_timeout: Duration::from_millis(self.session.store_timeout_ms),
        }
    }

    /// Heartbeat periods.
    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            validity_interval: Duration::from_secs(self.session.validity_interval_secs),
            activity_interval: Duration::from_secs(self.session.activity_interval_secs),
        }
    }

    /// Backend sweep period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session.sweep_interval_secs)
    }

    /// Build the local cache.
    pub fn build_cache(&self) -> Result<SessionCache, ConfigError> {
        let backend: Arc<dyn CacheBackend> = match self.cache.dir {
            Some(ref dir) => Arc::new(
                FileCache::open(dir).map_err(|e| ConfigError::Invalid(format!("cache dir: {e}")))?,
            ),
            None => Arc::new(MemoryCache::new()),
        };
        Ok(SessionCache::with_key(backend, self.cache.key.clone()))
    }

    /// Build the durable store.
    pub fn build_store(&self) -> Arc<dyn DurableStore> {
        match self.store.url {
            Some(ref url) => {
                let mut store = HttpStore::new(url)
                    .with_table(self.store.table.clone())
                    .with_timeout(Duration::from_millis(self.session.store_timeout_ms));
                if let Some(ref key) = self.store.api_key {
                    store = store.with_api_key(key.clone());
                }
                Arc::new(store)
            }
            None => Arc::new(MemoryStore::new()),
        }
    }

    /// Build the authenticator.
    pub fn build_authenticator(&self) -> Arc<dyn WalletAuthenticator> {
        let identity = self.auth.user_id.as_ref().map(|user| {
            let identity = UserIdentity::new(user.clone());
            match self.auth.access_token {
                Some(ref token) => identity.with_access_token(token.clone()),
                None => identity,
            }
        });

        match self.auth.url {
            Some(ref url) => {
                let auth = HttpAuthenticator::new(url)
                    .with_timeout(Duration::from_millis(self.session.store_timeout_ms));
                auth.set_identity(identity);
                Arc::new(auth)
            }
            None => {
                let auth = StaticAuthenticator::anonymous();
                auth.set_identity(identity);
                Arc::new(auth)
            }
        }
    }

    /// Wire a manager from the configured cache, store and authenticator.
    pub fn build_manager(&self) -> Result<SessionManager, ConfigError> {
        let manager = SessionManager::new(
            self.build_cache()?,
            self.build_store(),
            self.build_authenticator(),
        )
        .with_settings(self.session_settings())
        .with_observer(Arc::new(TracingObserver));
        Ok(manager)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// A value is out of range or unusable.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::Invalid(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.duration_secs, 14_400);
        assert_eq!(config.session.validity_interval_secs, 60);
        assert_eq!(config.session.activity_interval_secs, 300);
        assert!(config.store.url.is_none());
        assert_eq!(config.cache.key, "wallet_session");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "session": {
                "duration_secs": 3600,
                "store_timeout_ms": 2500
            },
            "store": {
                "url": "https://db.example.com/rest/v1",
                "api_key": "anon"
            },
            "auth": {
                "user_id": "user-1"
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.session.duration_secs, 3600);
        assert_eq!(config.session.validity_interval_secs, 60); // Default
        assert_eq!(
            config.store.url.as_deref(),
            Some("https://db.example.com/rest/v1")
        );
        assert_eq!(config.store.table, "wallet_sessions"); // Default

        let settings = config.session_settings();
        assert_eq!(settings.session_duration, Duration::from_secs(3600));
        assert_eq!(settings.store_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file(Path::new("/definitely/not/here.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_apply_vars() {
        let vars: HashMap<&str, &str> = [
            ("WALLET_SESSION_DURATION_SECS", "120"),
            ("WALLET_SESSION_STORE_URL", "http://localhost:3000"),
            ("WALLET_SESSION_USER_ID", "user-9"),
            ("WALLET_SESSION_LOG_LEVEL", "debug"),
            ("WALLET_SESSION_VALIDITY_INTERVAL_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_vars(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.session.duration_secs, 120);
        assert_eq!(config.session.validity_interval_secs, 60);
        assert_eq!(config.store.url.as_deref(), Some("http://localhost:3000"));
        assert_eq!(config.auth.user_id.as_deref(), Some("user-9"));
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_rust_log_fallback() {
        let mut config = Config::default();
        config.apply_vars(|name| (name == "RUST_LOG").then(|| "trace".to_string()));
        assert_eq!(config.log_filter(), "trace");
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        let mut config = Config::default();
        config.session.duration_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_unbounded_duration() {
        let mut config = Config::default();
        config.session.duration_secs = MAX_SESSION_DURATION_SECS;
        assert!(config.validate().is_ok());

        config.session.duration_secs = 10_000_000_000_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_rejects_unbounded_duration_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"session": {"duration_secs": 10000000000000}}"#)
            .unwrap();

        let mut config = Config::from_file(file.path()).unwrap();
        config.apply_vars(|_| None);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_build_file_cache() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.dir = Some(dir.path().join("cache"));
        config.cache.key = "custom_slot".to_string();

        let cache = config.build_cache().unwrap();
        assert_eq!(cache.key(), "custom_slot");
        assert!(dir.path().join("cache").is_dir());
    }

    #[test]
    fn test_build_authenticator_identity() {
        let mut config = Config::default();
        assert!(config.build_authenticator().identity().is_none());

        config.auth.user_id = Some("user-1".into());
        config.auth.access_token = Some("jwt".into());
        let identity = config.build_authenticator().identity().unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.access_token.as_deref(), Some("jwt"));
    }

    #[test]
    fn test_build_manager_uses_settings() {
        let mut config = Config::default();
        config.session.duration_secs = 90;
        let manager = config.build_manager().unwrap();
        assert_eq!(
            manager.settings().session_duration,
            Duration::from_secs(90)
        );
    }

    #[test]
    fn test_heartbeat_config() {
        let config = Config::default();
        let heartbeat = config.heartbeat_config();
        assert_eq!(heartbeat.validity_interval, Duration::from_secs(60));
        assert_eq!(heartbeat.activity_interval, Duration::from_secs(300));
        assert_eq!(config.sweep_interval(), Duration::from_secs(900));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"duration_secs\""));
        assert!(json.contains("\"wallet_session\""));
    }
}
