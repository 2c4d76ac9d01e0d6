//! Cache Configuration
//!
//! Settings for the persistent tier (store file and password) and the
//! in-memory tier. `PersistentCacheConfig` deserializes with field defaults,
//! so it can be bound from any serde-supported configuration source.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::CacheError;

/// Default store file name
pub const DEFAULT_CACHE_PATH: &str = "persistent-cache.db";

/// Environment variable holding the store path
pub const CACHE_PATH_ENV: &str = "PERSISTENT_CACHE_PATH";

/// Environment variable holding the store password
pub const CACHE_PASSWORD_ENV: &str = "PERSISTENT_CACHE_PASSWORD";

/// Configuration of the persistent cache store
///
/// # Example
///
/// ```rust
/// use multi_level_cache::PersistentCacheConfig;
///
/// let config = PersistentCacheConfig::new("caches/app.db")
///     .with_password("Test1234!");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentCacheConfig {
    /// Path of the SQLite store file
    pub cache_path: PathBuf,
    /// Optional password the store is locked with
    pub password: Option<String>,
}

impl Default for PersistentCacheConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            password: None,
        }
    }
}

impl PersistentCacheConfig {
    /// Configuration for a store at `cache_path` without a password
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
            password: None,
        }
    }

    /// Read configuration from `PERSISTENT_CACHE_PATH` and `PERSISTENT_CACHE_PASSWORD`
    ///
    /// Unset variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let cache_path = std::env::var(CACHE_PATH_ENV)
            .map_or_else(|_| PathBuf::from(DEFAULT_CACHE_PATH), PathBuf::from);
        let password = std::env::var(CACHE_PASSWORD_ENV).ok();

        Self {
            cache_path,
            password,
        }
    }

    /// Lock the store with `password`
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Check the configuration before anything is opened
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidConfig`] if the path or the password is empty.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.cache_path.as_os_str().is_empty() {
            return Err(CacheError::InvalidConfig(
                "cache_path must not be empty".to_string(),
            ));
        }
        if self.password.as_deref().is_some_and(str::is_empty) {
            return Err(CacheError::InvalidConfig(
                "password must not be empty when set".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for PersistentCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentCacheConfig")
            .field("cache_path", &self.cache_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Configuration for the in-memory tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCacheConfig {
    /// Capacity pre-allocated by the memory tier
    pub initial_capacity: usize,
    /// Name reported by the memory tier
    pub name: String,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 256,
            name: "memory-tier".to_string(),
        }
    }
}
