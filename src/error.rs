//! Cache Errors
//!
//! Failures raised by the persistent tier and by configuration validation.
//! Missing or expired keys are never errors; they surface as `None`.

use std::path::PathBuf;

/// Error type for persistent cache and configuration operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Required configuration is missing or malformed
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// The store was opened with a password that does not match the one it was created with
    #[error("Invalid password for cache store at {}", path.display())]
    InvalidPassword {
        /// Path of the store file that rejected the password
        path: PathBuf,
    },

    /// The underlying SQLite store failed
    #[error("Cache store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// A stored row could not be decoded
    #[error("Corrupt cache entry '{key}': {reason}")]
    Corrupt {
        /// Key of the offending row
        key: String,
        /// What could not be decoded
        reason: String,
    },

    /// A stored value was requested as text but is not valid UTF-8
    #[error("Cache entry '{key}' is not valid UTF-8")]
    InvalidUtf8 {
        /// Key of the offending entry
        key: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// I/O error while preparing the store location
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Whether this error was caused by a wrong or missing store password
    #[must_use]
    pub fn is_invalid_password(&self) -> bool {
        matches!(self, Self::InvalidPassword { .. })
    }
}
