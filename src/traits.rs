//! Cache Traits
//!
//! Seams of the multi-level cache:
//!
//! - `CacheSerializer`: pluggable text serialization between the tiers
//! - `DistributedCache`: the byte-oriented get/set/remove/refresh contract
//!   of the persistent tier
//! - `ManagedCache`: maintenance extensions (count, clear, size)
//!
//! # Example: Custom Serializer
//!
//! ```rust,ignore
//! use multi_level_cache::CacheSerializer;
//! use anyhow::Result;
//! use serde::{Serialize, de::DeserializeOwned};
//!
//! #[derive(Debug)]
//! struct TomlSerializer;
//!
//! impl CacheSerializer for TomlSerializer {
//!     fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
//!         Ok(toml::to_string(value)?)
//!     }
//!
//!     fn deserialize<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
//!         Ok(toml::from_str(text)?)
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "toml"
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

use crate::entry::EntryOptions;
use crate::error::CacheError;

/// Converts typed values to and from the text stored in the persistent tier
///
/// Implementations must round-trip every value shape callers store,
/// including plain structs and `Option`s.
pub trait CacheSerializer: Send + Sync + Debug {
    /// Serialize a value to text
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<String>;

    /// Deserialize text to a value
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not describe a `T`.
    fn deserialize<T: DeserializeOwned>(&self, text: &str) -> Result<T>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// Values the multi-level cache can hold
///
/// Memory-tier hits hand out clones; persistent-tier hits go through a
/// [`CacheSerializer`]. Implemented for every type meeting the bounds.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Byte-oriented cache contract of the persistent tier
///
/// Missing and expired keys are reported as `Ok(None)`, never as errors.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Get the value stored under `key`
    ///
    /// Reading an entry with a sliding window renews it. Reading an expired
    /// entry deletes it.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`, replacing any previous entry
    async fn set(&self, key: &str, value: &[u8], options: &EntryOptions) -> Result<(), CacheError>;

    /// Delete the entry stored under `key`, if any
    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Renew the sliding window of `key` without reading its value
    async fn refresh(&self, key: &str) -> Result<(), CacheError>;

    /// Get the value stored under `key` as UTF-8 text
    async fn get_string(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.get(key).await? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|source| CacheError::InvalidUtf8 {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Store UTF-8 text under `key`
    async fn set_string(
        &self,
        key: &str,
        value: &str,
        options: &EntryOptions,
    ) -> Result<(), CacheError> {
        self.set(key, value.as_bytes(), options).await
    }

    /// Check that the cache is operational
    async fn health_check(&self) -> bool;

    /// Name used in logs
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Maintenance extensions for caches that own their whole store
#[async_trait]
pub trait ManagedCache: DistributedCache {
    /// Number of stored entries, including expired entries not yet read
    async fn item_count(&self) -> Result<u64, CacheError>;

    /// Delete every entry
    async fn clear(&self) -> Result<(), CacheError>;

    /// Sum of the byte lengths of all stored values
    async fn size_in_bytes(&self) -> Result<u64, CacheError>;
}
