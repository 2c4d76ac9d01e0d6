//! Persistent Cache - Durable Tier
//!
//! Distributed-cache contract over the embedded [`SqliteStore`]:
//! get/set/remove/refresh with absolute and sliding expiration, plus
//! count/clear/size maintenance.
//!
//! Expired entries are deleted lazily by the read that discovers them;
//! nothing runs in the background.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::backends::SqliteStore;
use crate::clock::{Clock, SystemClock};
use crate::config::PersistentCacheConfig;
use crate::entry::{CacheEntry, EntryOptions};
use crate::error::CacheError;
use crate::traits::{DistributedCache, ManagedCache};

/// Persistent cache backed by a single SQLite file
///
/// # Example
///
/// ```rust,no_run
/// use multi_level_cache::{EntryOptions, PersistentCache, PersistentCacheConfig};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), multi_level_cache::CacheError> {
/// let cache = PersistentCache::open(&PersistentCacheConfig::new("cache.db"))?;
///
/// let options = EntryOptions::new().with_sliding_expiration(Duration::from_secs(300));
/// cache.set("greeting", b"Hello there!", &options)?;
/// assert_eq!(cache.get("greeting")?, Some(b"Hello there!".to_vec()));
/// # Ok(())
/// # }
/// ```
pub struct PersistentCache {
    store: SqliteStore,
    clock: Arc<dyn Clock>,
}

impl PersistentCache {
    /// Open the cache described by `config` using the wall clock
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the password is wrong, or the
    /// store file cannot be opened.
    pub fn open(config: &PersistentCacheConfig) -> Result<Self, CacheError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open the cache described by `config` reading time from `clock`
    ///
    /// # Errors
    ///
    /// Same as [`PersistentCache::open`].
    pub fn open_with_clock(
        config: &PersistentCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        Ok(Self::from_store(SqliteStore::open(config)?, clock))
    }

    /// Wrap an already opened store
    #[must_use]
    pub fn from_store(store: SqliteStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Path of the store file
    #[must_use]
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Get the value stored under `key`
    ///
    /// Returns `None` for missing and expired keys; an expired entry is
    /// deleted. Reading an entry with a sliding window renews it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.read(key)?.map(|entry| entry.value))
    }

    /// Store `value` under `key`, replacing any previous entry
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails; the previous entry is then kept.
    pub fn set(&self, key: &str, value: &[u8], options: &EntryOptions) -> Result<(), CacheError> {
        let entry = CacheEntry::new(key, value.to_vec(), options, self.clock.now());
        self.store.replace(&entry)?;
        debug!(
            key = %key,
            expiry = ?entry.expiry,
            renewal = ?entry.renewal,
            "[Persistent] Cached key"
        );
        Ok(())
    }

    /// Delete the entry stored under `key`, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        let removed = self.store.delete(key)?;
        debug!(key = %key, removed, "[Persistent] Removed key");
        Ok(())
    }

    /// Renew the sliding window of `key`
    ///
    /// Deletes the entry if it is already expired; does nothing for entries
    /// without a sliding window.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn refresh(&self, key: &str) -> Result<(), CacheError> {
        self.read(key).map(|_| ())
    }

    /// Number of stored entries, including expired entries not yet read
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn item_count(&self) -> Result<u64, CacheError> {
        self.store.count()
    }

    /// Delete every entry
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn clear(&self) -> Result<(), CacheError> {
        let removed = self.store.delete_all()?;
        debug!(removed, "[Persistent] Cleared cache");
        Ok(())
    }

    /// Sum of the byte lengths of all stored values
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn size_in_bytes(&self) -> Result<u64, CacheError> {
        self.store.total_value_bytes()
    }

    /// Every stored entry, expired or not
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        self.store.entries()
    }

    /// Release the store file
    ///
    /// Dropping the cache releases it too; `close` additionally reports
    /// errors raised while closing.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails to close cleanly.
    pub fn close(self) -> Result<(), CacheError> {
        self.store.close()
    }

    /// Shared read path of `get` and `refresh`
    fn read(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let now = self.clock.now();

        let Some(mut entry) = self.store.find(key)? else {
            return Ok(None);
        };

        if entry.is_expired(now) {
            self.store.delete_expired(key, now)?;
            debug!(key = %key, "[Persistent] Dropped expired key");
            return Ok(None);
        }

        let previous = entry.expiry;
        if entry.renew(now) {
            self.store.update_expiry(key, previous, entry.expiry)?;
        }

        Ok(Some(entry))
    }
}

// ===== Trait Implementations =====

#[async_trait]
impl DistributedCache for PersistentCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        PersistentCache::get(self, key)
    }

    async fn set(&self, key: &str, value: &[u8], options: &EntryOptions) -> Result<(), CacheError> {
        PersistentCache::set(self, key, value, options)
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        PersistentCache::remove(self, key)
    }

    async fn refresh(&self, key: &str) -> Result<(), CacheError> {
        PersistentCache::refresh(self, key)
    }

    async fn health_check(&self) -> bool {
        self.store.ping()
    }

    fn name(&self) -> &'static str {
        "SQLite"
    }
}

#[async_trait]
impl ManagedCache for PersistentCache {
    async fn item_count(&self) -> Result<u64, CacheError> {
        PersistentCache::item_count(self)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        PersistentCache::clear(self)
    }

    async fn size_in_bytes(&self) -> Result<u64, CacheError> {
        PersistentCache::size_in_bytes(self)
    }
}
