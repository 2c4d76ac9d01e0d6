//! Multi-Level Cache
//!
//! A two-tier caching library featuring:
//! - **Memory tier**: in-process typed values with Moka (no serialization on hits)
//! - **Persistent tier**: embedded single-file SQLite cache with absolute and
//!   sliding expiration, surviving process restarts
//! - **Stampede Protection**: per-key async locks, at most one factory per key
//! - **Automatic Promotion**: persistent hits are copied back into memory
//! - **Password Protection**: stores reject a wrong or missing password
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use multi_level_cache::{CacheSystem, EntryOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = CacheSystem::with_path("cache.db")?;
//!
//!     let memory = EntryOptions::new()
//!         .with_absolute_expiration_relative_to_now(Duration::from_secs(60));
//!     let persistent = EntryOptions::new().with_sliding_expiration(Duration::from_secs(3600));
//!
//!     let score: u32 = cache
//!         .multi_level()
//!         .get_or_set("user:1:score", || async { Ok(100) }, &memory, &persistent)
//!         .await?;
//!
//!     let stats = cache.multi_level().get_stats();
//!     tracing::info!("Hit rate: {:.2}%", stats.hit_rate);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Request → lock(key) → Memory (Moka) → Persistent (SQLite) → Factory
//!                       ↓ Hit           ↓ Hit                ↓ Miss
//!                       Return          Promote to memory    Store in both tiers
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod backends;
pub mod builder;
pub mod clock;
pub mod codecs;
pub mod config;
pub mod entry;
pub mod error;
pub mod key_locks;
pub mod multi_level_cache;
pub mod persistent_cache;
pub mod traits;

pub use backends::{MemoryCache, MemoryCacheStats, SqliteStore};
pub use builder::CacheSystemBuilder;
pub use clock::{Clock, ManualClock, SystemClock};
pub use codecs::JsonSerializer;
pub use config::{
    CACHE_PASSWORD_ENV, CACHE_PATH_ENV, DEFAULT_CACHE_PATH, MemoryCacheConfig,
    PersistentCacheConfig,
};
pub use entry::{CacheEntry, EntryOptions, Expiration};
pub use error::CacheError;
pub use key_locks::KeyLocks;
pub use multi_level_cache::{MultiLevelCache, MultiLevelStats};
pub use persistent_cache::PersistentCache;
pub use traits::{CacheSerializer, CacheValue, DistributedCache, ManagedCache};

// Re-export async_trait for implementors of the cache traits
pub use async_trait::async_trait;

/// Main entry point for the multi-level cache
///
/// Holds the coordinator and a handle to the persistent cache it writes
/// through. Both are shared; clones are cheap.
///
/// # Example
///
/// ```rust,no_run
/// use multi_level_cache::CacheSystem;
///
/// # fn example() -> Result<(), multi_level_cache::CacheError> {
/// let cache = CacheSystem::new()?;
///
/// // Typed two-tier operations
/// let multi_level = cache.multi_level();
///
/// // Raw byte operations and maintenance
/// let count = cache.persistent().item_count()?;
/// # Ok(())
/// # }
/// ```
pub struct CacheSystem<S: CacheSerializer = JsonSerializer> {
    multi_level: Arc<MultiLevelCache<S>>,
    persistent: Arc<PersistentCache>,
}

impl CacheSystem<JsonSerializer> {
    /// Create a cache system configured from the environment
    ///
    /// # Configuration
    ///
    /// The store path is read from `PERSISTENT_CACHE_PATH` (default
    /// `persistent-cache.db`) and the optional password from
    /// `PERSISTENT_CACHE_PASSWORD`.
    ///
    /// # Errors
    ///
    /// See [`CacheSystemBuilder::build`].
    pub fn new() -> Result<Self, CacheError> {
        info!("Initializing multi-level cache system from environment");
        CacheSystemBuilder::from_env().build()
    }

    /// Create a cache system storing its persistent tier at `cache_path`
    ///
    /// # Errors
    ///
    /// See [`CacheSystemBuilder::build`].
    pub fn with_path(cache_path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let cache_path = cache_path.into();
        info!(cache_path = %cache_path.display(), "Initializing multi-level cache system");
        CacheSystemBuilder::with_config(PersistentCacheConfig::new(cache_path)).build()
    }

    /// Start configuring a cache system
    #[must_use]
    pub fn builder() -> CacheSystemBuilder {
        CacheSystemBuilder::new()
    }
}

impl<S: CacheSerializer> CacheSystem<S> {
    /// The two-tier coordinator (primary interface)
    pub fn multi_level(&self) -> &Arc<MultiLevelCache<S>> {
        &self.multi_level
    }

    /// The persistent tier on its own
    pub fn persistent(&self) -> &Arc<PersistentCache> {
        &self.persistent
    }

    /// Check both tiers
    pub async fn health_check(&self) -> bool {
        if self.multi_level.health_check().await {
            info!("Multi-level cache health check passed");
            true
        } else {
            warn!("Multi-level cache health check failed");
            false
        }
    }

    /// Release the store file
    ///
    /// If other handles to the persistent cache are still alive the file is
    /// released when the last of them drops.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails to close cleanly.
    pub fn close(self) -> Result<(), CacheError> {
        let Self {
            multi_level,
            persistent,
        } = self;
        drop(multi_level);

        match Arc::try_unwrap(persistent) {
            Ok(persistent) => {
                persistent.close()?;
                info!("Multi-level cache system closed");
            }
            Err(_) => debug!("Persistent cache still shared, release deferred to last handle"),
        }
        Ok(())
    }
}

impl<S: CacheSerializer> Clone for CacheSystem<S> {
    fn clone(&self) -> Self {
        Self {
            multi_level: Arc::clone(&self.multi_level),
            persistent: Arc::clone(&self.persistent),
        }
    }
}
