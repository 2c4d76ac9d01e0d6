//! Cache System Builder
//!
//! Wires the memory tier, the persistent cache and the coordinator together
//! from configuration.
//!
//! # Example: Defaults
//!
//! ```rust,no_run
//! use multi_level_cache::CacheSystemBuilder;
//!
//! # fn example() -> Result<(), multi_level_cache::CacheError> {
//! let cache = CacheSystemBuilder::new().build()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Example: Password-Protected Store
//!
//! ```rust,no_run
//! use multi_level_cache::CacheSystemBuilder;
//!
//! # fn example() -> Result<(), multi_level_cache::CacheError> {
//! let cache = CacheSystemBuilder::new()
//!     .with_cache_path("data/app-cache.db")
//!     .with_password("s3cret")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::backends::MemoryCache;
use crate::clock::{Clock, SystemClock};
use crate::codecs::JsonSerializer;
use crate::config::{MemoryCacheConfig, PersistentCacheConfig};
use crate::error::CacheError;
use crate::multi_level_cache::MultiLevelCache;
use crate::persistent_cache::PersistentCache;
use crate::traits::{CacheSerializer, DistributedCache};
use crate::CacheSystem;

/// Builder for [`CacheSystem`]
///
/// Without further configuration the builder opens `persistent-cache.db`
/// without a password, uses the wall clock and JSON between the tiers.
/// Configuration is validated before anything is opened.
#[derive(Debug)]
pub struct CacheSystemBuilder<S: CacheSerializer = JsonSerializer> {
    persistent: PersistentCacheConfig,
    memory: MemoryCacheConfig,
    clock: Option<Arc<dyn Clock>>,
    serializer: S,
}

impl CacheSystemBuilder<JsonSerializer> {
    /// Create a builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PersistentCacheConfig::default())
    }

    /// Create a builder configured from the environment
    ///
    /// See [`PersistentCacheConfig::from_env`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_config(PersistentCacheConfig::from_env())
    }

    /// Create a builder from an explicit persistent configuration
    #[must_use]
    pub fn with_config(persistent: PersistentCacheConfig) -> Self {
        Self {
            persistent,
            memory: MemoryCacheConfig::default(),
            clock: None,
            serializer: JsonSerializer,
        }
    }
}

impl<S: CacheSerializer> CacheSystemBuilder<S> {
    /// Location of the store file
    #[must_use]
    pub fn with_cache_path(mut self, cache_path: impl Into<PathBuf>) -> Self {
        self.persistent.cache_path = cache_path.into();
        self
    }

    /// Password protecting the store file
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.persistent.password = Some(password.into());
        self
    }

    /// Configuration of the memory tier
    #[must_use]
    pub fn with_memory_config(mut self, memory: MemoryCacheConfig) -> Self {
        self.memory = memory;
        self
    }

    /// Time source of the persistent cache
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Default serializer of the coordinator
    #[must_use]
    pub fn with_serializer<X: CacheSerializer>(self, serializer: X) -> CacheSystemBuilder<X> {
        CacheSystemBuilder {
            persistent: self.persistent,
            memory: self.memory,
            clock: self.clock,
            serializer,
        }
    }

    /// Validate the configuration, open the store and wire both tiers
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidConfig`] for an empty path or password,
    /// [`CacheError::InvalidPassword`] if the store was created with another
    /// password, or a store error if the file cannot be opened.
    pub fn build(self) -> Result<CacheSystem<S>, CacheError> {
        self.persistent.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let persistent = Arc::new(PersistentCache::open_with_clock(&self.persistent, clock)?);
        let memory = MemoryCache::new(&self.memory);

        let tier: Arc<dyn DistributedCache> = persistent.clone();
        let multi_level = Arc::new(MultiLevelCache::with_serializer(
            memory,
            tier,
            self.serializer,
        ));

        info!(
            cache_path = %persistent.path().display(),
            password_protected = self.persistent.password.is_some(),
            "Multi-level cache system built"
        );

        Ok(CacheSystem {
            multi_level,
            persistent,
        })
    }
}

impl Default for CacheSystemBuilder<JsonSerializer> {
    fn default() -> Self {
        Self::new()
    }
}
