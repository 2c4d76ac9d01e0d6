//! Cache Backend Implementations
//!
//! # Available Backends
//!
//! - **Moka** ([`MemoryCache`]) - in-process tier holding live typed values
//! - **SQLite** ([`SqliteStore`]) - embedded single-file store behind the persistent tier
//!
//! # Usage
//!
//! ```rust,no_run
//! use multi_level_cache::backends::{MemoryCache, SqliteStore};
//! use multi_level_cache::{MemoryCacheConfig, PersistentCacheConfig};
//!
//! # fn example() -> Result<(), multi_level_cache::CacheError> {
//! let memory = MemoryCache::new(&MemoryCacheConfig::default());
//! let store = SqliteStore::open(&PersistentCacheConfig::new("cache.db"))?;
//! # Ok(())
//! # }
//! ```

pub mod moka_cache;
pub mod sqlite_store;

pub use moka_cache::{MemoryCache, MemoryCacheStats};
pub use sqlite_store::SqliteStore;
