//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - Temporary store locations
//! - Cache setup with real or manual clocks
//! - Test data generators
#![allow(dead_code)]

use multi_level_cache::{
    CacheSystem, CacheSystemBuilder, EntryOptions, ManualClock, PersistentCache,
    PersistentCacheConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Install a log subscriber honouring `RUST_LOG`; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fresh directory removed when the returned guard drops
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().unwrap_or_else(|e| panic!("Failed to create temp dir: {e}"))
}

/// Store file location inside `dir`
pub fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("cache.db")
}

/// Create a test key with unique suffix
pub fn test_key(name: &str) -> String {
    format!("test_{}_{}", name, uuid::Uuid::new_v4().simple())
}

/// Persistent cache on the wall clock
pub fn setup_persistent(dir: &TempDir) -> PersistentCache {
    init_tracing();
    PersistentCache::open(&PersistentCacheConfig::new(db_path(dir)))
        .unwrap_or_else(|e| panic!("Failed to open persistent cache: {e}"))
}

/// Persistent cache driven by a manual clock
pub fn setup_persistent_with_clock(dir: &TempDir) -> (PersistentCache, Arc<ManualClock>) {
    init_tracing();
    let clock = Arc::new(ManualClock::default());
    let cache = PersistentCache::open_with_clock(
        &PersistentCacheConfig::new(db_path(dir)),
        clock.clone(),
    )
    .unwrap_or_else(|e| panic!("Failed to open persistent cache: {e}"));
    (cache, clock)
}

/// Full cache system on the wall clock
pub fn setup_cache_system(dir: &TempDir) -> CacheSystem {
    init_tracing();
    CacheSystemBuilder::new()
        .with_cache_path(db_path(dir))
        .build()
        .unwrap_or_else(|e| panic!("Failed to build cache system: {e}"))
}

/// Absolute expiration relative to the write
pub fn expire_after(millis: u64) -> EntryOptions {
    EntryOptions::new().with_absolute_expiration_relative_to_now(Duration::from_millis(millis))
}

/// Sliding expiration
pub fn sliding(millis: u64) -> EntryOptions {
    EntryOptions::new().with_sliding_expiration(Duration::from_millis(millis))
}

/// Options long enough to outlive any test
pub fn long_lived() -> EntryOptions {
    sliding(3_600_000)
}

/// Generate test data of various types
pub mod test_data {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct User {
        pub id: u64,
        pub name: String,
        pub email: String,
    }

    impl User {
        pub fn new(id: u64) -> Self {
            Self {
                id,
                name: format!("User {id}"),
                email: format!("user{id}@example.com"),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Product {
        pub id: u64,
        pub name: String,
        pub price: f64,
        pub tags: Vec<String>,
    }

    impl Product {
        pub fn new(id: u64) -> Self {
            Self {
                id,
                name: format!("Product {id}"),
                price: 99.5 + (id as f64),
                tags: vec![format!("category-{}", id % 5)],
            }
        }
    }
}

/// Assert that coordinator stats meet expectations
#[macro_export]
macro_rules! assert_cache_stats {
    ($cache:expr, $field:ident == $value:expr) => {
        let stats = $cache.multi_level().get_stats();
        assert_eq!(
            stats.$field,
            $value,
            "Expected {} == {}, got {}",
            stringify!($field),
            $value,
            stats.$field
        );
    };
}
