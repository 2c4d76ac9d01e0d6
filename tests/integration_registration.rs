//! Integration tests for configuration and system wiring
//!
//! Tests fail-fast validation, password protection and the builder

mod common;

use common::*;
use multi_level_cache::{
    CacheError, CacheSystem, CacheSystemBuilder, EntryOptions, ManualClock, MemoryCacheConfig,
    PersistentCache, PersistentCacheConfig,
};
use std::sync::Arc;
use std::time::Duration;

fn protected(dir: &tempfile::TempDir, password: &str) -> PersistentCacheConfig {
    PersistentCacheConfig::new(db_path(dir)).with_password(password)
}

/// Test the right password reopens a protected store
#[test]
fn test_password_round_trip() {
    let dir = temp_dir();
    {
        let cache = PersistentCache::open(&protected(&dir, "hunter2"))
            .unwrap_or_else(|e| panic!("Create failed: {e}"));
        cache
            .set("k", b"secret", &EntryOptions::new())
            .unwrap_or_else(|e| panic!("{e}"));
    }

    let cache = PersistentCache::open(&protected(&dir, "hunter2"))
        .unwrap_or_else(|e| panic!("Reopen failed: {e}"));
    assert_eq!(
        cache.get("k").unwrap_or_else(|e| panic!("{e}")).as_deref(),
        Some(&b"secret"[..])
    );
}

/// Test a wrong password is rejected distinguishably
#[test]
fn test_wrong_password_rejected() {
    let dir = temp_dir();
    drop(
        PersistentCache::open(&protected(&dir, "hunter2"))
            .unwrap_or_else(|e| panic!("Create failed: {e}")),
    );

    let err = PersistentCache::open(&protected(&dir, "letmein"))
        .err()
        .unwrap_or_else(|| panic!("Wrong password must fail"));
    assert!(err.is_invalid_password(), "unexpected error: {err}");
}

/// Test a missing password is rejected for a protected store
#[test]
fn test_missing_password_rejected() {
    let dir = temp_dir();
    drop(
        PersistentCache::open(&protected(&dir, "hunter2"))
            .unwrap_or_else(|e| panic!("Create failed: {e}")),
    );

    let err = PersistentCache::open(&PersistentCacheConfig::new(db_path(&dir)))
        .err()
        .unwrap_or_else(|| panic!("Missing password must fail"));
    assert!(matches!(err, CacheError::InvalidPassword { .. }));
}

/// Test an unprotected store rejects a password
#[test]
fn test_unprotected_store_rejects_password() {
    let dir = temp_dir();
    drop(setup_persistent(&dir));

    let err = PersistentCache::open(&protected(&dir, "hunter2"))
        .err()
        .unwrap_or_else(|| panic!("Password on unprotected store must fail"));
    assert!(err.is_invalid_password());
}

/// Test invalid configuration fails before touching the filesystem
#[test]
fn test_invalid_config_fails_fast() {
    let dir = temp_dir();
    let path = dir.path().join("never-created").join("cache.db");

    let empty_password = CacheSystemBuilder::new()
        .with_cache_path(&path)
        .with_password("")
        .build();
    assert!(matches!(empty_password, Err(CacheError::InvalidConfig(_))));

    let empty_path = CacheSystemBuilder::new().with_cache_path("").build();
    assert!(matches!(empty_path, Err(CacheError::InvalidConfig(_))));

    assert!(!path.exists());
    assert!(!dir.path().join("never-created").exists());
}

/// Test missing parent directories are created
#[test]
fn test_nested_path_is_created() {
    let dir = temp_dir();
    let path = dir.path().join("a").join("b").join("cache.db");

    let cache = CacheSystem::with_path(&path).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(cache.persistent().path(), path.as_path());
    assert!(path.exists());
}

/// Test the builder wires the clock and memory configuration through
#[tokio::test]
async fn test_builder_with_clock() {
    let dir = temp_dir();
    let clock = Arc::new(ManualClock::default());

    let cache = CacheSystemBuilder::new()
        .with_cache_path(db_path(&dir))
        .with_password("hunter2")
        .with_memory_config(MemoryCacheConfig {
            initial_capacity: 16,
            name: "registration-test".to_string(),
        })
        .with_clock(clock.clone())
        .build()
        .unwrap_or_else(|e| panic!("Build failed: {e}"));

    cache
        .multi_level()
        .set(&test_key("clocked"), 1_u32, &EntryOptions::new(), &expire_after(1000))
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(cache.persistent().item_count().unwrap_or_else(|e| panic!("{e}")), 1);

    // Persistent expiry follows the injected clock, not the wall clock
    clock.advance(Duration::from_secs(2));
    let entries = cache.persistent().entries().unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(entries.len(), 1);
    let key = entries
        .first()
        .map(|entry| entry.key.clone())
        .unwrap_or_default();
    assert_eq!(cache.persistent().get(&key).unwrap_or_else(|e| panic!("{e}")), None);
}

/// Test configuration binds from an external document
#[test]
fn test_config_from_document() {
    let dir = temp_dir();
    let document = serde_json::json!({
        "cache_path": db_path(&dir),
        "password": "hunter2",
    });

    let config: PersistentCacheConfig =
        serde_json::from_value(document).unwrap_or_else(|e| panic!("{e}"));
    let cache = CacheSystemBuilder::with_config(config)
        .build()
        .unwrap_or_else(|e| panic!("{e}"));

    assert!(cache.persistent().path().ends_with("cache.db"));
}
