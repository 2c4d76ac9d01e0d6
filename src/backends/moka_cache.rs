//! Moka Cache - In-Memory Tier
//!
//! Process-local typed cache using Moka. Values are kept as live Rust values
//! (no serialization) and expire independently of the persistent tier, using
//! the same absolute/sliding rules through a per-entry [`Expiry`] policy.

use chrono::Utc;
use moka::Expiry;
use moka::future::Cache;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::MemoryCacheConfig;
use crate::entry::EntryOptions;

/// Value held by the memory tier, with its expiration policy
#[derive(Clone)]
struct MemoryEntry {
    value: Arc<dyn Any + Send + Sync>,
    absolute: Option<Instant>,
    sliding: Option<Duration>,
}

impl MemoryEntry {
    fn new<T: Send + Sync + 'static>(value: T, options: &EntryOptions) -> Self {
        let now = Instant::now();
        let wall_now = Utc::now();
        let absolute = options.absolute_deadline(wall_now).map(|deadline| {
            // Deadlines already in the past expire on creation.
            let remaining = (deadline - wall_now).to_std().unwrap_or(Duration::ZERO);
            now.checked_add(remaining).unwrap_or(now)
        });

        Self {
            value: Arc::new(value),
            absolute,
            sliding: options.sliding_expiration,
        }
    }

    /// Time to live measured from `at`
    fn ttl_from(&self, at: Instant) -> Option<Duration> {
        let absolute = self.absolute.map(|deadline| deadline.saturating_duration_since(at));
        match (self.sliding, absolute) {
            (Some(sliding), Some(absolute)) => Some(sliding.min(absolute)),
            (Some(sliding), None) => Some(sliding),
            (None, absolute) => absolute,
        }
    }
}

/// Per-entry expiration policy
struct EntryExpiry;

impl Expiry<String, MemoryEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &MemoryEntry,
        created_at: Instant,
    ) -> Option<Duration> {
        entry.ttl_from(created_at)
    }

    fn expire_after_read(
        &self,
        _key: &String,
        entry: &MemoryEntry,
        read_at: Instant,
        duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        if entry.sliding.is_some() {
            entry.ttl_from(read_at)
        } else {
            duration_until_expiry
        }
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &MemoryEntry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl_from(updated_at)
    }
}

/// Moka in-memory cache holding typed values
///
/// - Presence is reported exactly: a stored `None` is a hit, not a miss
/// - Per-entry absolute and sliding expiration
/// - No size-based eviction
pub struct MemoryCache {
    /// Moka cache instance
    cache: Cache<String, MemoryEntry>,
    /// Hit counter
    hits: AtomicU64,
    /// Miss counter
    misses: AtomicU64,
    /// Set counter
    sets: AtomicU64,
}

impl MemoryCache {
    /// Create new memory cache
    #[must_use]
    pub fn new(config: &MemoryCacheConfig) -> Self {
        info!(name = %config.name, "Initializing Moka memory tier");

        let cache = Cache::builder()
            .name(&config.name)
            .initial_capacity(config.initial_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        }
    }

    /// Get the value stored under `key`
    ///
    /// Returns `None` when the key is absent or expired. A value stored with a
    /// different type than `T` is also reported as absent.
    pub async fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let Some(entry) = self.cache.get(key).await else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if let Some(value) = entry.value.downcast_ref::<T>() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(value.clone())
        } else {
            warn!(
                key = %key,
                expected = std::any::type_name::<T>(),
                "[Moka] Stored value has a different type, treating as miss"
            );
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Store `value` under `key`, replacing any previous value
    pub async fn set<T: Send + Sync + 'static>(&self, key: &str, value: T, options: &EntryOptions) {
        self.cache
            .insert(key.to_string(), MemoryEntry::new(value, options))
            .await;
        self.sets.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, expires = options.has_expiration(), "[Moka] Cached key");
    }

    /// Remove the value stored under `key`
    pub async fn remove(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Drop every value
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// Approximate number of live entries
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    /// Hit, miss and set counters
    #[must_use]
    pub fn stats(&self) -> MemoryCacheStats {
        MemoryCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
        }
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        let test_key = "health_check_moka";
        let options = EntryOptions::new().with_absolute_expiration_relative_to_now(Duration::from_secs(60));

        self.set(test_key, true, &options).await;
        let healthy = self.get::<bool>(test_key).await == Some(true);
        self.remove(test_key).await;
        healthy
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(&MemoryCacheConfig::default())
    }
}

/// Memory tier statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[tokio::test]
    async fn test_stored_none_is_a_hit() {
        let cache = MemoryCache::default();
        cache.set("k", None::<u32>, &EntryOptions::new()).await;

        assert_eq!(cache.get::<Option<u32>>("k").await, Some(None));
        assert_eq!(cache.get::<Option<u32>>("other").await, None);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss() {
        let cache = MemoryCache::default();
        cache.set("k", 7_u32, &EntryOptions::new()).await;

        assert_eq!(cache.get::<String>("k").await, None);
        assert_eq!(cache.get::<u32>("k").await, Some(7));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_absolute_expiration() {
        let cache = MemoryCache::default();
        let options = EntryOptions::new().with_absolute_expiration_relative_to_now(ms(200));
        cache.set("k", 1_u8, &options).await;

        assert_eq!(cache.get::<u8>("k").await, Some(1));
        tokio::time::sleep(ms(500)).await;
        assert_eq!(cache.get::<u8>("k").await, None);
    }

    #[tokio::test]
    async fn test_past_deadline_expires_immediately() {
        let cache = MemoryCache::default();
        let options = EntryOptions::new().with_absolute_expiration(Utc::now() - chrono::Duration::seconds(1));
        cache.set("k", 1_u8, &options).await;

        assert_eq!(cache.get::<u8>("k").await, None);
    }

    #[tokio::test]
    async fn test_sliding_expiration_is_renewed_by_reads() {
        let cache = MemoryCache::default();
        let options = EntryOptions::new().with_sliding_expiration(ms(400));
        cache.set("k", 1_u8, &options).await;

        for _ in 0..5 {
            tokio::time::sleep(ms(100)).await;
            assert_eq!(cache.get::<u8>("k").await, Some(1));
        }

        tokio::time::sleep(ms(900)).await;
        assert_eq!(cache.get::<u8>("k").await, None);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cache = MemoryCache::default();
        cache.set("a", 1_u8, &EntryOptions::new()).await;
        cache.set("b", 2_u8, &EntryOptions::new()).await;

        cache.remove("a").await;
        assert_eq!(cache.get::<u8>("a").await, None);
        assert_eq!(cache.entry_count().await, 1);

        cache.clear().await;
        assert_eq!(cache.get::<u8>("b").await, None);
        assert_eq!(cache.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_health_check() {
        assert!(MemoryCache::default().health_check().await);
    }
}
