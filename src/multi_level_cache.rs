//! Multi-Level Cache - Memory + Persistent Coordination
//!
//! Composes the in-memory tier, a persistent [`DistributedCache`] and a
//! [`CacheSerializer`] behind per-key locking.
//!
//! # Cache Flow
//!
//! ```text
//! lock(key) → Memory tier → Persistent tier → Factory
//!             ↓ Hit          ↓ Hit              ↓ Miss
//!             Return         Promote to memory  Store in persistent + memory
//! ```
//!
//! Every operation on a key (get, set, get-or-set, remove) runs entirely
//! under that key's lock, so at most one factory runs per key at any moment
//! and no reader sees a value one tier has accepted and the other has not.

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::backends::MemoryCache;
use crate::codecs::JsonSerializer;
use crate::entry::EntryOptions;
use crate::key_locks::KeyLocks;
use crate::traits::{CacheSerializer, CacheValue, DistributedCache};

/// Multi-level cache coordinator
///
/// `S` is the default serializer; every operation has a `_with_serializer`
/// variant that overrides it for one call.
pub struct MultiLevelCache<S: CacheSerializer = JsonSerializer> {
    memory: MemoryCache,
    persistent: Arc<dyn DistributedCache>,
    serializer: S,
    locks: KeyLocks,
    /// Statistics
    total_requests: AtomicU64,
    memory_hits: AtomicU64,
    promotions: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
}

impl MultiLevelCache<JsonSerializer> {
    /// Create a coordinator using JSON between the tiers
    pub fn new(memory: MemoryCache, persistent: Arc<dyn DistributedCache>) -> Self {
        Self::with_serializer(memory, persistent, JsonSerializer)
    }
}

impl<S: CacheSerializer> MultiLevelCache<S> {
    /// Create a coordinator with a custom default serializer
    pub fn with_serializer(
        memory: MemoryCache,
        persistent: Arc<dyn DistributedCache>,
        serializer: S,
    ) -> Self {
        debug!(
            persistent = persistent.name(),
            serializer = serializer.name(),
            "Initializing multi-level cache"
        );

        Self {
            memory,
            persistent,
            serializer,
            locks: KeyLocks::new(),
            total_requests: AtomicU64::new(0),
            memory_hits: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            computations: AtomicU64::new(0),
        }
    }

    /// The in-memory tier
    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    /// The persistent tier
    pub fn persistent(&self) -> &Arc<dyn DistributedCache> {
        &self.persistent
    }

    /// The default serializer
    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    /// Get a value from memory, falling back to the persistent tier
    ///
    /// A persistent hit is deserialized and promoted to memory under
    /// `memory_options`.
    ///
    /// # Returns
    /// * `Ok(Some(value))` - found in either tier
    /// * `Ok(None)` - absent or expired in both tiers
    ///
    /// # Errors
    ///
    /// Returns an error if the persistent tier fails or its text cannot be
    /// deserialized as `T`.
    pub async fn get<T: CacheValue>(
        &self,
        key: &str,
        memory_options: &EntryOptions,
    ) -> Result<Option<T>> {
        self.get_with_serializer(key, memory_options, &self.serializer)
            .await
    }

    /// [`get`](Self::get) with a serializer override for this call
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub async fn get_with_serializer<T, X>(
        &self,
        key: &str,
        memory_options: &EntryOptions,
        serializer: &X,
    ) -> Result<Option<T>>
    where
        T: CacheValue,
        X: CacheSerializer,
    {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let _guard = self.locks.lock(key).await;

        let found = self.lookup(key, memory_options, serializer).await?;
        if found.is_none() {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    /// Store a value in both tiers, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the persistent write fails.
    /// Neither tier keeps the new value in that case.
    pub async fn set<T: CacheValue>(
        &self,
        key: &str,
        value: T,
        memory_options: &EntryOptions,
        persistent_options: &EntryOptions,
    ) -> Result<()> {
        self.set_with_serializer(key, value, memory_options, persistent_options, &self.serializer)
            .await
    }

    /// [`set`](Self::set) with a serializer override for this call
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub async fn set_with_serializer<T, X>(
        &self,
        key: &str,
        value: T,
        memory_options: &EntryOptions,
        persistent_options: &EntryOptions,
        serializer: &X,
    ) -> Result<()>
    where
        T: CacheValue,
        X: CacheSerializer,
    {
        let _guard = self.locks.lock(key).await;

        let text = serializer.serialize(&value)?;
        self.memory.set(key, value, memory_options).await;

        if let Err(e) = self
            .persistent
            .set_string(key, &text, persistent_options)
            .await
        {
            self.memory.remove(key).await;
            warn!(key = %key, error = %e, "[MultiLevel] Persistent write failed, memory entry dropped");
            return Err(e.into());
        }

        debug!(key = %key, "[MultiLevel] Cached key in memory + persistent tiers");
        Ok(())
    }

    /// Get a value, computing and storing it on a miss in both tiers
    ///
    /// Concurrent calls for the same key run `factory` at most once at a
    /// time; callers that waited find the stored value instead. A value still
    /// held by the persistent tier is promoted without running `factory`,
    /// even when the memory tier has expired it.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let user: User = cache
    ///     .get_or_set(
    ///         "user:123",
    ///         || async { load_user(123).await },
    ///         &EntryOptions::new().with_absolute_expiration_relative_to_now(Duration::from_secs(60)),
    ///         &EntryOptions::new().with_sliding_expiration(Duration::from_secs(3600)),
    ///     )
    ///     .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the factory's error unchanged, or an error if serialization
    /// or the persistent tier fails. Nothing is stored when any of these fail.
    pub async fn get_or_set<T, F, Fut>(
        &self,
        key: &str,
        factory: F,
        memory_options: &EntryOptions,
        persistent_options: &EntryOptions,
    ) -> Result<T>
    where
        T: CacheValue,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        self.get_or_set_with_serializer(
            key,
            factory,
            memory_options,
            persistent_options,
            &self.serializer,
        )
        .await
    }

    /// [`get_or_set`](Self::get_or_set) with a serializer override for this call
    ///
    /// # Errors
    ///
    /// Same as [`get_or_set`](Self::get_or_set).
    pub async fn get_or_set_with_serializer<T, X, F, Fut>(
        &self,
        key: &str,
        factory: F,
        memory_options: &EntryOptions,
        persistent_options: &EntryOptions,
        serializer: &X,
    ) -> Result<T>
    where
        T: CacheValue,
        X: CacheSerializer,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let _guard = self.locks.lock(key).await;

        if let Some(value) = self.lookup(key, memory_options, serializer).await? {
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.computations.fetch_add(1, Ordering::Relaxed);
        debug!(
            key = %key,
            value_type = std::any::type_name::<T>(),
            "[MultiLevel] Computing fresh value (stampede protected)"
        );
        let value = factory().await?;

        let text = serializer.serialize(&value)?;
        self.persistent
            .set_string(key, &text, persistent_options)
            .await?;
        self.memory.set(key, value.clone(), memory_options).await;

        Ok(value)
    }

    /// Remove a key from both tiers
    ///
    /// # Errors
    ///
    /// Returns an error if the persistent tier fails.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.locks.lock(key).await;

        self.memory.remove(key).await;
        self.persistent.remove(key).await?;
        debug!(key = %key, "[MultiLevel] Removed key from both tiers");
        Ok(())
    }

    /// Drop per-key locks nobody is using; returns how many were dropped
    ///
    /// Locks are otherwise kept for the life of the cache.
    pub fn prune_idle_locks(&self) -> usize {
        self.locks.prune_idle()
    }

    /// Check both tiers
    pub async fn health_check(&self) -> bool {
        let memory_ok = self.memory.health_check().await;
        let persistent_ok = self.persistent.health_check().await;

        if !(memory_ok && persistent_ok) {
            warn!(memory_ok, persistent_ok, "Multi-level cache health check failed");
        }
        memory_ok && persistent_ok
    }

    /// Get comprehensive cache statistics
    pub fn get_stats(&self) -> MultiLevelStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let memory_hits = self.memory_hits.load(Ordering::Relaxed);
        let promotions = self.promotions.load(Ordering::Relaxed);
        let total_hits = memory_hits + promotions;

        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total_requests > 0 {
            (total_hits as f64 / total_requests as f64) * 100.0
        } else {
            0.0
        };

        MultiLevelStats {
            total_requests,
            memory_hits,
            promotions,
            total_hits,
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            hit_rate,
            lock_table_size: self.locks.len(),
        }
    }

    /// Memory probe, then persistent probe with promotion. Caller holds the key lock.
    async fn lookup<T, X>(
        &self,
        key: &str,
        memory_options: &EntryOptions,
        serializer: &X,
    ) -> Result<Option<T>>
    where
        T: CacheValue,
        X: CacheSerializer,
    {
        if let Some(value) = self.memory.get::<T>(key).await {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "[MultiLevel] Memory hit");
            return Ok(Some(value));
        }

        let Some(text) = self.persistent.get_string(key).await? else {
            return Ok(None);
        };
        if text.trim().is_empty() {
            return Ok(None);
        }

        let value: T = serializer.deserialize(&text)?;
        self.memory.set(key, value.clone(), memory_options).await;
        self.promotions.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, serializer = serializer.name(), "[MultiLevel] Promoted persistent hit to memory");

        Ok(Some(value))
    }
}

/// Multi-level cache statistics
#[derive(Debug, Clone)]
pub struct MultiLevelStats {
    /// `get` and `get_or_set` calls
    pub total_requests: u64,
    /// Requests answered by the memory tier
    pub memory_hits: u64,
    /// Requests answered by the persistent tier and promoted to memory
    pub promotions: u64,
    pub total_hits: u64,
    /// Requests neither tier could answer
    pub misses: u64,
    /// Factory invocations
    pub computations: u64,
    /// Percentage of requests answered by either tier
    pub hit_rate: f64,
    /// Keys with a lock in the lock table
    pub lock_table_size: usize,
}
