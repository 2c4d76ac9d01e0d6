//! Per-key lock table
//!
//! One async mutex per cache key, created on first use and kept for the life
//! of the table. Holding a key's guard excludes every other multi-level
//! operation on that key; different keys never contend.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Table of per-key async mutexes
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyLocks {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    ///
    /// The guard owns its mutex, so the table shard is not held across the
    /// wait. Dropping the returned future while it waits leaves the lock
    /// untouched; dropping the guard releases it.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = match self.locks.get(key) {
            Some(mutex) => Arc::clone(&mutex),
            None => Arc::clone(
                &self
                    .locks
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            ),
        };
        mutex.lock_owned().await
    }

    /// Number of keys with a lock in the table
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Drop locks that nobody holds or waits on; returns how many were dropped
    ///
    /// Holders and waiters keep a reference to their mutex, and new references
    /// are only handed out under the shard lock `retain` holds, so a lock in
    /// use is never dropped.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before.saturating_sub(self.locks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = KeyLocks::new();
        let guard = locks.lock("k").await;

        let second = tokio::time::timeout(Duration::from_millis(50), locks.lock("k")).await;
        assert!(second.is_err(), "second lock on the same key must wait");

        drop(guard);
        let third = tokio::time::timeout(Duration::from_millis(50), locks.lock("k")).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_contend() {
        let locks = KeyLocks::new();
        let _a = locks.lock("a").await;

        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_locks_are_reused() {
        let locks = KeyLocks::new();
        drop(locks.lock("k").await);
        drop(locks.lock("k").await);
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = KeyLocks::new();
        let held = locks.lock("held").await;
        drop(locks.lock("idle").await);

        assert_eq!(locks.prune_idle(), 1);
        assert_eq!(locks.len(), 1);

        drop(held);
        assert_eq!(locks.prune_idle(), 1);
        assert!(locks.is_empty());
    }
}
