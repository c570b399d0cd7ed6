//! Per-cache refresh guard.

use dashmap::DashMap;
use lakesync_core::RefreshGuard;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per cache name.
///
/// With [`RefreshGuard::Unguarded`] no lock is ever taken and concurrent
/// refreshes of the same cache race, last writer wins.
#[derive(Debug)]
pub struct RefreshLocks {
    guard: RefreshGuard,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RefreshLocks {
    pub fn new(guard: RefreshGuard) -> Self {
        Self {
            guard,
            locks: DashMap::new(),
        }
    }

    pub fn guard(&self) -> RefreshGuard {
        self.guard
    }

    /// Wait for exclusive refresh rights on `cache_name`.
    ///
    /// The map shard lock is released before awaiting the mutex.
    pub async fn acquire(&self, cache_name: &str) -> Option<OwnedMutexGuard<()>> {
        match self.guard {
            RefreshGuard::Unguarded => None,
            RefreshGuard::PerCache => {
                let lock = Arc::clone(self.locks.entry(cache_name.to_string()).or_default().value());
                Some(lock.lock_owned().await)
            }
        }
    }

    /// Drop the lock of a deleted cache.
    pub fn forget(&self, cache_name: &str) {
        self.locks.remove(cache_name);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unguarded_never_locks() {
        let locks = RefreshLocks::new(RefreshGuard::Unguarded);
        assert!(locks.acquire("orders_cache").await.is_none());
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_second_acquire_waits() {
        let locks = Arc::new(RefreshLocks::new(RefreshGuard::PerCache));
        let held = locks.acquire("orders_cache").await;
        assert!(held.is_some());

        let contender = Arc::clone(&locks);
        let waiter = tokio::spawn(async move { contender.acquire("orders_cache").await.is_some() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_distinct_caches_do_not_block() {
        let locks = RefreshLocks::new(RefreshGuard::PerCache);
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);

        locks.forget("a");
        assert_eq!(locks.len(), 1);
    }
}
