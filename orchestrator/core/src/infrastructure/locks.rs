// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Resource Lock Registry
//!
//! Keyed mutual exclusion for operations that read-modify-write shared state
//! on a service host. Operations under the same key are totally ordered;
//! operations under different keys run concurrently.
//!
//! The default backend is process-local. Deployments that run several
//! orchestrator processes against the same hosts plug in a distributed
//! [`KeyedLockBackend`] with the same key space.

use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use crate::domain::host::HostId;

/// Composite lock key: operation class plus host identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// Mount table changes on a host
    Mount(HostId),
    /// Volume attach/detach against a host
    AttachDetach(HostId),
    /// The NFS export table of a host (one table for all shares)
    NfsExports(HostId),
    /// The Samba registry entry of one share on a host
    CifsShare(HostId, String),
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mount(host) => write!(f, "mount:{}", host),
            Self::AttachDetach(host) => write!(f, "attach-detach:{}", host),
            Self::NfsExports(host) => write!(f, "nfs:{}", host),
            Self::CifsShare(host, share) => write!(f, "cifs:{}:{}", host, share),
        }
    }
}

/// Held lock; released on drop
pub type LockGuard = Box<dyn Send + Sync>;

#[async_trait]
pub trait KeyedLockBackend: Send + Sync {
    /// Wait until the named lock is free and take it
    async fn acquire(&self, key: &str) -> LockGuard;
}

type LockTable = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Process-local lock table. Entries live only while some caller holds or
/// waits for the lock.
#[derive(Default)]
pub struct InProcessLocks {
    locks: LockTable,
}

impl InProcessLocks {
    /// Number of keys currently held or waited on
    pub fn active_keys(&self) -> usize {
        self.locks.len()
    }
}

struct InProcessGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    table: LockTable,
}

impl Drop for InProcessGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone of the mutex, so only the table's
        // reference is left once nobody needs the key.
        self.table
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[async_trait]
impl KeyedLockBackend for InProcessLocks {
    async fn acquire(&self, key: &str) -> LockGuard {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        Box::new(InProcessGuard {
            guard: Some(guard),
            key: key.to_string(),
            table: Arc::clone(&self.locks),
        })
    }
}

#[derive(Clone)]
pub struct ResourceLockRegistry {
    backend: Arc<dyn KeyedLockBackend>,
}

impl ResourceLockRegistry {
    pub fn new(backend: Arc<dyn KeyedLockBackend>) -> Self {
        Self { backend }
    }

    pub fn in_process() -> Self {
        Self::new(Arc::new(InProcessLocks::default()))
    }

    /// Run `body` while holding the lock named by `key`. The lock is released
    /// when `body` completes, whatever its outcome.
    pub async fn with_lock<F, Fut, T>(&self, key: LockKey, body: F) -> T
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = T> + Send,
    {
        let name = key.to_string();
        trace!(lock = %name, "Waiting for lock");
        let _guard = self.backend.acquire(&name).await;
        trace!(lock = %name, "Lock acquired");
        body().await
    }
}

impl Default for ResourceLockRegistry {
    fn default() -> Self {
        Self::in_process()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    #[test]
    fn test_key_names() {
        let host = HostId::new("inst-7");
        assert_eq!(LockKey::Mount(host.clone()).to_string(), "mount:inst-7");
        assert_eq!(LockKey::AttachDetach(host.clone()).to_string(), "attach-detach:inst-7");
        assert_eq!(LockKey::NfsExports(host.clone()).to_string(), "nfs:inst-7");
        assert_eq!(
            LockKey::CifsShare(host, "s1".to_string()).to_string(),
            "cifs:inst-7:s1"
        );
    }

    #[tokio::test]
    async fn test_same_key_never_interleaves() {
        let registry = ResourceLockRegistry::in_process();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let registry = registry.clone();
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            handles.push(tokio::spawn(async move {
                registry
                    .with_lock(LockKey::Mount(HostId::new("inst-1")), || async {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_run_concurrently() {
        let registry = ResourceLockRegistry::in_process();
        let barrier = Arc::new(Barrier::new(2));

        let run = |key: LockKey| {
            let registry = registry.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                registry
                    .with_lock(key, || async {
                        barrier.wait().await;
                    })
                    .await
            })
        };

        // Both bodies must be inside their locks at the same time for the
        // barrier to release.
        let a = run(LockKey::Mount(HostId::new("inst-1")));
        let b = run(LockKey::Mount(HostId::new("inst-2")));
        let both = async {
            a.await.unwrap();
            b.await.unwrap();
        };
        tokio::time::timeout(Duration::from_secs(5), both)
            .await
            .expect("locks on different hosts blocked each other");
    }

    #[tokio::test]
    async fn test_released_keys_leave_the_table() {
        let locks = Arc::new(InProcessLocks::default());
        let registry = ResourceLockRegistry::new(locks.clone());

        for i in 0..50 {
            let key = LockKey::CifsShare(HostId::new("inst-1"), format!("share-{}", i));
            registry.with_lock(key, || async {}).await;
        }
        assert_eq!(locks.active_keys(), 0);

        let key = LockKey::Mount(HostId::new("inst-1"));
        let held = locks.acquire(&key.to_string()).await;
        let waiter = {
            let registry = registry.clone();
            let key = key.clone();
            tokio::spawn(async move { registry.with_lock(key, || async { 7 }).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(locks.active_keys(), 1);

        drop(held);
        assert_eq!(waiter.await.unwrap(), 7);
        assert_eq!(locks.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_lock_released_after_error() {
        let registry = ResourceLockRegistry::in_process();
        let key = LockKey::AttachDetach(HostId::new("inst-1"));

        let result: Result<(), &str> = registry.with_lock(key.clone(), || async { Err("boom") }).await;
        assert!(result.is_err());

        let second = tokio::time::timeout(
            Duration::from_secs(1),
            registry.with_lock(key, || async { 42 }),
        )
        .await;
        assert_eq!(second.unwrap(), 42);
    }
}
