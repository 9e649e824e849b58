//! In-process lock store over a concurrent map.
//!
//! Backs single-instance deployments and every test in this crate. The
//! dashmap entry API holds the shard lock across the expiry check and the
//! insert, which gives the required acquire atomicity.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use jiff::Timestamp;
use uuid::Uuid;

use crate::locks::{LockError, LockHandle, LockNamespace, LockResult, LockStore};

#[derive(Debug, Clone)]
struct HeldLock {
    handle_id: Uuid,
    expires_on: Timestamp,
}

pub struct InMemoryLockStore {
    leases: DashMap<String, HeldLock>,
    ttl: Duration,
}

impl InMemoryLockStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            leases: DashMap::new(),
            ttl,
        }
    }

    /// Number of unexpired leases currently held. Test visibility.
    pub fn held_count(&self) -> usize {
        let now = Timestamp::now();
        self.leases
            .iter()
            .filter(|entry| entry.value().expires_on > now)
            .count()
    }
}

impl Default for InMemoryLockStore {
    fn default() -> Self {
        // Minutes scale: longer than any expected task, short enough to
        // reclaim after a crash.
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn acquire(&self, namespace: LockNamespace, key: &str) -> LockResult<LockHandle> {
        let qualified = format!("{namespace}:{key}");
        let now = Timestamp::now();
        let handle = LockHandle {
            id: Uuid::new_v4(),
            namespace,
            key: key.to_string(),
            expires_on: now + self.ttl,
        };

        match self.leases.entry(qualified) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_on > now {
                    return Err(LockError::Conflict {
                        key: handle.qualified_key(),
                    });
                }
                // Expired lease from a crashed holder; reclaim it.
                occupied.insert(HeldLock {
                    handle_id: handle.id,
                    expires_on: handle.expires_on,
                });
                Ok(handle)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(HeldLock {
                    handle_id: handle.id,
                    expires_on: handle.expires_on,
                });
                Ok(handle)
            }
        }
    }

    async fn release(&self, handle: &LockHandle) -> LockResult<()> {
        // Remove only our own lease: if it expired and was re-acquired, the
        // stored handle id differs and the entry stays.
        self.leases
            .remove_if(&handle.qualified_key(), |_, held| {
                held.handle_id == handle.id
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn acquire_is_exclusive_per_key() {
        let store = InMemoryLockStore::default();
        let first = store.acquire(LockNamespace::Task, "t-1").await.unwrap();
        let second = store.acquire(LockNamespace::Task, "t-1").await;
        assert!(matches!(second, Err(LockError::Conflict { .. })));

        store.release(&first).await.unwrap();
        store.acquire(LockNamespace::Task, "t-1").await.unwrap();
    }

    #[tokio::test]
    async fn namespaces_are_disjoint_key_spaces() {
        let store = InMemoryLockStore::default();
        store.acquire(LockNamespace::Task, "same").await.unwrap();
        store.acquire(LockNamespace::Source, "same").await.unwrap();
        assert_eq!(store.held_count(), 2);
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimable_without_release() {
        let store = InMemoryLockStore::new(Duration::ZERO);
        // Never released; expires immediately, as after a holder crash.
        store.acquire(LockNamespace::Task, "t-1").await.unwrap();
        store.acquire(LockNamespace::Task, "t-1").await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_acquires_on_one_key_admit_exactly_one_winner() {
        let store = Arc::new(InMemoryLockStore::new(Duration::from_secs(300)));
        let successes = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let successes = Arc::clone(&successes);
            handles.push(tokio::spawn(async move {
                if store.acquire(LockNamespace::Task, "contended").await.is_ok() {
                    successes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(successes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_release_does_not_free_a_successors_lease() {
        let store = InMemoryLockStore::new(Duration::from_secs(300));
        let live = store.acquire(LockNamespace::Task, "t-1").await.unwrap();

        // A handle from a previous, expired incarnation of this lease.
        let stale = LockHandle {
            id: Uuid::new_v4(),
            ..live.clone()
        };
        store.release(&stale).await.unwrap();
        assert!(store.acquire(LockNamespace::Task, "t-1").await.is_err());

        store.release(&live).await.unwrap();
        assert!(store.acquire(LockNamespace::Task, "t-1").await.is_ok());
    }
}
