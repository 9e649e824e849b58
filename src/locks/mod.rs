//! Time-bounded exclusive leases over a shared store.
//!
//! A lock is a lease: it expires on its own, so a crashed holder never wedges
//! a key for longer than the lease TTL. Acquisition failure is an expected
//! outcome, not an exception path.
//!
//! The key space is partitioned by namespace so per-task leases and
//! per-source admission leases can never collide or deadlock against each
//! other. Callers hold at most one key at a time.

pub mod memory;

use async_trait::async_trait;
use jiff::Timestamp;
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryLockStore;

/// Which concern a lease belongs to. Namespaces are disjoint key spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockNamespace {
    /// Per-task processing leases, keyed by task id.
    Task,
    /// Per-source batch admission leases, keyed by source identifier.
    Source,
}

impl LockNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockNamespace::Task => "task",
            LockNamespace::Source => "source",
        }
    }
}

impl std::fmt::Display for LockNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof of an acquired lease. Only the holder releases it; the handle id
/// lets the store reject a stale release after the lease expired and was
/// re-acquired by someone else.
#[derive(Debug, Clone)]
pub struct LockHandle {
    pub id: Uuid,
    pub namespace: LockNamespace,
    pub key: String,
    pub expires_on: Timestamp,
}

impl LockHandle {
    /// Fully qualified key as stored, e.g. `task:5f0c…`.
    pub fn qualified_key(&self) -> String {
        format!("{}:{}", self.namespace, self.key)
    }
}

#[derive(Error, Debug)]
pub enum LockError {
    /// An unexpired lease with the same key exists.
    #[error("Lock is held by another worker: {key}")]
    Conflict { key: String },

    /// The backing store failed.
    #[error("Lock store operation failed: {operation}")]
    Store {
        operation: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type LockResult<T> = Result<T, LockError>;

/// Shared-store lease operations.
///
/// `acquire` must be atomic with respect to the expiration check: two
/// concurrent acquires on an expired key succeed for exactly one caller.
#[async_trait]
pub trait LockStore: Send + Sync {
    async fn acquire(&self, namespace: LockNamespace, key: &str) -> LockResult<LockHandle>;

    /// Remove the lease. Only ever called by the holder; releasing an
    /// already-expired lease is not an error.
    async fn release(&self, handle: &LockHandle) -> LockResult<()>;
}
