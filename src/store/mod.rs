//! Durable store contracts.
//!
//! The engine talks to batch and task records only through these traits; the
//! real persistence layer lives with the host application. Writes are
//! last-write-wins whole-record saves. Inserts go through a
//! [`TransactionRunner`] session so a batch and its tasks land atomically.

pub mod memory;

use std::any::Any;

use async_trait::async_trait;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{Batch, Task};

pub use memory::InMemoryStore;

/// Opaque transaction session handed to insert operations. Implementations
/// downcast it to their own session type.
pub trait StoreSession: Send {
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Work executed inside a transaction. The closure receives the live session
/// and performs its inserts against it.
pub type TransactionWork =
    Box<dyn for<'a> FnOnce(&'a mut dyn StoreSession) -> BoxFuture<'a, EngineResult<()>> + Send>;

/// Runs a closure inside one atomic transaction: either every insert staged
/// through the session commits, or none do.
#[async_trait]
pub trait TransactionRunner: Send + Sync {
    async fn run(&self, work: TransactionWork) -> EngineResult<()>;
}

#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> EngineResult<Option<Batch>>;

    /// One batch with no `completed_on`, arbitrary selection among ties.
    async fn find_incomplete(&self) -> EngineResult<Option<Batch>>;

    /// An uncompleted batch for the given type and source, if any. Used by
    /// admission to re-check under the source lock.
    async fn find_incomplete_for_source(
        &self,
        batch_type: &str,
        source_key: &str,
    ) -> EngineResult<Option<Batch>>;

    /// Whole-record save, last-write-wins.
    async fn save(&self, batch: &Batch) -> EngineResult<()>;

    async fn insert(&self, batch: &Batch, session: &mut dyn StoreSession) -> EngineResult<()>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> EngineResult<Option<Task>>;

    /// One unprocessed task of the batch, chosen uniformly at random.
    /// Randomization keeps racing workers off each other's heels.
    async fn find_random_unprocessed(&self, batch_id: Uuid) -> EngineResult<Option<Task>>;

    /// `(processed, total)` task counts for the batch.
    async fn count_for_batch(&self, batch_id: Uuid) -> EngineResult<(u64, u64)>;

    /// Whole-record save, last-write-wins.
    async fn save(&self, task: &Task) -> EngineResult<()>;

    async fn insert_many(
        &self,
        tasks: &[Task],
        session: &mut dyn StoreSession,
    ) -> EngineResult<()>;
}
