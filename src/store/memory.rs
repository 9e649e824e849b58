//! In-memory batch/task store.
//!
//! The test double the processors are exercised against, also usable by
//! embedders for their own tests. Sessions stage inserts and the runner
//! applies them on commit, so transactional behavior matches the contract:
//! a failing closure leaves the store untouched.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{Batch, Task};
use crate::store::{BatchStore, StoreSession, TaskStore, TransactionRunner, TransactionWork};

#[derive(Default)]
struct Records {
    batches: HashMap<Uuid, Batch>,
    tasks: HashMap<Uuid, Task>,
}

#[derive(Default)]
struct MemorySession {
    staged_batches: Vec<Batch>,
    staged_tasks: Vec<Task>,
}

impl StoreSession for MemorySession {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn session_of(session: &mut dyn StoreSession) -> EngineResult<&mut MemorySession> {
    session
        .as_any_mut()
        .downcast_mut::<MemorySession>()
        .ok_or_else(|| crate::error::EngineError::Internal {
            source: anyhow::anyhow!("session was not created by InMemoryStore"),
        })
}

#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<Records>,
    task_store_ops: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many task-store operations have run. Lets tests assert that a
    /// cancelled or idle tick never touched the task collection.
    pub fn task_store_ops(&self) -> usize {
        self.task_store_ops.load(Ordering::SeqCst)
    }

    pub async fn batch(&self, id: Uuid) -> Option<Batch> {
        self.records.lock().await.batches.get(&id).cloned()
    }

    pub async fn task(&self, id: Uuid) -> Option<Task> {
        self.records.lock().await.tasks.get(&id).cloned()
    }

    pub async fn batch_count(&self) -> usize {
        self.records.lock().await.batches.len()
    }

    pub async fn task_count(&self) -> usize {
        self.records.lock().await.tasks.len()
    }

    /// Seed records directly, bypassing admission. Test setup.
    pub async fn put_batch(&self, batch: Batch) {
        self.records.lock().await.batches.insert(batch.id, batch);
    }

    /// Seed records directly, bypassing admission. Test setup.
    pub async fn put_task(&self, task: Task) {
        self.records.lock().await.tasks.insert(task.id, task);
    }
}

#[async_trait]
impl TransactionRunner for InMemoryStore {
    async fn run(&self, work: TransactionWork) -> EngineResult<()> {
        let mut session = MemorySession::default();
        work(&mut session).await?;

        // Commit: apply every staged insert in one critical section.
        let mut records = self.records.lock().await;
        for batch in session.staged_batches {
            records.batches.insert(batch.id, batch);
        }
        for task in session.staged_tasks {
            records.tasks.insert(task.id, task);
        }
        Ok(())
    }
}

#[async_trait]
impl BatchStore for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> EngineResult<Option<Batch>> {
        let records = self.records.lock().await;
        Ok(records.batches.get(&id).cloned())
    }

    async fn find_incomplete(&self) -> EngineResult<Option<Batch>> {
        let records = self.records.lock().await;
        Ok(records
            .batches
            .values()
            .find(|batch| !batch.is_completed())
            .cloned())
    }

    async fn find_incomplete_for_source(
        &self,
        batch_type: &str,
        source_key: &str,
    ) -> EngineResult<Option<Batch>> {
        let records = self.records.lock().await;
        Ok(records
            .batches
            .values()
            .find(|batch| {
                !batch.is_completed()
                    && batch.batch_type == batch_type
                    && batch.source_key == source_key
            })
            .cloned())
    }

    async fn save(&self, batch: &Batch) -> EngineResult<()> {
        let mut records = self.records.lock().await;
        records.batches.insert(batch.id, batch.clone());
        Ok(())
    }

    async fn insert(&self, batch: &Batch, session: &mut dyn StoreSession) -> EngineResult<()> {
        session_of(session)?.staged_batches.push(batch.clone());
        Ok(())
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> EngineResult<Option<Task>> {
        self.task_store_ops.fetch_add(1, Ordering::SeqCst);
        let records = self.records.lock().await;
        Ok(records.tasks.get(&id).cloned())
    }

    async fn find_random_unprocessed(&self, batch_id: Uuid) -> EngineResult<Option<Task>> {
        self.task_store_ops.fetch_add(1, Ordering::SeqCst);
        let records = self.records.lock().await;
        let candidates: Vec<&Task> = records
            .tasks
            .values()
            .filter(|task| task.batch_id == batch_id && !task.processed)
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }
        let index = rand::rng().random_range(0..candidates.len());
        Ok(Some(candidates[index].clone()))
    }

    async fn count_for_batch(&self, batch_id: Uuid) -> EngineResult<(u64, u64)> {
        self.task_store_ops.fetch_add(1, Ordering::SeqCst);
        let records = self.records.lock().await;
        let mut processed = 0;
        let mut total = 0;
        for task in records.tasks.values() {
            if task.batch_id == batch_id {
                total += 1;
                if task.processed {
                    processed += 1;
                }
            }
        }
        Ok((processed, total))
    }

    async fn save(&self, task: &Task) -> EngineResult<()> {
        self.task_store_ops.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().await;
        records.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn insert_many(
        &self,
        tasks: &[Task],
        session: &mut dyn StoreSession,
    ) -> EngineResult<()> {
        self.task_store_ops.fetch_add(1, Ordering::SeqCst);
        session_of(session)?.staged_tasks.extend_from_slice(tasks);
        Ok(())
    }
}
