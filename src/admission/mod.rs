//! Batch admission: the producer-side entry point.
//!
//! Admission takes a source-scoped lock before creating anything, so two
//! concurrent submissions for the same source cannot both get in, and the
//! in-lock re-check closes the window between "caller saw no batch" and
//! "lock acquired". Batch and tasks are inserted in one transaction; a crash
//! between the two can never leave an orphaned batch.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::locks::{LockError, LockNamespace, LockStore};
use crate::models::{Batch, BatchProgress, Task};
use crate::store::{BatchStore, TaskStore, TransactionRunner};

/// A task to be created together with its batch.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_type: String,
    pub params: JsonValue,
}

/// Everything needed to admit one batch.
#[derive(Debug, Clone)]
pub struct BatchSubmission {
    pub batch_type: String,
    /// Identifies the logical source; the admission lock key.
    pub source_key: String,
    /// Batch payload handed to every task handler of the batch.
    pub params: JsonValue,
    pub tasks: Vec<NewTask>,
    pub created_by: String,
}

pub struct AdmissionService {
    batches: Arc<dyn BatchStore>,
    tasks: Arc<dyn TaskStore>,
    transactions: Arc<dyn TransactionRunner>,
    locks: Arc<dyn LockStore>,
}

impl AdmissionService {
    pub fn new(
        batches: Arc<dyn BatchStore>,
        tasks: Arc<dyn TaskStore>,
        transactions: Arc<dyn TransactionRunner>,
        locks: Arc<dyn LockStore>,
    ) -> Self {
        Self {
            batches,
            tasks,
            transactions,
            locks,
        }
    }

    /// Create a batch and all its tasks, or fail with a conflict if another
    /// batch for the same source is still in flight.
    pub async fn create_batch(&self, submission: BatchSubmission) -> EngineResult<Batch> {
        if submission.tasks.is_empty() {
            return Err(EngineError::EmptySubmission);
        }

        let lock = match self
            .locks
            .acquire(LockNamespace::Source, &submission.source_key)
            .await
        {
            Ok(lock) => lock,
            Err(LockError::Conflict { .. }) => {
                // A concurrent submission holds the source. Reject, never
                // queue.
                return Err(EngineError::admission_conflict());
            }
            Err(error) => return Err(error.into()),
        };

        let result = self.create_locked(&submission).await;

        // The lock only guards admission; it is released whether the
        // transaction succeeded or failed.
        if let Err(error) = self.locks.release(&lock).await {
            tracing::warn!(
                source_key = %submission.source_key,
                error = %error,
                "failed to release admission lock"
            );
        }

        match &result {
            Ok(batch) => tracing::info!(
                batch_id = %batch.id,
                batch_type = %batch.batch_type,
                source_key = %batch.source_key,
                task_count = submission.tasks.len(),
                created_by = %batch.created_by,
                "batch admitted"
            ),
            Err(error) if !matches!(error, EngineError::AdmissionConflict { .. }) => {
                tracing::error!(
                    source_key = %submission.source_key,
                    error = %error,
                    "batch admission failed"
                );
            }
            Err(_) => {}
        }

        result
    }

    async fn create_locked(&self, submission: &BatchSubmission) -> EngineResult<Batch> {
        // Re-check under the lock: the caller decided to submit before we
        // held anything.
        if self
            .batches
            .find_incomplete_for_source(&submission.batch_type, &submission.source_key)
            .await?
            .is_some()
        {
            return Err(EngineError::admission_conflict());
        }

        let batch = Batch::new(
            submission.batch_type.clone(),
            submission.source_key.clone(),
            submission.params.clone(),
            submission.created_by.clone(),
        );
        let tasks: Vec<Task> = submission
            .tasks
            .iter()
            .map(|new_task| Task::new(batch.id, new_task.task_type.clone(), new_task.params.clone()))
            .collect();

        let batches = Arc::clone(&self.batches);
        let task_store = Arc::clone(&self.tasks);
        let staged_batch = batch.clone();
        self.transactions
            .run(Box::new(move |session| {
                Box::pin(async move {
                    batches.insert(&staged_batch, session).await?;
                    task_store.insert_many(&tasks, session).await?;
                    Ok(())
                })
            }))
            .await?;

        Ok(batch)
    }

    /// Derived progress for a batch: processed over total, with an
    /// explicitly completed batch reporting full progress regardless of
    /// counts.
    pub async fn progress(&self, batch_id: Uuid) -> EngineResult<BatchProgress> {
        let batch = self
            .batches
            .find_by_id(batch_id)
            .await?
            .ok_or(EngineError::BatchNotFound { batch_id })?;
        let (processed, total) = self.tasks.count_for_batch(batch_id).await?;
        Ok(BatchProgress {
            processed,
            total,
            completed: batch.is_completed(),
        })
    }
}
