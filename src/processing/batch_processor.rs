//! Batch-level pull loop body: one incomplete batch, one random task.

use std::sync::Arc;

use jiff::Timestamp;

use crate::error::EngineResult;
use crate::models::RecordedError;
use crate::processing::task_processor::TaskProcessor;
use crate::scheduler::JobContext;
use crate::store::{BatchStore, TaskStore};

/// Finds an incomplete batch, hands one of its unprocessed tasks to the
/// task processor, and completes the batch once none remain.
///
/// `process` never fails: every internal error is logged and converted into
/// "no more work", so the driving poll loop backs off instead of crashing.
pub struct BatchProcessor {
    batches: Arc<dyn BatchStore>,
    tasks: Arc<dyn TaskStore>,
    task_processor: Arc<TaskProcessor>,
    max_batch_errors: usize,
}

impl BatchProcessor {
    pub fn new(
        batches: Arc<dyn BatchStore>,
        tasks: Arc<dyn TaskStore>,
        task_processor: Arc<TaskProcessor>,
        max_batch_errors: usize,
    ) -> Self {
        Self {
            batches,
            tasks,
            task_processor,
            max_batch_errors,
        }
    }

    /// One tick. Returns whether more work remains.
    pub async fn process(&self, ctx: &JobContext) -> bool {
        match self.try_process(ctx).await {
            Ok(has_more_work) => has_more_work,
            Err(error) => {
                tracing::error!(error = %error, "batch processing tick failed");
                false
            }
        }
    }

    async fn try_process(&self, ctx: &JobContext) -> EngineResult<bool> {
        let Some(mut batch) = self.batches.find_incomplete().await? else {
            return Ok(false);
        };

        if ctx.is_cancellation_requested() {
            // Work exists but we will not start any; reporting "more work"
            // keeps the caller from treating this as an idle tick.
            return Ok(true);
        }

        // Random selection keeps racing workers from piling onto the same
        // task at the head of the batch.
        let Some(task) = self.tasks.find_random_unprocessed(batch.id).await? else {
            batch.completed_on = Some(Timestamp::now());
            self.batches.save(&batch).await?;
            tracing::info!(batch_id = %batch.id, batch_type = %batch.batch_type, "batch completed");
            return Ok(false);
        };

        // The task processor swallows handler failures; anything escaping it
        // is a configuration or store problem. Record it on the batch and
        // back off.
        if let Err(error) = self.task_processor.process(task.id, &batch.params, ctx).await {
            tracing::error!(
                batch_id = %batch.id,
                task_id = %task.id,
                error = %error,
                "task processing raised"
            );
            batch.record_error(
                RecordedError::with_kind(error.to_string(), "task_processing"),
                self.max_batch_errors,
            );
            self.batches.save(&batch).await?;
            return Ok(false);
        }

        Ok(true)
    }
}
