//! Per-task processing under an exclusive lease.

use std::sync::Arc;

use jiff::Timestamp;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::locks::{LockError, LockNamespace, LockStore};
use crate::models::{RecordedError, TaskAttempt};
use crate::processing::registry::HandlerRegistry;
use crate::scheduler::JobContext;
use crate::store::TaskStore;

/// Processes one queued task at a time under a per-task lock.
///
/// The lock is taken before the task is re-read; checking `processed` only
/// after acquisition closes the race where two workers both observe an
/// unprocessed task and then take turns on it.
pub struct TaskProcessor {
    tasks: Arc<dyn TaskStore>,
    locks: Arc<dyn LockStore>,
    handlers: Arc<HandlerRegistry>,
    max_attempts: usize,
}

impl TaskProcessor {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        locks: Arc<dyn LockStore>,
        handlers: Arc<HandlerRegistry>,
        max_attempts: usize,
    ) -> Self {
        Self {
            tasks,
            locks,
            handlers,
            max_attempts,
        }
    }

    /// Run one attempt at the task, or nothing at all if another worker owns
    /// it, it is already processed, or cancellation was requested.
    ///
    /// Handler failures are recorded on the attempt and never returned. The
    /// only error paths are an unregistered task type (a configuration
    /// error) and store failures.
    pub async fn process(
        &self,
        task_id: Uuid,
        batch_params: &JsonValue,
        ctx: &JobContext,
    ) -> EngineResult<()> {
        let lock = match self
            .locks
            .acquire(LockNamespace::Task, &task_id.to_string())
            .await
        {
            Ok(lock) => lock,
            Err(LockError::Conflict { key }) => {
                // Another worker, possibly in another process, owns this
                // task. Expected under contention.
                tracing::trace!(%task_id, %key, "task lock held elsewhere");
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        };

        let result = self.process_locked(task_id, batch_params, ctx).await;

        // Release on every path; a failed release only delays reclamation
        // until the lease expires.
        if let Err(error) = self.locks.release(&lock).await {
            tracing::warn!(%task_id, error = %error, "failed to release task lock");
        }

        result
    }

    async fn process_locked(
        &self,
        task_id: Uuid,
        batch_params: &JsonValue,
        ctx: &JobContext,
    ) -> EngineResult<()> {
        // Re-read under the lock: a previous holder may have finished the
        // task before we acquired it.
        let Some(mut task) = self.tasks.find_by_id(task_id).await? else {
            tracing::warn!(%task_id, "task not found, skipping");
            return Ok(());
        };
        if task.processed {
            return Ok(());
        }
        if ctx.is_cancellation_requested() {
            // Never start work we might not be able to finish cleanly.
            return Ok(());
        }

        let mut attempt = TaskAttempt::start();

        // An unregistered type is a programmer error and must surface; the
        // caller still releases the lock.
        let handler = self.handlers.resolve(&task.task_type)?;

        let mut irrecoverable = false;
        if let Err(failure) = handler.process(&task, batch_params, ctx).await {
            tracing::debug!(
                %task_id,
                task_type = %task.task_type,
                attempt = task.attempts.len() + 1,
                error = %failure,
                irrecoverable = failure.irrecoverable,
                "task attempt failed"
            );
            irrecoverable = failure.irrecoverable;
            attempt
                .errors
                .push(RecordedError::with_kind(failure.message, "handler"));
        }

        attempt.completed_on = Some(Timestamp::now());
        let attempt_succeeded = attempt.succeeded();
        task.attempts.push(attempt);

        task.processed = attempt_succeeded
            || irrecoverable
            || task.attempts.len() >= self.max_attempts;

        self.tasks.save(&task).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use crate::error::EngineError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::*;
    use crate::locks::InMemoryLockStore;
    use crate::models::Task;
    use crate::processing::registry::{HandlerFailure, TaskHandler};
    use crate::store::InMemoryStore;

    const MAX_ATTEMPTS: usize = 3;

    /// Replays a scripted sequence of outcomes, then succeeds.
    struct ScriptedHandler {
        outcomes: Mutex<VecDeque<Result<(), HandlerFailure>>>,
        calls: AtomicUsize,
    }

    impl ScriptedHandler {
        fn new(outcomes: Vec<Result<(), HandlerFailure>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskHandler for ScriptedHandler {
        async fn process(
            &self,
            _task: &Task,
            _batch_params: &JsonValue,
            _ctx: &JobContext,
        ) -> Result<(), HandlerFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes.lock().await.pop_front().unwrap_or(Ok(()))
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        locks: Arc<InMemoryLockStore>,
        processor: TaskProcessor,
        task_id: Uuid,
    }

    async fn fixture(handler: Arc<ScriptedHandler>) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let locks = Arc::new(InMemoryLockStore::default());
        let registry =
            Arc::new(HandlerRegistry::new().register("validate", handler as Arc<dyn TaskHandler>));

        let task = Task::new(Uuid::new_v4(), "validate", json!({}));
        let task_id = task.id;
        store.put_task(task).await;

        let processor = TaskProcessor::new(
            Arc::clone(&store) as Arc<dyn TaskStore>,
            Arc::clone(&locks) as Arc<dyn LockStore>,
            registry,
            MAX_ATTEMPTS,
        );

        Fixture {
            store,
            locks,
            processor,
            task_id,
        }
    }

    #[tokio::test]
    async fn successful_attempt_marks_the_task_processed() {
        let handler = ScriptedHandler::new(vec![Ok(())]);
        let fx = fixture(Arc::clone(&handler)).await;

        fx.processor
            .process(fx.task_id, &json!({}), &JobContext::new())
            .await
            .unwrap();

        let task = fx.store.task(fx.task_id).await.unwrap();
        assert!(task.processed);
        assert_eq!(task.attempts.len(), 1);
        assert!(task.attempts[0].succeeded());
        assert!(task.attempts[0].completed_on.is_some());
        assert_eq!(fx.locks.held_count(), 0);
    }

    #[tokio::test]
    async fn one_generic_failure_leaves_the_task_retryable() {
        let handler = ScriptedHandler::new(vec![Err(HandlerFailure::retryable("flaky"))]);
        let fx = fixture(Arc::clone(&handler)).await;

        fx.processor
            .process(fx.task_id, &json!({}), &JobContext::new())
            .await
            .unwrap();

        let task = fx.store.task(fx.task_id).await.unwrap();
        assert_eq!(task.attempts.len(), 1);
        assert!(!task.processed);
        assert_eq!(task.attempts[0].errors[0].message, "flaky");
    }

    #[tokio::test]
    async fn attempt_budget_exhaustion_marks_the_task_processed() {
        // Third consecutive failure hits the attempt budget.
        let handler = ScriptedHandler::new(vec![
            Err(HandlerFailure::retryable("1")),
            Err(HandlerFailure::retryable("2")),
            Err(HandlerFailure::retryable("3")),
        ]);
        let fx = fixture(Arc::clone(&handler)).await;

        for _ in 0..3 {
            fx.processor
                .process(fx.task_id, &json!({}), &JobContext::new())
                .await
                .unwrap();
        }

        let task = fx.store.task(fx.task_id).await.unwrap();
        assert!(task.processed);
        assert_eq!(task.attempts.len(), 3);
    }

    #[tokio::test]
    async fn irrecoverable_failure_short_circuits_the_retry_budget() {
        let handler =
            ScriptedHandler::new(vec![Err(HandlerFailure::irrecoverable("malformed input"))]);
        let fx = fixture(Arc::clone(&handler)).await;

        fx.processor
            .process(fx.task_id, &json!({}), &JobContext::new())
            .await
            .unwrap();

        let task = fx.store.task(fx.task_id).await.unwrap();
        assert!(task.processed);
        assert_eq!(task.attempts.len(), 1);
    }

    #[tokio::test]
    async fn processed_task_never_gains_another_attempt() {
        let handler = ScriptedHandler::new(vec![Ok(())]);
        let fx = fixture(Arc::clone(&handler)).await;

        for _ in 0..5 {
            fx.processor
                .process(fx.task_id, &json!({}), &JobContext::new())
                .await
                .unwrap();
        }

        let task = fx.store.task(fx.task_id).await.unwrap();
        assert_eq!(task.attempts.len(), 1);
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn held_lock_skips_the_task_without_error() {
        let handler = ScriptedHandler::new(vec![]);
        let fx = fixture(Arc::clone(&handler)).await;

        let held = fx
            .locks
            .acquire(LockNamespace::Task, &fx.task_id.to_string())
            .await
            .unwrap();

        fx.processor
            .process(fx.task_id, &json!({}), &JobContext::new())
            .await
            .unwrap();

        let task = fx.store.task(fx.task_id).await.unwrap();
        assert!(task.attempts.is_empty());
        assert_eq!(handler.calls(), 0);
        fx.locks.release(&held).await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_before_the_attempt_writes_nothing() {
        let handler = ScriptedHandler::new(vec![Ok(())]);
        let fx = fixture(Arc::clone(&handler)).await;

        let ctx = JobContext::new();
        ctx.cancel();
        fx.processor
            .process(fx.task_id, &json!({}), &ctx)
            .await
            .unwrap();

        let task = fx.store.task(fx.task_id).await.unwrap();
        assert!(task.attempts.is_empty());
        assert!(!task.processed);
        assert_eq!(handler.calls(), 0);
        assert_eq!(fx.locks.held_count(), 0);
    }

    #[tokio::test]
    async fn unknown_task_type_raises_and_releases_the_lock() {
        let store = Arc::new(InMemoryStore::new());
        let locks = Arc::new(InMemoryLockStore::default());
        let registry = Arc::new(HandlerRegistry::new());

        let task = Task::new(Uuid::new_v4(), "unregistered", json!({}));
        let task_id = task.id;
        store.put_task(task).await;

        let processor = TaskProcessor::new(
            Arc::clone(&store) as Arc<dyn TaskStore>,
            Arc::clone(&locks) as Arc<dyn LockStore>,
            registry,
            MAX_ATTEMPTS,
        );

        let error = processor
            .process(task_id, &json!({}), &JobContext::new())
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::UnknownTaskType { .. }));

        // No attempt recorded, lock released.
        let task = store.task(task_id).await.unwrap();
        assert!(task.attempts.is_empty());
        assert_eq!(locks.held_count(), 0);
    }

    mod attempt_bound {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]
            /// However the handler behaves across repeated processing calls,
            /// the persisted attempt count never exceeds the budget.
            #[test]
            fn attempts_never_exceed_the_budget(outcomes in prop::collection::vec(
                prop_oneof![
                    Just(0u8), // success
                    Just(1u8), // retryable failure
                    Just(2u8), // irrecoverable failure
                ],
                1..10,
            )) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                runtime.block_on(async move {
                    let scripted: Vec<Result<(), HandlerFailure>> = outcomes
                        .iter()
                        .map(|kind| match kind {
                            0 => Ok(()),
                            1 => Err(HandlerFailure::retryable("transient")),
                            _ => Err(HandlerFailure::irrecoverable("permanent")),
                        })
                        .collect();
                    let rounds = scripted.len();
                    let handler = ScriptedHandler::new(scripted);
                    let fx = fixture(handler).await;

                    for _ in 0..rounds {
                        fx.processor
                            .process(fx.task_id, &json!({}), &JobContext::new())
                            .await
                            .unwrap();
                    }

                    let task = fx.store.task(fx.task_id).await.unwrap();
                    assert!(task.attempts.len() <= MAX_ATTEMPTS);
                });
            }
        }
    }
}
