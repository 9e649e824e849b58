//! Task handler contract and the type-tag registry that resolves handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::{EngineError, EngineResult};
use crate::models::Task;
use crate::scheduler::JobContext;

/// What a handler reports when it cannot process a task.
///
/// Failures are recorded on the attempt, never propagated. An irrecoverable
/// failure short-circuits the retry budget: the task is marked processed
/// immediately, no matter how many attempts remain.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub message: String,
    pub irrecoverable: bool,
}

impl HandlerFailure {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            irrecoverable: false,
        }
    }

    pub fn irrecoverable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            irrecoverable: true,
        }
    }
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerFailure {}

/// Business logic for one task type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Process one task. `batch_params` is the owning batch's payload,
    /// identical for every task of the batch.
    async fn process(
        &self,
        task: &Task,
        batch_params: &JsonValue,
        ctx: &JobContext,
    ) -> Result<(), HandlerFailure>;
}

/// Maps task-type tags to their handlers. Built once at startup; lookup of
/// an unregistered type is a configuration error, not a task failure.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        task_type: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        self.handlers.insert(task_type.into(), handler);
        self
    }

    pub fn resolve(&self, task_type: &str) -> EngineResult<Arc<dyn TaskHandler>> {
        self.handlers
            .get(task_type)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTaskType {
                task_type: task_type.to_string(),
            })
    }
}
