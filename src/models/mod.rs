//! Persistent records the engine reads and writes.
//!
//! The engine never owns the storage itself; these are the shapes it expects
//! the durable store to round-trip with last-write-wins semantics.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A serialized failure, recorded on a task attempt or a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedError {
    pub message: String,
    /// Coarse classification tag, e.g. "handler" or "unknown_task_type".
    pub kind: Option<String>,
    pub occurred_on: Timestamp,
}

impl RecordedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
            occurred_on: Timestamp::now(),
        }
    }

    pub fn with_kind(message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: Some(kind.into()),
            occurred_on: Timestamp::now(),
        }
    }
}

/// A group of tasks submitted together. Completed when no unprocessed task
/// remains; never deleted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub batch_type: String,
    /// Type-specific payload, opaque to the engine. Handed unchanged to
    /// every task handler of the batch.
    pub params: JsonValue,
    /// Key the admission lock is taken on. At most one uncompleted batch per
    /// (batch_type, source_key) exists at any time.
    pub source_key: String,
    pub created_by: String,
    pub created_on: Timestamp,
    pub completed_on: Option<Timestamp>,
    /// Most recent task-processing failures, newest last, capped.
    pub errors: Vec<RecordedError>,
}

impl Batch {
    pub fn new(
        batch_type: impl Into<String>,
        source_key: impl Into<String>,
        params: JsonValue,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_type: batch_type.into(),
            params,
            source_key: source_key.into(),
            created_by: created_by.into(),
            created_on: Timestamp::now(),
            completed_on: None,
            errors: Vec::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_on.is_some()
    }

    /// Append a failure, dropping the oldest entries beyond `cap`.
    pub fn record_error(&mut self, error: RecordedError, cap: usize) {
        self.errors.push(error);
        if self.errors.len() > cap {
            let overflow = self.errors.len() - cap;
            self.errors.drain(..overflow);
        }
    }
}

/// One recorded try at processing a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAttempt {
    pub started_on: Timestamp,
    pub completed_on: Option<Timestamp>,
    /// Empty means the attempt succeeded.
    pub errors: Vec<RecordedError>,
}

impl TaskAttempt {
    pub fn start() -> Self {
        Self {
            started_on: Timestamp::now(),
            completed_on: None,
            errors: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One unit of work belonging to exactly one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub batch_id: Uuid,
    /// Selects the handler that processes this task.
    pub task_type: String,
    pub params: JsonValue,
    pub processed: bool,
    /// Strictly ordered, append-only.
    pub attempts: Vec<TaskAttempt>,
}

impl Task {
    pub fn new(batch_id: Uuid, task_type: impl Into<String>, params: JsonValue) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            task_type: task_type.into(),
            params,
            processed: false,
            attempts: Vec::new(),
        }
    }

    pub fn latest_attempt(&self) -> Option<&TaskAttempt> {
        self.attempts.last()
    }
}

/// Derived completion state of a batch, computed from its task counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchProgress {
    pub processed: u64,
    pub total: u64,
    pub completed: bool,
}

impl BatchProgress {
    /// Fraction done in `[0, 1]`. An explicitly completed batch reports full
    /// progress regardless of counts.
    pub fn ratio(&self) -> f64 {
        if self.completed {
            return 1.0;
        }
        if self.total == 0 {
            return 0.0;
        }
        self.processed as f64 / self.total as f64
    }
}
