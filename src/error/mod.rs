//! Engine-wide error type and result alias.
//!
//! The taxonomy separates expected coordination outcomes (lock conflicts,
//! admission conflicts) from configuration errors (unknown task type) and
//! transport failures (store unreachable). Lock conflicts are frequent and
//! cheap; callers match on them rather than logging them as errors.

use thiserror::Error;

use crate::locks::LockError;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Another holder owns the lease. Expected and frequent; treated as
    /// "try later", never as a bug.
    #[error("Lock is held by another worker: {key}")]
    LockConflict { key: String },

    /// A concurrent batch already exists for the submitted source. The only
    /// error surfaced synchronously to an external caller; the message is
    /// fixed and user-facing.
    #[error("{message}")]
    AdmissionConflict { message: &'static str },

    /// A batch submission carried no tasks.
    #[error("A batch must contain at least one task")]
    EmptySubmission,

    /// Read-side lookup of a batch that does not exist.
    #[error("Batch not found: {batch_id}")]
    BatchNotFound { batch_id: uuid::Uuid },

    /// No handler is registered for the task's type. A configuration error,
    /// raised rather than recorded on the task.
    #[error("No handler registered for task type: {task_type}")]
    UnknownTaskType { task_type: String },

    /// The durable store or lock store failed underneath us.
    #[error("Store operation failed: {operation}")]
    Store {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// Unexpected failure with no more specific classification.
    #[error("Internal error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    /// Conflict carrying the fixed admission message.
    pub fn admission_conflict() -> Self {
        EngineError::AdmissionConflict {
            message: "An import for this source is already in progress",
        }
    }

    pub fn store(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        EngineError::Store {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, EngineError::LockConflict { .. })
    }
}

impl From<LockError> for EngineError {
    fn from(error: LockError) -> Self {
        match error {
            LockError::Conflict { key } => EngineError::LockConflict { key },
            LockError::Store { operation, source } => EngineError::Store { operation, source },
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(error: anyhow::Error) -> Self {
        EngineError::Internal { source: error }
    }
}

/// Type alias for Result with EngineError to simplify function signatures.
pub type EngineResult<T> = Result<T, EngineError>;
