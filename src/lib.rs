//! batchline — a lease-guarded batch/task background processing engine.
//!
//! Work arrives as a batch of tasks admitted through the
//! [`admission::AdmissionService`]. Long-lived polling jobs pull one task at
//! a time through the [`processing::BatchProcessor`], which leases each task
//! via the [`locks::LockStore`] before handing it to its registered
//! [`processing::TaskHandler`]. Leases expire on their own, so a crashed
//! worker never strands a task for longer than the lease TTL. The
//! [`scheduler::JobScheduler`] owns the runner lifecycles and is the only
//! surface the host process talks to.
//!
//! The durable store is a collaborator, not part of the engine: hosts
//! implement the [`store`] traits over their database and hand them in. The
//! in-memory implementations back single-process deployments and tests.

pub mod admission;
pub mod config;
pub mod error;
pub mod locks;
pub mod logger;
pub mod models;
pub mod processing;
pub mod scheduler;
pub mod store;

pub use admission::{AdmissionService, BatchSubmission, NewTask};
pub use config::EngineSettings;
pub use error::{EngineError, EngineResult};
pub use locks::{LockHandle, LockNamespace, LockStore};
pub use models::{Batch, BatchProgress, RecordedError, Task, TaskAttempt};
pub use processing::{
    BatchProcessor, HandlerFailure, HandlerRegistry, TaskHandler, TaskProcessor,
};
pub use scheduler::{
    BatchPollingJob, IntervalJob, JobContext, JobScheduler, PollingJob,
};
