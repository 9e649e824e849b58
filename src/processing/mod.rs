pub mod batch_processor;
pub mod registry;
pub mod task_processor;

pub use batch_processor::BatchProcessor;
pub use registry::{HandlerFailure, HandlerRegistry, TaskHandler};
pub use task_processor::TaskProcessor;
