//! Application layer: the pipelines and services that orchestrate the
//! domain over the page and interceptor boundaries.

pub mod execution;
pub mod navigator;
pub mod preview;
pub mod retry;
pub mod task_manager;

pub use execution::{ExecutionEngine, ExecutionRequest, ExecutionResult};
pub use navigator::{extract_activity_id, PageNavigator, PrepareResult};
pub use preview::{PreviewEngine, PreviewOutcome, PreviewRequest};
pub use retry::RetryPolicy;
pub use task_manager::{TaskError, TaskManager};
