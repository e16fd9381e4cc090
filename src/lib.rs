//! Bulk editing engine for activity records on a training-log web UI.
//!
//! The engine never calls the site's API directly. It watches the list
//! responses the page already makes, drives the page's own pagination and
//! quick-edit controls, and applies user-defined filter rules to decide
//! which records to touch. Two pipelines share that machinery: a read-only
//! preview that counts matches, and an execution run that performs the
//! edits with pause, resume, and crash recovery.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub mod test_utils;

pub use application::{
    ExecutionEngine, ExecutionRequest, ExecutionResult, PreviewEngine, PreviewOutcome,
    PreviewRequest, TaskManager,
};
pub use domain::{
    Activity, ExecutionProgress, ExecutionStatus, FilterCriteria, PreviewProgress, PreviewStatus,
    Scenario, Task, TaskStatus, UpdateCriteria,
};
pub use infrastructure::{EngineConfig, InterceptSession, PageDriver};
