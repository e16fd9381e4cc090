//! Domain module - core model and pure business logic
//!
//! Everything here is I/O free: activity snapshots, criteria, compiled
//! rules, change detection and the task lifecycle. The pipelines in
//! `application` drive these against the infrastructure seams.

pub mod activity;
pub mod change_detector;
pub mod events;
pub mod rule;
pub mod task;

// Re-export commonly used items for convenience
pub use activity::{
    Activity, CriteriaError, DateRange, FilterCriteria, UpdateCriteria,
};
pub use change_detector::{
    check_if_needs_update, count_update_status, ComparisonResult, FieldChange, UpdateField,
};
pub use events::{
    ExecutionProgress, ExecutionStatus, PreviewProgress, PreviewStatus, ProgressSink,
};
pub use rule::{
    compile_rule, evaluate_condition, evaluate_rule, filter_records, should_stop_paging,
    Condition, ConditionKind, Rule,
};
pub use task::{
    estimate_remaining_secs, FailedRecord, Scenario, Task, TaskProgress, TaskStatus,
};
