//! Progress events produced for the UI while a pipeline runs.
//!
//! Both pipelines push these through caller-supplied callbacks; the engine
//! never blocks on a consumer. Events are plain serializable values so a
//! host can forward them over whatever bridge it uses.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Execution pipeline status as shown to the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Preparing,
    Executing,
    Paused,
    Completed,
    Error,
}

/// Snapshot of execution progress, emitted at least once per page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionProgress {
    pub current_page: u32,
    pub total_pages: u32,
    pub processed: u64,
    pub successful_updates: u64,
    pub failed_updates: u64,
    pub skipped: u64,
    pub status: ExecutionStatus,
    pub estimated_remaining_secs: Option<u64>,
    pub error: Option<String>,
}

/// Preview pipeline status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStatus {
    Scanning,
    Completed,
    Error,
}

/// Snapshot of preview progress, emitted per scanned page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviewProgress {
    pub current_page: u32,
    pub scanned: u64,
    pub matched: u64,
    pub estimated_total: Option<u64>,
    pub status: PreviewStatus,
    pub error: Option<String>,
}

/// Callback type used by both pipelines to report progress.
pub type ProgressSink<T> = Arc<dyn Fn(T) + Send + Sync>;
