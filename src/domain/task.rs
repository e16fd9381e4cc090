//! Bulk-edit task model.
//!
//! A [`Task`] is one user-initiated bulk-edit job: criteria, compiled rule,
//! lifecycle status and progress counters. Tasks persist through a
//! [`crate::infrastructure::storage::TaskStore`] on every mutation so that a
//! crash mid-run leaves progress consistent with work actually done.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::activity::{FilterCriteria, UpdateCriteria};
use crate::domain::rule::Rule;

/// Hours after which an unfinished persisted task is discarded on load.
pub const TASK_EXPIRY_HOURS: i64 = 24;

/// Which bulk-edit wizard flow created the task. Tag only; the engine
/// treats every scenario identically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Privacy,
    Shoes,
    Bikes,
    RideType,
}

/// Task lifecycle: `Pending → Running ⇄ Paused → Completed | Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Allowed lifecycle transitions.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::{Completed, Failed, Paused, Pending, Running};
        matches!(
            (self, next),
            (Pending, Running | Failed)
                | (Running, Paused | Completed | Failed)
                | (Paused, Running | Completed | Failed)
        )
    }
}

/// A record the executor gave up on, with a human-readable reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedRecord {
    pub id: String,
    pub name: String,
    pub error: String,
}

/// Live progress counters for a task.
///
/// Counters only ever grow while the task runs, and once a page's batch has
/// finished, `processed == succeeded + failed + skipped` holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskProgress {
    pub current_page: u32,
    pub total_pages: u32,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub failed_records: Vec<FailedRecord>,
    pub is_paused: bool,
    pub estimated_remaining_secs: u64,
}

impl TaskProgress {
    pub fn new() -> Self {
        Self { current_page: 1, ..Default::default() }
    }
}

/// One bulk-edit job with persisted lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub scenario: Scenario,
    pub filters: FilterCriteria,
    pub updates: UpdateCriteria,
    pub rule: Rule,
    pub status: TaskStatus,
    pub progress: TaskProgress,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Task {
    pub fn new(
        scenario: Scenario,
        filters: FilterCriteria,
        updates: UpdateCriteria,
        rule: Rule,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            scenario,
            filters,
            updates,
            rule,
            status: TaskStatus::Pending,
            progress: TaskProgress::new(),
            created_at: Utc::now(),
            started_at: None,
            paused_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Whether the persisted task has outlived its retention window.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::hours(TASK_EXPIRY_HOURS)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, TaskStatus::Running | TaskStatus::Paused)
    }

    pub fn can_resume(&self) -> bool {
        self.status == TaskStatus::Paused
    }

    /// Wall-clock run time so far, when the task has started.
    pub fn duration(&self) -> Option<Duration> {
        let started = self.started_at?;
        Some(self.completed_at.unwrap_or_else(Utc::now) - started)
    }
}

/// Projects remaining seconds from observed pace. Returns 0 until at least
/// one unit has been processed.
pub fn estimate_remaining_secs(processed: u64, total: u64, elapsed: Duration) -> u64 {
    if processed == 0 || total <= processed {
        return 0;
    }
    let elapsed_ms = elapsed.num_milliseconds().max(0) as u64;
    let per_unit_ms = elapsed_ms / processed;
    let remaining_ms = per_unit_ms * (total - processed);
    remaining_ms.div_ceil(1000)
}
