//! Task lifecycle management.
//!
//! One task at a time: created before an execution starts, mutated as
//! records are processed, persisted to the store after every change so a
//! page reload can resume where it left off. Stored tasks older than the
//! expiry window are discarded on load instead of being resumed.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::activity::{CriteriaError, FilterCriteria, UpdateCriteria};
use crate::domain::rule::compile_rule;
use crate::domain::task::{FailedRecord, Scenario, Task, TaskStatus};
use crate::infrastructure::storage::{StorageError, TaskStore};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("no task is loaded")]
    NoTask,
    #[error("task is already {0:?}")]
    AlreadyActive(TaskStatus),
    #[error("cannot move task from {from:?} to {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error(transparent)]
    InvalidCriteria(#[from] CriteriaError),
    #[error("compiled rule has no valid enabled conditions")]
    UnusableRule,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    current: RwLock<Option<Task>>,
}

impl TaskManager {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store, current: RwLock::new(None) }
    }

    /// Loads any persisted task, discarding it when expired. A task stored
    /// as `Running` was interrupted mid-run (crash or page reload); it comes
    /// back as `Paused` so it can be resumed or replaced.
    pub async fn load(&self) -> Result<Option<Task>, TaskError> {
        let Some(mut task) = self.store.load().await? else { return Ok(None) };
        if task.is_expired_at(Utc::now()) {
            warn!(task_id = %task.id, created_at = %task.created_at, "discarding expired task");
            self.store.clear().await?;
            return Ok(None);
        }
        if task.status == TaskStatus::Running {
            warn!(task_id = %task.id, "restored task was mid-run, demoting to paused");
            task.status = TaskStatus::Paused;
            task.paused_at = Some(Utc::now());
            task.progress.is_paused = true;
            self.store.save(&task).await?;
        }
        info!(task_id = %task.id, status = ?task.status, "restored persisted task");
        *self.current.write().await = Some(task.clone());
        Ok(Some(task))
    }

    /// Validates criteria, compiles the matching rule, and persists a fresh
    /// pending task. Refuses while another task is still active.
    pub async fn create_task(
        &self,
        scenario: Scenario,
        filters: FilterCriteria,
        updates: UpdateCriteria,
    ) -> Result<Task, TaskError> {
        if let Some(existing) = self.current.read().await.as_ref() {
            if existing.is_active() {
                return Err(TaskError::AlreadyActive(existing.status));
            }
        }
        filters.validate()?;
        updates.validate()?;
        let rule = compile_rule(&filters);
        if !rule.is_valid() {
            return Err(TaskError::UnusableRule);
        }
        let task = Task::new(scenario, filters, updates, rule);
        info!(task_id = %task.id, ?scenario, rule = %task.rule.summary(), "created task");
        self.store.save(&task).await?;
        *self.current.write().await = Some(task.clone());
        Ok(task)
    }

    async fn transition(&self, to: TaskStatus) -> Result<Task, TaskError> {
        let mut guard = self.current.write().await;
        let task = guard.as_mut().ok_or(TaskError::NoTask)?;
        if !task.status.can_transition_to(to) {
            return Err(TaskError::InvalidTransition { from: task.status, to });
        }
        let now = Utc::now();
        task.status = to;
        match to {
            TaskStatus::Running => {
                if task.started_at.is_none() {
                    task.started_at = Some(now);
                }
                task.paused_at = None;
                task.progress.is_paused = false;
            }
            TaskStatus::Paused => {
                task.paused_at = Some(now);
                task.progress.is_paused = true;
            }
            TaskStatus::Completed | TaskStatus::Failed => {
                task.completed_at = Some(now);
                task.progress.is_paused = false;
            }
            TaskStatus::Pending => {}
        }
        info!(task_id = %task.id, status = ?to, "task transition");
        self.store.save(task).await?;
        Ok(task.clone())
    }

    pub async fn start(&self) -> Result<Task, TaskError> {
        self.transition(TaskStatus::Running).await
    }

    pub async fn pause(&self) -> Result<Task, TaskError> {
        self.transition(TaskStatus::Paused).await
    }

    pub async fn resume(&self) -> Result<Task, TaskError> {
        self.transition(TaskStatus::Running).await
    }

    /// Finishes the task: `Completed` when `error` is `None`, `Failed`
    /// otherwise.
    pub async fn complete(&self, error: Option<String>) -> Result<Task, TaskError> {
        let status = if error.is_some() { TaskStatus::Failed } else { TaskStatus::Completed };
        {
            let mut guard = self.current.write().await;
            let task = guard.as_mut().ok_or(TaskError::NoTask)?;
            task.error = error;
        }
        self.transition(status).await
    }

    async fn mutate<F>(&self, apply: F) -> Result<(), TaskError>
    where
        F: FnOnce(&mut Task),
    {
        let mut guard = self.current.write().await;
        let task = guard.as_mut().ok_or(TaskError::NoTask)?;
        apply(task);
        self.store.save(task).await?;
        Ok(())
    }

    pub async fn record_success(&self) -> Result<(), TaskError> {
        self.mutate(|t| {
            t.progress.processed += 1;
            t.progress.succeeded += 1;
        })
        .await
    }

    pub async fn record_failure(&self, id: &str, name: &str, error: &str) -> Result<(), TaskError> {
        self.mutate(|t| {
            t.progress.processed += 1;
            t.progress.failed += 1;
            t.progress.failed_records.push(FailedRecord {
                id: id.to_string(),
                name: name.to_string(),
                error: error.to_string(),
            });
        })
        .await
    }

    pub async fn record_skipped(&self) -> Result<(), TaskError> {
        self.mutate(|t| {
            t.progress.processed += 1;
            t.progress.skipped += 1;
        })
        .await
    }

    pub async fn set_current_page(&self, page: u32) -> Result<(), TaskError> {
        self.mutate(|t| t.progress.current_page = page).await
    }

    pub async fn set_total_pages(&self, pages: u32) -> Result<(), TaskError> {
        // a resumed run re-observes early pages; the count never shrinks
        self.mutate(|t| t.progress.total_pages = t.progress.total_pages.max(pages)).await
    }

    pub async fn set_estimated_time(&self, secs: u64) -> Result<(), TaskError> {
        self.mutate(|t| t.progress.estimated_remaining_secs = secs).await
    }

    pub async fn current_task(&self) -> Option<Task> {
        self.current.read().await.clone()
    }

    pub async fn has_active_task(&self) -> bool {
        self.current.read().await.as_ref().is_some_and(Task::is_active)
    }

    pub async fn can_resume(&self) -> bool {
        self.current.read().await.as_ref().is_some_and(Task::can_resume)
    }

    /// Drops the in-memory task and wipes the store.
    pub async fn clear(&self) -> Result<(), TaskError> {
        *self.current.write().await = None;
        self.store.clear().await?;
        Ok(())
    }
}
