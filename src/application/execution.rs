//! Execution pipeline: walk the pages and apply the requested edits.
//!
//! Each matching record is updated through the page's quick-edit form with
//! human-paced delays between steps. Progress is persisted through the task
//! manager after every record, so pause, resume, and page reload all pick up
//! where the last record left off. Pause takes effect at the next record
//! boundary; stop cancels the same way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::domain::activity::{Activity, FilterCriteria, UpdateCriteria};
use crate::domain::change_detector::{check_if_needs_update, FieldChange, UpdateField};
use crate::domain::events::{ExecutionProgress, ExecutionStatus, ProgressSink};
use crate::domain::rule::{evaluate_rule, should_stop_paging, Rule};
use crate::domain::task::{estimate_remaining_secs, FailedRecord, Scenario, Task, TaskStatus};
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::intercept::InterceptSession;
use crate::infrastructure::page_driver::{FormField, PageDriver, RowHandle};

use super::navigator::{extract_activity_id, PageNavigator};
use super::retry::RetryPolicy;
use super::task_manager::{TaskError, TaskManager};

/// Consecutive pages that may fail outright before the run is abandoned.
const MAX_CONSECUTIVE_PAGE_ERRORS: u32 = 3;

#[derive(Clone)]
pub struct ExecutionRequest {
    pub scenario: Scenario,
    pub filters: FilterCriteria,
    pub updates: UpdateCriteria,
    /// Pre-compiled rule; the task's compiled rule is used when absent.
    pub rule: Option<Rule>,
    pub on_progress: Option<ProgressSink<ExecutionProgress>>,
    /// Overrides the configured per-record retry budget.
    pub max_retries: Option<u32>,
    /// Keep going after a record fails instead of stopping the run.
    pub continue_on_error: bool,
}

impl ExecutionRequest {
    pub fn new(scenario: Scenario, filters: FilterCriteria, updates: UpdateCriteria) -> Self {
        Self {
            scenario,
            filters,
            updates,
            rule: None,
            on_progress: None,
            max_retries: None,
            continue_on_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub total_processed: u64,
    pub successful_updates: u64,
    pub failed_updates: u64,
    pub skipped: u64,
    pub total_pages: u32,
    pub failed_details: Vec<FailedRecord>,
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum RecordError {
    #[error("record has no readable activity id")]
    MissingId,
    #[error("record {0} is not visible on the current page")]
    RowNotFound(String),
    #[error("quick-edit form exposes none of the requested fields")]
    NoEditableField,
    #[error("{0}")]
    Driver(String),
}

pub struct ExecutionEngine {
    navigator: PageNavigator,
    session: Arc<InterceptSession>,
    tasks: Arc<TaskManager>,
    config: EngineConfig,
    paused: Arc<AtomicBool>,
    should_stop: Arc<AtomicBool>,
}

impl ExecutionEngine {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        session: Arc<InterceptSession>,
        tasks: Arc<TaskManager>,
        config: EngineConfig,
    ) -> Self {
        let navigator =
            PageNavigator::new(driver, config.navigator.clone(), config.delays.clone());
        Self {
            navigator,
            session,
            tasks,
            config,
            paused: Arc::new(AtomicBool::new(false)),
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pause(&self) {
        info!("pause requested");
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        info!("resume requested");
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Cancels the run at the next record boundary.
    pub fn stop(&self) {
        info!("stop requested");
        self.should_stop.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn is_stopped(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }

    pub async fn run(&self, request: ExecutionRequest) -> ExecutionResult {
        // a stop from an earlier run must not leak into this one
        self.should_stop.store(false, Ordering::SeqCst);
        match self.run_inner(&request).await {
            Ok(result) => result,
            Err(e) => {
                let error = e.to_string();
                warn!(error, "execution failed");
                if let Err(persist) = self.tasks.complete(Some(error.clone())).await {
                    warn!(error = %persist, "could not persist failed task state");
                }
                let snapshot = self.tasks.current_task().await;
                let progress = snapshot.as_ref().map(|t| t.progress.clone()).unwrap_or_default();
                self.emit(&request, &progress_event(
                    &progress,
                    ExecutionStatus::Error,
                    Some(error.clone()),
                ));
                ExecutionResult {
                    success: false,
                    total_processed: progress.processed,
                    successful_updates: progress.succeeded,
                    failed_updates: progress.failed,
                    skipped: progress.skipped,
                    total_pages: progress.total_pages,
                    failed_details: progress.failed_records,
                    error: Some(error),
                }
            }
        }
    }

    async fn run_inner(&self, request: &ExecutionRequest) -> anyhow::Result<ExecutionResult> {
        let task = self.obtain_task(request).await?;
        let rule = request.rule.clone().unwrap_or_else(|| task.rule.clone());
        info!(task_id = %task.id, rule = %rule.summary(), "starting execution");

        self.emit_snapshot(request, ExecutionStatus::Preparing, None).await;
        let prepared = self.navigator.prepare_page_for_execution().await;
        if !prepared.success {
            anyhow::bail!("page not ready for execution: {}", prepared.errors.join("; "));
        }

        let retry = self.retry_policy(request.max_retries);
        let started = Instant::now();
        let estimated_total = self.page_total().await;
        let mut consecutive_page_errors: u32 = 0;

        if task.status == TaskStatus::Pending {
            self.tasks.start().await?;
        }
        self.emit_snapshot(request, ExecutionStatus::Executing, None).await;

        loop {
            if self.is_stopped() {
                info!("execution stopped by request");
                self.tasks.pause().await?;
                return Ok(self.finish_result(request, ExecutionStatus::Paused).await);
            }

            // the rendered page is the position of record: preparation reset
            // the list to page 1, so a resumed run walks forward from there
            // and the change detector skips records finished earlier
            let page = self.navigator.current_page().await;
            self.tasks.set_current_page(page).await?;
            match self.load_page(page, &retry).await {
                Some(records) => {
                    consecutive_page_errors = 0;
                    self.tasks.set_total_pages(page).await?;
                    let outcome = self
                        .process_page(request, &rule, &records, &retry, started, estimated_total)
                        .await?;
                    match outcome {
                        PageOutcome::Continue => {}
                        PageOutcome::Paused => {
                            self.tasks.pause().await?;
                            return Ok(self.finish_result(request, ExecutionStatus::Paused).await);
                        }
                        PageOutcome::Abort(error) => {
                            self.tasks.complete(Some(error.clone())).await?;
                            return Ok(self
                                .finish_with_error(request, error)
                                .await);
                        }
                    }
                    self.emit_snapshot(request, ExecutionStatus::Executing, None).await;
                    if should_stop_paging(&records, &rule) {
                        debug!(page, "remaining records predate every filter window");
                        break;
                    }
                }
                None => {
                    consecutive_page_errors += 1;
                    warn!(page, consecutive_page_errors, "no records readable for page");
                    if !request.continue_on_error
                        || consecutive_page_errors >= MAX_CONSECUTIVE_PAGE_ERRORS
                    {
                        let error = format!("page {page} could not be read");
                        self.tasks.complete(Some(error.clone())).await?;
                        return Ok(self.finish_with_error(request, error).await);
                    }
                }
            }

            if !self.navigator.has_next_page().await {
                break;
            }
            if !self.navigator.go_to_next_page().await {
                warn!(page, "could not advance past page, finishing run");
                break;
            }
        }

        if self.is_paused() {
            self.tasks.pause().await?;
            return Ok(self.finish_result(request, ExecutionStatus::Paused).await);
        }
        self.tasks.complete(None).await?;
        info!("execution completed");
        Ok(self.finish_result(request, ExecutionStatus::Completed).await)
    }

    /// Resumes a restorable task when its shape matches the request,
    /// otherwise creates a fresh one.
    async fn obtain_task(&self, request: &ExecutionRequest) -> Result<Task, TaskError> {
        if let Some(existing) = self.tasks.current_task().await {
            if existing.can_resume()
                && existing.scenario == request.scenario
                && existing.filters == request.filters
                && existing.updates == request.updates
            {
                info!(task_id = %existing.id, "resuming persisted task");
                self.paused.store(false, Ordering::SeqCst);
                return self.tasks.resume().await;
            }
            if !existing.is_active() {
                self.tasks.clear().await?;
            }
        }
        self.tasks
            .create_task(request.scenario, request.filters.clone(), request.updates.clone())
            .await
    }

    async fn process_page(
        &self,
        request: &ExecutionRequest,
        rule: &Rule,
        records: &[Activity],
        retry: &RetryPolicy,
        started: Instant,
        estimated_total: Option<u64>,
    ) -> Result<PageOutcome, TaskError> {
        for record in records {
            if self.is_paused() || self.is_stopped() {
                return Ok(PageOutcome::Paused);
            }

            if !evaluate_rule(rule, record) {
                self.tasks.record_skipped().await?;
                continue;
            }
            let comparison = check_if_needs_update(record, &request.updates);
            if !comparison.needs_update {
                debug!(id = %record.id, "record already up to date");
                self.tasks.record_skipped().await?;
                continue;
            }

            match self.update_record(record, &comparison.changes, retry).await {
                Ok(()) => {
                    info!(id = %record.id, name = %record.name, "record updated");
                    self.tasks.record_success().await?;
                }
                Err(e) => {
                    warn!(id = %record.id, error = %e, "record update failed");
                    self.tasks
                        .record_failure(&record.id, &record.name, &e.to_string())
                        .await?;
                    if !request.continue_on_error {
                        return Ok(PageOutcome::Abort(format!(
                            "stopped after record {} failed: {e}",
                            record.id
                        )));
                    }
                }
            }

            if let Some(total) = estimated_total {
                let processed = self
                    .tasks
                    .current_task()
                    .await
                    .map(|t| t.progress.processed)
                    .unwrap_or_default();
                let elapsed = chrono::Duration::from_std(started.elapsed())
                    .unwrap_or_else(|_| chrono::Duration::zero());
                let eta = estimate_remaining_secs(processed, total, elapsed);
                self.tasks.set_estimated_time(eta).await?;
            }
            // pacing between records so the page never sees a click storm
            sleep(self.config.delays.jittered(Duration::ZERO)).await;
        }
        Ok(PageOutcome::Continue)
    }

    /// Applies the detected changes to one record through the quick-edit
    /// form, retrying the whole interaction on failure.
    async fn update_record(
        &self,
        record: &Activity,
        changes: &[FieldChange],
        retry: &RetryPolicy,
    ) -> Result<(), RecordError> {
        let row = self.find_row(record).await?;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.apply_changes(row, changes).await {
                Ok(()) => return Ok(()),
                Err(e) if retry.should_retry(attempt) => {
                    warn!(id = %record.id, attempt, error = %e, "retrying record update");
                    retry.backoff(attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn find_row(&self, record: &Activity) -> Result<RowHandle, RecordError> {
        let rows = self
            .navigator
            .driver()
            .visible_rows()
            .await
            .map_err(|e| RecordError::Driver(e.to_string()))?;
        for row in rows {
            match extract_activity_id(&row) {
                Some(id) if id == record.id => return Ok(row.handle),
                Some(_) => {}
                None => warn!("row without a readable activity id"),
            }
        }
        if record.id.is_empty() {
            return Err(RecordError::MissingId);
        }
        Err(RecordError::RowNotFound(record.id.clone()))
    }

    async fn apply_changes(
        &self,
        row: RowHandle,
        changes: &[FieldChange],
    ) -> Result<(), RecordError> {
        let driver = self.navigator.driver();
        let delays = &self.config.delays;
        driver
            .open_quick_edit(row)
            .await
            .map_err(|e| RecordError::Driver(e.to_string()))?;
        sleep(Duration::from_millis(delays.quick_edit_click_ms)).await;

        let mut any_field_set = false;
        for change in changes {
            // an absent target clears the field on the form
            let value = change.new_value.as_deref().unwrap_or("");
            let set = match change.field {
                // a gear id targets whichever selector the form renders
                UpdateField::Gear => {
                    let bike = driver
                        .set_field(row, FormField::Bike, value)
                        .await
                        .map_err(|e| RecordError::Driver(e.to_string()))?;
                    let shoes = driver
                        .set_field(row, FormField::Shoes, value)
                        .await
                        .map_err(|e| RecordError::Driver(e.to_string()))?;
                    bike || shoes
                }
                UpdateField::Visibility => driver
                    .set_field(row, FormField::Visibility, value)
                    .await
                    .map_err(|e| RecordError::Driver(e.to_string()))?,
                UpdateField::RideType => driver
                    .set_field(row, FormField::RideType, value)
                    .await
                    .map_err(|e| RecordError::Driver(e.to_string()))?,
            };
            any_field_set |= set;
        }
        if !any_field_set {
            return Err(RecordError::NoEditableField);
        }
        sleep(Duration::from_millis(delays.form_fill_ms)).await;

        driver
            .submit_edit(row)
            .await
            .map_err(|e| RecordError::Driver(e.to_string()))?;
        sleep(Duration::from_millis(delays.submit_save_ms)).await;
        driver
            .confirm_saved(row)
            .await
            .map_err(|e| RecordError::Driver(e.to_string()))?;
        Ok(())
    }

    /// Cache first, then bounded waits for the in-flight list response.
    async fn load_page(&self, page: u32, retry: &RetryPolicy) -> Option<Vec<Activity>> {
        if let Some(cached) = self.session.cache().get(page).await {
            debug!(page, records = cached.records.len(), "serving page from cache");
            return Some(cached.records);
        }
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if let Some((records, _)) = self
                .session
                .wait_for_next_response(self.config.delays.response_wait_timeout())
                .await
            {
                return Some(records);
            }
            if let Some(cached) = self.session.cache().get(page).await {
                return Some(cached.records);
            }
            if !retry.should_retry(attempt) {
                return None;
            }
            retry.backoff(attempt).await;
        }
    }

    /// Estimated total record count, taken from the first cached page's
    /// metadata when available.
    async fn page_total(&self) -> Option<u64> {
        self.session
            .cache()
            .get(1)
            .await
            .and_then(|p| p.total)
            .map(u64::from)
    }

    fn retry_policy(&self, max_retries: Option<u32>) -> RetryPolicy {
        let mut config = self.config.retry.clone();
        if let Some(max) = max_retries {
            config.max_attempts = max.max(1);
        }
        RetryPolicy::new(&config)
    }

    async fn finish_result(
        &self,
        request: &ExecutionRequest,
        status: ExecutionStatus,
    ) -> ExecutionResult {
        self.emit_snapshot(request, status, None).await;
        let progress = self
            .tasks
            .current_task()
            .await
            .map(|t| t.progress)
            .unwrap_or_default();
        ExecutionResult {
            success: status == ExecutionStatus::Completed,
            total_processed: progress.processed,
            successful_updates: progress.succeeded,
            failed_updates: progress.failed,
            skipped: progress.skipped,
            total_pages: progress.total_pages,
            failed_details: progress.failed_records,
            error: None,
        }
    }

    async fn finish_with_error(
        &self,
        request: &ExecutionRequest,
        error: String,
    ) -> ExecutionResult {
        self.emit_snapshot(request, ExecutionStatus::Error, Some(error.clone())).await;
        let progress = self
            .tasks
            .current_task()
            .await
            .map(|t| t.progress)
            .unwrap_or_default();
        ExecutionResult {
            success: false,
            total_processed: progress.processed,
            successful_updates: progress.succeeded,
            failed_updates: progress.failed,
            skipped: progress.skipped,
            total_pages: progress.total_pages,
            failed_details: progress.failed_records,
            error: Some(error),
        }
    }

    async fn emit_snapshot(
        &self,
        request: &ExecutionRequest,
        status: ExecutionStatus,
        error: Option<String>,
    ) {
        let progress = self
            .tasks
            .current_task()
            .await
            .map(|t| t.progress)
            .unwrap_or_default();
        self.emit(request, &progress_event(&progress, status, error));
    }

    fn emit(&self, request: &ExecutionRequest, progress: &ExecutionProgress) {
        if let Some(sink) = &request.on_progress {
            sink(progress.clone());
        }
    }
}

enum PageOutcome {
    Continue,
    Paused,
    Abort(String),
}

fn progress_event(
    progress: &crate::domain::task::TaskProgress,
    status: ExecutionStatus,
    error: Option<String>,
) -> ExecutionProgress {
    ExecutionProgress {
        current_page: progress.current_page,
        total_pages: progress.total_pages,
        processed: progress.processed,
        successful_updates: progress.succeeded,
        failed_updates: progress.failed,
        skipped: progress.skipped,
        status,
        estimated_remaining_secs: (progress.estimated_remaining_secs > 0)
            .then_some(progress.estimated_remaining_secs),
        error,
    }
}
