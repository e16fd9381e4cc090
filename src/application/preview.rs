//! Preview pipeline: scan every page, collect the matching records, change
//! nothing.
//!
//! The scan rides on the interceptor: navigating reloads the list, the list
//! request lands in the cache, and the pipeline reads the cache (falling
//! back to an explicit wait when the response is slow). A first-page miss
//! aborts the whole preview; later pages tolerate a bounded error streak.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::activity::{Activity, FilterCriteria};
use crate::domain::events::{PreviewProgress, PreviewStatus, ProgressSink};
use crate::domain::rule::{compile_rule, filter_records, should_stop_paging, Rule};
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::intercept::InterceptSession;
use crate::infrastructure::page_driver::PageDriver;

use super::navigator::PageNavigator;
use super::retry::RetryPolicy;

/// Consecutive pages that may fail before a mid-scan preview gives up.
const MAX_CONSECUTIVE_PAGE_ERRORS: u32 = 3;

#[derive(Clone)]
pub struct PreviewRequest {
    pub filters: FilterCriteria,
    /// Pre-compiled rule; compiled from `filters` when absent.
    pub rule: Option<Rule>,
    pub on_progress: Option<ProgressSink<PreviewProgress>>,
    /// Overrides the configured response-wait retry budget.
    pub max_retries: Option<u32>,
    /// Abort on the first failed page instead of tolerating an error streak.
    pub stop_on_error: bool,
}

impl PreviewRequest {
    pub fn new(filters: FilterCriteria) -> Self {
        Self { filters, rule: None, on_progress: None, max_retries: None, stop_on_error: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewOutcome {
    pub success: bool,
    /// Every record the rule matched, in scan order.
    pub matched_records: Vec<Activity>,
    pub total_scanned: u64,
    pub total_pages: u32,
    pub error: Option<String>,
}

impl PreviewOutcome {
    pub fn matched(&self) -> u64 {
        self.matched_records.len() as u64
    }
}

pub struct PreviewEngine {
    navigator: PageNavigator,
    session: Arc<InterceptSession>,
    config: EngineConfig,
}

impl PreviewEngine {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        session: Arc<InterceptSession>,
        config: EngineConfig,
    ) -> Self {
        let navigator =
            PageNavigator::new(driver, config.navigator.clone(), config.delays.clone());
        Self { navigator, session, config }
    }

    /// Runs the full scan. Never mutates any record.
    pub async fn run(&self, request: PreviewRequest) -> PreviewOutcome {
        let rule = request
            .rule
            .clone()
            .unwrap_or_else(|| compile_rule(&request.filters));
        info!(rule = %rule.summary(), "starting preview scan");

        let prepared = self.navigator.prepare_page_for_execution().await;
        if !prepared.success {
            let error = prepared.errors.join("; ");
            warn!(error, "preview aborted during preparation");
            self.emit_error(&request, 0, 0, 0, &error);
            return PreviewOutcome {
                success: false,
                matched_records: Vec::new(),
                total_scanned: 0,
                total_pages: 0,
                error: Some(error),
            };
        }

        let retry = self.retry_policy(request.max_retries);
        let mut scanned: u64 = 0;
        let mut matched_records: Vec<Activity> = Vec::new();
        let mut page: u32 = 1;
        let mut pages_done: u32 = 0;
        let mut estimated_total: Option<u64> = None;
        let mut consecutive_errors: u32 = 0;

        loop {
            match self.scan_page(page, &retry).await {
                Some((records, total)) => {
                    consecutive_errors = 0;
                    if estimated_total.is_none() {
                        estimated_total = total.map(u64::from);
                    }
                    scanned += records.len() as u64;
                    matched_records
                        .extend(filter_records(&records, &rule).into_iter().cloned());
                    pages_done = page;
                    self.emit(&request, PreviewProgress {
                        current_page: page,
                        scanned,
                        matched: matched_records.len() as u64,
                        estimated_total,
                        status: PreviewStatus::Scanning,
                        error: None,
                    });
                    if should_stop_paging(&records, &rule) {
                        debug!(page, "remaining records are older than every filter window");
                        break;
                    }
                }
                None => {
                    consecutive_errors += 1;
                    // without page 1 there is nothing meaningful to report
                    if page == 1 {
                        let error = "no response captured for the first page".to_string();
                        warn!("preview aborted: {error}");
                        self.emit_error(
                            &request,
                            page,
                            scanned,
                            matched_records.len() as u64,
                            &error,
                        );
                        return PreviewOutcome {
                            success: false,
                            matched_records,
                            total_scanned: scanned,
                            total_pages: 0,
                            error: Some(error),
                        };
                    }
                    if request.stop_on_error || consecutive_errors >= MAX_CONSECUTIVE_PAGE_ERRORS {
                        let error = format!("page {page} could not be scanned");
                        warn!("preview aborted: {error}");
                        self.emit_error(
                            &request,
                            page,
                            scanned,
                            matched_records.len() as u64,
                            &error,
                        );
                        return PreviewOutcome {
                            success: false,
                            matched_records,
                            total_scanned: scanned,
                            total_pages: pages_done,
                            error: Some(error),
                        };
                    }
                    warn!(page, consecutive_errors, "skipping unreadable page");
                }
            }

            if !self.navigator.has_next_page().await {
                break;
            }
            if !self.navigator.go_to_next_page().await {
                warn!(page, "could not advance past page, ending scan");
                break;
            }
            page += 1;
        }

        info!(
            matched = matched_records.len(),
            scanned,
            pages = pages_done,
            "preview scan finished"
        );
        self.emit(&request, PreviewProgress {
            current_page: pages_done,
            scanned,
            matched: matched_records.len() as u64,
            estimated_total,
            status: PreviewStatus::Completed,
            error: None,
        });
        PreviewOutcome {
            success: true,
            matched_records,
            total_scanned: scanned,
            total_pages: pages_done,
            error: None,
        }
    }

    fn retry_policy(&self, max_retries: Option<u32>) -> RetryPolicy {
        let mut config = self.config.retry.clone();
        if let Some(max) = max_retries {
            config.max_attempts = max.max(1);
        }
        RetryPolicy::new(&config)
    }

    /// Cache first; on a miss, wait for the in-flight response, backing off
    /// between attempts.
    async fn scan_page(
        &self,
        page: u32,
        retry: &RetryPolicy,
    ) -> Option<(Vec<Activity>, Option<u32>)> {
        if let Some(cached) = self.session.cache().get(page).await {
            debug!(page, records = cached.records.len(), "serving page from cache");
            return Some((cached.records, cached.total));
        }
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if let Some((records, info)) = self
                .session
                .wait_for_next_response(self.config.delays.response_wait_timeout())
                .await
            {
                return Some((records, info.total));
            }
            // a response may have landed while no waiter was registered
            if let Some(cached) = self.session.cache().get(page).await {
                return Some((cached.records, cached.total));
            }
            if !retry.should_retry(attempt) {
                return None;
            }
            retry.backoff(attempt).await;
        }
    }

    fn emit(&self, request: &PreviewRequest, progress: PreviewProgress) {
        if let Some(sink) = &request.on_progress {
            sink(progress);
        }
    }

    fn emit_error(
        &self,
        request: &PreviewRequest,
        page: u32,
        scanned: u64,
        matched: u64,
        error: &str,
    ) {
        self.emit(request, PreviewProgress {
            current_page: page,
            scanned,
            matched,
            estimated_total: None,
            status: PreviewStatus::Error,
            error: Some(error.to_string()),
        });
    }
}
