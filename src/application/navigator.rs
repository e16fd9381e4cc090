//! Page navigation over the rendered activity list.
//!
//! The navigator owns the awkward parts of driving someone else's UI:
//! polling for readiness instead of sleeping blind, decoding the
//! `"21-40 of 41"` pagination indicator, and forcing the list back to page 1
//! via the date-sort control, which is the only reset the page offers.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

use crate::infrastructure::config::{DelayConfig, NavigatorConfig};
use crate::infrastructure::page_driver::{ControlState, PageDriver, RowSnapshot};

static RANGE_INDICATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)\s*[-–]\s*(\d+)\s*of\s*(\d+)\s*$")
        .unwrap_or_else(|e| panic!("invalid range pattern: {e}"))
});

static DETAIL_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/activities/(\d+)")
        .unwrap_or_else(|e| panic!("invalid href pattern: {e}"))
});

/// Outcome of [`PageNavigator::prepare_page_for_execution`].
#[derive(Debug, Clone)]
pub struct PrepareResult {
    pub success: bool,
    pub errors: Vec<String>,
}

pub struct PageNavigator {
    driver: Arc<dyn PageDriver>,
    config: NavigatorConfig,
    delays: DelayConfig,
}

impl PageNavigator {
    pub fn new(driver: Arc<dyn PageDriver>, config: NavigatorConfig, delays: DelayConfig) -> Self {
        Self { driver, config, delays }
    }

    pub fn driver(&self) -> &Arc<dyn PageDriver> {
        &self.driver
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    /// Polls until the document is ready and at least one row is rendered,
    /// or the timeout elapses. Returns whether the page became usable.
    pub async fn wait_for_load(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.driver.is_ready().await {
                match self.driver.visible_rows().await {
                    Ok(rows) if !rows.is_empty() => return true,
                    Ok(_) | Err(_) => {}
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.poll_interval()).await;
        }
    }

    pub async fn wait_for_page_load(&self) -> bool {
        self.wait_for_load(Duration::from_millis(self.config.page_load_timeout_ms)).await
    }

    /// Current page number, derived from the pagination indicator. The
    /// indicator is either a literal page number or a `"21-40 of 41"` range;
    /// anything unreadable is reported as page 1 rather than an error.
    pub async fn current_page(&self) -> u32 {
        let Some(text) = self.driver.page_indicator_text().await else {
            return 1;
        };
        let trimmed = text.trim();
        if let Ok(page) = trimmed.parse::<u32>() {
            return page.max(1);
        }
        if let Some(caps) = RANGE_INDICATOR.captures(trimmed) {
            if let Ok(start_item) = caps[1].parse::<u32>() {
                let per_page = self.config.items_per_page.max(1);
                return (start_item.saturating_sub(1)) / per_page + 1;
            }
        }
        debug!(indicator = trimmed, "unreadable page indicator, assuming page 1");
        1
    }

    pub async fn has_next_page(&self) -> bool {
        self.driver.next_control().await == ControlState::Enabled
    }

    /// Clicks "next" and waits for the page to advance. Returns whether the
    /// current page actually changed; the caller decides whether to retry.
    pub async fn go_to_next_page(&self) -> bool {
        let before = self.current_page().await;
        if self.driver.next_control().await != ControlState::Enabled {
            return false;
        }
        if let Err(e) = self.driver.click_next().await {
            warn!(error = %e, "next-page click failed");
            return false;
        }
        if !self.wait_for_page_load().await {
            return false;
        }
        let after = self.current_page().await;
        debug!(before, after, "advanced page");
        after > before
    }

    /// Forces the list back to page 1 by clicking the date-sort control,
    /// which always reloads the first page. Retries with a fixed delay.
    pub async fn ensure_first_page(&self, max_retries: u32) -> bool {
        if self.current_page().await == 1 {
            return true;
        }
        for attempt in 1..=max_retries.max(1) {
            if self.driver.sort_control().await != ControlState::Enabled {
                warn!("sort control unavailable, cannot reset to first page");
                return false;
            }
            if let Err(e) = self.driver.click_sort().await {
                warn!(attempt, error = %e, "sort click failed");
            } else {
                self.wait_for_page_load().await;
                if self.current_page().await == 1 {
                    debug!(attempt, "reset to first page");
                    return true;
                }
            }
            sleep(Duration::from_millis(self.config.navigation_retry_delay_ms)).await;
        }
        false
    }

    /// Makes sure the list is sorted newest-first, clicking the sort header
    /// once more when it currently shows oldest-first.
    pub async fn ensure_time_sorted(&self) -> bool {
        match self.driver.sort_is_descending().await {
            Some(true) => true,
            Some(false) => {
                for attempt in 1..=self.config.sort_retries.max(1) {
                    if let Err(e) = self.driver.click_sort().await {
                        warn!(attempt, error = %e, "sort toggle failed");
                        continue;
                    }
                    self.wait_for_page_load().await;
                    if self.driver.sort_is_descending().await == Some(true) {
                        return true;
                    }
                }
                false
            }
            None => {
                warn!("sort direction unreadable, proceeding unsorted");
                false
            }
        }
    }

    /// Checks every precondition a pipeline needs before touching the page.
    pub async fn validate_environment(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.driver.is_ready().await {
            errors.push("page is not finished loading".to_string());
        }
        if !self.driver.on_activity_page().await {
            errors.push("not on the activity list page".to_string());
        }
        match self.driver.visible_rows().await {
            Ok(rows) if rows.is_empty() => {
                errors.push("no activity rows are visible".to_string());
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("cannot read activity rows: {e}")),
        }
        if self.driver.sort_control().await == ControlState::Missing {
            errors.push("date sort control is missing".to_string());
        }
        errors
    }

    /// Full pre-flight: validate, reset to page 1, sort newest-first, and
    /// give the page its configured settle delay.
    pub async fn prepare_page_for_execution(&self) -> PrepareResult {
        let mut errors = self.validate_environment().await;
        if !errors.is_empty() {
            return PrepareResult { success: false, errors };
        }
        if !self.ensure_first_page(self.config.first_page_retries).await {
            errors.push("could not navigate back to the first page".to_string());
            return PrepareResult { success: false, errors };
        }
        // an unsorted list breaks the descending-date premise the pagination
        // stop heuristic rests on, so it is not safe to walk
        if !self.ensure_time_sorted().await {
            errors.push("could not sort the list newest-first".to_string());
            return PrepareResult { success: false, errors };
        }
        sleep(self.delays.page_load()).await;
        PrepareResult { success: true, errors }
    }
}

/// Pulls the activity id off a row: the data attribute when present,
/// otherwise the numeric id from the detail link.
pub fn extract_activity_id(row: &RowSnapshot) -> Option<String> {
    if let Some(id) = row.activity_id_attr.as_deref() {
        let id = id.trim();
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }
    row.href
        .as_deref()
        .and_then(|href| DETAIL_HREF.captures(href))
        .map(|caps| caps[1].to_string())
}
