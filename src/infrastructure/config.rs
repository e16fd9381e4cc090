//! Engine configuration.
//!
//! Timing, retry and cache knobs consumed by the navigator and the
//! pipelines. Defaults mirror production pacing against the live host; the
//! fast profile shortens every wait for tests and local development.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub delays: DelayConfig,
    pub retry: RetryConfig,
    pub navigator: NavigatorConfig,
    /// Response-cache entry lifetime in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delays: DelayConfig::default(),
            retry: RetryConfig::default(),
            navigator: NavigatorConfig::default(),
            cache_ttl_secs: 5 * 60,
        }
    }
}

impl EngineConfig {
    /// Shortened waits for tests and development runs.
    pub fn fast_profile() -> Self {
        Self {
            delays: DelayConfig {
                quick_edit_click_ms: 200,
                form_fill_ms: 100,
                submit_save_ms: 500,
                page_load_ms: 1000,
                random_min_ms: 0,
                random_max_ms: 0,
                response_wait_timeout_ms: 2000,
            },
            retry: RetryConfig { base_delay_ms: 500, ..RetryConfig::default() },
            navigator: NavigatorConfig {
                page_load_timeout_ms: 1000,
                poll_interval_ms: 10,
                navigation_retry_delay_ms: 10,
                ..NavigatorConfig::default()
            },
            cache_ttl_secs: 5 * 60,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Loads configuration from a JSON file, falling back to defaults when
    /// the file does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Persists the configuration as pretty-printed JSON.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create config dir {}", parent.display()))?;
        }
        fs::write(path, raw)
            .await
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }
}

/// Fixed and randomized pacing delays, in milliseconds.
///
/// The random component is layered on top of the fixed delays between
/// record updates so the outgoing request pattern does not look bursty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DelayConfig {
    /// Wait after opening a row's inline edit form.
    pub quick_edit_click_ms: u64,
    /// Wait after filling form fields.
    pub form_fill_ms: u64,
    /// Wait after submitting an edit.
    pub submit_save_ms: u64,
    /// Wait budget for a page reload to settle.
    pub page_load_ms: u64,
    pub random_min_ms: u64,
    pub random_max_ms: u64,
    /// How long a pipeline waits for the next intercepted list response.
    pub response_wait_timeout_ms: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            quick_edit_click_ms: 500,
            form_fill_ms: 300,
            submit_save_ms: 1500,
            page_load_ms: 2000,
            random_min_ms: 100,
            random_max_ms: 1000,
            response_wait_timeout_ms: 3000,
        }
    }
}

impl DelayConfig {
    pub fn page_load(&self) -> Duration {
        Duration::from_millis(self.page_load_ms)
    }

    pub fn response_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.response_wait_timeout_ms)
    }

    /// A randomized pacing delay between `random_min_ms` and
    /// `random_max_ms`, added on top of `base`.
    pub fn jittered(&self, base: Duration) -> Duration {
        if self.random_max_ms <= self.random_min_ms {
            return base + Duration::from_millis(self.random_min_ms);
        }
        let extra = fastrand::u64(self.random_min_ms..=self.random_max_ms);
        base + Duration::from_millis(extra)
    }
}

/// Retry policy knobs shared by page scans and record updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            jitter: false,
        }
    }
}

/// Page-walking knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NavigatorConfig {
    /// The host renders 20 rows per page; the page number is derived from
    /// the item-range indicator under that assumption.
    pub items_per_page: u32,
    pub page_load_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Attempts to reach page 1 through the sort control.
    pub first_page_retries: u32,
    /// Attempts to settle the descending-by-date sort.
    pub sort_retries: u32,
    /// Fixed backoff between navigation retries.
    pub navigation_retry_delay_ms: u64,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            items_per_page: 20,
            page_load_timeout_ms: 10_000,
            poll_interval_ms: 100,
            first_page_retries: 3,
            sort_retries: 2,
            navigation_retry_delay_ms: 1000,
        }
    }
}
