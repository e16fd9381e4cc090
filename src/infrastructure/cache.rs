//! In-memory cache of intercepted list responses, keyed by page number.
//!
//! The interceptor writes every parsed page here regardless of whether a
//! pipeline is waiting, which is what lets a later preview start from data
//! that arrived before any listener existed. Entries live for a fixed TTL
//! (5 minutes by default), after which they are treated as absent and
//! evicted on read. Purely process-lifetime state; nothing persists.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::domain::activity::Activity;

/// One cached page capture.
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub page: u32,
    pub records: Vec<Activity>,
    pub captured_at: Instant,
    pub page_size: Option<u32>,
    pub total: Option<u32>,
}

/// Cache summary for debugging surfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub page_count: usize,
    pub total_records: usize,
    /// Age of the oldest live entry.
    pub oldest_age: Option<Duration>,
    /// Age of the newest live entry.
    pub newest_age: Option<Duration>,
}

/// TTL-bounded page cache. Owned by an
/// [`crate::infrastructure::intercept::InterceptSession`], never a global.
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<HashMap<u32, CachedPage>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Mutex::new(HashMap::new()), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Overwrites any existing entry for `page` with a fresh timestamp.
    pub async fn put(
        &self,
        page: u32,
        records: Vec<Activity>,
        page_size: Option<u32>,
        total: Option<u32>,
    ) {
        debug!(page, records = records.len(), "caching page");
        let entry = CachedPage { page, records, captured_at: Instant::now(), page_size, total };
        self.entries.lock().await.insert(page, entry);
    }

    /// Returns the live entry for `page`, evicting it first if it has
    /// outlived the TTL. Never serves an expired capture.
    pub async fn get(&self, page: u32) -> Option<CachedPage> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(&page) {
            Some(entry) if now.duration_since(entry.captured_at) <= self.ttl => {
                Some(entry.clone())
            }
            Some(_) => {
                debug!(page, "evicting expired cache entry");
                entries.remove(&page);
                None
            }
            None => None,
        }
    }

    /// All live records, concatenated in ascending page order.
    pub async fn get_all_ordered(&self) -> Vec<Activity> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        let mut pages: Vec<&CachedPage> = entries
            .values()
            .filter(|e| now.duration_since(e.captured_at) <= self.ttl)
            .collect();
        pages.sort_by_key(|e| e.page);
        pages.iter().flat_map(|e| e.records.iter().cloned()).collect()
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        debug!(pages = count, "cleared response cache");
    }

    /// Drops every expired entry without touching live ones.
    pub async fn clear_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| now.duration_since(e.captured_at) <= self.ttl);
    }

    pub async fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        let live: Vec<&CachedPage> = entries
            .values()
            .filter(|e| now.duration_since(e.captured_at) <= self.ttl)
            .collect();
        CacheStats {
            page_count: live.len(),
            total_records: live.iter().map(|e| e.records.len()).sum(),
            oldest_age: live.iter().map(|e| now.duration_since(e.captured_at)).max(),
            newest_age: live.iter().map(|e| now.duration_since(e.captured_at)).min(),
        }
    }
}
