//! Passive interceptor for activity-list responses.
//!
//! The host page wraps `fetch`/XHR and forwards every completed response
//! here. [`InterceptSession::observe`] filters for the training-activities
//! endpoint, parses whichever envelope shape the backend happened to use,
//! caches the page, and wakes any pipeline currently waiting on the next
//! response. Malformed bodies are logged and swallowed; interception must
//! never break the page.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::domain::activity::Activity;
use crate::infrastructure::cache::ResponseCache;

static LIST_ENDPOINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/athlete/training_activities(?:\?|$)")
        .unwrap_or_else(|e| panic!("invalid endpoint pattern: {e}"))
});

/// Pagination metadata extracted from a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub page: u32,
    pub page_size: u32,
    pub total: Option<u32>,
}

impl Default for PageInfo {
    fn default() -> Self {
        Self { page: 1, page_size: 20, total: None }
    }
}

/// The envelope shapes the list endpoint is known to use.
#[derive(Debug)]
enum ListPayload {
    /// `{ "models": [...], "page": n, "perPage": n, "total": n }`
    Models(Value),
    /// `{ "data": [...] }`
    Data(Value),
    /// A bare JSON array of records.
    Bare(Value),
    Unrecognized,
}

fn classify(body: Value) -> ListPayload {
    match &body {
        Value::Array(_) => ListPayload::Bare(body),
        Value::Object(map) => {
            if map.get("models").is_some_and(Value::is_array) {
                ListPayload::Models(body)
            } else if map.get("data").is_some_and(Value::is_array) {
                ListPayload::Data(body)
            } else {
                ListPayload::Unrecognized
            }
        }
        _ => ListPayload::Unrecognized,
    }
}

fn u32_field(map: &Value, key: &str) -> Option<u32> {
    map.get(key).and_then(Value::as_u64).and_then(|v| u32::try_from(v).ok())
}

fn parse_records(items: Value) -> Vec<Activity> {
    let Value::Array(items) = items else { return Vec::new() };
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<Activity>(item) {
            Ok(record) => records.push(record),
            Err(e) => warn!(error = %e, "skipping unparseable record"),
        }
    }
    records
}

/// Parses a matching response body into records plus page metadata.
/// `None` means the shape was unrecognized.
fn parse_list_body(body: Value) -> Option<(Vec<Activity>, PageInfo)> {
    match classify(body) {
        ListPayload::Models(mut envelope) => {
            let mut info = PageInfo::default();
            if let Some(page) = u32_field(&envelope, "page") {
                info.page = page.max(1);
            }
            if let Some(per_page) = u32_field(&envelope, "perPage") {
                info.page_size = per_page.max(1);
            }
            info.total = u32_field(&envelope, "total");
            let items = envelope
                .as_object_mut()
                .and_then(|m| m.remove("models"))
                .unwrap_or(Value::Null);
            Some((parse_records(items), info))
        }
        ListPayload::Data(mut envelope) => {
            let items = envelope
                .as_object_mut()
                .and_then(|m| m.remove("data"))
                .unwrap_or(Value::Null);
            Some((parse_records(items), PageInfo::default()))
        }
        ListPayload::Bare(items) => Some((parse_records(items), PageInfo::default())),
        ListPayload::Unrecognized => None,
    }
}

type ResponseWaiter = oneshot::Sender<(Vec<Activity>, PageInfo)>;

/// One interception session, owning its cache and waiter list. Created per
/// engine instance; dropping it drops all captured state.
pub struct InterceptSession {
    cache: Arc<ResponseCache>,
    waiters: Mutex<Vec<ResponseWaiter>>,
}

impl InterceptSession {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            cache: Arc::new(ResponseCache::new(cache_ttl)),
            waiters: Mutex::new(Vec::new()),
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Feed point for the host page. Non-matching URLs are ignored; matching
    /// responses are parsed, cached, and delivered to every pending waiter.
    pub async fn observe(&self, url: &str, body: &str) {
        if !LIST_ENDPOINT.is_match(url) {
            return;
        }
        let value: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => {
                warn!(url, error = %e, "ignoring unparseable list response");
                return;
            }
        };
        let Some((records, info)) = parse_list_body(value) else {
            warn!(url, "ignoring list response with unrecognized shape");
            return;
        };
        debug!(url, page = info.page, records = records.len(), "intercepted list response");
        self.cache
            .put(info.page, records.clone(), Some(info.page_size), info.total)
            .await;
        let mut waiters = self.waiters.lock().await;
        for waiter in waiters.drain(..) {
            // a waiter whose receiver is gone is fine to drop silently
            let _ = waiter.send((records.clone(), info));
        }
    }

    /// Waits for the next matching response, up to `wait`. Returns `None` on
    /// timeout. An empty page still counts as a response.
    pub async fn wait_for_next_response(
        &self,
        wait: Duration,
    ) -> Option<(Vec<Activity>, PageInfo)> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.push(tx);
        match timeout(wait, rx).await {
            Ok(Ok(captured)) => Some(captured),
            Ok(Err(_)) | Err(_) => {
                // drop our stale sender so the list does not grow unbounded
                self.waiters.lock().await.retain(|w| !w.is_closed());
                None
            }
        }
    }

    pub async fn is_listening(&self) -> bool {
        !self.waiters.lock().await.is_empty()
    }
}

impl std::fmt::Debug for InterceptSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptSession").field("cache", &self.cache).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_URL: &str = "https://example.com/athlete/training_activities?page=2";

    fn models_body(ids: &[&str], page: u32) -> String {
        let models: Vec<Value> = ids
            .iter()
            .map(|id| serde_json::json!({ "id": id, "name": format!("ride {id}") }))
            .collect();
        serde_json::json!({ "models": models, "page": page, "perPage": 20, "total": 41 })
            .to_string()
    }

    #[tokio::test]
    async fn matching_response_is_cached() {
        let session = InterceptSession::new(Duration::from_secs(300));
        session.observe(LIST_URL, &models_body(&["1", "2"], 2)).await;
        let cached = session.cache().get(2).await.unwrap();
        assert_eq!(cached.records.len(), 2);
        assert_eq!(cached.total, Some(41));
    }

    #[tokio::test]
    async fn non_matching_url_is_ignored() {
        let session = InterceptSession::new(Duration::from_secs(300));
        session
            .observe("https://example.com/athlete/profile", &models_body(&["1"], 1))
            .await;
        assert_eq!(session.cache().stats().await.page_count, 0);
    }

    #[tokio::test]
    async fn malformed_body_is_swallowed() {
        let session = InterceptSession::new(Duration::from_secs(300));
        session.observe(LIST_URL, "not json at all").await;
        session.observe(LIST_URL, r#"{"something": "else"}"#).await;
        assert_eq!(session.cache().stats().await.page_count, 0);
    }

    #[tokio::test]
    async fn bare_array_and_data_envelope_default_to_page_one() {
        let session = InterceptSession::new(Duration::from_secs(300));
        session.observe(LIST_URL, r#"[{"id": 7, "name": "a"}]"#).await;
        let cached = session.cache().get(1).await.unwrap();
        assert_eq!(cached.records[0].id, "7");

        session
            .observe(LIST_URL, r#"{"data": [{"id": 8, "name": "b"}]}"#)
            .await;
        let cached = session.cache().get(1).await.unwrap();
        assert_eq!(cached.records[0].id, "8");
    }

    #[tokio::test]
    async fn waiter_is_woken_by_next_response() {
        let session = Arc::new(InterceptSession::new(Duration::from_secs(300)));
        let feed = Arc::clone(&session);
        let waiter = tokio::spawn(async move {
            session.wait_for_next_response(Duration::from_secs(5)).await
        });
        // let the waiter register before feeding
        tokio::task::yield_now().await;
        while !feed.is_listening().await {
            tokio::task::yield_now().await;
        }
        feed.observe(LIST_URL, &models_body(&["9"], 3)).await;
        let (records, info) = waiter.await.unwrap().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(info.page, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_without_a_response() {
        let session = InterceptSession::new(Duration::from_secs(300));
        let captured = session.wait_for_next_response(Duration::from_secs(3)).await;
        assert!(captured.is_none());
        assert!(!session.is_listening().await);
    }

    #[tokio::test]
    async fn empty_page_still_wakes_waiters() {
        let session = Arc::new(InterceptSession::new(Duration::from_secs(300)));
        let feed = Arc::clone(&session);
        let waiter = tokio::spawn(async move {
            session.wait_for_next_response(Duration::from_secs(5)).await
        });
        while !feed.is_listening().await {
            tokio::task::yield_now().await;
        }
        feed.observe(LIST_URL, &models_body(&[], 3)).await;
        let (records, _) = waiter.await.unwrap().unwrap();
        assert!(records.is_empty());
    }
}
