//! Test support: canned activity datasets and a scripted page driver that
//! replays list pages through the interceptor the way the real page would.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use crate::domain::activity::{Activity, DateRange, FilterCriteria};
use crate::infrastructure::intercept::InterceptSession;
use crate::infrastructure::page_driver::{
    ControlState, DriverError, FormField, PageDriver, RowHandle, RowSnapshot,
};

const LIST_URL: &str = "https://www.example.com/athlete/training_activities?page=1";

/// Builds one canned activity record.
pub fn make_activity(
    id: &str,
    sport: &str,
    start_time: &str,
    distance_m: f64,
    gear: Option<&str>,
) -> Activity {
    Activity {
        id: id.to_string(),
        name: format!("{sport} {id}"),
        sport_type: sport.to_string(),
        start_time: Some(start_time.to_string()),
        start_date_local_raw: None,
        distance_raw: Some(distance_m),
        moving_time_raw: Some(3600),
        elapsed_time_raw: Some(3700),
        elevation_gain_raw: Some(120.0),
        visibility: Some("everyone".to_string()),
        bike_id: gear.map(str::to_string),
        athlete_gear_id: None,
        workout_type: None,
        ride_type: None,
        selected_tag_type: None,
        trainer: Some(false),
        commute: Some(false),
    }
}

/// Ten records, newest first: six January-2025 rides on `bike_1`, plus four
/// records a Ride/January filter must not touch.
pub fn sample_activities() -> Vec<Activity> {
    vec![
        make_activity("1", "Ride", "2025-03-10T08:00:00+0000", 30_000.0, Some("bike_1")),
        make_activity("2", "Run", "2025-02-15T07:30:00+0000", 10_000.0, None),
        make_activity("3", "Ride", "2025-01-28T10:00:00+0000", 42_195.0, Some("bike_1")),
        make_activity("4", "Ride", "2025-01-25T09:15:00+0000", 55_000.0, Some("bike_1")),
        make_activity("5", "Ride", "2025-01-20T18:00:00+0000", 21_000.0, Some("bike_1")),
        make_activity("6", "Swim", "2025-01-18T06:45:00+0000", 2_000.0, None),
        make_activity("7", "Ride", "2025-01-10T11:30:00+0000", 80_500.0, Some("bike_1")),
        make_activity("8", "Ride", "2025-01-05T15:00:00+0000", 12_300.0, Some("bike_1")),
        make_activity("9", "Ride", "2025-01-02T08:20:00+0000", 64_000.0, Some("bike_1")),
        make_activity("10", "Ride", "2024-12-20T14:00:00+0000", 45_000.0, Some("bike_1")),
    ]
}

/// A filter that matches exactly the six January rides in
/// [`sample_activities`]: Ride, January 2025, up to 300 km.
pub fn january_ride_filter() -> FilterCriteria {
    FilterCriteria {
        sport_types: vec!["Ride".to_string()],
        date_ranges: vec![DateRange {
            start: Some("2025-01-01".to_string()),
            end: Some("2025-01-31".to_string()),
        }],
        distance_range: Some((0.0, 300.0)),
        ride_types: Vec::new(),
    }
}

/// Splits records into fixed-size pages, preserving order.
pub fn paged(records: Vec<Activity>, per_page: usize) -> Vec<Vec<Activity>> {
    records
        .chunks(per_page.max(1))
        .map(<[Activity]>::to_vec)
        .collect()
}

struct ScriptState {
    pages: Vec<Vec<Activity>>,
    per_page: usize,
    current_page: usize,
    sort_descending: bool,
    /// When set, sort clicks reload page 1 but never flip the direction.
    sort_stuck: bool,
    open_row: Option<u64>,
    staged: HashMap<u64, Vec<(FormField, String)>>,
    missing_fields: HashSet<FormField>,
    /// Remaining submit failures per record id.
    submit_failures: HashMap<String, u32>,
}

impl ScriptState {
    fn total(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    fn handle_for(&self, row_idx: usize) -> u64 {
        (self.current_page * 1000 + row_idx) as u64
    }

    fn record_at(&mut self, handle: u64) -> Option<&mut Activity> {
        let page = (handle / 1000) as usize;
        let idx = (handle % 1000) as usize;
        if page != self.current_page {
            return None;
        }
        self.pages.get_mut(page).and_then(|p| p.get_mut(idx))
    }

    fn page_body(&self) -> String {
        let records: Vec<serde_json::Value> = self.pages[self.current_page]
            .iter()
            .map(|r| serde_json::to_value(r).unwrap_or_default())
            .collect();
        json!({
            "models": records,
            "page": self.current_page + 1,
            "perPage": self.per_page,
            "total": self.total(),
        })
        .to_string()
    }
}

/// In-memory stand-in for the live page. Pagination clicks replay the
/// corresponding list response into the interceptor, submits mutate the
/// backing records, and failure injection covers the retry paths.
pub struct ScriptedPageDriver {
    session: Arc<InterceptSession>,
    state: Mutex<ScriptState>,
}

impl ScriptedPageDriver {
    /// Builds the driver and replays the initial page-1 response, the same
    /// request the real page fires while first rendering the list.
    pub async fn new(
        session: Arc<InterceptSession>,
        pages: Vec<Vec<Activity>>,
        per_page: usize,
    ) -> Self {
        let driver = Self {
            session,
            state: Mutex::new(ScriptState {
                pages,
                per_page,
                current_page: 0,
                sort_descending: true,
                sort_stuck: false,
                open_row: None,
                staged: HashMap::new(),
                missing_fields: HashSet::new(),
                submit_failures: HashMap::new(),
            }),
        };
        driver.replay_current_page().await;
        driver
    }

    /// Marks a form field as absent from the quick-edit form.
    pub async fn without_field(&self, field: FormField) {
        self.state.lock().await.missing_fields.insert(field);
    }

    /// Wedges the sort oldest-first: clicks keep reloading page 1 but the
    /// direction indicator never flips.
    pub async fn stick_sort_ascending(&self) {
        let mut state = self.state.lock().await;
        state.sort_descending = false;
        state.sort_stuck = true;
    }

    /// Makes the next `count` submits for `id` fail before succeeding.
    pub async fn fail_submits(&self, id: &str, count: u32) {
        self.state.lock().await.submit_failures.insert(id.to_string(), count);
    }

    /// Current state of one record, for assertions.
    pub async fn record(&self, id: &str) -> Option<Activity> {
        let state = self.state.lock().await;
        state.pages.iter().flatten().find(|r| r.id == id).cloned()
    }

    /// Copy of the full dataset, edits included.
    pub async fn snapshot_pages(&self) -> Vec<Vec<Activity>> {
        self.state.lock().await.pages.clone()
    }

    async fn replay_current_page(&self) {
        let body = self.state.lock().await.page_body();
        self.session.observe(LIST_URL, &body).await;
    }
}

#[async_trait]
impl PageDriver for ScriptedPageDriver {
    async fn is_ready(&self) -> bool {
        true
    }

    async fn on_activity_page(&self) -> bool {
        true
    }

    async fn visible_rows(&self) -> Result<Vec<RowSnapshot>, DriverError> {
        let state = self.state.lock().await;
        Ok(state.pages[state.current_page]
            .iter()
            .enumerate()
            .map(|(idx, record)| RowSnapshot {
                handle: RowHandle(state.handle_for(idx)),
                activity_id_attr: Some(record.id.clone()),
                href: Some(format!("/activities/{}", record.id)),
            })
            .collect())
    }

    async fn page_indicator_text(&self) -> Option<String> {
        let state = self.state.lock().await;
        let start = state.current_page * state.per_page + 1;
        let end = start + state.pages[state.current_page].len().max(1) - 1;
        Some(format!("{start}-{end} of {}", state.total()))
    }

    async fn next_control(&self) -> ControlState {
        let state = self.state.lock().await;
        if state.current_page + 1 < state.pages.len() {
            ControlState::Enabled
        } else {
            ControlState::Disabled
        }
    }

    async fn click_next(&self) -> Result<(), DriverError> {
        {
            let mut state = self.state.lock().await;
            if state.current_page + 1 >= state.pages.len() {
                return Err(DriverError::InteractionFailed("no next page".into()));
            }
            state.current_page += 1;
            state.open_row = None;
        }
        self.replay_current_page().await;
        Ok(())
    }

    async fn sort_control(&self) -> ControlState {
        ControlState::Enabled
    }

    async fn sort_is_descending(&self) -> Option<bool> {
        Some(self.state.lock().await.sort_descending)
    }

    async fn click_sort(&self) -> Result<(), DriverError> {
        {
            let mut state = self.state.lock().await;
            state.current_page = 0;
            if !state.sort_stuck {
                state.sort_descending = !state.sort_descending;
            }
            state.open_row = None;
        }
        self.replay_current_page().await;
        Ok(())
    }

    async fn open_quick_edit(&self, row: RowHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        if state.record_at(row.0).is_none() {
            return Err(DriverError::ElementNotFound(format!("row {}", row.0)));
        }
        state.open_row = Some(row.0);
        Ok(())
    }

    async fn set_field(
        &self,
        row: RowHandle,
        field: FormField,
        value: &str,
    ) -> Result<bool, DriverError> {
        let mut state = self.state.lock().await;
        if state.open_row != Some(row.0) {
            return Err(DriverError::InteractionFailed("quick edit is not open".into()));
        }
        if state.missing_fields.contains(&field) {
            return Ok(false);
        }
        state.staged.entry(row.0).or_default().push((field, value.to_string()));
        Ok(true)
    }

    async fn submit_edit(&self, row: RowHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        if state.open_row != Some(row.0) {
            return Err(DriverError::InteractionFailed("quick edit is not open".into()));
        }
        let id = state
            .record_at(row.0)
            .map(|r| r.id.clone())
            .ok_or_else(|| DriverError::ElementNotFound(format!("row {}", row.0)))?;
        if let Some(remaining) = state.submit_failures.get_mut(&id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::InteractionFailed(format!(
                    "save request for {id} rejected"
                )));
            }
        }
        let staged = state.staged.remove(&row.0).unwrap_or_default();
        if let Some(record) = state.record_at(row.0) {
            for (field, value) in staged {
                match field {
                    FormField::Bike => record.bike_id = Some(value),
                    FormField::Shoes => record.athlete_gear_id = Some(value),
                    FormField::Visibility => record.visibility = Some(value),
                    FormField::RideType => record.ride_type = Some(value),
                }
            }
        }
        state.open_row = None;
        Ok(())
    }

    async fn confirm_saved(&self, row: RowHandle) -> Result<(), DriverError> {
        let state = self.state.lock().await;
        if state.open_row == Some(row.0) {
            return Err(DriverError::SaveNotConfirmed(format!("row {}", row.0)));
        }
        Ok(())
    }
}
