//! Activity records and the user-facing criteria types.
//!
//! An [`Activity`] is a read-mostly snapshot of one training-log entry on the
//! remote host. Snapshots only materialize from intercepted list responses or
//! page scraping; the engine never creates them locally, and a snapshot is
//! considered stale as soon as the remote record changes (bounded by the
//! response-cache TTL).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// One fitness-activity entry, as delivered by the remote list endpoint.
///
/// The wire shape is tolerant: fields the host omits become `None`, unknown
/// fields are ignored, and the id may arrive as a number or a string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    #[serde(deserialize_with = "de_stringish")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sport_type: String,
    /// Start time as the host renders it, e.g. `"2025-11-01T01:00:00+0000"`.
    #[serde(default)]
    pub start_time: Option<String>,
    /// Local start timestamp in seconds, when present.
    #[serde(default)]
    pub start_date_local_raw: Option<i64>,
    /// Distance in meters.
    #[serde(default)]
    pub distance_raw: Option<f64>,
    /// Moving time in seconds.
    #[serde(default)]
    pub moving_time_raw: Option<u64>,
    /// Elapsed time in seconds.
    #[serde(default)]
    pub elapsed_time_raw: Option<u64>,
    /// Elevation gain in meters.
    #[serde(default)]
    pub elevation_gain_raw: Option<f64>,
    /// Privacy level: `everyone`, `followers_only` or `only_me`.
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub bike_id: Option<String>,
    #[serde(default)]
    pub athlete_gear_id: Option<String>,
    /// Numeric workout classification used by some list views.
    #[serde(default)]
    pub workout_type: Option<i64>,
    /// Ride sub-classification, e.g. `Race`, `Workout`, `Commute`.
    #[serde(default)]
    pub ride_type: Option<String>,
    /// Tag variant of the ride classification returned by newer payloads.
    #[serde(default, deserialize_with = "de_opt_stringish")]
    pub selected_tag_type: Option<String>,
    #[serde(default)]
    pub trainer: Option<bool>,
    #[serde(default)]
    pub commute: Option<bool>,
}

impl Activity {
    /// Parses the record's start time, accepting RFC 3339 and the host's
    /// colon-less offset form. `None` when absent or unparseable.
    pub fn start_time_utc(&self) -> Option<DateTime<Utc>> {
        self.start_time.as_deref().and_then(parse_flexible_datetime)
    }

    /// Distance converted to kilometers.
    pub fn distance_km(&self) -> Option<f64> {
        self.distance_raw.map(|m| m / 1000.0)
    }
}

/// Parses timestamps in the forms the host and the UI emit: RFC 3339,
/// `%Y-%m-%dT%H:%M:%S%z` (no colon in the offset), or a bare date taken as
/// midnight UTC.
pub fn parse_flexible_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// One user-supplied date window. Both bounds must be present for the range
/// to participate in rule compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRange {
    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }
}

/// Selects *which* records a bulk edit touches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterCriteria {
    #[serde(default)]
    pub sport_types: Vec<String>,
    #[serde(default)]
    pub date_ranges: Vec<DateRange>,
    /// Inclusive `[min, max]` in kilometers.
    #[serde(default)]
    pub distance_range: Option<(f64, f64)>,
    #[serde(default)]
    pub ride_types: Vec<String>,
}

impl FilterCriteria {
    /// Fails fast on malformed input before any task is created. Incomplete
    /// date ranges are tolerated (they simply do not compile into a
    /// condition), but a complete range must parse and be ordered.
    pub fn validate(&self) -> Result<(), CriteriaError> {
        for range in &self.date_ranges {
            let (Some(start), Some(end)) = (range.start.as_deref(), range.end.as_deref()) else {
                continue;
            };
            let start = parse_flexible_datetime(start)
                .ok_or_else(|| CriteriaError::UnparseableDate(start.to_owned()))?;
            let end = parse_flexible_datetime(end)
                .ok_or_else(|| CriteriaError::UnparseableDate(end.to_owned()))?;
            if start > end {
                return Err(CriteriaError::InvertedDateRange);
            }
        }
        if let Some((min, max)) = self.distance_range {
            if min < 0.0 || max < 0.0 {
                return Err(CriteriaError::NegativeDistance);
            }
            if min > max {
                return Err(CriteriaError::InvertedDistanceRange);
            }
        }
        Ok(())
    }
}

/// Specifies *what* a bulk edit changes. At least one field must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateCriteria {
    pub gear_id: Option<String>,
    pub visibility: Option<String>,
    pub ride_type: Option<String>,
}

impl UpdateCriteria {
    pub fn is_empty(&self) -> bool {
        self.gear_id.is_none() && self.visibility.is_none() && self.ride_type.is_none()
    }

    pub fn validate(&self) -> Result<(), CriteriaError> {
        if self.is_empty() {
            return Err(CriteriaError::EmptyUpdate);
        }
        Ok(())
    }
}

/// Validation failures for filter/update criteria, raised before a task is
/// created and before any page is touched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CriteriaError {
    #[error("date cannot be parsed: {0}")]
    UnparseableDate(String),
    #[error("date range start is after its end")]
    InvertedDateRange,
    #[error("distance bounds must be non-negative")]
    NegativeDistance,
    #[error("distance range minimum exceeds its maximum")]
    InvertedDistanceRange,
    #[error("update criteria must set at least one field")]
    EmptyUpdate,
}

/// Human label for a privacy value, matching what the host's UI shows.
pub fn visibility_label(value: &str) -> &str {
    match value {
        "everyone" => "Everyone",
        "followers_only" => "Followers Only",
        "only_me" => "Only Me",
        other => other,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Stringish {
    Num(i64),
    Text(String),
}

impl From<Stringish> for String {
    fn from(v: Stringish) -> Self {
        match v {
            Stringish::Num(n) => n.to_string(),
            Stringish::Text(s) => s,
        }
    }
}

fn de_stringish<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Stringish::deserialize(d).map(String::from)
}

fn de_opt_stringish<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Stringish>::deserialize(d)?.map(String::from))
}
