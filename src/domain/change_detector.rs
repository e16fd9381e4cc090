//! No-op write detection.
//!
//! Before the executor touches a row's edit form it asks whether the record
//! already carries the desired values. Records with zero detected changes
//! are classified as skipped rather than written, which keeps re-runs of the
//! same task approximately idempotent.

use serde::{Deserialize, Serialize};

use crate::domain::activity::{visibility_label, Activity, UpdateCriteria};

/// The editable fields the engine knows how to change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateField {
    Gear,
    Visibility,
    RideType,
}

impl std::fmt::Display for UpdateField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateField::Gear => write!(f, "gear"),
            UpdateField::Visibility => write!(f, "visibility"),
            UpdateField::RideType => write!(f, "ride type"),
        }
    }
}

/// One detected difference between a record's current value and the target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldChange {
    pub field: UpdateField,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub display_old: String,
    pub display_new: String,
}

/// Outcome of comparing one record against the update criteria.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComparisonResult {
    pub needs_update: bool,
    pub changes: Vec<FieldChange>,
}

// Empty strings and absent values both mean "none set" on the host; collapse
// them so `"" != None` never counts as a change.
fn normalize(value: Option<&str>) -> Option<String> {
    match value {
        None | Some("") => None,
        Some(v) => Some(v.to_owned()),
    }
}

fn display(value: Option<&str>, field: UpdateField) -> String {
    match value {
        None | Some("") => "None".to_owned(),
        Some(v) if field == UpdateField::Visibility => visibility_label(v).to_owned(),
        Some(v) => v.to_owned(),
    }
}

/// The record's current gear: bike slot first, generic gear slot second.
fn current_gear(record: &Activity) -> Option<&str> {
    record
        .bike_id
        .as_deref()
        .filter(|v| !v.is_empty())
        .or(record.athlete_gear_id.as_deref())
}

/// The record's current ride classification, probing the fields historical
/// payloads have used for it.
fn current_ride_type(record: &Activity) -> Option<String> {
    if let Some(rt) = record.ride_type.as_deref().filter(|v| !v.is_empty()) {
        return Some(rt.to_owned());
    }
    if let Some(wt) = record.workout_type {
        return Some(wt.to_string());
    }
    record.selected_tag_type.clone().filter(|v| !v.is_empty())
}

fn diff(
    field: UpdateField,
    current: Option<&str>,
    target: Option<&str>,
    changes: &mut Vec<FieldChange>,
) {
    let old = normalize(current);
    let new = normalize(target);
    if old != new {
        changes.push(FieldChange {
            display_old: display(old.as_deref(), field),
            display_new: display(new.as_deref(), field),
            field,
            old_value: old,
            new_value: new,
        });
    }
}

/// Compares a record's current field values with the intended update.
///
/// Only fields the caller intends to change are inspected; a record whose
/// values already match the target yields `needs_update == false`.
pub fn check_if_needs_update(record: &Activity, updates: &UpdateCriteria) -> ComparisonResult {
    let mut changes = Vec::new();

    if let Some(target) = updates.gear_id.as_deref() {
        diff(UpdateField::Gear, current_gear(record), Some(target), &mut changes);
    }
    if let Some(target) = updates.visibility.as_deref() {
        diff(UpdateField::Visibility, record.visibility.as_deref(), Some(target), &mut changes);
    }
    if let Some(target) = updates.ride_type.as_deref() {
        let current = current_ride_type(record);
        diff(UpdateField::RideType, current.as_deref(), Some(target), &mut changes);
    }

    ComparisonResult { needs_update: !changes.is_empty(), changes }
}

/// Aggregate counts used by preview summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStatusCounts {
    pub needs_update: usize,
    pub no_change: usize,
    pub total: usize,
}

pub fn count_update_status(records: &[Activity], updates: &UpdateCriteria) -> UpdateStatusCounts {
    let mut counts = UpdateStatusCounts { total: records.len(), ..Default::default() };
    for record in records {
        if check_if_needs_update(record, updates).needs_update {
            counts.needs_update += 1;
        } else {
            counts.no_change += 1;
        }
    }
    counts
}
