//! Rule compilation and evaluation.
//!
//! A [`Rule`] is the compiled, evaluable projection of [`FilterCriteria`]:
//! an ordered set of typed conditions combined with AND semantics across the
//! enabled ones. A rule with no enabled conditions matches every record —
//! that is an explicit policy, not an accident.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::activity::{parse_flexible_datetime, Activity, FilterCriteria};

/// A date window with both bounds resolved to UTC instants. Bounds are
/// inclusive on both ends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompiledDateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The typed payload of a single condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionKind {
    SportType { values: Vec<String> },
    /// Multiple ranges are OR'd: a record matches if it falls inside any one.
    DateRange { ranges: Vec<CompiledDateRange> },
    /// Inclusive bounds in kilometers; record distances arrive in meters.
    DistanceRange { min_km: f64, max_km: f64 },
    RideType { values: Vec<String> },
}

/// A single typed predicate. Immutable once compiled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: ConditionKind,
}

impl Condition {
    pub fn new(kind: ConditionKind) -> Self {
        Self { enabled: true, kind }
    }

    /// Structural validity. A disabled condition is always valid (it is
    /// skipped); an enabled one must carry a usable value.
    pub fn is_valid(&self) -> bool {
        if !self.enabled {
            return true;
        }
        match &self.kind {
            ConditionKind::SportType { values } | ConditionKind::RideType { values } => {
                !values.is_empty() && values.iter().all(|v| !v.is_empty())
            }
            ConditionKind::DateRange { ranges } => {
                !ranges.is_empty() && ranges.iter().all(|r| r.start <= r.end)
            }
            ConditionKind::DistanceRange { min_km, max_km } => {
                *min_km >= 0.0 && *max_km >= 0.0 && min_km <= max_km
            }
        }
    }
}

/// An ordered set of conditions. Rules have no identity of their own; they
/// are derived from filter criteria and stored only inside a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub conditions: Vec<Condition>,
}

impl Rule {
    /// A rule that matches every record.
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn enabled_conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter().filter(|c| c.enabled)
    }

    pub fn is_valid(&self) -> bool {
        self.conditions.iter().all(Condition::is_valid)
    }

    /// Short description used in logs and persisted task records.
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .enabled_conditions()
            .map(|c| match &c.kind {
                ConditionKind::SportType { values } => format!("Sport: {}", values.join(", ")),
                ConditionKind::DateRange { ranges } => {
                    let windows: Vec<String> = ranges
                        .iter()
                        .map(|r| {
                            format!("{} - {}", r.start.format("%Y-%m-%d"), r.end.format("%Y-%m-%d"))
                        })
                        .collect();
                    if windows.len() == 1 {
                        format!("Date: {}", windows[0])
                    } else {
                        format!("Date: ({})", windows.join(" OR "))
                    }
                }
                ConditionKind::DistanceRange { min_km, max_km } => {
                    format!("Distance: {min_km}-{max_km} km")
                }
                ConditionKind::RideType { values } => format!("Ride Type: {}", values.join(", ")),
            })
            .collect();
        if parts.is_empty() {
            "Match all activities (no enabled conditions)".to_owned()
        } else {
            parts.join(" AND ")
        }
    }
}

/// Builds a rule from user filter criteria. Only criteria that carry a
/// usable value compile into conditions; everything else is left out, which
/// is how an all-defaults filter ends up matching everything.
pub fn compile_rule(filters: &FilterCriteria) -> Rule {
    let mut conditions = Vec::new();

    if !filters.sport_types.is_empty() {
        conditions.push(Condition::new(ConditionKind::SportType {
            values: filters.sport_types.clone(),
        }));
    }

    let ranges: Vec<CompiledDateRange> = filters
        .date_ranges
        .iter()
        .filter_map(|r| {
            let start = parse_flexible_datetime(r.start.as_deref()?)?;
            let end = parse_flexible_datetime(r.end.as_deref()?)?;
            Some(CompiledDateRange { start, end })
        })
        .collect();
    if !ranges.is_empty() {
        conditions.push(Condition::new(ConditionKind::DateRange { ranges }));
    }

    if let Some((min_km, max_km)) = filters.distance_range {
        conditions.push(Condition::new(ConditionKind::DistanceRange { min_km, max_km }));
    }

    if !filters.ride_types.is_empty() {
        conditions.push(Condition::new(ConditionKind::RideType {
            values: filters.ride_types.clone(),
        }));
    }

    let rule = Rule { conditions };
    debug!(summary = %rule.summary(), "compiled rule from filter criteria");
    rule
}

/// Evaluates one condition against one record.
///
/// Total by construction: a disabled condition passes unconditionally, an
/// invalid one fails (never panics or errors), and a record missing the
/// probed field fails the enabled condition.
pub fn evaluate_condition(condition: &Condition, record: &Activity) -> bool {
    if !condition.enabled {
        return true;
    }
    if !condition.is_valid() {
        warn!(?condition, "invalid condition treated as non-matching");
        return false;
    }
    match &condition.kind {
        ConditionKind::SportType { values } => values.iter().any(|v| v == &record.sport_type),
        ConditionKind::DateRange { ranges } => match record.start_time_utc() {
            Some(at) => ranges.iter().any(|r| at >= r.start && at <= r.end),
            None => false,
        },
        ConditionKind::DistanceRange { min_km, max_km } => match record.distance_km() {
            Some(km) => km >= *min_km && km <= *max_km,
            None => false,
        },
        ConditionKind::RideType { values } => match record.ride_type.as_deref() {
            Some(rt) => values.iter().any(|v| v == rt),
            None => false,
        },
    }
}

/// AND across all enabled conditions; an empty (or all-disabled) rule
/// matches every record.
pub fn evaluate_rule(rule: &Rule, record: &Activity) -> bool {
    rule.enabled_conditions().all(|c| evaluate_condition(c, record))
}

/// Filters a page worth of records through a rule.
pub fn filter_records<'a>(records: &'a [Activity], rule: &Rule) -> Vec<&'a Activity> {
    records.iter().filter(|r| evaluate_rule(rule, r)).collect()
}

/// Pagination short-circuit heuristic.
///
/// With the list sorted descending by date, once every record on a page is
/// strictly older than the earliest date-range bound, later pages cannot
/// match either. Pure optimization: disabling it changes latency, never
/// output. Records without a start time keep paging going.
pub fn should_stop_paging(records: &[Activity], rule: &Rule) -> bool {
    let earliest = rule
        .enabled_conditions()
        .filter_map(|c| match &c.kind {
            ConditionKind::DateRange { ranges } => ranges.iter().map(|r| r.start).min(),
            _ => None,
        })
        .min();
    let Some(earliest) = earliest else {
        return false;
    };
    if records.is_empty() {
        return false;
    }
    let all_older = records.iter().all(|r| match r.start_time_utc() {
        Some(at) => at < earliest,
        None => false,
    });
    if all_older {
        debug!("every record on page predates the date filter, stopping pagination");
    }
    all_older
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::activity::DateRange;

    fn record(id: &str, sport: &str, start: &str, distance_m: f64) -> Activity {
        Activity {
            id: id.into(),
            name: format!("Activity {id}"),
            sport_type: sport.into(),
            start_time: Some(start.into()),
            distance_raw: Some(distance_m),
            start_date_local_raw: None,
            moving_time_raw: None,
            elapsed_time_raw: None,
            elevation_gain_raw: None,
            visibility: None,
            bike_id: None,
            athlete_gear_id: None,
            workout_type: None,
            ride_type: None,
            selected_tag_type: None,
            trainer: None,
            commute: None,
        }
    }

    fn january_rule() -> Rule {
        compile_rule(&FilterCriteria {
            sport_types: vec!["Ride".into()],
            date_ranges: vec![DateRange {
                start: Some("2025-01-01".into()),
                end: Some("2025-01-31".into()),
            }],
            ..Default::default()
        })
    }

    #[test]
    fn empty_rule_matches_everything() {
        let rule = Rule::match_all();
        assert!(evaluate_rule(&rule, &record("1", "Ride", "2025-01-05T08:00:00+0000", 1000.0)));
    }

    #[test]
    fn disabled_condition_always_passes() {
        let mut condition = Condition::new(ConditionKind::SportType { values: vec!["Run".into()] });
        condition.enabled = false;
        let ride = record("1", "Ride", "2025-01-05T08:00:00+0000", 1000.0);
        assert!(evaluate_condition(&condition, &ride));

        let rule = Rule { conditions: vec![condition] };
        assert!(evaluate_rule(&rule, &ride));
    }

    #[test]
    fn invalid_condition_evaluates_false() {
        let condition = Condition::new(ConditionKind::SportType { values: vec![] });
        assert!(!evaluate_condition(&condition, &record("1", "Ride", "2025-01-05", 1000.0)));
    }

    #[test]
    fn date_ranges_or_conditions_and() {
        let rule = compile_rule(&FilterCriteria {
            sport_types: vec!["Ride".into()],
            date_ranges: vec![
                DateRange { start: Some("2025-01-01".into()), end: Some("2025-01-10".into()) },
                DateRange { start: Some("2025-03-01".into()), end: Some("2025-03-10".into()) },
            ],
            ..Default::default()
        });

        // inside first window
        assert!(evaluate_rule(&rule, &record("1", "Ride", "2025-01-05T08:00:00+0000", 1000.0)));
        // inside second window
        assert!(evaluate_rule(&rule, &record("2", "Ride", "2025-03-05T08:00:00+0000", 1000.0)));
        // between windows
        assert!(!evaluate_rule(&rule, &record("3", "Ride", "2025-02-05T08:00:00+0000", 1000.0)));
        // right window, wrong sport
        assert!(!evaluate_rule(&rule, &record("4", "Run", "2025-01-05T08:00:00+0000", 1000.0)));
    }

    #[test]
    fn date_bounds_are_inclusive() {
        let rule = january_rule();
        assert!(evaluate_rule(&rule, &record("1", "Ride", "2025-01-01T00:00:00+0000", 1000.0)));
        assert!(evaluate_rule(&rule, &record("2", "Ride", "2025-01-31T00:00:00+0000", 1000.0)));
    }

    #[test]
    fn record_without_start_time_never_matches_date_condition() {
        let rule = january_rule();
        let mut r = record("1", "Ride", "2025-01-05T08:00:00+0000", 1000.0);
        r.start_time = None;
        assert!(!evaluate_rule(&rule, &r));
    }

    #[test]
    fn distance_converts_meters_to_kilometers() {
        let rule = compile_rule(&FilterCriteria {
            distance_range: Some((0.0, 5.0)),
            ..Default::default()
        });
        assert!(evaluate_rule(&rule, &record("1", "Ride", "2025-01-05", 5000.0)));

        let tighter = compile_rule(&FilterCriteria {
            distance_range: Some((0.0, 4.0)),
            ..Default::default()
        });
        assert!(!evaluate_rule(&tighter, &record("1", "Ride", "2025-01-05", 5000.0)));
    }

    #[test]
    fn missing_distance_never_matches() {
        let rule = compile_rule(&FilterCriteria {
            distance_range: Some((0.0, 100.0)),
            ..Default::default()
        });
        let mut r = record("1", "Ride", "2025-01-05", 0.0);
        r.distance_raw = None;
        assert!(!evaluate_rule(&rule, &r));
    }

    #[test]
    fn short_circuit_fires_only_when_all_records_predate_filter() {
        let rule = january_rule();
        let old = vec![
            record("1", "Ride", "2024-12-20T08:00:00+0000", 1000.0),
            record("2", "Run", "2024-11-01T08:00:00+0000", 1000.0),
        ];
        assert!(should_stop_paging(&old, &rule));

        let mixed = vec![
            record("1", "Ride", "2024-12-20T08:00:00+0000", 1000.0),
            record("2", "Ride", "2025-01-15T08:00:00+0000", 1000.0),
        ];
        assert!(!should_stop_paging(&mixed, &rule));
    }

    #[test]
    fn short_circuit_needs_a_date_condition_and_records() {
        let rule = compile_rule(&FilterCriteria {
            sport_types: vec!["Ride".into()],
            ..Default::default()
        });
        let old = vec![record("1", "Ride", "2020-01-01T08:00:00+0000", 1000.0)];
        assert!(!should_stop_paging(&old, &rule));
        assert!(!should_stop_paging(&[], &january_rule()));
    }

    #[test]
    fn incomplete_date_ranges_do_not_compile() {
        let rule = compile_rule(&FilterCriteria {
            date_ranges: vec![DateRange { start: Some("2025-01-01".into()), end: None }],
            ..Default::default()
        });
        assert!(rule.conditions.is_empty());
    }

    #[test]
    fn summary_reads_like_a_sentence() {
        assert_eq!(Rule::match_all().summary(), "Match all activities (no enabled conditions)");
        let summary = january_rule().summary();
        assert!(summary.contains("Sport: Ride"));
        assert!(summary.contains("AND"));
    }
}
