//! Worked-hours validation and correction.
//!
//! For every employee-day the events are ordered by clock time and each `_in`
//! is paired with the next unmatched `_out` of the same session. The elapsed
//! time of a pair is booked on its `_out` record; the `_in` carries zero.
//! With the 8-hour rule on, regular-session time beyond the daily cap moves
//! to overtime in chronological order. Explicit overtime sessions are never
//! capped and do not count toward the cap.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, WorkSchedule};
use crate::error::{Error, Result};
use crate::models::{
    hours_eq, round_hours, AttendanceRecord, DayKey, RecordId, Session, SyncStatus,
};
use crate::services::LocalStore;

/// Business rules applied when validating and summarising a day
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationPolicy {
    pub schedule: WorkSchedule,
    pub grace_period_minutes: u32,
    pub apply_eight_hour_rule: bool,
    pub regular_hours_cap: f64,
}

impl ValidationPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            schedule: config.schedule,
            grace_period_minutes: config.grace_period_minutes,
            apply_eight_hour_rule: config.apply_eight_hour_rule,
            regular_hours_cap: config.regular_hours_cap,
        }
    }

    #[must_use]
    pub fn with_eight_hour_rule(mut self, enabled: bool) -> Self {
        self.apply_eight_hour_rule = enabled;
        self
    }

    /// Whether a clock-in is past the session's scheduled start plus grace.
    ///
    /// Seconds are truncated, so with a 5 minute grace 08:05:59 is on time
    /// and 08:06:00 is late.
    pub fn is_late(&self, session: Session, clock_in: NaiveDateTime) -> bool {
        let Some(start) = self.schedule.scheduled_start(session) else {
            return false;
        };
        let scheduled = clock_in.date().and_time(start);
        let clock_in = clock_in.with_second(0).unwrap_or(clock_in);
        let minutes_late = (clock_in - scheduled).num_minutes();
        minutes_late > i64::from(self.grace_period_minutes)
    }
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Irregularities found while pairing events; reported, not corrected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// An `_in` that no `_out` closes
    UnmatchedIn,
    /// An `_out` with no open `_in` before it
    UnmatchedOut,
    /// A second `_in` while the session was still open
    DuplicateIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub record_id: RecordId,
    pub employee_id: String,
    pub date: NaiveDate,
    pub kind: AnomalyKind,
}

/// Recomputed view of one employee-day
#[derive(Debug, Clone, PartialEq)]
pub struct DayEvaluation {
    /// Input records with corrected hours, ordered by clock time
    pub records: Vec<AttendanceRecord>,
    pub anomalies: Vec<Anomaly>,
    pub late_entries: usize,
}

/// Recompute hours for the records of a single employee-day.
///
/// Pure: the input is not modified and `sync_status` is left untouched.
pub fn evaluate_day(records: &[AttendanceRecord], policy: &ValidationPolicy) -> DayEvaluation {
    let mut ordered = records.to_vec();
    ordered.sort_by_key(|record| (record.clock_time, record.id));

    let mut anomalies = Vec::new();
    let mut open: HashMap<Session, usize> = HashMap::new();
    let mut pairs: Vec<(usize, usize)> = Vec::new();

    for (index, record) in ordered.iter().enumerate() {
        let session = record.session();
        if record.clock_type.is_in() {
            if open.contains_key(&session) {
                anomalies.push(anomaly(record, AnomalyKind::DuplicateIn));
            } else {
                open.insert(session, index);
            }
        } else if let Some(in_index) = open.remove(&session) {
            pairs.push((in_index, index));
        } else {
            anomalies.push(anomaly(record, AnomalyKind::UnmatchedOut));
        }
    }

    let mut still_open: Vec<usize> = open.into_values().collect();
    still_open.sort_unstable();
    for index in still_open {
        anomalies.push(anomaly(&ordered[index], AnomalyKind::UnmatchedIn));
    }

    for record in &mut ordered {
        record.regular_hours = 0.0;
        record.overtime_hours = 0.0;
        record.is_overtime_session = record.session().is_overtime();
    }

    let mut regular_so_far = 0.0_f64;
    for (in_index, out_index) in pairs {
        let worked = ordered[out_index].clock_time - ordered[in_index].clock_time;
        let hours = worked.num_seconds() as f64 / 3600.0;
        let out = &mut ordered[out_index];

        if out.session().is_overtime() {
            out.overtime_hours = round_hours(hours);
            continue;
        }

        let (regular, overtime) = if policy.apply_eight_hour_rule {
            let remaining = (policy.regular_hours_cap - regular_so_far).max(0.0);
            let regular = hours.min(remaining);
            (regular, hours - regular)
        } else {
            (hours, 0.0)
        };
        regular_so_far += regular;
        out.regular_hours = round_hours(regular);
        out.overtime_hours = round_hours(overtime);
    }

    let mut first_in: BTreeMap<Session, NaiveDateTime> = BTreeMap::new();
    for record in ordered.iter().filter(|record| record.clock_type.is_in()) {
        first_in.entry(record.session()).or_insert(record.clock_time);
    }
    let late_entries = first_in
        .iter()
        .filter(|(session, clock_in)| policy.is_late(**session, **clock_in))
        .count();

    DayEvaluation {
        records: ordered,
        anomalies,
        late_entries,
    }
}

fn anomaly(record: &AttendanceRecord, kind: AnomalyKind) -> Anomaly {
    Anomaly {
        record_id: record.id,
        employee_id: record.employee_id.clone(),
        date: record.work_date(),
        kind,
    }
}

/// Which records a validation pass looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationScope {
    All,
    DateRange { start: NaiveDate, end: NaiveDate },
    /// Employee-days with at least one pending record
    Unsynced,
    EmployeeDays(BTreeSet<DayKey>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOptions {
    pub scope: ValidationScope,
    /// Write corrected hours back; when false only report
    pub auto_correct: bool,
    pub apply_eight_hour_rule: bool,
}

impl ValidationOptions {
    pub const fn new(scope: ValidationScope, auto_correct: bool, apply_eight_hour_rule: bool) -> Self {
        Self {
            scope,
            auto_correct,
            apply_eight_hour_rule,
        }
    }
}

/// Outcome of a validation pass ("N of M records corrected")
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total_records: usize,
    pub corrected_records: usize,
    pub skipped_records: usize,
    pub late_entries: usize,
    pub anomalies: Vec<Anomaly>,
    /// Employee-days that were examined
    #[serde(skip)]
    pub days: BTreeSet<DayKey>,
}

/// Validate the records in `options.scope`, writing corrections when asked.
///
/// A record is rewritten only when its hours actually changed; a rewrite
/// resets it to pending. A failed write is logged and skipped.
pub async fn validate(
    store: &LocalStore,
    policy: &ValidationPolicy,
    options: &ValidationOptions,
) -> Result<ValidationReport> {
    let policy = policy.clone().with_eight_hour_rule(options.apply_eight_hour_rule);
    let groups = load_groups(store, &options.scope).await?;

    let mut report = ValidationReport::default();
    for (key, records) in groups {
        let evaluation = evaluate_day(&records, &policy);
        report.total_records += records.len();
        report.late_entries += evaluation.late_entries;
        report.anomalies.extend(evaluation.anomalies);

        for corrected in evaluation.records {
            let Some(original) = records.iter().find(|record| record.id == corrected.id) else {
                continue;
            };
            if !needs_correction(original, &corrected) {
                continue;
            }
            if !options.auto_correct {
                report.corrected_records += 1;
                continue;
            }

            let mut updated = corrected;
            updated.sync_status = SyncStatus::Pending;
            match store.update_attendance(&updated).await {
                Ok(()) => {
                    report.corrected_records += 1;
                    tracing::debug!(
                        record_id = %updated.id,
                        regular_hours = updated.regular_hours,
                        overtime_hours = updated.overtime_hours,
                        "Corrected attendance hours"
                    );
                }
                Err(error) => {
                    let error = Error::Validation {
                        record_id: updated.id.get(),
                        reason: error.to_string(),
                    };
                    tracing::warn!(day = %key, "Skipping record: {error}");
                    report.skipped_records += 1;
                }
            }
        }
        report.days.insert(key);
    }

    tracing::info!(
        total = report.total_records,
        corrected = report.corrected_records,
        skipped = report.skipped_records,
        anomalies = report.anomalies.len(),
        "Validation finished"
    );
    Ok(report)
}

fn needs_correction(original: &AttendanceRecord, corrected: &AttendanceRecord) -> bool {
    !hours_eq(original.regular_hours, corrected.regular_hours)
        || !hours_eq(original.overtime_hours, corrected.overtime_hours)
        || original.is_overtime_session != corrected.is_overtime_session
}

async fn load_groups(
    store: &LocalStore,
    scope: &ValidationScope,
) -> Result<BTreeMap<DayKey, Vec<AttendanceRecord>>> {
    let records = match scope {
        ValidationScope::All => store.list_all_attendance().await?,
        ValidationScope::DateRange { start, end } => {
            store.list_attendance_range(*start, *end).await?
        }
        ValidationScope::Unsynced => {
            let mut records = Vec::new();
            for key in store.unsynced_attendance_days().await? {
                records.extend(store.list_attendance_for_day(&key).await?);
            }
            records
        }
        ValidationScope::EmployeeDays(keys) => {
            let mut records = Vec::new();
            for key in keys {
                records.extend(store.list_attendance_for_day(key).await?);
            }
            records
        }
    };

    let mut groups: BTreeMap<DayKey, Vec<AttendanceRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.day_key()).or_default().push(record);
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClockType, RecordKind};
    use pretty_assertions::assert_eq;

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").unwrap()
    }

    fn record(id: i64, clock_type: ClockType, time: &str) -> AttendanceRecord {
        AttendanceRecord::new_local(RecordId::new(id), "E1", clock_type, at(time))
    }

    fn by_id(evaluation: &DayEvaluation, id: i64) -> &AttendanceRecord {
        evaluation
            .records
            .iter()
            .find(|record| record.id == RecordId::new(id))
            .unwrap()
    }

    #[test]
    fn hours_are_booked_on_the_out_record() {
        let records = vec![
            record(1, ClockType::MorningIn, "2024-03-01 08:00"),
            record(2, ClockType::MorningOut, "2024-03-01 12:30"),
        ];
        let evaluation = evaluate_day(&records, &ValidationPolicy::default());

        assert_eq!(by_id(&evaluation, 1).regular_hours, 0.0);
        assert_eq!(by_id(&evaluation, 2).regular_hours, 4.5);
        assert!(evaluation.anomalies.is_empty());
    }

    #[test]
    fn eight_hour_rule_moves_excess_to_overtime() {
        let records = vec![
            record(1, ClockType::MorningIn, "2024-03-01 08:00"),
            record(2, ClockType::MorningOut, "2024-03-01 12:00"),
            record(3, ClockType::AfternoonIn, "2024-03-01 13:00"),
            record(4, ClockType::AfternoonOut, "2024-03-01 18:00"),
        ];
        let evaluation = evaluate_day(&records, &ValidationPolicy::default());

        let regular: f64 = evaluation.records.iter().map(|r| r.regular_hours).sum();
        let overtime: f64 = evaluation.records.iter().map(|r| r.overtime_hours).sum();
        assert_eq!(regular, 8.0);
        assert!(overtime >= 1.0);
        assert_eq!(by_id(&evaluation, 4).regular_hours, 4.0);
        assert_eq!(by_id(&evaluation, 4).overtime_hours, 1.0);
    }

    #[test]
    fn eight_hour_rule_can_be_disabled() {
        let records = vec![
            record(1, ClockType::MorningIn, "2024-03-01 08:00"),
            record(2, ClockType::MorningOut, "2024-03-01 12:00"),
            record(3, ClockType::AfternoonIn, "2024-03-01 13:00"),
            record(4, ClockType::AfternoonOut, "2024-03-01 18:00"),
        ];
        let policy = ValidationPolicy::default().with_eight_hour_rule(false);
        let evaluation = evaluate_day(&records, &policy);

        assert_eq!(by_id(&evaluation, 4).regular_hours, 5.0);
        assert_eq!(by_id(&evaluation, 4).overtime_hours, 0.0);
    }

    #[test]
    fn explicit_overtime_is_never_capped() {
        let records = vec![
            record(1, ClockType::MorningIn, "2024-03-01 08:00"),
            record(2, ClockType::MorningOut, "2024-03-01 12:00"),
            record(3, ClockType::AfternoonIn, "2024-03-01 13:00"),
            record(4, ClockType::AfternoonOut, "2024-03-01 17:00"),
            record(5, ClockType::OvertimeIn, "2024-03-01 17:30"),
            record(6, ClockType::OvertimeOut, "2024-03-01 20:30"),
        ];
        let evaluation = evaluate_day(&records, &ValidationPolicy::default());

        assert_eq!(by_id(&evaluation, 4).regular_hours, 4.0);
        assert_eq!(by_id(&evaluation, 4).overtime_hours, 0.0);
        assert_eq!(by_id(&evaluation, 6).regular_hours, 0.0);
        assert_eq!(by_id(&evaluation, 6).overtime_hours, 3.0);
        assert!(by_id(&evaluation, 6).is_overtime_session);
    }

    #[test]
    fn grace_period_boundary() {
        let policy = ValidationPolicy::default();
        assert!(!policy.is_late(Session::Morning, at("2024-03-01 08:05")));
        assert!(policy.is_late(Session::Morning, at("2024-03-01 08:06")));
        assert!(!policy.is_late(Session::Morning, at("2024-03-01 07:40")));
        assert!(!policy.is_late(Session::Overtime, at("2024-03-01 23:00")));

        let late_by_seconds = at("2024-03-01 08:05") + chrono::Duration::seconds(59);
        assert!(!policy.is_late(Session::Morning, late_by_seconds));
    }

    #[test]
    fn anomalies_are_reported() {
        let records = vec![
            record(1, ClockType::MorningOut, "2024-03-01 07:00"),
            record(2, ClockType::MorningIn, "2024-03-01 08:00"),
            record(3, ClockType::MorningIn, "2024-03-01 08:02"),
            record(4, ClockType::AfternoonIn, "2024-03-01 13:10"),
        ];
        let evaluation = evaluate_day(&records, &ValidationPolicy::default());
        let kinds: Vec<(i64, AnomalyKind)> = evaluation
            .anomalies
            .iter()
            .map(|a| (a.record_id.get(), a.kind))
            .collect();

        assert_eq!(
            kinds,
            vec![
                (1, AnomalyKind::UnmatchedOut),
                (3, AnomalyKind::DuplicateIn),
                (2, AnomalyKind::UnmatchedIn),
                (4, AnomalyKind::UnmatchedIn),
            ]
        );
        assert_eq!(evaluation.late_entries, 1);
    }

    #[tokio::test]
    async fn validate_writes_only_changed_records() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut morning_in = record(1, ClockType::MorningIn, "2024-03-01 08:00");
        morning_in.sync_status = SyncStatus::Synced;
        let mut morning_out = record(2, ClockType::MorningOut, "2024-03-01 12:00");
        morning_out.regular_hours = 4.0;
        morning_out.sync_status = SyncStatus::Synced;
        let mut afternoon_in = record(3, ClockType::AfternoonIn, "2024-03-01 13:00");
        afternoon_in.sync_status = SyncStatus::Synced;
        let mut afternoon_out = record(4, ClockType::AfternoonOut, "2024-03-01 17:00");
        afternoon_out.sync_status = SyncStatus::Synced;
        for r in [&morning_in, &morning_out, &afternoon_in, &afternoon_out] {
            store.insert_attendance(r).await.unwrap();
        }

        let options = ValidationOptions::new(ValidationScope::All, true, true);
        let report = validate(&store, &ValidationPolicy::default(), &options)
            .await
            .unwrap();

        assert_eq!(report.total_records, 4);
        assert_eq!(report.corrected_records, 1);
        assert_eq!(store.unsynced_count(RecordKind::Attendance).await.unwrap(), 1);
        let fixed = store.get_attendance(RecordId::new(4)).await.unwrap().unwrap();
        assert_eq!(fixed.regular_hours, 4.0);
        assert_eq!(fixed.sync_status, SyncStatus::Pending);
        let untouched = store.get_attendance(RecordId::new(2)).await.unwrap().unwrap();
        assert_eq!(untouched.sync_status, SyncStatus::Synced);

        let again = validate(&store, &ValidationPolicy::default(), &options)
            .await
            .unwrap();
        assert_eq!(again.corrected_records, 0);
    }

    #[tokio::test]
    async fn report_only_mode_does_not_write() {
        let store = LocalStore::open_in_memory().unwrap();
        store
            .insert_attendance(&record(1, ClockType::MorningIn, "2024-03-01 08:00"))
            .await
            .unwrap();
        store
            .insert_attendance(&record(2, ClockType::MorningOut, "2024-03-01 12:00"))
            .await
            .unwrap();

        let options = ValidationOptions::new(ValidationScope::All, false, true);
        let report = validate(&store, &ValidationPolicy::default(), &options)
            .await
            .unwrap();

        assert_eq!(report.corrected_records, 1);
        let stored = store.get_attendance(RecordId::new(2)).await.unwrap().unwrap();
        assert_eq!(stored.regular_hours, 0.0);
    }

    #[tokio::test]
    async fn date_range_scope_limits_records() {
        let store = LocalStore::open_in_memory().unwrap();
        store
            .insert_attendance(&record(1, ClockType::MorningIn, "2024-03-01 08:00"))
            .await
            .unwrap();
        store
            .insert_attendance(&record(2, ClockType::MorningIn, "2024-03-05 08:00"))
            .await
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let options = ValidationOptions::new(
            ValidationScope::DateRange {
                start: day,
                end: day,
            },
            true,
            true,
        );
        let report = validate(&store, &ValidationPolicy::default(), &options)
            .await
            .unwrap();
        assert_eq!(report.total_records, 1);
        assert_eq!(report.days.len(), 1);
    }
}
