//! Daily summary derivation.

use crate::error::Result;
use crate::models::{round_hours, AttendanceRecord, DailySummary, DayKey, Session, SyncStatus};
use crate::services::LocalStore;
use crate::validation::{evaluate_day, AnomalyKind, ValidationPolicy};

/// Derive the summary of one employee-day from its attendance records.
///
/// Records belonging to other days are ignored. Duplicate scans are
/// tolerated: each session keeps its earliest `_in` and latest `_out`.
/// The day is incomplete when pairing leaves any `_in` unclosed, including
/// a session reopened after its `_out`. The result is always pending.
pub fn rebuild(key: &DayKey, records: &[AttendanceRecord], policy: &ValidationPolicy) -> DailySummary {
    let mut summary = DailySummary::empty(key);
    let mut regular = 0.0;
    let mut overtime = 0.0;
    let day: Vec<AttendanceRecord> = records
        .iter()
        .filter(|record| record.day_key() == *key)
        .cloned()
        .collect();

    for record in &day {
        regular += record.regular_hours;
        overtime += record.overtime_hours;

        let span = summary.session_mut(record.session());
        if record.clock_type.is_in() {
            span.clock_in = Some(
                span.clock_in
                    .map_or(record.clock_time, |current| current.min(record.clock_time)),
            );
        } else {
            span.clock_out = Some(
                span.clock_out
                    .map_or(record.clock_time, |current| current.max(record.clock_time)),
            );
        }
    }

    summary.regular_hours = round_hours(regular);
    summary.overtime_hours = round_hours(overtime);
    summary.total_hours = round_hours(regular + overtime);
    summary.has_late_entry = Session::ALL.iter().any(|session| {
        summary
            .session(*session)
            .clock_in
            .is_some_and(|clock_in| policy.is_late(*session, clock_in))
    });
    summary.is_incomplete = evaluate_day(&day, policy)
        .anomalies
        .iter()
        .any(|anomaly| anomaly.kind == AnomalyKind::UnmatchedIn);
    summary.sync_status = SyncStatus::Pending;
    summary
}

/// Rebuild the stored summary of one employee-day from the stored records.
///
/// Replaces any prior row. A day without records has no summary, so an
/// existing row is removed and `None` returned.
pub async fn rebuild_and_store(
    store: &LocalStore,
    key: &DayKey,
    policy: &ValidationPolicy,
) -> Result<Option<DailySummary>> {
    let records = store.list_attendance_for_day(key).await?;
    if records.is_empty() {
        if store.delete_summary(key).await? {
            tracing::debug!(day = %key, "Removed summary of empty day");
        }
        return Ok(None);
    }

    let summary = rebuild(key, &records, policy);
    store.upsert_summary(&summary).await?;
    tracing::debug!(
        day = %key,
        total_hours = summary.total_hours,
        incomplete = summary.is_incomplete,
        "Rebuilt daily summary"
    );
    Ok(Some(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClockType, RecordId};
    use chrono::{NaiveDate, NaiveDateTime};
    use pretty_assertions::assert_eq;

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").unwrap()
    }

    fn record(id: i64, clock_type: ClockType, time: &str) -> AttendanceRecord {
        AttendanceRecord::new_local(RecordId::new(id), "E1", clock_type, at(time))
    }

    fn key() -> DayKey {
        DayKey::new("E1", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    }

    fn full_day() -> Vec<AttendanceRecord> {
        let records = vec![
            record(1, ClockType::MorningIn, "2024-03-01 08:00"),
            record(2, ClockType::MorningOut, "2024-03-01 12:00"),
            record(3, ClockType::AfternoonIn, "2024-03-01 13:00"),
            record(4, ClockType::AfternoonOut, "2024-03-01 18:00"),
        ];
        evaluate_day(&records, &ValidationPolicy::default()).records
    }

    #[test]
    fn rebuild_is_idempotent() {
        let records = full_day();
        let policy = ValidationPolicy::default();

        let first = rebuild(&key(), &records, &policy);
        let second = rebuild(&key(), &records, &policy);

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn rebuild_sums_hours_and_spans() {
        let summary = rebuild(&key(), &full_day(), &ValidationPolicy::default());

        assert_eq!(summary.regular_hours, 8.0);
        assert_eq!(summary.overtime_hours, 1.0);
        assert_eq!(summary.total_hours, 9.0);
        assert_eq!(summary.morning.clock_in, Some(at("2024-03-01 08:00")));
        assert_eq!(summary.afternoon.clock_out, Some(at("2024-03-01 18:00")));
        assert!(!summary.has_late_entry);
        assert!(!summary.is_incomplete);
        assert_eq!(summary.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn duplicate_scans_keep_earliest_in_and_latest_out() {
        let records = vec![
            record(1, ClockType::MorningIn, "2024-03-01 08:03"),
            record(2, ClockType::MorningIn, "2024-03-01 08:01"),
            record(3, ClockType::MorningOut, "2024-03-01 12:00"),
            record(4, ClockType::MorningOut, "2024-03-01 12:02"),
        ];
        let summary = rebuild(&key(), &records, &ValidationPolicy::default());

        assert_eq!(summary.morning.clock_in, Some(at("2024-03-01 08:01")));
        assert_eq!(summary.morning.clock_out, Some(at("2024-03-01 12:02")));
        assert!(!summary.is_incomplete);
    }

    #[test]
    fn open_session_marks_incomplete_and_late() {
        let records = vec![record(1, ClockType::MorningIn, "2024-03-01 08:06")];
        let summary = rebuild(&key(), &records, &ValidationPolicy::default());

        assert!(summary.is_incomplete);
        assert!(summary.has_late_entry);
    }

    #[test]
    fn reopened_session_marks_incomplete() {
        let records = vec![
            record(1, ClockType::MorningIn, "2024-03-01 08:00"),
            record(2, ClockType::MorningOut, "2024-03-01 10:00"),
            record(3, ClockType::MorningIn, "2024-03-01 10:15"),
        ];
        let summary = rebuild(&key(), &records, &ValidationPolicy::default());

        assert_eq!(summary.morning.clock_in, Some(at("2024-03-01 08:00")));
        assert_eq!(summary.morning.clock_out, Some(at("2024-03-01 10:00")));
        assert!(summary.is_incomplete);
    }

    #[tokio::test]
    async fn rebuild_and_store_replaces_and_removes() {
        let store = LocalStore::open_in_memory().unwrap();
        let policy = ValidationPolicy::default();
        for record in full_day() {
            store.insert_attendance(&record).await.unwrap();
        }

        let stored = rebuild_and_store(&store, &key(), &policy).await.unwrap().unwrap();
        assert_eq!(store.get_summary(&key()).await.unwrap(), Some(stored));

        for id in 1..=4 {
            store.delete_attendance(RecordId::new(id)).await.unwrap();
        }
        assert_eq!(rebuild_and_store(&store, &key(), &policy).await.unwrap(), None);
        assert_eq!(store.get_summary(&key()).await.unwrap(), None);
    }
}
