use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::duplicates::find_duplicate_clusters;
use crate::models::{hours_eq, AttendanceRecord, ComparisonReport, FieldDiff, RecordDiff, RecordId};

/// Classify records by id into server-only, local-only, different and
/// identical, and collect duplicate clusters across both sides.
pub fn compare_records(
    start: NaiveDate,
    end: NaiveDate,
    local: &[AttendanceRecord],
    server: &[AttendanceRecord],
    tolerance: chrono::Duration,
) -> ComparisonReport {
    let local_by_id: BTreeMap<RecordId, &AttendanceRecord> =
        local.iter().map(|record| (record.id, record)).collect();
    let server_by_id: BTreeMap<RecordId, &AttendanceRecord> =
        server.iter().map(|record| (record.id, record)).collect();

    let mut report = ComparisonReport {
        start,
        end,
        server_only: Vec::new(),
        local_only: Vec::new(),
        different: Vec::new(),
        identical: Vec::new(),
        duplicates: find_duplicate_clusters(local, server, tolerance),
    };

    for (id, server_record) in &server_by_id {
        match local_by_id.get(id) {
            None => report.server_only.push((*server_record).clone()),
            Some(local_record) => {
                let fields = diff_fields(server_record, local_record);
                if fields.is_empty() {
                    report.identical.push((*local_record).clone());
                } else {
                    report.different.push(RecordDiff {
                        id: *id,
                        server: (*server_record).clone(),
                        local: (*local_record).clone(),
                        fields,
                    });
                }
            }
        }
    }

    report.local_only = local_by_id
        .iter()
        .filter(|(id, _)| !server_by_id.contains_key(*id))
        .map(|(_, record)| (*record).clone())
        .collect();

    tracing::debug!(
        server_only = report.server_only.len(),
        local_only = report.local_only.len(),
        different = report.different.len(),
        identical = report.identical.len(),
        duplicates = report.duplicates.len(),
        "Compared attendance"
    );
    report
}

/// Business fields that differ between two versions of a record
pub fn diff_fields(server: &AttendanceRecord, local: &AttendanceRecord) -> Vec<FieldDiff> {
    let mut fields = Vec::new();
    let mut push = |field: &str, server: String, local: String| {
        fields.push(FieldDiff {
            field: field.to_string(),
            server,
            local,
        });
    };

    if server.employee_id != local.employee_id {
        push(
            "employee_id",
            server.employee_id.clone(),
            local.employee_id.clone(),
        );
    }
    if server.clock_type != local.clock_type {
        push(
            "clock_type",
            server.clock_type.to_string(),
            local.clock_type.to_string(),
        );
    }
    if server.clock_time != local.clock_time {
        push(
            "clock_time",
            server.clock_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            local.clock_time.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
    }
    if !hours_eq(server.regular_hours, local.regular_hours) {
        push(
            "regular_hours",
            format!("{:.2}", server.regular_hours),
            format!("{:.2}", local.regular_hours),
        );
    }
    if !hours_eq(server.overtime_hours, local.overtime_hours) {
        push(
            "overtime_hours",
            format!("{:.2}", server.overtime_hours),
            format!("{:.2}", local.overtime_hours),
        );
    }
    if server.is_overtime_session != local.is_overtime_session {
        push(
            "is_overtime_session",
            server.is_overtime_session.to_string(),
            local.is_overtime_session.to_string(),
        );
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClockType, RecordSource, SyncStatus};
    use chrono::NaiveDateTime;
    use pretty_assertions::assert_eq;

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").unwrap()
    }

    fn record(id: i64, clock_type: ClockType, time: &str) -> AttendanceRecord {
        let mut record = AttendanceRecord::new_local(RecordId::new(id), "E1", clock_type, at(time));
        record.sync_status = SyncStatus::Synced;
        record
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn classifies_records_by_id() {
        let local = vec![
            record(1, ClockType::MorningIn, "2024-03-01 08:00"),
            record(2, ClockType::MorningOut, "2024-03-01 12:00"),
            record(3, ClockType::AfternoonIn, "2024-03-01 13:00"),
        ];
        let mut server = local.clone();
        server[2].clock_time = at("2024-03-01 13:20");
        server.push(record(4, ClockType::AfternoonOut, "2024-03-01 17:00"));
        for record in &mut server {
            record.source = RecordSource::Server;
        }

        let report = compare_records(day(), day(), &local, &server, chrono::Duration::minutes(5));

        assert_eq!(report.server_only.len(), 1);
        assert_eq!(report.server_only[0].id, RecordId::new(4));
        assert_eq!(report.different.len(), 1);
        assert_eq!(report.identical.len(), 2);
        assert!(report.local_only.is_empty());
        assert_eq!(
            report.different[0].fields,
            vec![FieldDiff {
                field: "clock_time".to_string(),
                server: "2024-03-01 13:20:00".to_string(),
                local: "2024-03-01 13:00:00".to_string(),
            }]
        );
        assert!(!report.is_in_sync());
    }

    #[test]
    fn proposed_actions_skip_pending_local_only_records() {
        let mut pending = record(-1, ClockType::EveningIn, "2024-03-01 18:00");
        pending.sync_status = SyncStatus::Pending;
        let deleted_remotely = record(5, ClockType::EveningOut, "2024-03-01 21:00");
        let local = vec![pending, deleted_remotely];

        let report = compare_records(day(), day(), &local, &[], chrono::Duration::minutes(5));
        let actions = report.proposed_actions();

        assert_eq!(report.local_only.len(), 2);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].record_id(), RecordId::new(5));
        assert_eq!(actions[0].kind(), crate::models::ActionKind::DeleteLocal);
    }

    #[test]
    fn hour_differences_below_a_cent_are_equal() {
        let local = record(1, ClockType::MorningOut, "2024-03-01 12:00");
        let mut server = local.clone();
        server.regular_hours = 0.001;
        assert!(diff_fields(&server, &local).is_empty());

        server.regular_hours = 4.0;
        let fields = diff_fields(&server, &local);
        assert_eq!(fields[0].field, "regular_hours");
        assert_eq!(fields[0].server, "4.00");
    }
}
