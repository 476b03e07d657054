use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{AttendanceRecord, ClockType, DuplicateCluster, RecordId};

/// Group suspected duplicate scans across both sides.
///
/// A record present on both sides counts once (the local copy wins).
/// Within each (employee, date, clock type) group, records are clustered
/// around the earliest unclustered scan: every member lies within
/// `tolerance` of that anchor. Only clusters of two or more are returned.
pub fn find_duplicate_clusters(
    local: &[AttendanceRecord],
    server: &[AttendanceRecord],
    tolerance: chrono::Duration,
) -> Vec<DuplicateCluster> {
    let mut by_id: BTreeMap<RecordId, &AttendanceRecord> = BTreeMap::new();
    for record in server {
        by_id.insert(record.id, record);
    }
    for record in local {
        by_id.insert(record.id, record);
    }

    let mut groups: BTreeMap<(String, NaiveDate, ClockType), Vec<&AttendanceRecord>> =
        BTreeMap::new();
    for record in by_id.into_values() {
        groups
            .entry((record.employee_id.clone(), record.work_date(), record.clock_type))
            .or_default()
            .push(record);
    }

    let mut clusters = Vec::new();
    for ((employee_id, date, clock_type), mut records) in groups {
        records.sort_by_key(|record| (record.clock_time, record.id));

        let mut current: Vec<&AttendanceRecord> = Vec::new();
        for record in records {
            let within = current
                .first()
                .is_some_and(|anchor| record.clock_time - anchor.clock_time <= tolerance);
            if !within {
                push_cluster(&mut clusters, &employee_id, date, clock_type, &current);
                current.clear();
            }
            current.push(record);
        }
        push_cluster(&mut clusters, &employee_id, date, clock_type, &current);
    }
    clusters
}

fn push_cluster(
    clusters: &mut Vec<DuplicateCluster>,
    employee_id: &str,
    date: NaiveDate,
    clock_type: ClockType,
    members: &[&AttendanceRecord],
) {
    let (Some(first), Some(last)) = (members.first(), members.last()) else {
        return;
    };
    if members.len() < 2 {
        return;
    }
    clusters.push(DuplicateCluster {
        employee_id: employee_id.to_string(),
        date,
        clock_type,
        records: members.iter().map(|record| (*record).clone()).collect(),
        span_seconds: (last.clock_time - first.clock_time).num_seconds(),
    });
}
