//! Upload pipeline: validate, push pending attendance, then summaries.

use serde::{Deserialize, Serialize};

use super::events::{Phase, Reporter};
use super::SyncEngine;
use crate::error::{Error, Result};
use crate::models::{AttendanceRecord, RecordKind};
use crate::summary;
use crate::validation::ValidationScope;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCounts {
    pub validated: usize,
    pub corrected: usize,
    pub summaries_rebuilt: usize,
    pub attendance_synced: usize,
    pub summary_synced: usize,
}

impl SyncEngine {
    pub(super) async fn upload(
        &self,
        reporter: &Reporter<'_>,
        counts: &mut UploadCounts,
    ) -> Result<String> {
        self.prepare_pending_days(reporter, counts).await;

        self.ensure_not_cancelled()?;
        let pending = self
            .inner
            .store
            .unsynced_count(RecordKind::Attendance)
            .await?;
        self.cursor().set_pending(RecordKind::Attendance, pending);

        if pending > 0 {
            reporter.started(Phase::PushAttendance);
            counts.attendance_synced = self.push_pending_attendance(reporter).await?;
            reporter.completed(Phase::PushAttendance, counts.attendance_synced);
        } else {
            tracing::debug!("No pending attendance to push");
        }

        self.ensure_not_cancelled()?;
        let settle = self.inner.config.settle_delay();
        if !settle.is_zero() {
            reporter.started(Phase::SettleDelay);
            tokio::time::sleep(settle).await;
            reporter.completed(Phase::SettleDelay, 0);
        }

        self.ensure_not_cancelled()?;
        let summaries = self.inner.store.list_unsynced_summaries().await?;
        if !summaries.is_empty() {
            reporter.started(Phase::PushSummaries);
            counts.summary_synced = self.push_summaries(&summaries).await?;
            reporter.completed(Phase::PushSummaries, counts.summary_synced);
        }

        Ok(format!(
            "Synced {} attendance records and {} summaries",
            counts.attendance_synced, counts.summary_synced
        ))
    }

    /// Best-effort correction and summary rebuild of days with pending
    /// records. Failures are logged and the upload continues.
    async fn prepare_pending_days(&self, reporter: &Reporter<'_>, counts: &mut UploadCounts) {
        reporter.started(Phase::Validate);
        let options = self.validation_options(ValidationScope::Unsynced);
        let days = match self.validate(&options).await {
            Ok(report) => {
                counts.validated = report.total_records;
                counts.corrected = report.corrected_records;
                reporter.completed(Phase::Validate, report.corrected_records);
                report.days
            }
            Err(error) => {
                tracing::warn!("Validation before upload failed: {error}");
                return;
            }
        };

        reporter.started(Phase::RebuildSummaries);
        for key in &days {
            match summary::rebuild_and_store(&self.inner.store, key, &self.inner.policy).await {
                Ok(Some(_)) => counts.summaries_rebuilt += 1,
                Ok(None) => {}
                Err(error) => tracing::warn!(day = %key, "Summary rebuild failed: {error}"),
            }
        }
        reporter.completed(Phase::RebuildSummaries, counts.summaries_rebuilt);
    }

    /// Push every pending attendance record in one batch.
    ///
    /// Provisional records are re-keyed to their assigned server id. A record
    /// is marked synced only if it still matches what was pushed; one that a
    /// correction or server edit rewrote meanwhile stays pending.
    async fn push_pending_attendance(&self, reporter: &Reporter<'_>) -> Result<usize> {
        let records = self.inner.store.list_unsynced_attendance().await?;
        let ack = self.inner.remote.push_attendance(&records).await?;
        if !ack.success {
            return Err(Error::Network(ack.message.unwrap_or_else(|| {
                "server rejected the attendance batch".to_string()
            })));
        }

        let total = records.len();
        let mut acknowledged: Vec<AttendanceRecord> = Vec::new();
        let mut reassigned = 0;
        let mut reassigned_synced = 0;
        for record in &records {
            if ack.rejected.contains(&record.id) {
                tracing::warn!(record_id = %record.id, "Server rejected attendance record");
                continue;
            }
            if !record.id.is_provisional() {
                acknowledged.push(record.clone());
                continue;
            }
            match ack.server_id_for(record.id) {
                Some(server_id) => {
                    let synced = self
                        .inner
                        .store
                        .reassign_attendance_id(record, server_id)
                        .await?;
                    if synced {
                        reassigned_synced += 1;
                    } else {
                        tracing::debug!(
                            record_id = %server_id,
                            "Record changed during push; stays pending"
                        );
                    }
                    reassigned += 1;
                    reporter.progress(Phase::PushAttendance, reassigned, total);
                }
                None => tracing::warn!(
                    record_id = %record.id,
                    "No server id assigned; record stays pending"
                ),
            }
        }

        let marked = self.inner.store.mark_attendance_synced(&acknowledged).await?;
        self.cursor()
            .record_push(RecordKind::Attendance, self.now());
        tracing::debug!(total, marked, reassigned, "Attendance batch acknowledged");
        Ok(marked + reassigned_synced)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{at, engine, hooked_engine};
    use crate::models::{ClockType, DayKey, RecordId, RecordKind, SyncStatus};
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn upload_marks_records_synced_after_ack() {
        let (engine, remote, _) = engine("2024-03-01 12:30");
        engine
            .submit_clock_event("E1", ClockType::MorningIn, at("2024-03-01 08:00"))
            .await
            .unwrap();
        engine
            .submit_clock_event("E1", ClockType::MorningOut, at("2024-03-01 12:00"))
            .await
            .unwrap();

        let outcome = engine.sync_now(true).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.counts.attendance_synced, 2);
        assert_eq!(outcome.counts.summary_synced, 1);

        let store = engine.store();
        assert_eq!(store.unsynced_count(RecordKind::Attendance).await.unwrap(), 0);
        assert_eq!(store.unsynced_count(RecordKind::Summary).await.unwrap(), 0);

        let records = store.list_all_attendance().await.unwrap();
        assert!(records.iter().all(|record| !record.id.is_provisional()));
        assert!(records.iter().all(|record| record.sync_status == SyncStatus::Synced));
        assert_eq!(remote.records().len(), 2);

        let key = DayKey::new("E1", at("2024-03-01 00:00").date());
        assert_eq!(remote.summary(&key).unwrap().regular_hours, 4.0);
    }

    #[tokio::test]
    async fn failed_push_leaves_everything_pending() {
        let (engine, remote, _) = engine("2024-03-01 12:30");
        engine
            .submit_clock_event("E1", ClockType::MorningIn, at("2024-03-01 08:00"))
            .await
            .unwrap();
        remote.set_offline(true);

        let outcome = engine.sync_now(true).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Network));
        assert_eq!(outcome.counts.attendance_synced, 0);

        let records = engine.store().list_all_attendance().await.unwrap();
        assert_eq!(records[0].sync_status, SyncStatus::Pending);
        assert!(records[0].id.is_provisional());
        assert_eq!(engine.status().cursor.pending_attendance, 1);

        // The lock is released after a failed run
        remote.set_offline(false);
        assert!(engine.sync_now(true).await.success);
    }

    #[tokio::test]
    async fn nothing_pending_pushes_nothing() {
        let (engine, remote, _) = engine("2024-03-01 12:30");
        let outcome = engine.sync_now(true).await;

        assert!(outcome.success);
        assert_eq!(remote.attendance_pushes(), 0);
        assert_eq!(remote.summary_pushes(), 0);
    }

    #[tokio::test]
    async fn round_trip_compares_clean() {
        let (engine, _, _) = engine("2024-03-01 18:30");
        for (clock_type, time) in [
            (ClockType::MorningIn, "2024-03-01 08:00"),
            (ClockType::MorningOut, "2024-03-01 12:00"),
            (ClockType::AfternoonIn, "2024-03-01 13:00"),
            (ClockType::AfternoonOut, "2024-03-01 18:00"),
        ] {
            engine
                .submit_clock_event("E1", clock_type, at(time))
                .await
                .unwrap();
        }
        assert!(engine.sync_now(true).await.success);

        let day = at("2024-03-01 00:00").date();
        let report = engine.compare(day, day).await.counts.unwrap();
        assert!(report.different.is_empty());
        assert!(report.server_only.is_empty());
        assert!(report.local_only.is_empty());
        assert_eq!(report.identical.len(), 4);
    }

    #[tokio::test]
    async fn record_rewritten_during_push_stays_pending() {
        let (engine, remote) = hooked_engine("2024-03-01 12:30");
        engine
            .submit_clock_event("E1", ClockType::MorningIn, at("2024-03-01 08:00"))
            .await
            .unwrap();
        engine
            .submit_clock_event("E1", ClockType::MorningOut, at("2024-03-01 12:00"))
            .await
            .unwrap();

        // A scan landing mid-push re-pairs the day and zeroes the 12:00 out
        let scanner = engine.clone();
        remote.during_attendance_push(move || async move {
            scanner
                .submit_clock_event("E1", ClockType::MorningOut, at("2024-03-01 10:00"))
                .await
                .unwrap();
        });

        let outcome = engine.sync_now(true).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.counts.attendance_synced, 1);

        let store = engine.store();
        let rewritten = store.get_attendance(RecordId::new(1001)).await.unwrap().unwrap();
        assert_eq!(rewritten.clock_time, at("2024-03-01 12:00"));
        assert_eq!(rewritten.regular_hours, 0.0);
        assert_eq!(rewritten.sync_status, SyncStatus::Pending);
        assert_eq!(
            remote.server().record(RecordId::new(1001)).unwrap().regular_hours,
            4.0
        );

        let outcome = engine.sync_now(true).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(store.unsynced_count(RecordKind::Attendance).await.unwrap(), 0);
        assert_eq!(remote.server().records().len(), 3);

        let day = at("2024-03-01 00:00").date();
        let report = engine.compare(day, day).await.counts.unwrap();
        assert!(report.different.is_empty());
        assert!(report.server_only.is_empty());
        assert!(report.local_only.is_empty());
        assert_eq!(report.identical.len(), 3);
    }

    #[tokio::test]
    async fn cancel_during_push_stops_before_summaries() {
        let (engine, remote) = hooked_engine("2024-03-01 12:30");
        engine
            .submit_clock_event("E1", ClockType::MorningIn, at("2024-03-01 08:00"))
            .await
            .unwrap();
        engine
            .submit_clock_event("E1", ClockType::MorningOut, at("2024-03-01 12:00"))
            .await
            .unwrap();

        let operator = engine.clone();
        remote.during_attendance_push(move || async move { operator.cancel() });

        let outcome = engine.sync_now(true).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Cancelled));
        assert_eq!(outcome.counts.attendance_synced, 2);
        assert_eq!(remote.server().summary_pushes(), 0);
        assert_eq!(
            engine.store().unsynced_count(RecordKind::Summary).await.unwrap(),
            1
        );
        assert_eq!(engine.status().active, None);

        // The next run starts with the request cleared
        let outcome = engine.sync_now(true).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(remote.server().summary_pushes(), 1);
        assert_eq!(
            engine.store().unsynced_count(RecordKind::Summary).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn cancel_between_runs_does_not_stop_the_next_one() {
        let (engine, remote, _) = engine("2024-03-01 12:30");
        engine
            .submit_clock_event("E1", ClockType::MorningIn, at("2024-03-01 08:00"))
            .await
            .unwrap();

        engine.cancel();
        let outcome = engine.sync_now(true).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(remote.attendance_pushes(), 1);
    }
}
