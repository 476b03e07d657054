//! Server-edit download and apply pipeline.
//!
//! The server drops a day's summary whenever it accepts an edit to one of
//! that day's records. After applying downloaded edits the local summary of
//! every touched day is dropped too, then re-derived and pushed back. Until
//! the push lands neither side has a summary for that day.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::events::{Phase, Reporter};
use super::SyncEngine;
use crate::error::Result;
use crate::models::{AttendanceRecord, DayKey, RecordSource, SyncStatus};
use crate::remote::ServerEdits;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditCounts {
    pub applied: usize,
    pub deleted: usize,
    pub corrected: usize,
    pub summaries_regenerated: usize,
    pub summaries_uploaded: usize,
}

impl SyncEngine {
    pub(super) async fn apply_server_edits(
        &self,
        reporter: &Reporter<'_>,
        counts: &mut EditCounts,
    ) -> Result<String> {
        let now = self.now();
        let lookback = chrono::Duration::days(i64::from(self.inner.config.edit_lookback_days));
        let since = self.cursor().edits_since(now, lookback);

        reporter.started(Phase::PullEdits);
        let edits = self.inner.remote.pull_server_edits(since).await?;
        reporter.completed(
            Phase::PullEdits,
            edits.updated.len() + edits.deleted_ids.len(),
        );
        let next_cursor = edits.server_time.unwrap_or(now);
        if edits.is_empty() {
            self.cursor().last_edit_pull = Some(next_cursor);
            return Ok("No server edits".to_string());
        }

        self.ensure_not_cancelled()?;
        reporter.started(Phase::ApplyEdits);
        let touched = self.apply_edits_locally(edits, counts).await?;
        reporter.completed(Phase::ApplyEdits, counts.applied + counts.deleted);

        for key in &touched {
            self.inner.store.delete_summary(key).await?;
        }

        let refreshed = self.refresh_days(&touched, reporter).await?;
        counts.corrected = refreshed.corrected;
        counts.summaries_regenerated = refreshed.rebuilt;
        counts.summaries_uploaded = refreshed.uploaded;

        self.cursor().last_edit_pull = Some(next_cursor);
        Ok(format!(
            "Applied {} server edits and {} deletions; {} summaries regenerated",
            counts.applied, counts.deleted, counts.summaries_regenerated
        ))
    }

    /// Overwrite or delete local records; returns the days that changed.
    ///
    /// An edit identical to the local record changes nothing, so pulling the
    /// same edit twice touches no day the second time.
    async fn apply_edits_locally(
        &self,
        edits: ServerEdits,
        counts: &mut EditCounts,
    ) -> Result<BTreeSet<DayKey>> {
        let store = &self.inner.store;
        let mut touched = BTreeSet::new();

        for record in edits.updated {
            let record = from_server(record);
            let existing = store.get_attendance(record.id).await?;
            if let Some(existing) = &existing {
                if existing.same_content(&record) && existing.sync_status == SyncStatus::Synced {
                    continue;
                }
                touched.insert(existing.day_key());
            }
            store.upsert_attendance(&record).await?;
            tracing::debug!(record_id = %record.id, "Applied server edit");
            touched.insert(record.day_key());
            counts.applied += 1;
        }

        for id in edits.deleted_ids {
            let Some(existing) = store.get_attendance(id).await? else {
                continue;
            };
            store.delete_attendance(id).await?;
            tracing::debug!(record_id = %id, "Applied server deletion");
            touched.insert(existing.day_key());
            counts.deleted += 1;
        }

        Ok(touched)
    }
}

fn from_server(mut record: AttendanceRecord) -> AttendanceRecord {
    record.sync_status = SyncStatus::Synced;
    record.source = RecordSource::Server;
    record
}
