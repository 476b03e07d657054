//! Process-wide sync bookkeeping. Never persisted.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::config::TimeOfDay;
use crate::models::RecordKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncCursor {
    pub last_attendance_push: Option<NaiveDateTime>,
    pub last_summary_push: Option<NaiveDateTime>,
    pub last_edit_pull: Option<NaiveDateTime>,
    pub pending_attendance: usize,
    pub pending_summaries: usize,
    /// Checkpoint already fired today
    pub last_checkpoint: Option<(NaiveDate, TimeOfDay)>,
}

impl SyncCursor {
    /// Fresh cursor seeded with the store's pending counts
    pub fn rebuilt(pending_attendance: usize, pending_summaries: usize) -> Self {
        Self {
            pending_attendance,
            pending_summaries,
            ..Self::default()
        }
    }

    pub fn record_push(&mut self, kind: RecordKind, at: NaiveDateTime) {
        match kind {
            RecordKind::Attendance => self.last_attendance_push = Some(at),
            RecordKind::Summary => self.last_summary_push = Some(at),
        }
    }

    pub fn set_pending(&mut self, kind: RecordKind, count: usize) {
        match kind {
            RecordKind::Attendance => self.pending_attendance = count,
            RecordKind::Summary => self.pending_summaries = count,
        }
    }

    /// Where the next edit pull starts: the previous pull, or `lookback`
    /// before `now` on the first pull of the process.
    pub fn edits_since(&self, now: NaiveDateTime, lookback: chrono::Duration) -> NaiveDateTime {
        self.last_edit_pull.unwrap_or(now - lookback)
    }

    /// Mark a checkpoint as fired; false if it already fired today
    pub fn mark_checkpoint(&mut self, date: NaiveDate, checkpoint: TimeOfDay) -> bool {
        if self.last_checkpoint == Some((date, checkpoint)) {
            return false;
        }
        self.last_checkpoint = Some((date, checkpoint));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn first_pull_uses_lookback() {
        let mut cursor = SyncCursor::default();
        let now = at("2024-03-08 09:00");
        assert_eq!(
            cursor.edits_since(now, chrono::Duration::days(7)),
            at("2024-03-01 09:00")
        );

        cursor.last_edit_pull = Some(at("2024-03-08 08:00"));
        assert_eq!(
            cursor.edits_since(now, chrono::Duration::days(7)),
            at("2024-03-08 08:00")
        );
    }

    #[test]
    fn checkpoint_fires_once_per_day() {
        let mut cursor = SyncCursor::default();
        let day = at("2024-03-01 08:30").date();
        let checkpoint = "08:30".parse::<TimeOfDay>().unwrap();

        assert!(cursor.mark_checkpoint(day, checkpoint));
        assert!(!cursor.mark_checkpoint(day, checkpoint));
        assert!(cursor.mark_checkpoint(day.succ_opt().unwrap(), checkpoint));
    }
}
