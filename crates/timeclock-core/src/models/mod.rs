//! Data models for timeclock

mod attendance;
mod reconciliation;
mod summary;

pub use attendance::{
    hours_eq, round_hours, AttendanceRecord, ClockType, DayKey, RecordId, RecordKind, RecordSource,
    Session, SyncStatus,
};
pub use reconciliation::{
    ActionKind, ComparisonReport, DuplicateCluster, FieldDiff, RecordDiff, ReconciliationAction,
};
pub use summary::{DailySummary, SessionSpan};
