//! Reconciliation models: comparison report, duplicate clusters and actions

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::attendance::{AttendanceRecord, ClockType, RecordId, SyncStatus};

/// A human-selected change to apply to the local store.
///
/// Produced by comparison, consumed by the action executor, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconciliationAction {
    /// Insert the server record under the server's id
    AddFromServer { record: AttendanceRecord },
    /// Overwrite every field of the local record with the server version
    UpdateFromServer { record: AttendanceRecord },
    /// Remove the local record
    DeleteLocal { record_id: RecordId },
    /// Keep the local version and push it again on the next upload
    KeepLocal { record_id: RecordId },
}

impl ReconciliationAction {
    pub const fn record_id(&self) -> RecordId {
        match self {
            Self::AddFromServer { record } | Self::UpdateFromServer { record } => record.id,
            Self::DeleteLocal { record_id } | Self::KeepLocal { record_id } => *record_id,
        }
    }

    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::AddFromServer { .. } => ActionKind::AddFromServer,
            Self::UpdateFromServer { .. } => ActionKind::UpdateFromServer,
            Self::DeleteLocal { .. } => ActionKind::DeleteLocal,
            Self::KeepLocal { .. } => ActionKind::KeepLocal,
        }
    }
}

/// Discriminant of [`ReconciliationAction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AddFromServer,
    UpdateFromServer,
    DeleteLocal,
    KeepLocal,
}

impl ActionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AddFromServer => "add_from_server",
            Self::UpdateFromServer => "update_from_server",
            Self::DeleteLocal => "delete_local",
            Self::KeepLocal => "keep_local",
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "add" | "add_from_server" => Ok(Self::AddFromServer),
            "update" | "update_from_server" => Ok(Self::UpdateFromServer),
            "delete" | "delete_local" => Ok(Self::DeleteLocal),
            "keep" | "keep_local" => Ok(Self::KeepLocal),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown action kind '{other}'"
            ))),
        }
    }
}

/// One field whose value differs between the server and local copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: String,
    pub server: String,
    pub local: String,
}

/// A record present on both sides with at least one differing field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDiff {
    pub id: RecordId,
    pub server: AttendanceRecord,
    pub local: AttendanceRecord,
    pub fields: Vec<FieldDiff>,
}

/// Records of the same employee, date and clock type scanned within the
/// duplicate tolerance of one another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCluster {
    pub employee_id: String,
    pub date: NaiveDate,
    pub clock_type: ClockType,
    pub records: Vec<AttendanceRecord>,
    /// Seconds between the earliest and latest scan in the cluster
    pub span_seconds: i64,
}

/// Read-only diff of local and remote attendance over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub server_only: Vec<AttendanceRecord>,
    pub local_only: Vec<AttendanceRecord>,
    pub different: Vec<RecordDiff>,
    pub identical: Vec<AttendanceRecord>,
    pub duplicates: Vec<DuplicateCluster>,
}

impl ComparisonReport {
    /// True when both sides agree on every record
    pub fn is_in_sync(&self) -> bool {
        self.server_only.is_empty() && self.local_only.is_empty() && self.different.is_empty()
    }

    /// Suggested actions for a human to pick from. Nothing here is applied.
    ///
    /// Local-only records that are still pending are simply unsynced and get
    /// no suggestion; synced local-only records were deleted on the server.
    pub fn proposed_actions(&self) -> Vec<ReconciliationAction> {
        let mut actions = Vec::new();
        actions.extend(
            self.server_only
                .iter()
                .map(|record| ReconciliationAction::AddFromServer {
                    record: record.clone(),
                }),
        );
        actions.extend(
            self.different
                .iter()
                .map(|diff| ReconciliationAction::UpdateFromServer {
                    record: diff.server.clone(),
                }),
        );
        actions.extend(
            self.local_only
                .iter()
                .filter(|record| record.sync_status == SyncStatus::Synced)
                .map(|record| ReconciliationAction::DeleteLocal {
                    record_id: record.id,
                }),
        );
        actions
    }
}
