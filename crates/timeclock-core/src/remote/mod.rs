//! Transport to the authoritative attendance server.
//!
//! The engine only talks to the server through [`RemoteClient`]; the HTTP
//! implementation lives in [`http`].

mod http;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{AttendanceRecord, DailySummary, DayKey, RecordId};

pub use http::HttpRemoteClient;

/// Server id assigned to a record pushed under a provisional id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAssignment {
    pub local_id: RecordId,
    pub server_id: RecordId,
}

/// Acknowledgement of an attendance batch.
///
/// A successful batch acknowledges every pushed record except those listed
/// in `rejected`. Provisional records are only acknowledged once they
/// appear in `assigned`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAck {
    pub success: bool,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub assigned: Vec<IdAssignment>,
    #[serde(default)]
    pub rejected: Vec<RecordId>,
    #[serde(default)]
    pub message: Option<String>,
}

impl PushAck {
    pub fn server_id_for(&self, local_id: RecordId) -> Option<RecordId> {
        self.assigned
            .iter()
            .find(|assignment| assignment.local_id == local_id)
            .map(|assignment| assignment.server_id)
    }
}

/// Acknowledgement of a summary batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryAck {
    pub success: bool,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub rejected: Vec<DayKey>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Attendance changes made on the server since a point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerEdits {
    #[serde(default)]
    pub updated: Vec<AttendanceRecord>,
    #[serde(default)]
    pub deleted_ids: Vec<RecordId>,
    /// Server clock at the time of the response, used as the next cursor
    #[serde(default)]
    pub server_time: Option<NaiveDateTime>,
}

impl ServerEdits {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.deleted_ids.is_empty()
    }
}

/// Everything the server holds for a date range
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeSnapshot {
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
    #[serde(default)]
    pub summary: Vec<DailySummary>,
}

#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Push one batch of attendance records
    async fn push_attendance(&self, records: &[AttendanceRecord]) -> Result<PushAck>;

    /// Push one batch of daily summaries
    async fn push_summary(&self, summaries: &[DailySummary]) -> Result<SummaryAck>;

    /// Fetch records updated or deleted on the server since `since`
    async fn pull_server_edits(&self, since: NaiveDateTime) -> Result<ServerEdits>;

    /// Fetch every attendance record and summary in `start..=end`
    async fn pull_full_range(&self, start: NaiveDate, end: NaiveDate) -> Result<RangeSnapshot>;
}

/// Remote for clients with no server configured; every call fails with
/// [`Error::Config`] so local-only work keeps running.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedRemote;

impl DisconnectedRemote {
    fn unavailable<T>() -> Result<T> {
        Err(Error::Config("remote server is not configured".to_string()))
    }
}

#[async_trait]
impl RemoteClient for DisconnectedRemote {
    async fn push_attendance(&self, _records: &[AttendanceRecord]) -> Result<PushAck> {
        Self::unavailable()
    }

    async fn push_summary(&self, _summaries: &[DailySummary]) -> Result<SummaryAck> {
        Self::unavailable()
    }

    async fn pull_server_edits(&self, _since: NaiveDateTime) -> Result<ServerEdits> {
        Self::unavailable()
    }

    async fn pull_full_range(&self, _start: NaiveDate, _end: NaiveDate) -> Result<RangeSnapshot> {
        Self::unavailable()
    }
}
