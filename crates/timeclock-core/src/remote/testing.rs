//! In-memory server used by engine tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use super::{IdAssignment, PushAck, RangeSnapshot, RemoteClient, ServerEdits, SummaryAck};
use crate::error::{Error, Result};
use crate::models::{AttendanceRecord, DailySummary, DayKey, RecordId, RecordSource, SyncStatus};

#[derive(Default)]
struct ServerState {
    attendance: BTreeMap<RecordId, AttendanceRecord>,
    summaries: BTreeMap<DayKey, DailySummary>,
    pending_edits: ServerEdits,
    next_id: i64,
    offline: bool,
    attendance_pushes: usize,
    summary_pushes: usize,
}

/// Server fake that assigns ids from 1000 upwards and mirrors the real
/// server's habit of dropping a day's summary whenever one of its records
/// is edited.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.lock().next_id = 1000;
        remote
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Store a record as if it had always been on the server
    pub fn seed(&self, record: AttendanceRecord) {
        self.lock().attendance.insert(record.id, as_server(record));
    }

    /// Edit a record through the server's admin surface
    pub fn server_edit(&self, record: AttendanceRecord) {
        let record = as_server(record);
        let mut state = self.lock();
        state.summaries.remove(&record.day_key());
        state.attendance.insert(record.id, record.clone());
        state.pending_edits.updated.push(record);
    }

    /// Delete a record through the server's admin surface
    pub fn server_delete(&self, id: RecordId) {
        let mut state = self.lock();
        if let Some(record) = state.attendance.remove(&id) {
            state.summaries.remove(&record.day_key());
        }
        state.pending_edits.deleted_ids.push(id);
    }

    pub fn record(&self, id: RecordId) -> Option<AttendanceRecord> {
        self.lock().attendance.get(&id).cloned()
    }

    pub fn records(&self) -> Vec<AttendanceRecord> {
        self.lock().attendance.values().cloned().collect()
    }

    pub fn summary(&self, key: &DayKey) -> Option<DailySummary> {
        self.lock().summaries.get(key).cloned()
    }

    pub fn attendance_pushes(&self) -> usize {
        self.lock().attendance_pushes
    }

    pub fn summary_pushes(&self) -> usize {
        self.lock().summary_pushes
    }

    fn ensure_online(state: &ServerState) -> Result<()> {
        if state.offline {
            Err(Error::Network("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

fn as_server(mut record: AttendanceRecord) -> AttendanceRecord {
    record.sync_status = SyncStatus::Synced;
    record.source = RecordSource::Server;
    record
}

#[async_trait]
impl RemoteClient for MemoryRemote {
    async fn push_attendance(&self, records: &[AttendanceRecord]) -> Result<PushAck> {
        let mut state = self.lock();
        Self::ensure_online(&state)?;
        state.attendance_pushes += 1;

        let mut assigned = Vec::new();
        for record in records {
            let mut stored = as_server(record.clone());
            if record.id.is_provisional() {
                let server_id = RecordId::new(state.next_id);
                state.next_id += 1;
                assigned.push(IdAssignment {
                    local_id: record.id,
                    server_id,
                });
                stored.id = server_id;
            }
            state.attendance.insert(stored.id, stored);
        }

        Ok(PushAck {
            success: true,
            count: records.len(),
            assigned,
            rejected: Vec::new(),
            message: None,
        })
    }

    async fn push_summary(&self, summaries: &[DailySummary]) -> Result<SummaryAck> {
        let mut state = self.lock();
        Self::ensure_online(&state)?;
        state.summary_pushes += 1;

        for summary in summaries {
            let mut stored = summary.clone();
            stored.sync_status = SyncStatus::Synced;
            state.summaries.insert(stored.key(), stored);
        }

        Ok(SummaryAck {
            success: true,
            count: summaries.len(),
            rejected: Vec::new(),
            message: None,
        })
    }

    async fn pull_server_edits(&self, _since: NaiveDateTime) -> Result<ServerEdits> {
        let mut state = self.lock();
        Self::ensure_online(&state)?;
        Ok(std::mem::take(&mut state.pending_edits))
    }

    async fn pull_full_range(&self, start: NaiveDate, end: NaiveDate) -> Result<RangeSnapshot> {
        let state = self.lock();
        Self::ensure_online(&state)?;
        let in_range = |date: NaiveDate| date >= start && date <= end;
        Ok(RangeSnapshot {
            attendance: state
                .attendance
                .values()
                .filter(|record| in_range(record.work_date()))
                .cloned()
                .collect(),
            summary: state
                .summaries
                .values()
                .filter(|summary| in_range(summary.date))
                .cloned()
                .collect(),
        })
    }
}

type PushHook = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// [`MemoryRemote`] that runs a one-shot hook while an attendance batch is
/// in flight, after the engine listed the records but before it sees the ack
#[derive(Clone, Default)]
pub struct HookedRemote {
    server: MemoryRemote,
    hook: Arc<Mutex<Option<PushHook>>>,
}

impl HookedRemote {
    pub fn new() -> Self {
        Self {
            server: MemoryRemote::new(),
            hook: Arc::default(),
        }
    }

    pub fn server(&self) -> &MemoryRemote {
        &self.server
    }

    pub fn during_attendance_push<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.hook.lock().unwrap() = Some(Box::new(move || Box::pin(hook())));
    }
}

#[async_trait]
impl RemoteClient for HookedRemote {
    async fn push_attendance(&self, records: &[AttendanceRecord]) -> Result<PushAck> {
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook().await;
        }
        self.server.push_attendance(records).await
    }

    async fn push_summary(&self, summaries: &[DailySummary]) -> Result<SummaryAck> {
        self.server.push_summary(summaries).await
    }

    async fn pull_server_edits(&self, since: NaiveDateTime) -> Result<ServerEdits> {
        self.server.pull_server_edits(since).await
    }

    async fn pull_full_range(&self, start: NaiveDate, end: NaiveDate) -> Result<RangeSnapshot> {
        self.server.pull_full_range(start, end).await
    }
}
