//! Shared local store service used by the sync engine and clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::Mutex;

use crate::db::{
    AttendanceRepository, Database, SqliteAttendanceRepository, SqliteSummaryRepository,
    SummaryRepository,
};
use crate::models::{AttendanceRecord, ClockType, DailySummary, DayKey, RecordId, RecordKind};
use crate::{Error, Result};

/// Thread-safe handle to the local attendance database.
///
/// The process is the only writer; every operation takes the connection
/// mutex for the duration of one repository call.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open a store at the given filesystem path.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let db = Database::open(&db_path)?;
        tracing::info!("Local store opened at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Record a locally scanned clock event under a fresh provisional id.
    ///
    /// Rejects an `_in` while the same session is still open for that
    /// employee-day.
    pub async fn insert_clock_event(
        &self,
        employee_id: &str,
        clock_type: ClockType,
        clock_time: NaiveDateTime,
    ) -> Result<AttendanceRecord> {
        let db = self.db.lock().await;
        let repo = SqliteAttendanceRepository::new(db.connection());

        if clock_type.is_in() {
            let key = DayKey::new(employee_id, clock_time.date());
            let day = repo.list_for_day(&key)?;
            if session_is_open(&day, clock_type) {
                return Err(Error::InvalidInput(format!(
                    "{} already has an open {} session on {}",
                    employee_id,
                    clock_type.session().as_str(),
                    key.date
                )));
            }
        }

        let id = repo.next_provisional_id()?;
        let record = AttendanceRecord::new_local(id, employee_id, clock_type, clock_time);
        repo.insert(&record)?;
        Ok(record)
    }

    /// Fetch an attendance record by id.
    pub async fn get_attendance(&self, id: RecordId) -> Result<Option<AttendanceRecord>> {
        let db = self.db.lock().await;
        SqliteAttendanceRepository::new(db.connection()).get(id)
    }

    /// Insert a record under its own id.
    pub async fn insert_attendance(&self, record: &AttendanceRecord) -> Result<()> {
        let db = self.db.lock().await;
        SqliteAttendanceRepository::new(db.connection()).insert(record)
    }

    /// Insert or fully overwrite a record by id.
    pub async fn upsert_attendance(&self, record: &AttendanceRecord) -> Result<()> {
        let db = self.db.lock().await;
        SqliteAttendanceRepository::new(db.connection()).upsert(record)
    }

    /// Fully overwrite an existing record.
    pub async fn update_attendance(&self, record: &AttendanceRecord) -> Result<()> {
        let db = self.db.lock().await;
        SqliteAttendanceRepository::new(db.connection()).update(record)
    }

    /// Delete a record; returns whether it existed.
    pub async fn delete_attendance(&self, id: RecordId) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteAttendanceRepository::new(db.connection()).delete(id)
    }

    pub async fn list_attendance_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>> {
        let db = self.db.lock().await;
        SqliteAttendanceRepository::new(db.connection()).list_range(start, end)
    }

    pub async fn list_all_attendance(&self) -> Result<Vec<AttendanceRecord>> {
        let db = self.db.lock().await;
        SqliteAttendanceRepository::new(db.connection()).list_all()
    }

    pub async fn list_attendance_for_day(&self, key: &DayKey) -> Result<Vec<AttendanceRecord>> {
        let db = self.db.lock().await;
        SqliteAttendanceRepository::new(db.connection()).list_for_day(key)
    }

    pub async fn list_unsynced_attendance(&self) -> Result<Vec<AttendanceRecord>> {
        let db = self.db.lock().await;
        SqliteAttendanceRepository::new(db.connection()).list_unsynced()
    }

    /// Employee-days with at least one pending attendance record.
    pub async fn unsynced_attendance_days(&self) -> Result<Vec<DayKey>> {
        let db = self.db.lock().await;
        SqliteAttendanceRepository::new(db.connection()).unsynced_day_keys()
    }

    /// Number of rows of the given kind awaiting upload.
    pub async fn unsynced_count(&self, kind: RecordKind) -> Result<usize> {
        let db = self.db.lock().await;
        match kind {
            RecordKind::Attendance => {
                SqliteAttendanceRepository::new(db.connection()).unsynced_count()
            }
            RecordKind::Summary => SqliteSummaryRepository::new(db.connection()).unsynced_count(),
        }
    }

    /// Mark acknowledged records synced unless they changed after the push.
    pub async fn mark_attendance_synced(&self, pushed: &[AttendanceRecord]) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteAttendanceRepository::new(db.connection()).mark_synced(pushed)
    }

    pub async fn mark_attendance_pending(&self, id: RecordId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteAttendanceRepository::new(db.connection()).mark_pending(id)
    }

    /// Re-key an acknowledged provisional record to its server id; returns
    /// whether it was also marked synced.
    pub async fn reassign_attendance_id(
        &self,
        pushed: &AttendanceRecord,
        server: RecordId,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteAttendanceRepository::new(db.connection()).reassign_id(pushed, server)
    }

    pub async fn get_summary(&self, key: &DayKey) -> Result<Option<DailySummary>> {
        let db = self.db.lock().await;
        SqliteSummaryRepository::new(db.connection()).get(key)
    }

    /// Replace the summary row for its key.
    pub async fn upsert_summary(&self, summary: &DailySummary) -> Result<()> {
        let db = self.db.lock().await;
        SqliteSummaryRepository::new(db.connection()).upsert(summary)
    }

    pub async fn delete_summary(&self, key: &DayKey) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteSummaryRepository::new(db.connection()).delete(key)
    }

    pub async fn list_unsynced_summaries(&self) -> Result<Vec<DailySummary>> {
        let db = self.db.lock().await;
        SqliteSummaryRepository::new(db.connection()).list_unsynced()
    }

    pub async fn mark_summaries_synced(&self, pushed: &[DailySummary]) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteSummaryRepository::new(db.connection()).mark_synced(pushed)
    }
}

/// True when the latest event of `clock_type`'s session that day is an `_in`
fn session_is_open(day: &[AttendanceRecord], clock_type: ClockType) -> bool {
    day.iter()
        .filter(|record| record.session() == clock_type.session())
        .max_by_key(|record| (record.clock_time, record.id))
        .is_some_and(|record| record.clock_type.is_in())
}
