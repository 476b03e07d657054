//! Attendance repository implementation

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::models::{
    AttendanceRecord, ClockType, DayKey, RecordId, RecordSource, SyncStatus,
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
/// Fractional seconds are written only when present and are optional on read
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const ATTENDANCE_COLUMNS: &str = "id, employee_id, clock_type, clock_time, regular_hours, \
     overtime_hours, is_overtime_session, sync_status, source";

/// Trait for attendance storage operations
pub trait AttendanceRepository {
    /// Get a record by id
    fn get(&self, id: RecordId) -> Result<Option<AttendanceRecord>>;

    /// Insert a new record; fails if the id is already taken
    fn insert(&self, record: &AttendanceRecord) -> Result<()>;

    /// Insert or fully overwrite a record by id
    fn upsert(&self, record: &AttendanceRecord) -> Result<()>;

    /// Fully overwrite an existing record
    fn update(&self, record: &AttendanceRecord) -> Result<()>;

    /// Delete a record, returning whether a row was removed
    fn delete(&self, id: RecordId) -> Result<bool>;

    /// Records with a work date inside `[start, end]`, ordered by clock time
    fn list_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AttendanceRecord>>;

    /// Every record, ordered by clock time
    fn list_all(&self) -> Result<Vec<AttendanceRecord>>;

    /// Records of a single employee-day, ordered by clock time
    fn list_for_day(&self, key: &DayKey) -> Result<Vec<AttendanceRecord>>;

    /// Records not yet acknowledged by the server
    fn list_unsynced(&self) -> Result<Vec<AttendanceRecord>>;

    /// Distinct employee-days that have at least one pending record
    fn unsynced_day_keys(&self) -> Result<Vec<DayKey>>;

    /// Number of pending records
    fn unsynced_count(&self) -> Result<usize>;

    /// Mark pushed records synced where the stored row still matches what
    /// was pushed; a row rewritten since the push stays pending
    fn mark_synced(&self, pushed: &[AttendanceRecord]) -> Result<usize>;

    /// Mark a record as pending so the next upload pushes it
    fn mark_pending(&self, id: RecordId) -> Result<()>;

    /// Re-key a pushed provisional record to its server-assigned id.
    ///
    /// The row is marked synced only if it still matches what was pushed;
    /// returns whether it was.
    fn reassign_id(&self, pushed: &AttendanceRecord, server: RecordId) -> Result<bool>;

    /// Next unused provisional (negative) id
    fn next_provisional_id(&self) -> Result<RecordId>;
}

/// `SQLite` implementation of `AttendanceRepository`
pub struct SqliteAttendanceRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteAttendanceRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a record from a database row
    fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRecord> {
        let clock_type: String = row.get(2)?;
        let clock_time: String = row.get(3)?;
        let sync_status: String = row.get(7)?;
        let source: String = row.get(8)?;
        Ok(AttendanceRecord {
            id: RecordId::new(row.get(0)?),
            employee_id: row.get(1)?,
            clock_type: clock_type
                .parse::<ClockType>()
                .map_err(|error| conversion_error(2, error))?,
            clock_time: parse_datetime(3, &clock_time)?,
            regular_hours: row.get(4)?,
            overtime_hours: row.get(5)?,
            is_overtime_session: row.get::<_, i32>(6)? != 0,
            sync_status: SyncStatus::parse(&sync_status),
            source: RecordSource::parse(&source),
        })
    }

    fn query(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<AttendanceRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params, Self::parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn unchanged_since_push(&self, pushed: &AttendanceRecord) -> Result<bool> {
        Ok(self
            .get(pushed.id)?
            .is_some_and(|current| current.same_content(pushed)))
    }

    fn write(&self, verb: &str, record: &AttendanceRecord) -> Result<usize> {
        let sql = format!(
            "{verb} INTO attendance (id, employee_id, work_date, clock_type, clock_time, \
             regular_hours, overtime_hours, is_overtime_session, sync_status, source) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        let rows = self.conn.execute(
            &sql,
            params![
                record.id.get(),
                record.employee_id,
                format_date(record.work_date()),
                record.clock_type.as_str(),
                format_datetime(record.clock_time),
                record.regular_hours,
                record.overtime_hours,
                i32::from(record.is_overtime_session),
                record.sync_status.as_str(),
                record.source.as_str(),
            ],
        )?;
        Ok(rows)
    }
}

impl AttendanceRepository for SqliteAttendanceRepository<'_> {
    fn get(&self, id: RecordId) -> Result<Option<AttendanceRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?"),
                params![id.get()],
                Self::parse_record,
            )
            .optional()?;
        Ok(record)
    }

    fn insert(&self, record: &AttendanceRecord) -> Result<()> {
        if self.get(record.id)?.is_some() {
            return Err(Error::InvalidInput(format!(
                "attendance record {} already exists",
                record.id
            )));
        }
        self.write("INSERT", record)?;
        Ok(())
    }

    fn upsert(&self, record: &AttendanceRecord) -> Result<()> {
        self.write("INSERT OR REPLACE", record)?;
        Ok(())
    }

    fn update(&self, record: &AttendanceRecord) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE attendance SET employee_id = ?, work_date = ?, clock_type = ?, clock_time = ?,
                 regular_hours = ?, overtime_hours = ?, is_overtime_session = ?,
                 sync_status = ?, source = ?
             WHERE id = ?",
            params![
                record.employee_id,
                format_date(record.work_date()),
                record.clock_type.as_str(),
                format_datetime(record.clock_time),
                record.regular_hours,
                record.overtime_hours,
                i32::from(record.is_overtime_session),
                record.sync_status.as_str(),
                record.source.as_str(),
                record.id.get(),
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("attendance record {}", record.id)));
        }
        Ok(())
    }

    fn delete(&self, id: RecordId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM attendance WHERE id = ?", params![id.get()])?;
        Ok(rows > 0)
    }

    fn list_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        self.query(
            &format!(
                "SELECT {ATTENDANCE_COLUMNS} FROM attendance
                 WHERE work_date >= ? AND work_date <= ?
                 ORDER BY clock_time ASC, id ASC"
            ),
            params![format_date(start), format_date(end)],
        )
    }

    fn list_all(&self) -> Result<Vec<AttendanceRecord>> {
        self.query(
            &format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance ORDER BY clock_time ASC, id ASC"),
            [],
        )
    }

    fn list_for_day(&self, key: &DayKey) -> Result<Vec<AttendanceRecord>> {
        self.query(
            &format!(
                "SELECT {ATTENDANCE_COLUMNS} FROM attendance
                 WHERE employee_id = ? AND work_date = ?
                 ORDER BY clock_time ASC, id ASC"
            ),
            params![key.employee_id, format_date(key.date)],
        )
    }

    fn list_unsynced(&self) -> Result<Vec<AttendanceRecord>> {
        self.query(
            &format!(
                "SELECT {ATTENDANCE_COLUMNS} FROM attendance
                 WHERE sync_status = 'pending'
                 ORDER BY clock_time ASC, id ASC"
            ),
            [],
        )
    }

    fn unsynced_day_keys(&self) -> Result<Vec<DayKey>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT employee_id, work_date FROM attendance
             WHERE sync_status = 'pending'
             ORDER BY work_date ASC, employee_id ASC",
        )?;
        let keys = stmt
            .query_map([], |row| {
                let date: String = row.get(1)?;
                Ok(DayKey::new(row.get::<_, String>(0)?, parse_date(1, &date)?))
            })?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(keys.into_iter().collect())
    }

    fn unsynced_count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM attendance WHERE sync_status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn mark_synced(&self, pushed: &[AttendanceRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut updated = 0;
        for record in pushed {
            if !self.unchanged_since_push(record)? {
                tracing::debug!(record_id = %record.id, "Record changed after push; stays pending");
                continue;
            }
            updated += tx.execute(
                "UPDATE attendance SET sync_status = 'synced' WHERE id = ?",
                params![record.id.get()],
            )?;
        }
        tx.commit()?;
        Ok(updated)
    }

    fn mark_pending(&self, id: RecordId) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE attendance SET sync_status = 'pending' WHERE id = ?",
            params![id.get()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("attendance record {id}")));
        }
        Ok(())
    }

    fn reassign_id(&self, pushed: &AttendanceRecord, server: RecordId) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let unchanged = self.unchanged_since_push(pushed)?;
        let status = if unchanged {
            SyncStatus::Synced
        } else {
            SyncStatus::Pending
        };
        let rows = tx.execute(
            "UPDATE OR REPLACE attendance SET id = ?, sync_status = ? WHERE id = ?",
            params![server.get(), status.as_str(), pushed.id.get()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("attendance record {}", pushed.id)));
        }
        tx.commit()?;
        Ok(unchanged)
    }

    fn next_provisional_id(&self) -> Result<RecordId> {
        let min: Option<i64> =
            self.conn
                .query_row("SELECT MIN(id) FROM attendance", [], |row| row.get(0))?;
        Ok(RecordId::new(min.unwrap_or(0).min(0) - 1))
    }
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn format_datetime(value: NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn parse_date(column: usize, value: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|error| conversion_error(column, error))
}

pub(crate) fn parse_datetime(column: usize, value: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .map_err(|error| conversion_error(column, error))
}

fn conversion_error(
    column: usize,
    error: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(error))
}
