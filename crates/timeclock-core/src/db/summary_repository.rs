//! Daily summary repository implementation

use crate::error::Result;
use crate::models::{DailySummary, DayKey, SessionSpan, SyncStatus};
use rusqlite::{params, Connection, OptionalExtension};

use super::repository::{format_date, format_datetime, parse_date, parse_datetime};

const SUMMARY_COLUMNS: &str = "employee_id, work_date, morning_in, morning_out, afternoon_in, \
     afternoon_out, evening_in, evening_out, overtime_in, overtime_out, regular_hours, \
     overtime_hours, total_hours, has_late_entry, is_incomplete, sync_status";

/// Trait for daily summary storage operations
pub trait SummaryRepository {
    /// Get the summary of one employee-day
    fn get(&self, key: &DayKey) -> Result<Option<DailySummary>>;

    /// Insert or fully replace the summary row for its key
    fn upsert(&self, summary: &DailySummary) -> Result<()>;

    /// Delete a summary, returning whether a row was removed
    fn delete(&self, key: &DayKey) -> Result<bool>;

    /// Summaries not yet acknowledged by the server
    fn list_unsynced(&self) -> Result<Vec<DailySummary>>;

    /// Number of pending summaries
    fn unsynced_count(&self) -> Result<usize>;

    /// Mark pushed summaries synced where the stored row still matches
    /// what was pushed
    fn mark_synced(&self, pushed: &[DailySummary]) -> Result<usize>;
}

/// `SQLite` implementation of `SummaryRepository`
pub struct SqliteSummaryRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSummaryRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailySummary> {
        let date: String = row.get(1)?;
        let sync_status: String = row.get(15)?;
        Ok(DailySummary {
            employee_id: row.get(0)?,
            date: parse_date(1, &date)?,
            morning: Self::parse_span(row, 2)?,
            afternoon: Self::parse_span(row, 4)?,
            evening: Self::parse_span(row, 6)?,
            overtime: Self::parse_span(row, 8)?,
            regular_hours: row.get(10)?,
            overtime_hours: row.get(11)?,
            total_hours: row.get(12)?,
            has_late_entry: row.get::<_, i32>(13)? != 0,
            is_incomplete: row.get::<_, i32>(14)? != 0,
            sync_status: SyncStatus::parse(&sync_status),
        })
    }

    fn parse_span(row: &rusqlite::Row<'_>, first: usize) -> rusqlite::Result<SessionSpan> {
        let clock_in: Option<String> = row.get(first)?;
        let clock_out: Option<String> = row.get(first + 1)?;
        Ok(SessionSpan {
            clock_in: clock_in
                .map(|value| parse_datetime(first, &value))
                .transpose()?,
            clock_out: clock_out
                .map(|value| parse_datetime(first + 1, &value))
                .transpose()?,
        })
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<DailySummary>> {
        let mut stmt = self.conn.prepare(sql)?;
        let summaries = stmt
            .query_map(params, Self::parse_summary)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }
}

impl SummaryRepository for SqliteSummaryRepository<'_> {
    fn get(&self, key: &DayKey) -> Result<Option<DailySummary>> {
        let summary = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SUMMARY_COLUMNS} FROM daily_summary
                     WHERE employee_id = ? AND work_date = ?"
                ),
                params![key.employee_id, format_date(key.date)],
                Self::parse_summary,
            )
            .optional()?;
        Ok(summary)
    }

    fn upsert(&self, summary: &DailySummary) -> Result<()> {
        let span = |value: Option<chrono::NaiveDateTime>| value.map(format_datetime);
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO daily_summary ({SUMMARY_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                summary.employee_id,
                format_date(summary.date),
                span(summary.morning.clock_in),
                span(summary.morning.clock_out),
                span(summary.afternoon.clock_in),
                span(summary.afternoon.clock_out),
                span(summary.evening.clock_in),
                span(summary.evening.clock_out),
                span(summary.overtime.clock_in),
                span(summary.overtime.clock_out),
                summary.regular_hours,
                summary.overtime_hours,
                summary.total_hours,
                i32::from(summary.has_late_entry),
                i32::from(summary.is_incomplete),
                summary.sync_status.as_str(),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, key: &DayKey) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM daily_summary WHERE employee_id = ? AND work_date = ?",
            params![key.employee_id, format_date(key.date)],
        )?;
        Ok(rows > 0)
    }

    fn list_unsynced(&self) -> Result<Vec<DailySummary>> {
        self.query(
            &format!(
                "SELECT {SUMMARY_COLUMNS} FROM daily_summary
                 WHERE sync_status = 'pending'
                 ORDER BY work_date ASC, employee_id ASC"
            ),
            [],
        )
    }

    fn unsynced_count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM daily_summary WHERE sync_status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn mark_synced(&self, pushed: &[DailySummary]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut updated = 0;
        for summary in pushed {
            let key = summary.key();
            let unchanged = self
                .get(&key)?
                .is_some_and(|current| current.same_content(summary));
            if !unchanged {
                tracing::debug!(day = %key, "Summary changed after push; stays pending");
                continue;
            }
            updated += tx.execute(
                "UPDATE daily_summary SET sync_status = 'synced'
                 WHERE employee_id = ? AND work_date = ?",
                params![key.employee_id, format_date(key.date)],
            )?;
        }
        tx.commit()?;
        Ok(updated)
    }
}
