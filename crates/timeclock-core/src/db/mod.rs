//! Database layer for timeclock

mod connection;
mod migrations;
mod repository;
mod summary_repository;

pub use connection::Database;
pub use repository::{AttendanceRepository, SqliteAttendanceRepository};
pub use summary_repository::{SqliteSummaryRepository, SummaryRepository};
