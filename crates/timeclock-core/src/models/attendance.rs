//! Attendance record model

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of an attendance record.
///
/// Positive values are server-assigned. Records created on this device carry
/// a provisional negative id until the server acknowledges them and assigns
/// the permanent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    /// True for ids that have not been acknowledged by the server yet
    pub const fn is_provisional(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// One of the four fixed daily work periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    Morning,
    Afternoon,
    Evening,
    Overtime,
}

impl Session {
    pub const ALL: [Self; 4] = [Self::Morning, Self::Afternoon, Self::Evening, Self::Overtime];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Overtime => "overtime",
        }
    }

    pub const fn is_overtime(self) -> bool {
        matches!(self, Self::Overtime)
    }
}

/// Which half of which session an attendance record represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockType {
    MorningIn,
    MorningOut,
    AfternoonIn,
    AfternoonOut,
    EveningIn,
    EveningOut,
    OvertimeIn,
    OvertimeOut,
}

impl ClockType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MorningIn => "morning_in",
            Self::MorningOut => "morning_out",
            Self::AfternoonIn => "afternoon_in",
            Self::AfternoonOut => "afternoon_out",
            Self::EveningIn => "evening_in",
            Self::EveningOut => "evening_out",
            Self::OvertimeIn => "overtime_in",
            Self::OvertimeOut => "overtime_out",
        }
    }

    pub const fn session(self) -> Session {
        match self {
            Self::MorningIn | Self::MorningOut => Session::Morning,
            Self::AfternoonIn | Self::AfternoonOut => Session::Afternoon,
            Self::EveningIn | Self::EveningOut => Session::Evening,
            Self::OvertimeIn | Self::OvertimeOut => Session::Overtime,
        }
    }

    pub const fn is_in(self) -> bool {
        matches!(
            self,
            Self::MorningIn | Self::AfternoonIn | Self::EveningIn | Self::OvertimeIn
        )
    }

    pub const fn is_out(self) -> bool {
        !self.is_in()
    }
}

impl fmt::Display for ClockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClockType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "morning_in" => Ok(Self::MorningIn),
            "morning_out" => Ok(Self::MorningOut),
            "afternoon_in" => Ok(Self::AfternoonIn),
            "afternoon_out" => Ok(Self::AfternoonOut),
            "evening_in" => Ok(Self::EveningIn),
            "evening_out" => Ok(Self::EveningOut),
            "overtime_in" => Ok(Self::OvertimeIn),
            "overtime_out" => Ok(Self::OvertimeOut),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown clock type '{other}'"
            ))),
        }
    }
}

/// Whether the remote server has acknowledged a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("synced") {
            Self::Synced
        } else {
            Self::Pending
        }
    }
}

/// The two kinds of rows that are pushed to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Attendance,
    Summary,
}

/// Where a record originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    #[default]
    Local,
    Server,
}

impl RecordSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Server => "server",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("server") {
            Self::Server
        } else {
            Self::Local
        }
    }
}

/// Composite key of an employee's working day
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DayKey {
    pub employee_id: String,
    pub date: NaiveDate,
}

impl DayKey {
    pub fn new(employee_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            employee_id: employee_id.into(),
            date,
        }
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.employee_id, self.date)
    }
}

/// A single clock-in or clock-out event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub employee_id: String,
    pub clock_type: ClockType,
    /// Site-local wall-clock time of the scan
    pub clock_time: NaiveDateTime,
    #[serde(default)]
    pub regular_hours: f64,
    #[serde(default)]
    pub overtime_hours: f64,
    #[serde(default)]
    pub is_overtime_session: bool,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub source: RecordSource,
}

impl AttendanceRecord {
    /// Create a pending, locally originated record with zeroed hours
    pub fn new_local(
        id: RecordId,
        employee_id: impl Into<String>,
        clock_type: ClockType,
        clock_time: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            employee_id: employee_id.into(),
            clock_type,
            clock_time,
            regular_hours: 0.0,
            overtime_hours: 0.0,
            is_overtime_session: clock_type.session().is_overtime(),
            sync_status: SyncStatus::Pending,
            source: RecordSource::Local,
        }
    }

    pub fn work_date(&self) -> NaiveDate {
        self.clock_time.date()
    }

    pub fn day_key(&self) -> DayKey {
        DayKey::new(self.employee_id.clone(), self.work_date())
    }

    pub const fn session(&self) -> Session {
        self.clock_type.session()
    }

    pub fn total_hours(&self) -> f64 {
        round_hours(self.regular_hours + self.overtime_hours)
    }

    /// Compare the business fields, ignoring local bookkeeping
    /// (`sync_status`, `source`).
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.employee_id == other.employee_id
            && self.clock_type == other.clock_type
            && self.clock_time == other.clock_time
            && hours_eq(self.regular_hours, other.regular_hours)
            && hours_eq(self.overtime_hours, other.overtime_hours)
            && self.is_overtime_session == other.is_overtime_session
    }
}

/// Round an hour amount to two decimals
pub fn round_hours(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

/// Equality for hour amounts after rounding to two decimals
pub fn hours_eq(left: f64, right: f64) -> bool {
    (round_hours(left) - round_hours(right)).abs() < 0.005
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn clock_type_parse_accepts_dashes_and_case() {
        assert_eq!(
            "Morning-In".parse::<ClockType>().unwrap(),
            ClockType::MorningIn
        );
        assert_eq!(
            "overtime_out".parse::<ClockType>().unwrap(),
            ClockType::OvertimeOut
        );
        assert!("lunch_in".parse::<ClockType>().is_err());
    }

    #[test]
    fn clock_type_session_and_direction() {
        assert_eq!(ClockType::EveningOut.session(), Session::Evening);
        assert!(ClockType::AfternoonIn.is_in());
        assert!(ClockType::AfternoonOut.is_out());
    }

    #[test]
    fn provisional_ids_are_negative() {
        assert!(RecordId::new(-1).is_provisional());
        assert!(!RecordId::new(42).is_provisional());
    }

    #[test]
    fn new_local_marks_overtime_sessions() {
        let record =
            AttendanceRecord::new_local(RecordId::new(-1), "E1", ClockType::OvertimeIn, at("2024-03-01 18:00"));
        assert!(record.is_overtime_session);
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.source, RecordSource::Local);
        assert_eq!(record.day_key().to_string(), "E1@2024-03-01");
    }

    #[test]
    fn same_content_ignores_bookkeeping() {
        let local =
            AttendanceRecord::new_local(RecordId::new(7), "E1", ClockType::MorningIn, at("2024-03-01 08:00"));
        let mut server = local.clone();
        server.sync_status = SyncStatus::Synced;
        server.source = RecordSource::Server;
        assert!(local.same_content(&server));

        server.clock_time = at("2024-03-01 08:10");
        assert!(!local.same_content(&server));
    }

    #[test]
    fn record_serializes_with_snake_case_clock_type() {
        let record =
            AttendanceRecord::new_local(RecordId::new(3), "E1", ClockType::MorningOut, at("2024-03-01 12:00"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["clock_type"], "morning_out");
        assert_eq!(json["sync_status"], "pending");
        assert_eq!(json["id"], 3);
    }
}
