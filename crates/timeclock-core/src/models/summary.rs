//! Daily summary model

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::attendance::{hours_eq, DayKey, Session, SyncStatus};

/// Earliest clock-in and latest clock-out of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSpan {
    pub clock_in: Option<NaiveDateTime>,
    pub clock_out: Option<NaiveDateTime>,
}

/// Per-day aggregate derived from an employee's attendance records.
///
/// Never the source of truth: it can always be rebuilt from the records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub employee_id: String,
    pub date: NaiveDate,
    pub morning: SessionSpan,
    pub afternoon: SessionSpan,
    pub evening: SessionSpan,
    pub overtime: SessionSpan,
    pub regular_hours: f64,
    pub overtime_hours: f64,
    pub total_hours: f64,
    pub has_late_entry: bool,
    pub is_incomplete: bool,
    #[serde(default)]
    pub sync_status: SyncStatus,
}

impl DailySummary {
    /// An empty pending summary for the given day
    pub fn empty(key: &DayKey) -> Self {
        Self {
            employee_id: key.employee_id.clone(),
            date: key.date,
            morning: SessionSpan::default(),
            afternoon: SessionSpan::default(),
            evening: SessionSpan::default(),
            overtime: SessionSpan::default(),
            regular_hours: 0.0,
            overtime_hours: 0.0,
            total_hours: 0.0,
            has_late_entry: false,
            is_incomplete: false,
            sync_status: SyncStatus::Pending,
        }
    }

    pub fn key(&self) -> DayKey {
        DayKey::new(self.employee_id.clone(), self.date)
    }

    /// Compare everything except `sync_status`
    pub fn same_content(&self, other: &Self) -> bool {
        self.employee_id == other.employee_id
            && self.date == other.date
            && self.morning == other.morning
            && self.afternoon == other.afternoon
            && self.evening == other.evening
            && self.overtime == other.overtime
            && hours_eq(self.regular_hours, other.regular_hours)
            && hours_eq(self.overtime_hours, other.overtime_hours)
            && hours_eq(self.total_hours, other.total_hours)
            && self.has_late_entry == other.has_late_entry
            && self.is_incomplete == other.is_incomplete
    }

    pub const fn session(&self, session: Session) -> &SessionSpan {
        match session {
            Session::Morning => &self.morning,
            Session::Afternoon => &self.afternoon,
            Session::Evening => &self.evening,
            Session::Overtime => &self.overtime,
        }
    }

    pub fn session_mut(&mut self, session: Session) -> &mut SessionSpan {
        match session {
            Session::Morning => &mut self.morning,
            Session::Afternoon => &mut self.afternoon,
            Session::Evening => &mut self.evening,
            Session::Overtime => &mut self.overtime,
        }
    }
}
