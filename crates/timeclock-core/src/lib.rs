//! timeclock-core - Core library for timeclock
//!
//! This crate contains the attendance models, the local `SQLite` store, the
//! validation and summary logic, and the offline-first sync engine used by
//! every timeclock client.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod remote;
pub mod services;
pub mod summary;
pub mod sync;
pub mod util;
pub mod validation;

pub use config::{EngineConfig, RemoteConfig, TimeOfDay, WorkSchedule};
pub use error::{Error, ErrorKind, Result};
pub use models::{
    AttendanceRecord, ClockType, ComparisonReport, DailySummary, DayKey, RecordId,
    ReconciliationAction, Session, SyncStatus,
};
pub use remote::{DisconnectedRemote, HttpRemoteClient, RemoteClient};
pub use services::LocalStore;
pub use sync::{PipelineOutcome, SyncEngine, SyncEvent};
pub use validation::{ValidationOptions, ValidationPolicy, ValidationReport, ValidationScope};
