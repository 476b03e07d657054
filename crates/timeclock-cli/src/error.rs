use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] timeclock_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Employee ID cannot be empty")]
    EmptyEmployeeId,
    #[error("Invalid date/time '{0}', expected YYYY-MM-DD HH:MM[:SS]")]
    InvalidDateTime(String),
    #[error("Invalid action '{0}', expected <add|update|delete|keep>:<record id>")]
    InvalidAction(String),
    #[error("No proposed {kind} action for record {record_id}")]
    ActionNotProposed { kind: String, record_id: String },
    #[error(
        "Remote sync is not configured. Set remote.base_url in the config file or TIMECLOCK_REMOTE_URL."
    )]
    RemoteNotConfigured,
    #[error("{0}")]
    Pipeline(String),
}
