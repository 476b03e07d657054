//! Error types for timeclock-core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using timeclock-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in timeclock-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A single record could not be validated or corrected
    #[error("Validation failed for record {record_id}: {reason}")]
    Validation { record_id: i64, reason: String },

    /// Remote transport failure; fatal to the running pipeline
    #[error("Network error: {0}")]
    Network(String),

    /// A single reconciliation action failed
    #[error("Action on record {record_id} failed: {reason}")]
    ActionExecution { record_id: i64, reason: String },

    /// Another pipeline already holds the processing lock
    #[error("Processing lock active: {active} is running")]
    LockRejected { active: String },

    /// The pipeline observed a cancellation request between steps
    #[error("Pipeline cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

/// Coarse error taxonomy surfaced to callers in pipeline outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Storage,
    InvalidInput,
    Validation,
    Network,
    ActionExecution,
    LockRejected,
    Cancelled,
    Config,
}

impl Error {
    /// Classify this error for status reporting.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Sqlite(_) | Self::Io(_) | Self::Serialization(_) => ErrorKind::Storage,
            Self::NotFound(_) | Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Network(_) => ErrorKind::Network,
            Self::ActionExecution { .. } => ErrorKind::ActionExecution,
            Self::LockRejected { .. } => ErrorKind::LockRejected,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_rejection_is_classified() {
        let error = Error::LockRejected {
            active: "upload".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::LockRejected);
        assert!(error.to_string().contains("Processing lock active"));
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ActionExecution).unwrap();
        assert_eq!(json, "\"action_execution\"");
    }
}
