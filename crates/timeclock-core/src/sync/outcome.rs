//! Uniform result shape returned by every engine entry point.

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutcome<C> {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Counts gathered so far, also on failure
    pub counts: C,
}

impl<C> PipelineOutcome<C> {
    pub fn succeeded(message: impl Into<String>, counts: C) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            error_kind: None,
            counts,
        }
    }

    pub fn failed(error: &Error, counts: C) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            counts,
        }
    }

    /// Build an outcome from a pipeline run that may have failed part way
    pub fn from_run(result: Result<String, Error>, counts: C) -> Self {
        match result {
            Ok(message) => Self::succeeded(message, counts),
            Err(error) => Self::failed(&error, counts),
        }
    }

    pub fn is_lock_rejected(&self) -> bool {
        self.error_kind == Some(ErrorKind::LockRejected)
    }
}
