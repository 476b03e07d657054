//! Single-flight guard shared by the mutating pipelines.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::events::Pipeline;
use crate::error::{Error, Result};

/// At most one of upload, server-edit apply and action apply runs at a
/// time. A second request is rejected, never queued.
#[derive(Debug, Clone, Default)]
pub struct ProcessingLock {
    active: Arc<Mutex<Option<Pipeline>>>,
}

impl ProcessingLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Pipeline>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the lock for `pipeline`; released when the guard drops.
    pub fn try_acquire(&self, pipeline: Pipeline) -> Result<ProcessingGuard> {
        let mut slot = self.slot();
        if let Some(active) = *slot {
            return Err(Error::LockRejected {
                active: active.to_string(),
            });
        }
        *slot = Some(pipeline);
        Ok(ProcessingGuard { lock: self.clone() })
    }

    /// The pipeline currently holding the lock
    pub fn active(&self) -> Option<Pipeline> {
        *self.slot()
    }
}

#[derive(Debug)]
pub struct ProcessingGuard {
    lock: ProcessingLock,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        *self.lock.slot() = None;
    }
}
