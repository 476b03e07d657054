//! Typed progress events published by the pipelines.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ErrorKind;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Pipelines guarded by the processing lock, plus the scheduler itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    Upload,
    ServerEdits,
    ApplyActions,
    Scheduler,
}

impl Pipeline {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::ServerEdits => "server_edits",
            Self::ApplyActions => "apply_actions",
            Self::Scheduler => "scheduler",
        }
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Validate,
    RebuildSummaries,
    PushAttendance,
    SettleDelay,
    PushSummaries,
    PullEdits,
    ApplyEdits,
    ApplyActions,
    Checkpoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    PhaseStarted {
        pipeline: Pipeline,
        phase: Phase,
    },
    PhaseCompleted {
        pipeline: Pipeline,
        phase: Phase,
        count: usize,
    },
    Progress {
        pipeline: Pipeline,
        phase: Phase,
        done: usize,
        total: usize,
    },
    Error {
        pipeline: Pipeline,
        kind: ErrorKind,
        message: String,
    },
}

/// Fan-out of pipeline events to any number of subscribers.
///
/// Publishing never blocks; events sent with no subscriber are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }

    /// A reporter for one pipeline run
    pub(crate) fn reporter(&self, pipeline: Pipeline, silent: bool) -> Reporter<'_> {
        Reporter {
            bus: self,
            pipeline,
            silent,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes events for one pipeline run; `silent` drops everything but
/// errors.
pub(crate) struct Reporter<'a> {
    bus: &'a EventBus,
    pipeline: Pipeline,
    silent: bool,
}

impl Reporter<'_> {
    pub(crate) fn started(&self, phase: Phase) {
        if !self.silent {
            self.bus.publish(SyncEvent::PhaseStarted {
                pipeline: self.pipeline,
                phase,
            });
        }
    }

    pub(crate) fn completed(&self, phase: Phase, count: usize) {
        if !self.silent {
            self.bus.publish(SyncEvent::PhaseCompleted {
                pipeline: self.pipeline,
                phase,
                count,
            });
        }
    }

    pub(crate) fn progress(&self, phase: Phase, done: usize, total: usize) {
        if !self.silent {
            self.bus.publish(SyncEvent::Progress {
                pipeline: self.pipeline,
                phase,
                done,
                total,
            });
        }
    }

    pub(crate) fn error(&self, error: &crate::Error) {
        self.bus.publish(SyncEvent::Error {
            pipeline: self.pipeline,
            kind: error.kind(),
            message: error.to_string(),
        });
    }
}
