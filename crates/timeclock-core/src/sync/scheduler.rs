//! Fires the upload pipeline at fixed daily checkpoints.
//!
//! A failed scheduled run is not retried; the next checkpoint (or a manual
//! sync) is the only retry path.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::clock::Clock;
use super::events::{Phase, Pipeline};
use super::upload::UploadCounts;
use super::{PipelineOutcome, SyncEngine};
use crate::config::TimeOfDay;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub struct Scheduler {
    engine: SyncEngine,
    checkpoints: Vec<TimeOfDay>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(engine: SyncEngine, mut checkpoints: Vec<TimeOfDay>, clock: Arc<dyn Clock>) -> Self {
        checkpoints.sort_unstable();
        checkpoints.dedup();
        Self {
            engine,
            checkpoints,
            clock,
        }
    }

    pub fn checkpoints(&self) -> &[TimeOfDay] {
        &self.checkpoints
    }

    /// The checkpoint due at `now`, if it has not fired yet today.
    ///
    /// Marks the returned checkpoint as fired.
    pub fn poll(&self, now: NaiveDateTime) -> Option<TimeOfDay> {
        let checkpoint = self
            .checkpoints
            .iter()
            .copied()
            .find(|checkpoint| checkpoint.matches(now.time()))?;
        self.engine
            .cursor()
            .mark_checkpoint(now.date(), checkpoint)
            .then_some(checkpoint)
    }

    /// Check the clock once and run the upload when a checkpoint is due
    pub async fn tick(&self) -> Option<PipelineOutcome<UploadCounts>> {
        let checkpoint = self.poll(self.clock.now())?;
        tracing::info!(checkpoint = %checkpoint, "Scheduled sync checkpoint reached");

        let reporter = self.engine.inner.events.reporter(Pipeline::Scheduler, false);
        reporter.started(Phase::Checkpoint);
        let outcome = self.engine.sync_now(true).await;
        if outcome.success {
            reporter.completed(Phase::Checkpoint, outcome.counts.attendance_synced);
        } else if outcome.is_lock_rejected() {
            tracing::info!(checkpoint = %checkpoint, "Skipped checkpoint: {}", outcome.message);
        } else {
            tracing::warn!(
                checkpoint = %checkpoint,
                "Scheduled sync failed; waiting for the next checkpoint: {}",
                outcome.message
            );
        }
        Some(outcome)
    }

    /// Run the one-second tick loop on the tokio runtime until stopped
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        tracing::info!(
            checkpoints = ?self.checkpoints.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Scheduler started"
        );

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.tick().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("Scheduler stopped");
        });

        SchedulerHandle { shutdown, task }
    }
}

/// Handle to a running scheduler task
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop to exit and wait for it. A pipeline already running
    /// finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            tracing::warn!("Scheduler task ended abnormally: {error}");
        }
    }
}
