//! Offline-first sync engine.
//!
//! [`SyncEngine`] owns the local store, the remote client and the process
//! sync state. The mutating pipelines (upload, server-edit apply, action
//! apply) share a single-flight [`ProcessingLock`]; a request arriving while
//! one of them runs is rejected with [`Error::LockRejected`]. Engines in other
//! processes on the same database file are kept out by a [`PipelineLease`].

mod apply;
mod clock;
mod cursor;
mod events;
mod lease;
mod lock;
mod outcome;
mod scheduler;
mod server_edits;
mod upload;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::{
    AttendanceRecord, ClockType, ComparisonReport, DailySummary, DayKey, RecordKind,
    ReconciliationAction,
};
use crate::reconcile;
use crate::remote::RemoteClient;
use crate::services::LocalStore;
use crate::summary;
use crate::validation::{self, ValidationOptions, ValidationPolicy, ValidationReport, ValidationScope};

pub use apply::{ActionCounts, ActionError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cursor::SyncCursor;
pub use events::{EventBus, Phase, Pipeline, SyncEvent};
pub use lease::PipelineLease;
pub use lock::{ProcessingGuard, ProcessingLock};
pub use outcome::PipelineOutcome;
pub use scheduler::{Scheduler, SchedulerHandle};
pub use server_edits::EditCounts;
pub use upload::UploadCounts;

use events::Reporter;

struct EngineInner {
    store: LocalStore,
    remote: Arc<dyn RemoteClient>,
    config: EngineConfig,
    policy: ValidationPolicy,
    lock: ProcessingLock,
    events: EventBus,
    cursor: Mutex<SyncCursor>,
    cancelled: AtomicBool,
    clock: Arc<dyn Clock>,
}

/// Cheaply cloneable handle to the sync engine
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

/// Snapshot of the engine for status displays
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub active: Option<Pipeline>,
    pub cursor: SyncCursor,
}

/// Everything a running pipeline holds; released on drop
struct RunGuard {
    _lease: Option<PipelineLease>,
    _processing: ProcessingGuard,
}

/// Counts shared by the pipelines that re-derive touched days
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RefreshCounts {
    pub corrected: usize,
    pub rebuilt: usize,
    pub uploaded: usize,
}

impl SyncEngine {
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteClient>, config: EngineConfig) -> Self {
        Self::with_clock(store, remote, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: LocalStore,
        remote: Arc<dyn RemoteClient>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let policy = ValidationPolicy::from_config(&config);
        Self {
            inner: Arc::new(EngineInner {
                store,
                remote,
                config,
                policy,
                lock: ProcessingLock::new(),
                events: EventBus::new(),
                cursor: Mutex::new(SyncCursor::default()),
                cancelled: AtomicBool::new(false),
                clock,
            }),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.inner.policy
    }

    pub fn processing_lock(&self) -> &ProcessingLock {
        &self.inner.lock
    }

    pub fn now(&self) -> NaiveDateTime {
        self.inner.clock.now()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Ask the running pipeline to stop at its next step boundary
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        tracing::info!("Cancellation requested");
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            active: self.inner.lock.active(),
            cursor: self.cursor().clone(),
        }
    }

    /// Reset the sync cursor from the store's pending counts
    pub async fn rebuild_cursor(&self) -> Result<SyncCursor> {
        let attendance = self.inner.store.unsynced_count(RecordKind::Attendance).await?;
        let summaries = self.inner.store.unsynced_count(RecordKind::Summary).await?;
        let cursor = SyncCursor::rebuilt(attendance, summaries);
        *self.cursor() = cursor.clone();
        tracing::debug!(attendance, summaries, "Sync cursor rebuilt");
        Ok(cursor)
    }

    /// A scheduler firing uploads at the configured checkpoints
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.clone(),
            self.inner.config.checkpoints.clone(),
            Arc::clone(&self.inner.clock),
        )
    }

    /// Record a clock event from a scanner and refresh that day's summary.
    ///
    /// Takes no processing lock; the new pending record is picked up by the
    /// next upload.
    pub async fn submit_clock_event(
        &self,
        employee_id: &str,
        clock_type: ClockType,
        timestamp: NaiveDateTime,
    ) -> Result<AttendanceRecord> {
        let employee_id = employee_id.trim();
        if employee_id.is_empty() {
            return Err(Error::InvalidInput(
                "employee id must not be empty".to_string(),
            ));
        }

        let record = self
            .inner
            .store
            .insert_clock_event(employee_id, clock_type, timestamp)
            .await?;
        tracing::info!(
            record_id = %record.id,
            employee_id,
            clock_type = %clock_type,
            "Clock event recorded"
        );

        let key = record.day_key();
        if let Err(error) = self.revalidate_and_rebuild(&BTreeSet::from([key])).await {
            tracing::warn!("Failed to refresh summary after clock event: {error}");
        }
        self.cursor().pending_attendance += 1;

        Ok(self
            .inner
            .store
            .get_attendance(record.id)
            .await?
            .unwrap_or(record))
    }

    /// Validate and optionally correct stored records
    pub async fn validate(&self, options: &ValidationOptions) -> Result<ValidationReport> {
        validation::validate(&self.inner.store, &self.inner.policy, options).await
    }

    /// Run the upload pipeline now
    pub async fn sync_now(&self, silent: bool) -> PipelineOutcome<UploadCounts> {
        let reporter = self.inner.events.reporter(Pipeline::Upload, silent);
        let _guard = match self.begin(Pipeline::Upload) {
            Ok(guard) => guard,
            Err(error) => return Self::rejected(&reporter, &error),
        };

        let mut counts = UploadCounts::default();
        let result = self.upload(&reporter, &mut counts).await;
        self.finish(&reporter, result, counts).await
    }

    /// Pull and apply server-side edits now
    pub async fn check_server_edits_now(&self, silent: bool) -> PipelineOutcome<EditCounts> {
        let reporter = self.inner.events.reporter(Pipeline::ServerEdits, silent);
        let _guard = match self.begin(Pipeline::ServerEdits) {
            Ok(guard) => guard,
            Err(error) => return Self::rejected(&reporter, &error),
        };

        let mut counts = EditCounts::default();
        let result = self.apply_server_edits(&reporter, &mut counts).await;
        self.finish(&reporter, result, counts).await
    }

    /// Apply human-selected reconciliation actions
    pub async fn apply_selected_actions(
        &self,
        actions: &[ReconciliationAction],
        silent: bool,
    ) -> PipelineOutcome<ActionCounts> {
        let reporter = self.inner.events.reporter(Pipeline::ApplyActions, silent);
        let _guard = match self.begin(Pipeline::ApplyActions) {
            Ok(guard) => guard,
            Err(error) => return Self::rejected(&reporter, &error),
        };

        let mut counts = ActionCounts::default();
        let result = self.apply_actions(actions, &reporter, &mut counts).await;
        self.finish(&reporter, result, counts).await
    }

    /// Diff local and server records over `start..=end`. Read-only, so it
    /// does not take the processing lock.
    pub async fn compare(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PipelineOutcome<Option<ComparisonReport>> {
        match self.compare_range(start, end).await {
            Ok(report) => {
                let message = format!(
                    "{} server-only, {} local-only, {} different, {} identical, {} duplicate clusters",
                    report.server_only.len(),
                    report.local_only.len(),
                    report.different.len(),
                    report.identical.len(),
                    report.duplicates.len()
                );
                PipelineOutcome::succeeded(message, Some(report))
            }
            Err(error) => {
                tracing::warn!("Comparison failed: {error}");
                PipelineOutcome::failed(&error, None)
            }
        }
    }

    async fn compare_range(&self, start: NaiveDate, end: NaiveDate) -> Result<ComparisonReport> {
        if end < start {
            return Err(Error::InvalidInput(format!(
                "end date {end} is before start date {start}"
            )));
        }

        let local = self.inner.store.list_attendance_range(start, end).await?;
        let snapshot = self.inner.remote.pull_full_range(start, end).await?;
        Ok(reconcile::compare_records(
            start,
            end,
            &local,
            &snapshot.attendance,
            self.inner.config.duplicate_tolerance(),
        ))
    }

    fn cursor(&self) -> MutexGuard<'_, SyncCursor> {
        self.inner.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the in-process lock, then the database lease when the store is
    /// file backed.
    fn begin(&self, pipeline: Pipeline) -> Result<RunGuard> {
        let processing = self.inner.lock.try_acquire(pipeline)?;
        let lease = self
            .inner
            .store
            .path()
            .map(|db_path| PipelineLease::acquire(db_path, pipeline))
            .transpose()?;
        self.inner.cancelled.store(false, Ordering::SeqCst);
        tracing::debug!(pipeline = %pipeline, "Pipeline started");
        Ok(RunGuard {
            _lease: lease,
            _processing: processing,
        })
    }

    fn rejected<C: Default>(reporter: &Reporter<'_>, error: &Error) -> PipelineOutcome<C> {
        tracing::info!("{error}");
        reporter.error(error);
        PipelineOutcome::failed(error, C::default())
    }

    async fn finish<C>(
        &self,
        reporter: &Reporter<'_>,
        result: Result<String>,
        counts: C,
    ) -> PipelineOutcome<C> {
        match &result {
            Ok(message) => tracing::info!("{message}"),
            Err(error) => {
                tracing::warn!("Pipeline failed: {error}");
                reporter.error(error);
            }
        }
        if let Err(error) = self.rebuild_pending_counts().await {
            tracing::warn!("Failed to refresh pending counts: {error}");
        }
        PipelineOutcome::from_run(result, counts)
    }

    async fn rebuild_pending_counts(&self) -> Result<()> {
        let attendance = self.inner.store.unsynced_count(RecordKind::Attendance).await?;
        let summaries = self.inner.store.unsynced_count(RecordKind::Summary).await?;
        let mut cursor = self.cursor();
        cursor.set_pending(RecordKind::Attendance, attendance);
        cursor.set_pending(RecordKind::Summary, summaries);
        Ok(())
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn validation_options(&self, scope: ValidationScope) -> ValidationOptions {
        ValidationOptions::new(scope, true, self.inner.config.apply_eight_hour_rule)
    }

    /// Re-validate the given days and rebuild their summaries locally
    async fn revalidate_and_rebuild(
        &self,
        days: &BTreeSet<DayKey>,
    ) -> Result<(ValidationReport, Vec<DailySummary>)> {
        let options = self.validation_options(ValidationScope::EmployeeDays(days.clone()));
        let report = self.validate(&options).await?;

        let mut rebuilt = Vec::new();
        for key in days {
            if let Some(summary) =
                summary::rebuild_and_store(&self.inner.store, key, &self.inner.policy).await?
            {
                rebuilt.push(summary);
            }
        }
        Ok((report, rebuilt))
    }

    /// Re-validate touched days, rebuild their summaries and push them
    async fn refresh_days(
        &self,
        days: &BTreeSet<DayKey>,
        reporter: &Reporter<'_>,
    ) -> Result<RefreshCounts> {
        let mut counts = RefreshCounts::default();
        if days.is_empty() {
            return Ok(counts);
        }

        reporter.started(Phase::Validate);
        self.ensure_not_cancelled()?;
        let (report, rebuilt) = self.revalidate_and_rebuild(days).await?;
        counts.corrected = report.corrected_records;
        counts.rebuilt = rebuilt.len();
        reporter.completed(Phase::Validate, report.corrected_records);
        reporter.completed(Phase::RebuildSummaries, rebuilt.len());

        self.ensure_not_cancelled()?;
        reporter.started(Phase::PushSummaries);
        counts.uploaded = self.push_summaries(&rebuilt).await?;
        reporter.completed(Phase::PushSummaries, counts.uploaded);
        Ok(counts)
    }

    /// Push one batch of summaries and mark the acknowledged ones synced
    async fn push_summaries(&self, summaries: &[DailySummary]) -> Result<usize> {
        if summaries.is_empty() {
            return Ok(0);
        }

        let ack = self.inner.remote.push_summary(summaries).await?;
        if !ack.success {
            return Err(Error::Network(ack.message.unwrap_or_else(|| {
                "server rejected the summary batch".to_string()
            })));
        }

        let accepted: Vec<DailySummary> = summaries
            .iter()
            .filter(|summary| !ack.rejected.contains(&summary.key()))
            .cloned()
            .collect();
        for key in &ack.rejected {
            tracing::warn!(day = %key, "Server rejected summary");
        }
        let marked = self.inner.store.mark_summaries_synced(&accepted).await?;
        self.cursor().record_push(RecordKind::Summary, self.now());
        Ok(marked)
    }
}
