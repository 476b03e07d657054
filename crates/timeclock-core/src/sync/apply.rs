//! Executor for human-selected reconciliation actions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::events::{Phase, Reporter};
use super::SyncEngine;
use crate::error::{Error, Result};
use crate::models::{
    ActionKind, AttendanceRecord, DayKey, RecordId, RecordSource, ReconciliationAction, SyncStatus,
};

/// A single action that could not be applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionError {
    pub record_id: RecordId,
    pub action: ActionKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounts {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub kept: usize,
    pub corrected: usize,
    pub summaries_rebuilt: usize,
    pub summaries_uploaded: usize,
    pub errors: Vec<ActionError>,
}

impl SyncEngine {
    /// Apply each action independently, then refresh every touched day.
    ///
    /// A failing action is recorded in `counts.errors` and the rest still
    /// run.
    pub(super) async fn apply_actions(
        &self,
        actions: &[ReconciliationAction],
        reporter: &Reporter<'_>,
        counts: &mut ActionCounts,
    ) -> Result<String> {
        reporter.started(Phase::ApplyActions);
        let mut touched = BTreeSet::new();

        for (index, action) in actions.iter().enumerate() {
            self.ensure_not_cancelled()?;
            if let Err(error) = self.apply_action(action, counts, &mut touched).await {
                let error = Error::ActionExecution {
                    record_id: action.record_id().get(),
                    reason: error.to_string(),
                };
                tracing::warn!(action = action.kind().as_str(), "{error}");
                reporter.error(&error);
                counts.errors.push(ActionError {
                    record_id: action.record_id(),
                    action: action.kind(),
                    message: error.to_string(),
                });
            }
            reporter.progress(Phase::ApplyActions, index + 1, actions.len());
        }
        let applied = actions.len() - counts.errors.len();
        reporter.completed(Phase::ApplyActions, applied);

        let refreshed = self.refresh_days(&touched, reporter).await?;
        counts.corrected = refreshed.corrected;
        counts.summaries_rebuilt = refreshed.rebuilt;
        counts.summaries_uploaded = refreshed.uploaded;

        Ok(format!(
            "Applied {applied} of {} actions; {} summaries rebuilt",
            actions.len(),
            counts.summaries_rebuilt
        ))
    }

    async fn apply_action(
        &self,
        action: &ReconciliationAction,
        counts: &mut ActionCounts,
        touched: &mut BTreeSet<DayKey>,
    ) -> Result<()> {
        let store = &self.inner.store;
        match action {
            ReconciliationAction::AddFromServer { record } => {
                if store.get_attendance(record.id).await?.is_some() {
                    return Err(Error::InvalidInput(format!(
                        "record {} already exists locally",
                        record.id
                    )));
                }
                let record = from_server(record);
                store.insert_attendance(&record).await?;
                touched.insert(record.day_key());
                counts.added += 1;
            }
            ReconciliationAction::UpdateFromServer { record } => {
                let existing = self.require_local(record.id).await?;
                let record = from_server(record);
                store.update_attendance(&record).await?;
                touched.insert(existing.day_key());
                touched.insert(record.day_key());
                counts.updated += 1;
            }
            ReconciliationAction::DeleteLocal { record_id } => {
                let existing = self.require_local(*record_id).await?;
                store.delete_attendance(*record_id).await?;
                touched.insert(existing.day_key());
                counts.deleted += 1;
            }
            ReconciliationAction::KeepLocal { record_id } => {
                self.require_local(*record_id).await?;
                store.mark_attendance_pending(*record_id).await?;
                counts.kept += 1;
            }
        }
        tracing::debug!(
            action = action.kind().as_str(),
            record_id = %action.record_id(),
            "Applied reconciliation action"
        );
        Ok(())
    }

    async fn require_local(&self, id: RecordId) -> Result<AttendanceRecord> {
        self.inner
            .store
            .get_attendance(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("attendance record {id}")))
    }
}

fn from_server(record: &AttendanceRecord) -> AttendanceRecord {
    AttendanceRecord {
        sync_status: SyncStatus::Synced,
        source: RecordSource::Server,
        ..record.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{at, engine};
    use crate::models::{
        ActionKind, AttendanceRecord, ClockType, DayKey, RecordId, ReconciliationAction,
        SyncStatus,
    };
    use pretty_assertions::assert_eq;

    fn synced(id: i64, clock_type: ClockType, time: &str) -> AttendanceRecord {
        let mut record = AttendanceRecord::new_local(RecordId::new(id), "E1", clock_type, at(time));
        record.sync_status = SyncStatus::Synced;
        record
    }

    #[tokio::test]
    async fn applies_selected_actions_and_refreshes_days() {
        let (engine, remote, _) = engine("2024-03-02 09:00");
        let local_in = synced(1, ClockType::MorningIn, "2024-03-01 08:00");
        let stale = synced(2, ClockType::AfternoonIn, "2024-03-01 13:00");
        let orphan = synced(3, ClockType::EveningIn, "2024-03-01 19:00");
        for record in [&local_in, &stale, &orphan] {
            engine.store().insert_attendance(record).await.unwrap();
        }

        let mut server_in = local_in.clone();
        server_in.clock_time = at("2024-03-01 07:55");
        let server_out = synced(10, ClockType::MorningOut, "2024-03-01 12:00");
        remote.seed(server_in.clone());
        remote.seed(server_out.clone());
        remote.seed(stale.clone());

        let day = at("2024-03-01 00:00").date();
        let report = engine.compare(day, day).await.counts.unwrap();
        let actions = report.proposed_actions();
        let kinds: Vec<ActionKind> = actions.iter().map(ReconciliationAction::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::AddFromServer,
                ActionKind::UpdateFromServer,
                ActionKind::DeleteLocal
            ]
        );

        let outcome = engine.apply_selected_actions(&actions, true).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.counts.added, 1);
        assert_eq!(outcome.counts.updated, 1);
        assert_eq!(outcome.counts.deleted, 1);
        assert!(outcome.counts.errors.is_empty());
        assert_eq!(outcome.counts.summaries_rebuilt, 1);
        assert_eq!(outcome.counts.summaries_uploaded, 1);

        let store = engine.store();
        assert!(store.get_attendance(RecordId::new(3)).await.unwrap().is_none());
        let updated = store.get_attendance(RecordId::new(1)).await.unwrap().unwrap();
        assert_eq!(updated.clock_time, at("2024-03-01 07:55"));

        let key = DayKey::new("E1", day);
        let summary = remote.summary(&key).unwrap();
        assert_eq!(summary.morning.clock_in, Some(at("2024-03-01 07:55")));
    }

    #[tokio::test]
    async fn failing_action_does_not_abort_the_rest() {
        let (engine, _, _) = engine("2024-03-02 09:00");
        let record = synced(1, ClockType::MorningIn, "2024-03-01 08:00");
        engine.store().insert_attendance(&record).await.unwrap();

        let actions = vec![
            ReconciliationAction::DeleteLocal {
                record_id: RecordId::new(99),
            },
            ReconciliationAction::AddFromServer {
                record: record.clone(),
            },
            ReconciliationAction::KeepLocal {
                record_id: RecordId::new(1),
            },
        ];
        let outcome = engine.apply_selected_actions(&actions, true).await;

        assert!(outcome.success);
        assert_eq!(outcome.counts.kept, 1);
        assert_eq!(outcome.counts.errors.len(), 2);
        assert_eq!(outcome.counts.errors[0].record_id, RecordId::new(99));
        assert_eq!(outcome.counts.errors[0].action, ActionKind::DeleteLocal);
        assert_eq!(outcome.counts.errors[1].action, ActionKind::AddFromServer);

        let kept = engine.store().get_attendance(RecordId::new(1)).await.unwrap().unwrap();
        assert_eq!(kept.sync_status, SyncStatus::Pending);
    }
}
