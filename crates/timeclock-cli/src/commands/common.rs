use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use timeclock_core::models::{ActionKind, FieldDiff};
use timeclock_core::sync::{Phase, Pipeline};
use timeclock_core::{
    AttendanceRecord, ComparisonReport, DailySummary, DisconnectedRemote, EngineConfig,
    HttpRemoteClient, LocalStore, PipelineOutcome, RecordId, ReconciliationAction, SyncEngine,
    SyncEvent,
};
use tokio::sync::broadcast;

use crate::error::CliError;

const DB_PATH_ENV: &str = "TIMECLOCK_DB_PATH";
const CONFIG_PATH_ENV: &str = "TIMECLOCK_CONFIG";

/// Paths resolved from flags, environment and platform defaults
#[derive(Debug, Clone)]
pub struct Context {
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl Context {
    pub fn resolve(db_path: Option<PathBuf>, config_path: Option<PathBuf>) -> Self {
        Self {
            db_path: resolve_db_path(db_path),
            config_path: resolve_config_path(config_path),
        }
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("timeclock")
        .join("timeclock.db")
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> PathBuf {
    cli_config_path
        .or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("timeclock")
        .join("config.json")
}

pub fn open_store(db_path: &Path) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open_path(db_path)?)
}

/// Build the engine; with `require_remote` a missing server config is an
/// error, otherwise the engine runs disconnected.
pub async fn open_engine(context: &Context, require_remote: bool) -> Result<SyncEngine, CliError> {
    let config = EngineConfig::load(&context.config_path)?;
    let store = open_store(&context.db_path)?;

    let engine = if config.remote.is_configured() {
        let remote = HttpRemoteClient::from_config(&config.remote)?;
        tracing::debug!("Remote sync enabled at {}", remote.base_url());
        SyncEngine::new(store, Arc::new(remote), config)
    } else if require_remote {
        return Err(CliError::RemoteNotConfigured);
    } else {
        SyncEngine::new(store, Arc::new(DisconnectedRemote), config)
    };

    engine.rebuild_cursor().await?;
    Ok(engine)
}

/// Parse a scan time; accepts a space or `T` separator and optional seconds
pub fn parse_clock_time(value: &str) -> Result<NaiveDateTime, CliError> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];

    let trimmed = value.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| CliError::InvalidDateTime(value.to_string()))
}

/// Parse `<kind>:<record id>`, e.g. `update:42`
pub fn parse_action_arg(value: &str) -> Result<(ActionKind, RecordId), CliError> {
    let invalid = || CliError::InvalidAction(value.to_string());
    let (kind, id) = value.split_once(':').ok_or_else(invalid)?;
    let kind = kind.parse::<ActionKind>().map_err(|_| invalid())?;
    let id = id.parse::<RecordId>().map_err(|_| invalid())?;
    Ok((kind, id))
}

/// Resolve requested actions against the proposed ones.
///
/// Add and update carry the server payload, so they must have been
/// proposed. Delete and keep only need the id.
pub fn select_actions(
    proposed: &[ReconciliationAction],
    requested: &[(ActionKind, RecordId)],
) -> Result<Vec<ReconciliationAction>, CliError> {
    requested
        .iter()
        .map(|(kind, record_id)| match kind {
            ActionKind::DeleteLocal => Ok(ReconciliationAction::DeleteLocal {
                record_id: *record_id,
            }),
            ActionKind::KeepLocal => Ok(ReconciliationAction::KeepLocal {
                record_id: *record_id,
            }),
            ActionKind::AddFromServer | ActionKind::UpdateFromServer => proposed
                .iter()
                .find(|action| action.kind() == *kind && action.record_id() == *record_id)
                .cloned()
                .ok_or_else(|| CliError::ActionNotProposed {
                    kind: kind.as_str().to_string(),
                    record_id: record_id.to_string(),
                }),
        })
        .collect()
}

pub fn format_record_line(record: &AttendanceRecord) -> String {
    format!(
        "{:>7}  {:<10}  {:<13}  {}  reg {:>5.2}  ot {:>5.2}  {}",
        record.id.get(),
        record.employee_id,
        record.clock_type.as_str(),
        record.clock_time.format("%Y-%m-%d %H:%M:%S"),
        record.regular_hours,
        record.overtime_hours,
        record.sync_status.as_str()
    )
}

pub fn format_summary_lines(summary: &DailySummary) -> Vec<String> {
    let mut lines = vec![format!("{} on {}", summary.employee_id, summary.date)];
    for session in timeclock_core::Session::ALL {
        let span = summary.session(session);
        if span.clock_in.is_none() && span.clock_out.is_none() {
            continue;
        }
        lines.push(format!(
            "  {:<10} {} - {}",
            session.as_str(),
            format_optional_time(span.clock_in.map(|time| time.time())),
            format_optional_time(span.clock_out.map(|time| time.time()))
        ));
    }
    lines.push(format!(
        "  regular {:.2}h, overtime {:.2}h, total {:.2}h",
        summary.regular_hours, summary.overtime_hours, summary.total_hours
    ));
    let mut flags = Vec::new();
    if summary.has_late_entry {
        flags.push("late");
    }
    if summary.is_incomplete {
        flags.push("incomplete");
    }
    flags.push(summary.sync_status.as_str());
    lines.push(format!("  [{}]", flags.join(", ")));
    lines
}

fn format_optional_time(time: Option<NaiveTime>) -> String {
    time.map_or_else(|| "--:--".to_string(), |time| time.format("%H:%M").to_string())
}

fn format_field_diffs(fields: &[FieldDiff]) -> String {
    fields
        .iter()
        .map(|diff| format!("{}: server={} local={}", diff.field, diff.server, diff.local))
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn format_report_lines(report: &ComparisonReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Comparison {} .. {}: {} server-only, {} local-only, {} different, {} identical",
        report.start,
        report.end,
        report.server_only.len(),
        report.local_only.len(),
        report.different.len(),
        report.identical.len()
    )];

    for record in &report.server_only {
        lines.push(format!("  server-only {}", format_record_line(record)));
    }
    for record in &report.local_only {
        lines.push(format!("  local-only  {}", format_record_line(record)));
    }
    for diff in &report.different {
        lines.push(format!(
            "  different   {:>7}  {}",
            diff.id.get(),
            format_field_diffs(&diff.fields)
        ));
    }
    for cluster in &report.duplicates {
        let ids = cluster
            .records
            .iter()
            .map(|record| record.id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!(
            "  duplicates  {} {} {} within {}s: {ids}",
            cluster.employee_id, cluster.date, cluster.clock_type, cluster.span_seconds
        ));
    }

    let proposed = report.proposed_actions();
    if !proposed.is_empty() {
        lines.push("Proposed actions:".to_string());
        for action in proposed {
            lines.push(format!(
                "  --action {}:{}",
                short_action_name(action.kind()),
                action.record_id()
            ));
        }
    }
    lines
}

pub const fn short_action_name(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::AddFromServer => "add",
        ActionKind::UpdateFromServer => "update",
        ActionKind::DeleteLocal => "delete",
        ActionKind::KeepLocal => "keep",
    }
}

pub fn format_event(event: &SyncEvent) -> String {
    match event {
        SyncEvent::PhaseStarted { pipeline, phase } => {
            format!("[{pipeline}] {} ...", phase_label(*phase))
        }
        SyncEvent::PhaseCompleted {
            pipeline,
            phase,
            count,
        } => format!("[{pipeline}] {} done ({count})", phase_label(*phase)),
        SyncEvent::Progress {
            pipeline,
            phase,
            done,
            total,
        } => format!("[{pipeline}] {} {done}/{total}", phase_label(*phase)),
        SyncEvent::Error {
            pipeline, message, ..
        } => format!("[{pipeline}] error: {message}"),
    }
}

const fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Validate => "validating",
        Phase::RebuildSummaries => "rebuilding summaries",
        Phase::PushAttendance => "pushing attendance",
        Phase::SettleDelay => "waiting for summaries",
        Phase::PushSummaries => "pushing summaries",
        Phase::PullEdits => "pulling server edits",
        Phase::ApplyEdits => "applying server edits",
        Phase::ApplyActions => "applying actions",
        Phase::Checkpoint => "checkpoint",
    }
}

/// Print events buffered during a run to stderr
pub fn drain_events(receiver: &mut broadcast::Receiver<SyncEvent>, pipeline: Pipeline) {
    loop {
        match receiver.try_recv() {
            Ok(event) => eprintln!("{}", format_event(&event)),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                eprintln!("[{pipeline}] {skipped} progress events skipped");
            }
            Err(_) => break,
        }
    }
}

/// Print an outcome and turn a failed one into an error exit
pub fn finish_outcome<C: Serialize>(
    outcome: &PipelineOutcome<C>,
    as_json: bool,
) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else if outcome.success {
        println!("{}", outcome.message);
    }

    if outcome.success {
        Ok(())
    } else {
        Err(CliError::Pipeline(outcome.message.clone()))
    }
}
