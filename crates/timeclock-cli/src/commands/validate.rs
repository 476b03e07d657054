use chrono::NaiveDate;
use timeclock_core::validation::{Anomaly, AnomalyKind};
use timeclock_core::{ValidationOptions, ValidationReport, ValidationScope};

use crate::commands::common::{open_engine, Context};
use crate::error::CliError;

#[derive(Debug, Clone, Copy)]
pub struct ValidateArgs {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub correct: bool,
    pub eight_hour_rule: bool,
}

pub async fn validate_records(
    context: &Context,
    args: ValidateArgs,
) -> Result<ValidationReport, CliError> {
    let engine = open_engine(context, false).await?;
    let scope = match (args.from, args.to) {
        (Some(start), Some(end)) => ValidationScope::DateRange { start, end },
        _ => ValidationScope::All,
    };
    let options = ValidationOptions::new(
        scope,
        args.correct,
        args.eight_hour_rule && engine.config().apply_eight_hour_rule,
    );
    Ok(engine.validate(&options).await?)
}

pub async fn run_validate(
    context: &Context,
    args: ValidateArgs,
    as_json: bool,
) -> Result<(), CliError> {
    let report = validate_records(context, args).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in format_validation_lines(&report, args.correct) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_validation_lines(report: &ValidationReport, corrected: bool) -> Vec<String> {
    let verb = if corrected { "corrected" } else { "need correction" };
    let mut lines = vec![format!(
        "{} of {} records {verb}, {} skipped, {} late entries",
        report.corrected_records, report.total_records, report.skipped_records, report.late_entries
    )];
    lines.extend(report.anomalies.iter().map(format_anomaly));
    lines
}

fn format_anomaly(anomaly: &Anomaly) -> String {
    let description = match anomaly.kind {
        AnomalyKind::UnmatchedIn => "clock-in without clock-out",
        AnomalyKind::UnmatchedOut => "clock-out without clock-in",
        AnomalyKind::DuplicateIn => "second clock-in while session open",
    };
    format!(
        "  record {} ({} on {}): {description}",
        anomaly.record_id, anomaly.employee_id, anomaly.date
    )
}
