use chrono::NaiveDate;
use timeclock_core::sync::Pipeline;
use timeclock_core::{ComparisonReport, SyncEngine};

use crate::commands::common::{
    drain_events, finish_outcome, format_report_lines, open_engine, parse_action_arg,
    select_actions, short_action_name, Context,
};
use crate::error::CliError;

async fn fetch_report(
    engine: &SyncEngine,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<ComparisonReport, CliError> {
    let outcome = engine.compare(from, to).await;
    match outcome.counts {
        Some(report) if outcome.success => Ok(report),
        _ => Err(CliError::Pipeline(outcome.message)),
    }
}

pub async fn run_compare(
    context: &Context,
    from: NaiveDate,
    to: NaiveDate,
    as_json: bool,
) -> Result<(), CliError> {
    let engine = open_engine(context, true).await?;
    let report = fetch_report(&engine, from, to).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_report_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub struct ApplyArgs<'a> {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub actions: &'a [String],
    pub all: bool,
    pub silent: bool,
}

pub async fn run_apply(context: &Context, args: ApplyArgs<'_>) -> Result<(), CliError> {
    let requested = args
        .actions
        .iter()
        .map(String::as_str)
        .map(parse_action_arg)
        .collect::<Result<Vec<_>, _>>()?;

    let engine = open_engine(context, true).await?;
    let proposed = fetch_report(&engine, args.from, args.to)
        .await?
        .proposed_actions();
    let selected = if args.all {
        proposed
    } else {
        select_actions(&proposed, &requested)?
    };

    if selected.is_empty() {
        println!("Nothing to apply");
        return Ok(());
    }

    let mut events = engine.subscribe();
    let outcome = engine.apply_selected_actions(&selected, args.silent).await;
    drain_events(&mut events, Pipeline::ApplyActions);

    for error in &outcome.counts.errors {
        eprintln!(
            "{}:{} failed: {}",
            short_action_name(error.action),
            error.record_id,
            error.message
        );
    }
    finish_outcome(&outcome, false)
}
