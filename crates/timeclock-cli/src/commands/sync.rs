use timeclock_core::sync::Pipeline;

use crate::commands::common::{drain_events, finish_outcome, open_engine, Context};
use crate::error::CliError;

pub async fn run_sync(context: &Context, silent: bool) -> Result<(), CliError> {
    let engine = open_engine(context, true).await?;
    let mut events = engine.subscribe();

    let outcome = engine.sync_now(silent).await;
    drain_events(&mut events, Pipeline::Upload);
    finish_outcome(&outcome, false)
}

pub async fn run_pull_edits(context: &Context, silent: bool) -> Result<(), CliError> {
    let engine = open_engine(context, true).await?;
    let mut events = engine.subscribe();

    let outcome = engine.check_server_edits_now(silent).await;
    drain_events(&mut events, Pipeline::ServerEdits);
    finish_outcome(&outcome, false)
}
