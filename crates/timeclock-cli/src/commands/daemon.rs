use crate::commands::common::{open_engine, Context};
use crate::error::CliError;

/// Run scheduled uploads until Ctrl-C
pub async fn run_daemon(context: &Context) -> Result<(), CliError> {
    let engine = open_engine(context, true).await?;
    let scheduler = engine.scheduler();
    let checkpoints = scheduler
        .checkpoints()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    println!("Scheduler running, checkpoints: {checkpoints}");

    let handle = scheduler.start();
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down scheduler");
    engine.cancel();
    handle.stop().await;
    Ok(())
}
