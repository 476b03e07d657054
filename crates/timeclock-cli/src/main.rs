//! timeclock CLI - record attendance scans and drive the sync engine
//!
//! Clock events are written locally first; `sync`, `pull-edits` and the
//! daemon's checkpoints reconcile them with the server.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::Context;
use crate::commands::compare::ApplyArgs;
use crate::commands::validate::ValidateArgs;
use crate::error::CliError;

const LOG_DIRECTIVES: [&str; 2] = ["timeclock=info", "timeclock_core=info"];

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = LOG_DIRECTIVES
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(EnvFilter::from_default_env(), EnvFilter::add_directive);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let context = Context::resolve(cli.db_path, cli.config);

    match cli.command {
        Commands::Clock {
            employee,
            clock_type,
            at,
        } => {
            commands::clock::run_clock(&context, &employee, &clock_type, at.as_deref()).await?;
        }
        Commands::List {
            from,
            to,
            employee,
            json,
        } => {
            commands::list::run_list(&context, from, to, employee.as_deref(), json).await?;
        }
        Commands::Summary {
            employee,
            date,
            json,
        } => commands::summary::run_summary(&context, &employee, date, json).await?,
        Commands::Validate {
            from,
            to,
            no_correct,
            no_eight_hour_rule,
            json,
        } => {
            let args = ValidateArgs {
                from,
                to,
                correct: !no_correct,
                eight_hour_rule: !no_eight_hour_rule,
            };
            commands::validate::run_validate(&context, args, json).await?;
        }
        Commands::Sync { silent } => commands::sync::run_sync(&context, silent).await?,
        Commands::PullEdits { silent } => {
            commands::sync::run_pull_edits(&context, silent).await?;
        }
        Commands::Compare { from, to, json } => {
            commands::compare::run_compare(&context, from, to, json).await?;
        }
        Commands::Apply {
            from,
            to,
            actions,
            all,
            silent,
        } => {
            let args = ApplyArgs {
                from,
                to,
                actions: &actions,
                all,
                silent,
            };
            commands::compare::run_apply(&context, args).await?;
        }
        Commands::Daemon => commands::daemon::run_daemon(&context).await?,
        Commands::Completions { shell, output } => {
            commands::completions::run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
