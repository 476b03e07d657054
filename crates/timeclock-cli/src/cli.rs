use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "timeclock")]
#[command(about = "Record attendance and keep it in sync with the server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the engine config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a clock-in or clock-out
    Clock {
        /// Employee identifier
        employee: String,
        /// One of morning_in, morning_out, afternoon_in, ... overtime_out
        clock_type: String,
        /// Scan time as `YYYY-MM-DD HH:MM[:SS]` (defaults to now)
        #[arg(long, value_name = "DATETIME")]
        at: Option<String>,
    },
    /// List attendance records
    List {
        /// First day to include
        #[arg(long, value_name = "DATE")]
        from: Option<NaiveDate>,
        /// Last day to include
        #[arg(long, value_name = "DATE")]
        to: Option<NaiveDate>,
        /// Only show this employee
        #[arg(long)]
        employee: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the daily summary of an employee
    Summary {
        /// Employee identifier
        employee: String,
        /// Day to summarise
        date: NaiveDate,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recompute worked hours and report anomalies
    Validate {
        /// First day to include
        #[arg(long, value_name = "DATE", requires = "to")]
        from: Option<NaiveDate>,
        /// Last day to include
        #[arg(long, value_name = "DATE", requires = "from")]
        to: Option<NaiveDate>,
        /// Report only; do not write corrections
        #[arg(long)]
        no_correct: bool,
        /// Do not cap regular hours at the daily limit
        #[arg(long)]
        no_eight_hour_rule: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload pending attendance and summaries now
    Sync {
        /// Do not print progress events
        #[arg(long)]
        silent: bool,
    },
    /// Download and apply edits made on the server
    PullEdits {
        /// Do not print progress events
        #[arg(long)]
        silent: bool,
    },
    /// Compare local and server records over a date range
    Compare {
        /// First day to include
        #[arg(long, value_name = "DATE")]
        from: NaiveDate,
        /// Last day to include
        #[arg(long, value_name = "DATE")]
        to: NaiveDate,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply selected reconciliation actions over a date range
    Apply {
        /// First day to include
        #[arg(long, value_name = "DATE")]
        from: NaiveDate,
        /// Last day to include
        #[arg(long, value_name = "DATE")]
        to: NaiveDate,
        /// Action to apply, as `<add|update|delete|keep>:<record id>`
        #[arg(long = "action", value_name = "KIND:ID", required_unless_present = "all")]
        actions: Vec<String>,
        /// Apply every proposed action
        #[arg(long, conflicts_with = "actions")]
        all: bool,
        /// Do not print progress events
        #[arg(long)]
        silent: bool,
    },
    /// Run the checkpoint scheduler until interrupted
    Daemon,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
