use chrono::NaiveDate;
use timeclock_core::DayKey;

use crate::commands::common::{format_summary_lines, open_store, Context};
use crate::error::CliError;

pub async fn run_summary(
    context: &Context,
    employee: &str,
    date: NaiveDate,
    as_json: bool,
) -> Result<(), CliError> {
    let employee = employee.trim();
    if employee.is_empty() {
        return Err(CliError::EmptyEmployeeId);
    }

    let store = open_store(&context.db_path)?;
    let summary = store.get_summary(&DayKey::new(employee, date)).await?;

    match (summary, as_json) {
        (summary, true) => println!("{}", serde_json::to_string_pretty(&summary)?),
        (Some(summary), false) => {
            for line in format_summary_lines(&summary) {
                println!("{line}");
            }
        }
        (None, false) => println!("No summary for {employee} on {date}"),
    }

    Ok(())
}
