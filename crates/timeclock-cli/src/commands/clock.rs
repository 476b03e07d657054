use timeclock_core::ClockType;

use crate::commands::common::{format_record_line, open_engine, parse_clock_time, Context};
use crate::error::CliError;

pub async fn run_clock(
    context: &Context,
    employee: &str,
    clock_type: &str,
    at: Option<&str>,
) -> Result<(), CliError> {
    let employee = employee.trim();
    if employee.is_empty() {
        return Err(CliError::EmptyEmployeeId);
    }
    let clock_type = clock_type.parse::<ClockType>()?;
    let engine = open_engine(context, false).await?;
    let timestamp = match at {
        Some(value) => parse_clock_time(value)?,
        None => engine.now(),
    };

    let record = engine
        .submit_clock_event(employee, clock_type, timestamp)
        .await?;
    println!("{}", format_record_line(&record));
    Ok(())
}
