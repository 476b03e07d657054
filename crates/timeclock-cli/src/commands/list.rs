use chrono::NaiveDate;
use timeclock_core::AttendanceRecord;

use crate::commands::common::{format_record_line, open_store, Context};
use crate::error::CliError;

pub async fn list_records(
    context: &Context,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    employee: Option<&str>,
) -> Result<Vec<AttendanceRecord>, CliError> {
    let store = open_store(&context.db_path)?;
    let records = match (from, to) {
        (Some(start), Some(end)) => store.list_attendance_range(start, end).await?,
        _ => store.list_all_attendance().await?,
    };

    let employee = employee.map(str::trim).filter(|value| !value.is_empty());
    Ok(records
        .into_iter()
        .filter(|record| from.is_none_or(|start| record.work_date() >= start))
        .filter(|record| to.is_none_or(|end| record.work_date() <= end))
        .filter(|record| employee.is_none_or(|id| record.employee_id == id))
        .collect())
}

pub async fn run_list(
    context: &Context,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    employee: Option<&str>,
    as_json: bool,
) -> Result<(), CliError> {
    let records = list_records(context, from, to, employee).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if records.is_empty() {
        println!("No attendance records");
    } else {
        for record in &records {
            println!("{}", format_record_line(record));
        }
    }

    Ok(())
}
