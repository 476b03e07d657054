//! Read-only comparison of local and server attendance.

mod compare;
mod duplicates;

pub use compare::{compare_records, diff_fields};
pub use duplicates::find_duplicate_clusters;
