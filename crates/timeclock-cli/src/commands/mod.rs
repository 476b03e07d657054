pub mod clock;
pub mod common;
pub mod compare;
pub mod completions;
pub mod daemon;
pub mod list;
pub mod summary;
pub mod sync;
pub mod validate;
