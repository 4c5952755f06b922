//! Small helpers shared by the transformer and the run report.
//!
//! - **Text normalization**: null-coalescing and trimming of source text columns
//! - **Durations**: compact human-readable elapsed times for the run summary

mod duration;
mod text;

pub use duration::format_duration;
pub use text::strip_to_empty;
