//! Output formatters for run summaries

mod json;
mod text;

pub use json::JsonFormatter;
pub use text::TextFormatter;

use crate::engine::RunSummary;
use crate::violation::Violation;

/// Output formatter trait
pub trait OutputFormatter: Send + Sync {
    /// Format the entire run summary
    fn format(&self, summary: &RunSummary) -> String;

    /// Format a single violation
    fn format_violation(&self, violation: &Violation) -> String;
}
