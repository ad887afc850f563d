//! Human-readable text output formatter

use super::OutputFormatter;
use crate::engine::RunSummary;
use crate::violation::{Severity, Violation};
use colored::*;
use std::collections::BTreeMap;

/// Text formatter with optional color support
pub struct TextFormatter {
    /// Enable colored output
    pub colored: bool,

    /// Show fix suggestions
    pub show_fixes: bool,

    /// Show statistics
    pub show_stats: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            colored: true,
            show_fixes: true,
            show_stats: true,
        }
    }
}

impl TextFormatter {
    /// Create a new text formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors
    pub fn without_color(mut self) -> Self {
        self.colored = false;
        self
    }

    fn severity_str(&self, severity: Severity) -> ColoredString {
        let s = format!("{}", severity);
        if !self.colored {
            return s.normal();
        }
        match severity {
            Severity::Error => s.red().bold(),
            Severity::Warning => s.yellow().bold(),
            Severity::Info => s.blue(),
        }
    }

    fn paint(&self, text: String, paint: impl Fn(&str) -> ColoredString) -> String {
        if self.colored {
            paint(&text).to_string()
        } else {
            text
        }
    }

    fn count(&self, count: usize, singular: &str, plural: &str) -> String {
        format!("{} {}", count, if count == 1 { singular } else { plural })
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        // Group violations by file, engine-level ones last
        let mut by_file: BTreeMap<String, Vec<&Violation>> = BTreeMap::new();
        let mut engine = Vec::new();
        for violation in &summary.violations {
            match &violation.file {
                Some(file) => by_file
                    .entry(file.display().to_string())
                    .or_default()
                    .push(violation),
                None => engine.push(violation),
            }
        }

        for (file, violations) in &by_file {
            output.push_str(&self.paint(file.clone(), |s| s.underline()));
            output.push('\n');
            for violation in violations {
                output.push_str(&self.format_violation(violation));
            }
            output.push('\n');
        }

        for violation in engine {
            output.push_str(&self.format_violation(violation));
        }

        if summary.cancelled {
            output.push_str(&self.paint("Analysis cancelled".to_string(), |s| s.yellow()));
            output.push('\n');
        }

        if self.show_stats {
            output.push_str(&format!(
                "\n{} analyzed, {} from cache",
                self.count(summary.files_analyzed, "file", "files"),
                summary.files_cached
            ));

            let mut counts = Vec::new();
            if summary.error_count > 0 {
                let s = self.count(summary.error_count, "error", "errors");
                counts.push(self.paint(s, |s| s.red()));
            }
            if summary.warning_count > 0 {
                let s = self.count(summary.warning_count, "warning", "warnings");
                counts.push(self.paint(s, |s| s.yellow()));
            }
            if summary.info_count > 0 {
                let s = self.count(summary.info_count, "info", "infos");
                counts.push(self.paint(s, |s| s.blue()));
            }

            if !counts.is_empty() {
                output.push_str(&format!(": {}", counts.join(", ")));
            }
            output.push('\n');

            if summary.fixes_applied > 0 {
                output.push_str(&format!(
                    "Applied {} in {}\n",
                    self.count(summary.fixes_applied, "fix", "fixes"),
                    self.count(summary.files_fixed, "file", "files")
                ));
            }

            output.push_str(&format!(
                "Finished in {:.2}s ({})\n",
                summary.duration.as_secs_f64(),
                self.count(summary.passes, "pass", "passes")
            ));
        }

        output
    }

    fn format_violation(&self, violation: &Violation) -> String {
        let location = match &violation.file {
            Some(file) => format!("{}:{}", file.display(), violation.line),
            None => "<engine>".to_string(),
        };

        let mut output = format!(
            "{}: {}[{}]: {}\n",
            location,
            self.severity_str(violation.severity),
            self.paint(violation.rule_id.clone(), |s| s.cyan()),
            violation.message
        );

        if let Some(element) = &violation.element {
            output.push_str(&format!("   {} in: {}\n", self.paint("=".to_string(), |s| s.blue()), element));
        }

        if self.show_fixes {
            if let Some(fix) = &violation.fix {
                output.push_str(&format!(
                    "   {} fix ({}): {} -> {}\n",
                    self.paint("=".to_string(), |s| s.green()),
                    fix.safety,
                    fix.description,
                    self.paint(fix.replacement.clone(), |s| s.green())
                ));
            }
        }

        output
    }
}
