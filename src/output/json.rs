//! JSON output formatter

use super::OutputFormatter;
use crate::engine::RunSummary;
use crate::violation::Violation;
use serde::Serialize;

/// JSON formatter for machine-readable output
#[derive(Default)]
pub struct JsonFormatter {
    /// Pretty print with indentation
    pub pretty: bool,
}

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretty printing
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        if self.pretty {
            serde_json::to_string_pretty(value).unwrap_or_default()
        } else {
            serde_json::to_string(value).unwrap_or_default()
        }
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    violations: Vec<JsonViolation<'a>>,
    summary: JsonSummary,
}

#[derive(Serialize)]
struct JsonViolation<'a> {
    rule_id: &'a str,
    severity: String,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    element: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fix: Option<JsonFix<'a>>,
}

#[derive(Serialize)]
struct JsonFix<'a> {
    description: &'a str,
    replacement: &'a str,
    safety: String,
}

#[derive(Serialize)]
struct JsonSummary {
    files_total: usize,
    files_analyzed: usize,
    files_cached: usize,
    files_fixed: usize,
    fixes_applied: usize,
    passes: usize,
    cancelled: bool,
    converged: bool,
    error_count: usize,
    warning_count: usize,
    info_count: usize,
    duration_ms: u128,
}

impl<'a> From<&'a Violation> for JsonViolation<'a> {
    fn from(v: &'a Violation) -> Self {
        Self {
            rule_id: &v.rule_id,
            severity: v.severity.to_string(),
            message: &v.message,
            file: v.file.as_ref().map(|f| f.display().to_string()),
            line: v.line,
            element: v.element.as_deref(),
            fix: v.fix.as_ref().map(|f| JsonFix {
                description: &f.description,
                replacement: &f.replacement,
                safety: f.safety.to_string(),
            }),
        }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, summary: &RunSummary) -> String {
        let output = JsonOutput {
            violations: summary.violations.iter().map(JsonViolation::from).collect(),
            summary: JsonSummary {
                files_total: summary.files_total,
                files_analyzed: summary.files_analyzed,
                files_cached: summary.files_cached,
                files_fixed: summary.files_fixed,
                fixes_applied: summary.fixes_applied,
                passes: summary.passes,
                cancelled: summary.cancelled,
                converged: summary.converged,
                error_count: summary.error_count,
                warning_count: summary.warning_count,
                info_count: summary.info_count,
                duration_ms: summary.duration.as_millis(),
            },
        };
        self.render(&output)
    }

    fn format_violation(&self, violation: &Violation) -> String {
        self.render(&JsonViolation::from(violation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::Severity;
    use std::path::Path;

    #[test]
    fn test_json_format_violation() {
        let formatter = JsonFormatter::new();
        let violation = Violation::new("AvoidGoto", "Test message", Path::new("a.cs"), 10)
            .with_severity(Severity::Error);

        let output = formatter.format_violation(&violation);
        assert!(output.contains("\"rule_id\":\"AvoidGoto\""));
        assert!(output.contains("\"severity\":\"error\""));
        assert!(output.contains("\"line\":10"));
        assert!(!output.contains("\"fix\""));
    }

    #[test]
    fn test_json_engine_violation_omits_file() {
        let output = JsonFormatter::new().format_violation(&Violation::exception("boom"));
        assert!(!output.contains("\"file\""));
        assert!(output.contains("\"rule_id\":\"ExceptionOccurred\""));
    }

    #[test]
    fn test_json_format_summary() {
        let formatter = JsonFormatter::new();
        let summary = RunSummary {
            files_analyzed: 5,
            error_count: 2,
            warning_count: 3,
            converged: true,
            ..Default::default()
        };

        let output = formatter.format(&summary);
        assert!(output.contains("\"files_analyzed\":5"));
        assert!(output.contains("\"error_count\":2"));
        assert!(output.contains("\"warning_count\":3"));
        assert!(output.contains("\"converged\":true"));
    }

    #[test]
    fn test_json_pretty() {
        let formatter = JsonFormatter::new().pretty();
        let violation = Violation::new("AvoidGoto", "msg", Path::new("a.cs"), 1);
        assert!(formatter.format_violation(&violation).contains('\n'));
    }
}
