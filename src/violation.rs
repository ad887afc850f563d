//! Violation types produced by analyzers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Rule id used for failures that escape the per-file boundary
pub const EXCEPTION_OCCURRED: &str = "ExceptionOccurred";

/// Rule id used when a parser or analyzer fails on a single file
pub const FILE_FAILED: &str = "FileAnalysisFailed";

/// Severity level for violations
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,
    /// Warning - style issue
    #[default]
    Warning,
    /// Error - definite problem
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" | "hint" | "note" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "err" => Ok(Severity::Error),
            _ => Err(()),
        }
    }
}

/// Fix safety classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixSafety {
    /// Preserves meaning, applied by auto-fix runs
    #[default]
    Safe,
    /// May change behavior, never applied automatically
    Unsafe,
}

impl fmt::Display for FixSafety {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixSafety::Safe => write!(f, "safe"),
            FixSafety::Unsafe => write!(f, "unsafe"),
        }
    }
}

/// A replacement for the line a violation points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    /// Description of the fix
    pub description: String,
    /// The full replacement text for the line
    pub replacement: String,
    /// Safety classification of this fix
    #[serde(default)]
    pub safety: FixSafety,
}

impl Fix {
    /// Create a new safe fix
    pub fn safe(description: &str, replacement: &str) -> Self {
        Self {
            description: description.to_string(),
            replacement: replacement.to_string(),
            safety: FixSafety::Safe,
        }
    }

    /// Create a new unsafe fix
    pub fn unsafe_fix(description: &str, replacement: &str) -> Self {
        Self {
            description: description.to_string(),
            replacement: replacement.to_string(),
            safety: FixSafety::Unsafe,
        }
    }

    pub fn is_safe(&self) -> bool {
        self.safety == FixSafety::Safe
    }
}

/// One occurrence of a rule being broken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Rule ID that triggered this violation
    pub rule_id: String,
    /// Severity level
    #[serde(default)]
    pub severity: Severity,
    /// Rendered message
    pub message: String,
    /// Source file, absent for engine-level failures
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Owning element inside the file, if the code model has one
    #[serde(default)]
    pub element: Option<String>,
    /// Line number (1-based)
    pub line: usize,
    /// Suggested fix
    #[serde(default)]
    pub fix: Option<Fix>,
}

impl Violation {
    /// Create a violation attributed to a file
    pub fn new(rule_id: &str, message: &str, file: &Path, line: usize) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity: Severity::Warning,
            message: message.to_string(),
            file: Some(file.to_path_buf()),
            element: None,
            line,
            fix: None,
        }
    }

    /// Generic violation for a failure outside any file
    pub fn exception(message: &str) -> Self {
        Self {
            rule_id: EXCEPTION_OCCURRED.to_string(),
            severity: Severity::Error,
            message: message.to_string(),
            file: None,
            element: None,
            line: 1,
            fix: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_element(mut self, element: &str) -> Self {
        self.element = Some(element.to_string());
        self
    }

    pub fn with_fix(mut self, fix: Fix) -> Self {
        self.fix = Some(fix);
        self
    }

    pub fn has_safe_fix(&self) -> bool {
        self.fix.as_ref().is_some_and(Fix::is_safe)
    }

    /// Whether two violations describe the same underlying occurrence
    pub fn same_occurrence(&self, other: &Violation) -> bool {
        self.rule_id == other.rule_id
            && self.line == other.line
            && self.element == other.element
            && self.file == other.file
            && self.message == other.message
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(
                f,
                "{}:{}: {} [{}] {}",
                file.display(),
                self.line,
                self.severity,
                self.rule_id,
                self.message
            ),
            None => write!(
                f,
                "{}: {} [{}] {}",
                self.line, self.severity, self.rule_id, self.message
            ),
        }
    }
}
