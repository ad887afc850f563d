//! Auto-fix application
//!
//! Fixes replace the whole line a violation points at. They are applied to
//! the file's code model from the bottom of the file up; only safe fixes are
//! applied, and only one fix per line.

use crate::project::SourceFile;
use crate::violation::Violation;
use std::collections::HashSet;
use std::path::Path;

/// Result of applying fixes to one file
#[derive(Debug, Default)]
pub struct FixOutcome {
    /// Violations whose fix was applied
    pub applied: Vec<Violation>,
    /// Violations that still stand (unsafe, out of range, or line already fixed)
    pub rejected: Vec<Violation>,
}

impl FixOutcome {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

/// Apply the safe fixes carried by `violations` to the file's model
pub fn apply_fixes(file: &SourceFile, mut violations: Vec<Violation>) -> FixOutcome {
    let mut outcome = FixOutcome::default();

    // Sort fixes by line number in reverse order (apply from bottom to top)
    violations.sort_by(|a, b| b.line.cmp(&a.line));

    let mut fixed_lines = HashSet::new();
    for violation in violations {
        let replacement = match &violation.fix {
            Some(fix) if fix.is_safe() && !fixed_lines.contains(&violation.line) => {
                fix.replacement.clone()
            }
            _ => {
                outcome.rejected.push(violation);
                continue;
            }
        };

        let replaced = file
            .with_model_mut(|model| model.replace_line(violation.line, &replacement))
            .unwrap_or(false);

        if replaced {
            log::debug!(
                "Fixed {} at {}:{}",
                violation.rule_id,
                file.path().display(),
                violation.line
            );
            fixed_lines.insert(violation.line);
            outcome.applied.push(violation);
        } else {
            outcome.rejected.push(violation);
        }
    }

    if !outcome.applied.is_empty() {
        file.mark_modified();
    }
    outcome
}

/// Generate a unified diff between two strings
pub fn unified_diff(file: &Path, original: &str, modified: &str) -> String {
    let mut diff = String::new();

    let original_lines: Vec<&str> = original.lines().collect();
    let modified_lines: Vec<&str> = modified.lines().collect();

    diff.push_str(&format!("--- a/{}\n", file.display()));
    diff.push_str(&format!("+++ b/{}\n", file.display()));

    // Simple line-by-line diff; fixes never add or remove lines
    let max_len = original_lines.len().max(modified_lines.len());
    let mut hunk_start = None;
    let mut hunk_lines: Vec<String> = Vec::new();

    for i in 0..max_len {
        match (original_lines.get(i), modified_lines.get(i)) {
            (Some(o), Some(m)) if o == m => {
                if hunk_start.is_some() {
                    hunk_lines.push(format!(" {}", o));
                }
            }
            (orig, modif) => {
                if hunk_start.is_none() {
                    hunk_start = Some(i + 1);
                    if let Some(ctx) = i.checked_sub(1).and_then(|p| original_lines.get(p)) {
                        hunk_lines.push(format!(" {}", ctx));
                    }
                }
                if let Some(o) = orig {
                    hunk_lines.push(format!("-{}", o));
                }
                if let Some(m) = modif {
                    hunk_lines.push(format!("+{}", m));
                }
            }
        }
    }

    if let Some(start) = hunk_start {
        diff.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            start,
            original_lines.len(),
            start,
            modified_lines.len()
        ));
        for line in hunk_lines {
            diff.push_str(&line);
            diff.push('\n');
        }
    }

    diff
}
