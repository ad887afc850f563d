//! Projects, source files and the code model they carry through a run

use crate::settings::Settings;
use crate::violation::Violation;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Parsed representation of a source file
///
/// Parsers produce a model, analyzers downcast it through `as_any` to the
/// concrete type their parser builds. The line-oriented methods are what
/// the engine needs for auto-fix and inline suppressions.
pub trait CodeModel: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Number of source lines
    fn line_count(&self) -> usize;

    /// Get source line at line number (1-based)
    fn line(&self, line: usize) -> Option<&str>;

    /// Replace a whole line (1-based). Returns false if out of range.
    fn replace_line(&mut self, line: usize, text: &str) -> bool;

    /// Render the model back to source text
    fn to_source(&self) -> String;

    /// Check if a rule is suppressed at a line (inline comments)
    fn is_rule_suppressed(&self, _rule_id: &str, _line: usize) -> bool {
        false
    }
}

/// A unit of analysis belonging to exactly one project
pub struct SourceFile {
    path: PathBuf,
    /// blake3 digest of the current text, refreshed when fixes change it
    digest: Mutex<String>,
    text: Mutex<Option<String>>,
    model: Mutex<Option<Box<dyn CodeModel>>>,
    violations: Mutex<Vec<Violation>>,
    done: AtomicBool,
    modified: AtomicBool,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            path: path.into(),
            digest: Mutex::new(content_digest(&text)),
            text: Mutex::new(Some(text)),
            model: Mutex::new(None),
            violations: Mutex::new(Vec::new()),
            done: AtomicBool::new(false),
            modified: AtomicBool::new(false),
        }
    }

    /// Read a file from disk
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(path, text))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn digest(&self) -> String {
        self.digest.lock().clone()
    }

    /// Lower-cased file extension
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
    }

    /// Hand the raw text to a parser. Only the first caller gets it.
    pub fn take_text(&self) -> Option<String> {
        self.text.lock().take()
    }

    pub fn set_model(&self, model: Box<dyn CodeModel>) {
        *self.model.lock() = Some(model);
    }

    pub fn has_model(&self) -> bool {
        self.model.lock().is_some()
    }

    /// Run a closure against the parsed model
    pub fn with_model<R>(&self, f: impl FnOnce(&dyn CodeModel) -> R) -> Option<R> {
        let guard = self.model.lock();
        guard.as_deref().map(f)
    }

    pub(crate) fn with_model_mut<R>(
        &self,
        f: impl FnOnce(&mut (dyn CodeModel + 'static)) -> R,
    ) -> Option<R> {
        let mut guard = self.model.lock();
        guard.as_deref_mut().map(f)
    }

    /// Current source text, whether still raw or already parsed
    pub fn source_text(&self) -> Option<String> {
        if let Some(text) = self.text.lock().as_ref() {
            return Some(text.clone());
        }
        self.with_model(|m| m.to_source())
    }

    /// Append a violation. Returns false if the same occurrence is already recorded.
    pub fn add_violation(&self, violation: Violation) -> bool {
        let mut violations = self.violations.lock();
        if violations.iter().any(|v| v.same_occurrence(&violation)) {
            return false;
        }
        violations.push(violation);
        true
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.violations.lock().clone()
    }

    pub(crate) fn remove_violations(&self, keep: impl Fn(&Violation) -> bool) {
        self.violations.lock().retain(|v| keep(v));
    }

    /// Whether the file finished processing in the current run
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub(crate) fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }

    /// Whether auto-fix changed this file
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    pub(crate) fn mark_modified(&self) {
        self.modified.store(true, Ordering::Release);
    }

    /// Return the file to its pre-run state so it can be analyzed again
    pub(crate) fn reset_for_run(&self) {
        let mut text = self.text.lock();
        let mut model = self.model.lock();
        if text.is_none() {
            *text = model.as_ref().map(|m| m.to_source());
        }
        if self.is_modified() {
            if let Some(text) = text.as_ref() {
                *self.digest.lock() = content_digest(text);
            }
        }
        *model = None;
        self.violations.lock().clear();
        self.done.store(false, Ordering::Release);
        self.modified.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFile")
            .field("path", &self.path)
            .field("done", &self.is_done())
            .finish_non_exhaustive()
    }
}

/// A named collection of files sharing configuration flags and settings
#[derive(Debug)]
pub struct Project {
    name: String,
    root: PathBuf,
    configuration: BTreeSet<String>,
    files: Vec<SourceFile>,
    settings: OnceLock<Settings>,
    write_cache: bool,
}

impl Project {
    pub fn new(name: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            root: root.into(),
            configuration: BTreeSet::new(),
            files: Vec::new(),
            settings: OnceLock::new(),
            write_cache: true,
        }
    }

    /// Add a configuration flag (e.g., "DEBUG")
    pub fn with_flag(mut self, flag: &str) -> Self {
        self.configuration.insert(flag.to_string());
        self
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.configuration.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn with_file(mut self, file: SourceFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn add_file(&mut self, file: SourceFile) {
        self.files.push(file);
    }

    /// Whether results of this project go to the cache
    pub fn with_write_cache(mut self, write_cache: bool) -> Self {
        self.write_cache = write_cache;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn configuration(&self) -> &BTreeSet<String> {
        &self.configuration
    }

    /// Configuration flags as stored in the cache
    pub fn fingerprint(&self) -> String {
        self.configuration
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn file(&self, path: &Path) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.path() == path)
    }

    pub fn write_cache(&self) -> bool {
        self.write_cache
    }

    /// Settings, loading them on first use
    pub fn settings_or_init(&self, load: impl FnOnce() -> Settings) -> &Settings {
        self.settings.get_or_init(load)
    }

    pub fn settings(&self) -> Option<&Settings> {
        self.settings.get()
    }

    pub fn settings_loaded(&self) -> bool {
        self.settings.get().is_some()
    }

    /// All violations currently recorded on the project's files
    pub fn violations(&self) -> Vec<Violation> {
        self.files.iter().flat_map(|f| f.violations()).collect()
    }
}

/// blake3 hex digest of file content
pub fn content_digest(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Lines(Vec<String>);

    impl CodeModel for Lines {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn line_count(&self) -> usize {
            self.0.len()
        }

        fn line(&self, line: usize) -> Option<&str> {
            self.0.get(line.checked_sub(1)?).map(String::as_str)
        }

        fn replace_line(&mut self, line: usize, text: &str) -> bool {
            match line.checked_sub(1).and_then(|i| self.0.get_mut(i)) {
                Some(slot) => {
                    *slot = text.to_string();
                    true
                }
                None => false,
            }
        }

        fn to_source(&self) -> String {
            self.0.join("\n")
        }
    }

    #[test]
    fn test_fingerprint_is_sorted() {
        let project = Project::new("p", "/tmp")
            .with_flag("TRACE")
            .with_flag("DEBUG")
            .with_flag("DEBUG");
        assert_eq!(project.fingerprint(), "DEBUG;TRACE");
        assert_eq!(Project::new("empty", "/tmp").fingerprint(), "");
    }

    #[test]
    fn test_text_is_taken_once() {
        let file = SourceFile::new("a.cs", "one\ntwo");
        assert_eq!(file.take_text().as_deref(), Some("one\ntwo"));
        assert!(file.take_text().is_none());
    }

    #[test]
    fn test_add_violation_dedupes() {
        let file = SourceFile::new("a.cs", "");
        let v = Violation::new("R1", "m", Path::new("a.cs"), 1);
        assert!(file.add_violation(v.clone()));
        assert!(!file.add_violation(v));
        assert_eq!(file.violations().len(), 1);
    }

    #[test]
    fn test_reset_restores_text_from_model() {
        let file = SourceFile::new("a.cs", "x\ny");
        let text = file.take_text().unwrap();
        file.set_model(Box::new(Lines(text.lines().map(String::from).collect())));
        file.with_model_mut(|m| m.replace_line(2, "z"));
        file.mark_done();

        file.reset_for_run();
        assert!(!file.is_done());
        assert!(!file.has_model());
        assert_eq!(file.take_text().as_deref(), Some("x\nz"));
    }

    #[test]
    fn test_reset_after_fix_refreshes_digest() {
        let file = SourceFile::new("a.cs", "x\ny");
        let original = file.digest();
        let text = file.take_text().unwrap();
        file.set_model(Box::new(Lines(text.lines().map(String::from).collect())));
        assert_eq!(file.with_model_mut(|m| m.replace_line(2, "z")), Some(true));
        file.mark_modified();

        file.reset_for_run();
        assert_ne!(file.digest(), original);
        assert_eq!(file.digest(), content_digest("x\nz"));
        assert!(!file.is_modified());
    }

    #[test]
    fn test_reset_without_fix_keeps_digest() {
        let file = SourceFile::new("a.cs", "x\ny");
        let original = file.digest();
        let text = file.take_text().unwrap();
        file.set_model(Box::new(Lines(text.lines().map(String::from).collect())));

        file.reset_for_run();
        assert_eq!(file.digest(), original);
    }

    #[test]
    fn test_settings_loaded_once() {
        let project = Project::new("p", "/tmp");
        assert!(!project.settings_loaded());

        let mut calls = 0;
        project.settings_or_init(|| {
            calls += 1;
            Settings::default()
        });
        project.settings_or_init(|| {
            calls += 1;
            Settings::default()
        });
        assert_eq!(calls, 1);
        assert!(project.settings_loaded());
    }

    #[test]
    fn test_digest_changes_with_content() {
        let a = SourceFile::new("a.cs", "goto x;");
        let b = SourceFile::new("a.cs", "return;");
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest(), content_digest("goto x;"));
    }
}
