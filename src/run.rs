//! Per-run state shared by the orchestrator and every worker

use crate::addin::AddInError;
use crate::events::{EventHub, OutputEvent};
use crate::project::{Project, SourceFile};
use crate::registry::AddInRegistry;
use crate::rule::Rule;
use crate::settings::Settings;
use crate::violation::Violation;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-project record for one run
#[derive(Debug, Default)]
pub struct ProjectStatus {
    /// Cached results must not be used for this project
    pub ignore_cache: bool,
    /// Results of this project go to the cache
    pub write_cache: bool,
    /// Digest of the settings the project is analyzed under
    pub settings_digest: String,
    complete: AtomicBool,
}

impl ProjectStatus {
    pub fn new(ignore_cache: bool, write_cache: bool, settings_digest: impl Into<String>) -> Self {
        Self {
            ignore_cache,
            write_cache,
            settings_digest: settings_digest.into(),
            complete: AtomicBool::new(false),
        }
    }

    /// Whether every file of the project has been processed
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub(crate) fn set_complete(&self, complete: bool) {
        self.complete.store(complete, Ordering::Release);
    }
}

/// Run counters reported in the summary
#[derive(Debug, Default)]
pub struct RunCounters {
    pub files_analyzed: AtomicUsize,
    pub files_cached: AtomicUsize,
    pub fixes_applied: AtomicUsize,
}

/// State of one analysis run
///
/// Files of all projects are flattened into one list in project order; the
/// cursor walks it once per pass.
#[derive(Debug)]
pub struct RunContext {
    auto_fix: bool,
    cancel: Arc<AtomicBool>,
    statuses: Vec<ProjectStatus>,
    files: Vec<(usize, usize)>,
    cursor: AtomicUsize,
    pass: AtomicUsize,
    outstanding: AtomicUsize,
    incomplete: AtomicBool,
    fatal: Mutex<Option<AddInError>>,
    default_settings: Settings,
    pub counters: RunCounters,
}

impl RunContext {
    pub fn new(
        projects: &[Project],
        statuses: Vec<ProjectStatus>,
        auto_fix: bool,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        let files = projects
            .iter()
            .enumerate()
            .flat_map(|(p, project)| (0..project.files().len()).map(move |f| (p, f)))
            .collect();

        Self {
            auto_fix,
            cancel,
            statuses,
            files,
            cursor: AtomicUsize::new(0),
            pass: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
            incomplete: AtomicBool::new(false),
            fatal: Mutex::new(None),
            default_settings: Settings::default(),
            counters: RunCounters::default(),
        }
    }

    pub fn auto_fix(&self) -> bool {
        self.auto_fix
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Current pass number, starting at 0
    pub fn pass(&self) -> usize {
        self.pass.load(Ordering::Acquire)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn status(&self, project: usize) -> Option<&ProjectStatus> {
        self.statuses.get(project)
    }

    pub fn statuses(&self) -> &[ProjectStatus] {
        &self.statuses
    }

    /// Rewind the cursor and expect `workers` completions
    pub(crate) fn begin_pass(&self, workers: usize) {
        self.cursor.store(0, Ordering::Release);
        self.incomplete.store(false, Ordering::Release);
        self.outstanding.store(workers, Ordering::Release);
    }

    pub(crate) fn next_pass(&self) -> usize {
        self.pass.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Claim the next file of this pass. Each index is handed out once.
    pub(crate) fn claim(&self) -> Option<(usize, usize)> {
        let index = self.cursor.fetch_add(1, Ordering::AcqRel);
        self.files.get(index).copied()
    }

    /// A worker is leaving. Returns true for the last one out.
    pub(crate) fn worker_finished(&self) -> bool {
        self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub fn outstanding_workers(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// A worker left part of its files unfinished
    pub(crate) fn report_leftover(&self) {
        self.incomplete.store(true, Ordering::Release);
    }

    pub fn pass_incomplete(&self) -> bool {
        self.incomplete.load(Ordering::Acquire)
    }

    /// Record a failure that stops the run. The first one wins.
    pub(crate) fn abort(&self, err: AddInError) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(err);
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.fatal.lock().is_some()
    }

    pub(crate) fn take_fatal(&self) -> Option<AddInError> {
        self.fatal.lock().take()
    }

    pub(crate) fn default_settings(&self) -> &Settings {
        &self.default_settings
    }
}

/// What add-ins see while processing one file
pub struct FileContext<'a> {
    project: &'a Project,
    settings: &'a Settings,
    registry: &'a AddInRegistry,
    events: &'a EventHub,
    run: &'a RunContext,
    pending_fixes: Mutex<Vec<Violation>>,
}

impl<'a> FileContext<'a> {
    pub(crate) fn new(
        project: &'a Project,
        settings: &'a Settings,
        registry: &'a AddInRegistry,
        events: &'a EventHub,
        run: &'a RunContext,
    ) -> Self {
        Self {
            project,
            settings,
            registry,
            events,
            run,
            pending_fixes: Mutex::new(Vec::new()),
        }
    }

    pub fn project(&self) -> &Project {
        self.project
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    pub fn pass(&self) -> usize {
        self.run.pass()
    }

    pub fn auto_fix(&self) -> bool {
        self.run.auto_fix()
    }

    /// Whether a rule should be checked in a file
    pub fn is_rule_enabled(&self, rule_id: &str, path: &Path) -> bool {
        let default_enabled = self.registry.rule_default(rule_id).unwrap_or(true);
        if !self.settings.is_rule_enabled(rule_id, default_enabled) {
            return false;
        }

        let relative = path.strip_prefix(self.project.root()).unwrap_or(path);
        !(self.settings.should_ignore_rule_for_file(rule_id, path)
            || self.settings.should_ignore_rule_for_file(rule_id, relative))
    }

    /// Report a rule violation with a rendered message
    pub fn add_violation(&self, file: &SourceFile, rule: &Rule, line: usize, message: &str) -> bool {
        let violation =
            Violation::new(&rule.id, message, file.path(), line).with_severity(rule.severity);
        self.report(file, violation)
    }

    /// Record a violation on the file and publish it if it is new
    ///
    /// In auto-fix runs, violations carrying a safe fix are held back for
    /// the fixer instead.
    pub fn report(&self, file: &SourceFile, mut violation: Violation) -> bool {
        if let Some(severity) = self.settings.severity_override(&violation.rule_id) {
            violation.severity = severity;
        }

        let suppressed = file
            .with_model(|m| m.is_rule_suppressed(&violation.rule_id, violation.line))
            .unwrap_or(false);
        if suppressed {
            return false;
        }

        if self.run.auto_fix() && violation.has_safe_fix() {
            let mut pending = self.pending_fixes.lock();
            if pending.iter().any(|v| v.same_occurrence(&violation)) {
                return false;
            }
            pending.push(violation);
            return true;
        }

        publish(file, violation, self.events)
    }

    /// Send a message on the output channel
    pub fn output(&self, event: OutputEvent) {
        self.events.output_generated(event);
    }

    pub(crate) fn take_pending_fixes(&self) -> Vec<Violation> {
        std::mem::take(&mut *self.pending_fixes.lock())
    }
}

/// Append to the file and fire the violation event only for new occurrences
pub(crate) fn publish(file: &SourceFile, violation: Violation, events: &EventHub) -> bool {
    let event = violation.clone();
    if file.add_violation(violation) {
        events.violation_encountered(&event);
        true
    } else {
        false
    }
}
