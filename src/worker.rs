//! Worker loop run by each member of the pool during a pass

use crate::addin::{AddInError, ParseOutcome};
use crate::cache::ResultsCache;
use crate::events::EventHub;
use crate::fixer;
use crate::project::{Project, SourceFile};
use crate::registry::AddInRegistry;
use crate::run::{publish, FileContext, ProjectStatus, RunContext};
use crate::violation::{Severity, Violation, FILE_FAILED};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;

/// Everything a worker reads during a pass
pub(crate) struct Worker<'a> {
    pub run: &'a RunContext,
    pub projects: &'a [Project],
    pub registry: &'a AddInRegistry,
    pub events: &'a EventHub,
    pub cache: Option<&'a ResultsCache>,
}

/// What happened to one claimed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Skipped,
    Cached,
    Analyzed,
    Deferred,
}

impl Worker<'_> {
    /// Claim and process files until the pass is exhausted
    pub fn run(&self) {
        let mut leftover = false;

        while !self.run.is_aborted() {
            let Some((p, f)) = self.run.claim() else {
                break;
            };
            let project = &self.projects[p];
            let file = &project.files()[f];

            if self.process(p, project, file) == FileOutcome::Deferred {
                leftover = true;
            }
        }

        if leftover {
            self.run.report_leftover();
        }
        if self.run.worker_finished() {
            log::debug!("Last worker finished pass {}", self.run.pass());
        }
    }

    fn process(&self, project_index: usize, project: &Project, file: &SourceFile) -> FileOutcome {
        if file.is_done() {
            return FileOutcome::Skipped;
        }

        let Some(status) = self.run.status(project_index) else {
            log::debug!("No status for project {}", project.name());
            file.mark_done();
            return FileOutcome::Skipped;
        };
        let use_cache = !status.ignore_cache && !self.run.auto_fix();
        if use_cache && self.serve_from_cache(project, file, status) {
            return FileOutcome::Cached;
        }

        let Some(parser) = file
            .extension()
            .and_then(|ext| self.registry.parser_for_extension(&ext))
        else {
            log::debug!("No parser for {}", file.path().display());
            file.mark_done();
            return FileOutcome::Skipped;
        };

        let settings = project
            .settings()
            .unwrap_or_else(|| self.run.default_settings());
        if !settings.is_addin_enabled(parser.id()) {
            file.mark_done();
            return FileOutcome::Skipped;
        }

        let ctx = FileContext::new(project, settings, self.registry, self.events, self.run);

        let parsed = isolate(|| parser.parse_file(file, &ctx));
        match parsed {
            Ok(ParseOutcome::Complete) => {}
            Ok(ParseOutcome::Deferred) => {
                log::debug!(
                    "Parser {} deferred {} in pass {}",
                    parser.id(),
                    file.path().display(),
                    self.run.pass()
                );
                return FileOutcome::Deferred;
            }
            Err(e) => {
                self.file_failed(file, &format!("Parser {} failed: {}", parser.id(), e), e);
                self.finish(project, file, status, false);
                return FileOutcome::Analyzed;
            }
        }

        let mut failed = false;
        for analyzer in self.registry.analyzers_of(parser.id()) {
            if !settings.is_addin_enabled(analyzer.id()) {
                continue;
            }
            if let Err(e) = isolate(|| analyzer.analyze_file(file, &ctx)) {
                failed = true;
                self.file_failed(file, &format!("Analyzer {} failed: {}", analyzer.id(), e), e);
            }
        }

        if self.run.auto_fix() {
            let outcome = fixer::apply_fixes(file, ctx.take_pending_fixes());
            self.run
                .counters
                .fixes_applied
                .fetch_add(outcome.applied_count(), Ordering::AcqRel);
            for violation in outcome.rejected {
                publish(file, violation, self.events);
            }
        }

        self.finish(project, file, status, !failed && !file.is_modified());
        FileOutcome::Analyzed
    }

    /// Count an analyzed file and store its results, or drop the entry it
    /// replaces when they cannot be cached
    fn finish(
        &self,
        project: &Project,
        file: &SourceFile,
        status: &ProjectStatus,
        cacheable: bool,
    ) {
        if let Some(cache) = self.cache {
            if status.write_cache && cacheable {
                cache.save_file(project, file, &status.settings_digest, &file.violations());
            } else {
                cache.remove_file(file.path());
            }
        }

        self.run
            .counters
            .files_analyzed
            .fetch_add(1, Ordering::AcqRel);
        file.mark_done();
    }

    fn serve_from_cache(
        &self,
        project: &Project,
        file: &SourceFile,
        status: &ProjectStatus,
    ) -> bool {
        let Some(violations) = self
            .cache
            .and_then(|cache| cache.load_file(project, file, &status.settings_digest))
        else {
            return false;
        };

        for violation in violations {
            publish(file, violation, self.events);
        }
        self.run.counters.files_cached.fetch_add(1, Ordering::AcqRel);
        file.mark_done();
        true
    }

    /// Record a per-file failure; exhaustion stops the whole run instead
    fn file_failed(&self, file: &SourceFile, message: &str, err: AddInError) {
        if err.is_resource_exhaustion() {
            self.run.abort(err);
            return;
        }

        log::warn!("{}: {}", file.path().display(), message);
        let violation = Violation::new(FILE_FAILED, message, file.path(), 1)
            .with_severity(Severity::Error);
        publish(file, violation, self.events);
    }
}

/// Run add-in code, turning a panic into an error
fn isolate<T>(f: impl FnOnce() -> Result<T, AddInError>) -> Result<T, AddInError> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(AddInError::Failed(format!("panicked: {}", panic_message(&*payload))))
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
