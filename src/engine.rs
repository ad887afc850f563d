//! Analysis engine
//!
//! Loads add-ins, prepares projects and drives passes over their files on a
//! worker pool until no worker reports leftover work or the run is
//! cancelled.

use crate::addin::{AddInError, AddInRef, Analyzer, InitDescriptor, Parser};
use crate::cache::ResultsCache;
use crate::environment::{Environment, FileEnvironment};
use crate::events::{EventHub, OutputEvent};
use crate::project::Project;
use crate::registry::{AddInRegistry, AddInSpec, LoadReport};
use crate::run::{ProjectStatus, RunContext};
use crate::violation::{Severity, Violation};
use crate::worker::{panic_message, Worker};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Upper bound on passes for add-ins that never converge
pub const MAX_PASSES: usize = 64;

/// Engine error
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("An analysis run is already in progress")]
    AlreadyAnalyzing,

    #[error("Settings path must not be empty")]
    InvalidSettingsPath,

    #[error("Resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Add-in error: {0}")]
    AddIn(AddInError),
}

impl From<AddInError> for EngineError {
    fn from(err: AddInError) -> Self {
        match err {
            AddInError::ResourceExhausted(message) => EngineError::ResourceExhausted(message),
            other => EngineError::AddIn(other),
        }
    }
}

/// Engine options
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Number of workers (0 = auto-detect)
    pub jobs: usize,

    /// Run a single worker for deterministic debugging
    pub single_worker: bool,

    /// Key add-in modules must carry to be trusted
    pub host_key: Vec<u8>,
}

/// Result of an analysis run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// All violations, file-level and engine-level
    pub violations: Vec<Violation>,

    /// Failures outside any file
    pub engine_violations: Vec<Violation>,

    /// Files in all projects
    pub files_total: usize,

    /// Files parsed and analyzed
    pub files_analyzed: usize,

    /// Files answered from the results cache
    pub files_cached: usize,

    /// Files changed by auto-fix
    pub files_fixed: usize,

    /// Fixes applied
    pub fixes_applied: usize,

    /// Passes started
    pub passes: usize,

    /// Whether the run stopped because of cancellation
    pub cancelled: bool,

    /// Whether a pass finished with no leftover work
    pub converged: bool,

    /// Total errors
    pub error_count: usize,

    /// Total warnings
    pub warning_count: usize,

    /// Total info messages
    pub info_count: usize,

    /// Processing duration
    pub duration: Duration,
}

impl RunSummary {
    fn collect(projects: &[Project], engine_violations: Vec<Violation>) -> Self {
        let mut summary = Self {
            files_total: projects.iter().map(|p| p.files().len()).sum(),
            files_fixed: projects
                .iter()
                .flat_map(|p| p.files())
                .filter(|f| f.is_modified())
                .count(),
            ..Self::default()
        };

        summary.violations = projects.iter().flat_map(|p| p.violations()).collect();
        summary.violations.extend(engine_violations.iter().cloned());
        summary.engine_violations = engine_violations;

        for violation in &summary.violations {
            match violation.severity {
                Severity::Error => summary.error_count += 1,
                Severity::Warning => summary.warning_count += 1,
                Severity::Info => summary.info_count += 1,
            }
        }
        summary
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Check if there are any warnings
    pub fn has_warnings(&self) -> bool {
        self.warning_count > 0
    }

    /// Check if result is clean (no errors or warnings)
    pub fn is_clean(&self) -> bool {
        self.error_count == 0 && self.warning_count == 0
    }

    /// Get exit code (0 = success, 1 = warnings, 2 = errors)
    pub fn exit_code(&self) -> i32 {
        if self.error_count > 0 {
            2
        } else if self.warning_count > 0 {
            1
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RunMode {
    full: bool,
    auto_fix: bool,
    auto_save: bool,
}

/// How a run ended when it did not end normally
enum RunFailure {
    Exhausted(String),
    Failed(String),
}

impl From<AddInError> for RunFailure {
    fn from(err: AddInError) -> Self {
        if err.is_resource_exhaustion() {
            RunFailure::Exhausted(err.to_string())
        } else {
            RunFailure::Failed(err.to_string())
        }
    }
}

struct PassResult {
    passes: usize,
    cancelled: bool,
    converged: bool,
}

/// The analysis engine
pub struct Engine {
    options: EngineOptions,
    registry: AddInRegistry,
    environment: Box<dyn Environment>,
    events: EventHub,
    cache: Option<ResultsCache>,
    cancel: Arc<AtomicBool>,
    analyzing: AtomicBool,
    run_lock: Mutex<()>,
    pool: Mutex<Option<(usize, Arc<rayon::ThreadPool>)>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl Engine {
    /// Create an engine with the built-in add-in factories and no cache
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            registry: AddInRegistry::with_builtin_factories(),
            environment: Box::new(FileEnvironment::new()),
            events: EventHub::new(),
            cache: None,
            cancel: Arc::new(AtomicBool::new(false)),
            analyzing: AtomicBool::new(false),
            run_lock: Mutex::new(()),
            pool: Mutex::new(None),
        }
    }

    pub fn with_environment(mut self, environment: impl Environment + 'static) -> Self {
        self.environment = Box::new(environment);
        self
    }

    pub fn with_cache(mut self, cache: ResultsCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&ResultsCache> {
        self.cache.as_ref()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Load add-ins from the given directories, and from the environment's
    /// search paths when `load_defaults` is set, then wire analyzers to
    /// their parsers
    pub fn initialize(
        &mut self,
        addin_paths: &[PathBuf],
        load_defaults: bool,
    ) -> Result<LoadReport, EngineError> {
        let known: HashSet<String> = self
            .registry
            .parsers()
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        let mut report = LoadReport::default();

        let mut paths: Vec<(PathBuf, bool)> =
            addin_paths.iter().map(|p| (p.clone(), true)).collect();
        if load_defaults {
            paths.extend(
                self.environment
                    .addin_search_paths()
                    .into_iter()
                    .map(|p| (p, false)),
            );
        }

        for (path, explicit) in paths {
            if !self.environment.validate_addin_path(&path) {
                if explicit {
                    self.events.output_generated(OutputEvent::warning(format!(
                        "Add-in path {} is not a directory",
                        path.display()
                    )));
                } else {
                    log::debug!("Skipping missing add-in path {}", path.display());
                }
                continue;
            }

            let loaded = self.registry.load_addins(&path, &self.options.host_key)?;
            for (module, reason) in &loaded.skipped {
                self.events.output_generated(OutputEvent::info(format!(
                    "Skipped add-in module {}: {}",
                    module.display(),
                    reason
                )));
            }
            report.loaded.extend(loaded.loaded);
            report.skipped.extend(loaded.skipped);
        }

        self.wire(&known);
        log::info!("Loaded {} add-ins", report.loaded.len());
        Ok(report)
    }

    /// Register a parser instance directly
    pub fn register_parser(
        &mut self,
        parser: Box<dyn Parser>,
        descriptors: &[InitDescriptor],
        trusted: bool,
    ) -> Result<bool, EngineError> {
        let known = self.parser_ids();
        let registered = self.registry.register_parser(parser, descriptors, trusted)?;
        self.wire(&known);
        Ok(registered)
    }

    /// Register an analyzer instance directly
    pub fn register_analyzer(
        &mut self,
        analyzer: Box<dyn Analyzer>,
        descriptors: &[InitDescriptor],
        trusted: bool,
    ) -> Result<bool, EngineError> {
        let registered = self
            .registry
            .register_analyzer(analyzer, descriptors, trusted)?;
        self.registry.wire();
        Ok(registered)
    }

    pub fn register_parser_factory<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&AddInSpec) -> Result<Box<dyn Parser>, AddInError> + Send + Sync + 'static,
    {
        self.registry.register_parser_factory(name, factory);
    }

    pub fn register_analyzer_factory<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&AddInSpec) -> Result<Box<dyn Analyzer>, AddInError> + Send + Sync + 'static,
    {
        self.registry.register_analyzer_factory(name, factory);
    }

    fn parser_ids(&self) -> HashSet<String> {
        self.registry
            .parsers()
            .iter()
            .map(|p| p.id().to_string())
            .collect()
    }

    /// Wire analyzers and tell the environment about parsers not in `known`
    fn wire(&mut self, known: &HashSet<String>) {
        self.registry.wire();
        for parser in self.registry.parsers() {
            if !known.contains(parser.id()) {
                self.environment.parser_registered(parser.as_ref());
            }
        }
    }

    pub fn registry(&self) -> &AddInRegistry {
        &self.registry
    }

    pub fn parser(&self, id: &str) -> Option<Arc<dyn Parser>> {
        self.registry.parser(id)
    }

    pub fn analyzer(&self, id: &str) -> Option<Arc<dyn Analyzer>> {
        self.registry.analyzer(id)
    }

    pub fn addin(&self, id: &str) -> Option<AddInRef> {
        self.registry.addin(id)
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn on_violation(&self, handler: impl Fn(&Violation) + Send + Sync + 'static) {
        self.events.on_violation(handler);
    }

    pub fn on_output(&self, handler: impl Fn(&OutputEvent) + Send + Sync + 'static) {
        self.events.on_output(handler);
    }

    /// Ask the running analysis to stop before its next pass
    pub fn cancel(&self) {
        self.set_cancel(true);
    }

    pub fn set_cancel(&self, cancel: bool) {
        self.cancel.store(cancel, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Shared cancellation flag, for hosts cancelling from another thread
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_analyzing(&self) -> bool {
        self.analyzing.load(Ordering::Acquire)
    }

    /// Analyze projects, using cached results where they are still valid
    pub fn analyze(&self, projects: &[Project]) -> Result<RunSummary, EngineError> {
        self.run(projects, RunMode::default(), None)
    }

    pub fn analyze_with_settings(
        &self,
        projects: &[Project],
        settings_path: &str,
    ) -> Result<RunSummary, EngineError> {
        self.run(projects, RunMode::default(), Some(settings_path))
    }

    /// Analyze projects, ignoring cached results
    pub fn full_analyze(&self, projects: &[Project]) -> Result<RunSummary, EngineError> {
        let mode = RunMode {
            full: true,
            ..RunMode::default()
        };
        self.run(projects, mode, None)
    }

    pub fn full_analyze_with_settings(
        &self,
        projects: &[Project],
        settings_path: &str,
    ) -> Result<RunSummary, EngineError> {
        let mode = RunMode {
            full: true,
            ..RunMode::default()
        };
        self.run(projects, mode, Some(settings_path))
    }

    /// Analyze projects and apply safe fixes; `auto_save` writes changed
    /// files back through the environment
    pub fn auto_fix(&self, projects: &[Project], auto_save: bool) -> Result<RunSummary, EngineError> {
        let mode = RunMode {
            full: false,
            auto_fix: true,
            auto_save,
        };
        self.run(projects, mode, None)
    }

    pub fn auto_fix_with_settings(
        &self,
        projects: &[Project],
        auto_save: bool,
        settings_path: &str,
    ) -> Result<RunSummary, EngineError> {
        let mode = RunMode {
            full: false,
            auto_fix: true,
            auto_save,
        };
        self.run(projects, mode, Some(settings_path))
    }

    fn run(
        &self,
        projects: &[Project],
        mode: RunMode,
        settings_path: Option<&str>,
    ) -> Result<RunSummary, EngineError> {
        if settings_path.is_some_and(|p| p.trim().is_empty()) {
            return Err(EngineError::InvalidSettingsPath);
        }

        let _guard = self
            .run_lock
            .try_lock()
            .ok_or(EngineError::AlreadyAnalyzing)?;
        self.analyzing.store(true, Ordering::Release);
        self.cancel.store(false, Ordering::Release);

        let start = Instant::now();
        let settings_path = settings_path.map(Path::new);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.run_passes(projects, mode, settings_path)
        }))
        .unwrap_or_else(|payload| Err(RunFailure::Failed(panic_message(&*payload))));

        let result = match outcome {
            Ok((pass, run)) => {
                let mut summary = RunSummary::collect(projects, Vec::new());
                summary.passes = pass.passes;
                summary.cancelled = pass.cancelled;
                summary.converged = pass.converged;
                summary.files_analyzed = run.counters.files_analyzed.load(Ordering::Acquire);
                summary.files_cached = run.counters.files_cached.load(Ordering::Acquire);
                summary.fixes_applied = run.counters.fixes_applied.load(Ordering::Acquire);
                Ok(summary)
            }
            Err(RunFailure::Exhausted(message)) => Err(EngineError::ResourceExhausted(message)),
            Err(RunFailure::Failed(message)) => {
                log::error!("Analysis failed: {}", message);
                let violation = Violation::exception(&message);
                self.events.violation_encountered(&violation);
                Ok(RunSummary::collect(projects, vec![violation]))
            }
        };

        self.analyzing.store(false, Ordering::Release);
        result.map(|mut summary| {
            summary.duration = start.elapsed();
            summary
        })
    }

    /// Prepare projects, run the pass loop between the pre and post hooks
    /// and flush the cache
    fn run_passes(
        &self,
        projects: &[Project],
        mode: RunMode,
        settings_path: Option<&Path>,
    ) -> Result<(PassResult, RunContext), RunFailure> {
        let statuses = self.prepare_projects(projects, mode, settings_path)?;
        let threads = self.thread_count(projects);
        let pool = self.pool(threads)?;
        log::debug!("Analyzing with {} workers", threads);

        let parsers = self.registry.parsers();
        for parser in &parsers {
            parser.pre_parse();
            for analyzer in self.registry.analyzers_of(parser.id()) {
                analyzer.pre_analyze();
            }
        }

        let run = RunContext::new(projects, statuses, mode.auto_fix, Arc::clone(&self.cancel));
        let passes = catch_unwind(AssertUnwindSafe(|| {
            self.pass_loop(projects, &run, &pool, threads)
        }));

        for parser in &parsers {
            parser.post_parse();
            for analyzer in self.registry.analyzers_of(parser.id()) {
                analyzer.post_analyze();
            }
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.flush() {
                log::warn!("Failed to write cache: {}", e);
                self.events
                    .output_generated(OutputEvent::warning(format!("Failed to write cache: {}", e)));
            }
        }

        let passes = passes.map_err(|payload| RunFailure::Failed(panic_message(&*payload)))??;

        if mode.auto_save {
            self.save_fixed(projects);
        }
        Ok((passes, run))
    }

    fn pass_loop(
        &self,
        projects: &[Project],
        run: &RunContext,
        pool: &rayon::ThreadPool,
        threads: usize,
    ) -> Result<PassResult, RunFailure> {
        let worker = Worker {
            run,
            projects,
            registry: &self.registry,
            events: &self.events,
            cache: self.cache.as_ref(),
        };

        loop {
            if run.is_cancelled() {
                log::info!("Analysis cancelled before pass {}", run.pass());
                return Ok(PassResult {
                    passes: run.pass(),
                    cancelled: true,
                    converged: false,
                });
            }

            log::debug!("Starting pass {}", run.pass());
            run.begin_pass(threads);
            pool.scope(|scope| {
                for _ in 0..threads {
                    scope.spawn(|_| worker.run());
                }
            });

            if let Some(err) = run.take_fatal() {
                return Err(err.into());
            }

            for (index, project) in projects.iter().enumerate() {
                if let Some(status) = run.status(index) {
                    status.set_complete(project.files().iter().all(|f| f.is_done()));
                }
            }

            if !run.pass_incomplete() {
                return Ok(PassResult {
                    passes: run.pass() + 1,
                    cancelled: false,
                    converged: true,
                });
            }

            if run.pass() + 1 >= MAX_PASSES {
                self.events.output_generated(OutputEvent::warning(format!(
                    "Analysis did not converge after {} passes",
                    MAX_PASSES
                )));
                return Ok(PassResult {
                    passes: MAX_PASSES,
                    cancelled: false,
                    converged: false,
                });
            }
            run.next_pass();
        }
    }

    /// Load settings once per project, reset files and decide cache use
    fn prepare_projects(
        &self,
        projects: &[Project],
        mode: RunMode,
        settings_path: Option<&Path>,
    ) -> Result<Vec<ProjectStatus>, RunFailure> {
        let mut statuses = Vec::with_capacity(projects.len());

        for project in projects {
            if !project.settings_loaded() {
                let loaded = self
                    .environment
                    .settings_for(project, settings_path)
                    .map_err(|e| {
                        RunFailure::Failed(format!(
                            "Failed to load settings for {}: {}",
                            project.name(),
                            e
                        ))
                    })?;
                project.settings_or_init(|| loaded);
            }
            let settings = project.settings_or_init(Default::default);
            let digest = settings.digest();

            for file in project.files() {
                file.reset_for_run();
            }

            let write_cache = project.write_cache() && settings.engine.write_cache;
            let ignore_cache = match &self.cache {
                Some(cache) => mode.full || !cache.is_project_valid(project, &digest),
                None => true,
            };
            if ignore_cache {
                log::debug!("Ignoring cached results for {}", project.name());
            }

            if let Some(cache) = &self.cache {
                if write_cache {
                    cache.save_project(project, &digest);
                }
            }

            statuses.push(ProjectStatus::new(ignore_cache, write_cache, digest));
        }

        Ok(statuses)
    }

    /// Worker count: 1 in single-worker mode, else the jobs override, else
    /// the CPU count with a floor of 2
    fn thread_count(&self, projects: &[Project]) -> usize {
        let settings = projects.iter().filter_map(|p| p.settings());

        let single_worker = self.options.single_worker
            || settings.clone().any(|s| s.engine.single_worker);
        if single_worker {
            return 1;
        }

        if self.options.jobs > 0 {
            return self.options.jobs;
        }

        settings
            .map(|s| s.engine.jobs)
            .find(|jobs| *jobs > 0)
            .unwrap_or_else(|| num_cpus::get().max(2))
    }

    fn pool(&self, threads: usize) -> Result<Arc<rayon::ThreadPool>, RunFailure> {
        let mut pool = self.pool.lock();
        if let Some((size, existing)) = pool.as_ref() {
            if *size == threads {
                return Ok(Arc::clone(existing));
            }
        }

        let built = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("stylecheck-worker-{}", i))
            .build()
            .map_err(|e| RunFailure::Failed(format!("Failed to start workers: {}", e)))?;
        let built = Arc::new(built);
        *pool = Some((threads, Arc::clone(&built)));
        Ok(built)
    }

    fn save_fixed(&self, projects: &[Project]) {
        for file in projects.iter().flat_map(|p| p.files()) {
            if !file.is_modified() {
                continue;
            }
            let Some(text) = file.source_text() else {
                continue;
            };
            if let Err(e) = self.environment.write_source(file.path(), &text) {
                self.events.output_generated(OutputEvent::warning(format!(
                    "Failed to write {}: {}",
                    file.path().display(),
                    e
                )));
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .field("addins", &self.registry.len())
            .field("analyzing", &self.is_analyzing())
            .finish_non_exhaustive()
    }
}
