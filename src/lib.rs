//! Stylecheck - multi-pass, pluggable static analysis
//!
//! Parsers build a code model for each source file they own; analyzers
//! attached to a parser inspect that model and report violations. Both are
//! add-ins, declared in YAML/JSON module manifests and built through named
//! factories.
//!
//! # Architecture
//!
//! ```text
//! CLI/API -> Engine -> AddInRegistry -> Parser -> Analyzer(s) -> Violation
//!                 \-> ResultsCache
//! ```
//!
//! The engine loads settings once per project, then runs passes over every
//! file on a worker pool. A parser may defer a file until a later pass; the
//! run finishes once a pass ends with no deferred work. Results of files
//! whose content and project configuration are unchanged come from the
//! cache instead of being recomputed.
//!
//! # Declaring Add-ins
//!
//! ```yaml
//! module:
//!   name: readability
//! addins:
//!   - id: text
//!     kind: parser
//!     factory: text
//!     extensions: ["cs"]
//!   - id: readability-rules
//!     kind: analyzer
//!     factory: pattern
//!     parser: text
//!     descriptors:
//!       - id: ReadabilityRules
//!         rules:
//!           - id: AvoidGoto
//!             context: "Do not use '{0}'"
//!             pattern: "\\b(goto)\\b"
//! ```

pub mod addin;
pub mod addins;
pub mod cache;
pub mod engine;
pub mod environment;
pub mod events;
pub mod fixer;
pub mod output;
pub mod project;
pub mod registry;
pub mod rule;
pub mod run;
pub mod settings;
pub mod violation;

mod worker;

// Re-export main types
pub use addin::{AddIn, AddInError, AddInRef, Analyzer, InitDescriptor, ParseOutcome, Parser};
pub use cache::{CacheStore, JsonCacheStore, MemoryCacheStore, ResultsCache};
pub use engine::{Engine, EngineError, EngineOptions, RunSummary};
pub use environment::{Environment, FileEnvironment};
pub use events::{EventHub, OutputEvent, OutputLevel};
pub use output::{JsonFormatter, OutputFormatter, TextFormatter};
pub use project::{CodeModel, Project, SourceFile};
pub use registry::{AddInRegistry, LoadReport};
pub use rule::{Rule, RuleCategory};
pub use run::FileContext;
pub use settings::Settings;
pub use violation::{Fix, FixSafety, Severity, Violation};
