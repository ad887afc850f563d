//! Add-in registry - discovers add-in modules, instantiates them and wires
//! analyzers to the parser that owns their file type
//!
//! An add-in module is a YAML/JSON manifest. Each declared add-in names the
//! factory that builds it and the ordered initialization descriptors it is
//! initialized with (most specific first):
//!
//! ```yaml
//! module:
//!   name: readability
//!   key: "9f3c61d2a0b7e4c8"
//!
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
//!             context: "Do not use goto statements"
//!             pattern: "\\bgoto\\b"
//! ```

use crate::addin::{AddIn, AddInError, AddInRef, Analyzer, InitDescriptor, Parser};
use crate::addins::{PatternAnalyzer, TextParser};
use crate::rule::Rule;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Module file stems that belong to the host and are never loaded as add-ins
pub const RESERVED_MODULES: [&str; 3] = ["stylecheck", "stylecheck-settings", "stylecheck-cache"];

/// Module manifest file structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleManifest {
    pub module: ModuleMetadata,

    #[serde(default)]
    pub addins: Vec<AddInSpec>,
}

/// Module metadata
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleMetadata {
    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: String,

    /// Origin key compared against the host key
    #[serde(default)]
    pub key: Option<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Kind of add-in declared in a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddInKind {
    Parser,
    Analyzer,
}

/// One add-in declaration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AddInSpec {
    pub id: String,

    pub kind: AddInKind,

    /// Name of the registered factory that builds this add-in
    pub factory: String,

    /// Owning parser (analyzers only)
    #[serde(default)]
    pub parser: Option<String>,

    /// File extensions (parsers only)
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Initialization descriptors, most specific first
    #[serde(default)]
    pub descriptors: Vec<InitDescriptor>,

    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

type ParserFactory = Arc<dyn Fn(&AddInSpec) -> Result<Box<dyn Parser>, AddInError> + Send + Sync>;
type AnalyzerFactory =
    Arc<dyn Fn(&AddInSpec) -> Result<Box<dyn Analyzer>, AddInError> + Send + Sync>;

/// A parser and the analyzers wired to it
struct ParserSlot {
    parser: Arc<dyn Parser>,
    analyzers: IndexMap<String, Arc<dyn Analyzer>>,
}

/// An analyzer and its back-reference to the owning parser
struct AnalyzerSlot {
    analyzer: Arc<dyn Analyzer>,
    parser: Option<String>,
}

/// Outcome of scanning a directory tree for add-in modules
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Ids of add-ins registered
    pub loaded: Vec<String>,
    /// Modules or add-ins skipped, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

/// Registry of loaded parsers and analyzers
pub struct AddInRegistry {
    parsers: IndexMap<String, ParserSlot>,
    analyzers: IndexMap<String, AnalyzerSlot>,
    extension_map: HashMap<String, String>,
    /// Synthesized "<Rule>#Enabled" options per add-in
    options: HashMap<String, IndexMap<String, bool>>,
    rule_defaults: HashMap<String, bool>,
    trusted: HashMap<String, bool>,
    parser_factories: HashMap<String, ParserFactory>,
    analyzer_factories: HashMap<String, AnalyzerFactory>,
}

impl Default for AddInRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AddInRegistry {
    /// Create an empty registry with no factories
    pub fn new() -> Self {
        Self {
            parsers: IndexMap::new(),
            analyzers: IndexMap::new(),
            extension_map: HashMap::new(),
            options: HashMap::new(),
            rule_defaults: HashMap::new(),
            trusted: HashMap::new(),
            parser_factories: HashMap::new(),
            analyzer_factories: HashMap::new(),
        }
    }

    /// Create a registry that knows the built-in `text` and `pattern` factories
    pub fn with_builtin_factories() -> Self {
        let mut registry = Self::new();
        registry.register_parser_factory("text", |spec| {
            Ok(Box::new(TextParser::from_spec(spec)) as Box<dyn Parser>)
        });
        registry.register_analyzer_factory("pattern", |spec| {
            PatternAnalyzer::from_spec(spec).map(|a| Box::new(a) as Box<dyn Analyzer>)
        });
        registry
    }

    pub fn register_parser_factory<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&AddInSpec) -> Result<Box<dyn Parser>, AddInError> + Send + Sync + 'static,
    {
        self.parser_factories
            .insert(name.to_string(), Arc::new(factory));
    }

    pub fn register_analyzer_factory<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&AddInSpec) -> Result<Box<dyn Analyzer>, AddInError> + Send + Sync + 'static,
    {
        self.analyzer_factories
            .insert(name.to_string(), Arc::new(factory));
    }

    /// Recursively scan a directory tree and load every add-in module in it.
    ///
    /// Broken modules are skipped; only resource exhaustion aborts the scan.
    pub fn load_addins(&mut self, path: &Path, trusted_key: &[u8]) -> Result<LoadReport, AddInError> {
        let mut report = LoadReport::default();

        for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::info!("Skipping unreadable add-in location: {}", e);
                    let location = e.path().map(Path::to_path_buf).unwrap_or_default();
                    report.skipped.push((location, e.to_string()));
                    continue;
                }
            };

            let module_path = entry.path();
            if !entry.file_type().is_file() || !is_module_candidate(module_path) {
                continue;
            }

            match self.load_module(module_path, trusted_key) {
                Ok(outcome) => {
                    report.loaded.extend(outcome.loaded);
                    report.skipped.extend(outcome.skipped);
                }
                Err(e) if e.is_resource_exhaustion() => return Err(e),
                Err(e) => {
                    log::info!("Skipping add-in module {}: {}", module_path.display(), e);
                    report.skipped.push((module_path.to_path_buf(), e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Load the add-ins declared by one module manifest
    pub fn load_module(&mut self, path: &Path, trusted_key: &[u8]) -> Result<LoadReport, AddInError> {
        let content = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let manifest: ModuleManifest = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| AddInError::Parse {
                file: path.display().to_string(),
                message: e.to_string(),
            })?,
            "json" => serde_json::from_str(&content).map_err(|e| AddInError::Parse {
                file: path.display().to_string(),
                message: e.to_string(),
            })?,
            _ => {
                return Err(AddInError::Invalid(format!(
                    "Unsupported module format: {}",
                    ext
                )))
            }
        };

        let trusted = is_trusted(manifest.module.key.as_deref(), trusted_key);
        log::debug!(
            "Loading module {} ({} add-ins, trusted: {})",
            manifest.module.name,
            manifest.addins.len(),
            trusted
        );

        let mut report = LoadReport::default();
        for spec in &manifest.addins {
            match self.instantiate(spec, trusted) {
                Ok(true) => report.loaded.push(spec.id.clone()),
                Ok(false) => {
                    log::debug!("Add-in {} already registered, ignoring duplicate", spec.id);
                }
                Err(e) if e.is_resource_exhaustion() => return Err(e),
                Err(e) => {
                    log::info!("Skipping add-in {} in {}: {}", spec.id, path.display(), e);
                    report.skipped.push((path.to_path_buf(), e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Build one declared add-in through its factory and register it
    fn instantiate(&mut self, spec: &AddInSpec, trusted: bool) -> Result<bool, AddInError> {
        if self.contains(&spec.id) {
            return Ok(false);
        }

        match spec.kind {
            AddInKind::Parser => {
                let factory = self
                    .parser_factories
                    .get(&spec.factory)
                    .cloned()
                    .ok_or_else(|| AddInError::UnknownFactory(spec.factory.clone()))?;
                let parser = factory(spec)?;
                self.register_parser(parser, &spec.descriptors, trusted)
            }
            AddInKind::Analyzer => {
                let factory = self
                    .analyzer_factories
                    .get(&spec.factory)
                    .cloned()
                    .ok_or_else(|| AddInError::UnknownFactory(spec.factory.clone()))?;
                let analyzer = factory(spec)?;
                self.register_analyzer(analyzer, &spec.descriptors, trusted)
            }
        }
    }

    /// Initialize and register a parser. Returns false if the id is taken.
    pub fn register_parser(
        &mut self,
        mut parser: Box<dyn Parser>,
        descriptors: &[InitDescriptor],
        trusted: bool,
    ) -> Result<bool, AddInError> {
        let id = parser.id().to_string();
        if self.contains(&id) {
            return Ok(false);
        }

        apply_descriptors(parser.as_mut(), descriptors, trusted)?;
        self.synthesize_options(&id, parser.rules());

        for ext in parser.extensions() {
            self.extension_map
                .entry(ext.to_lowercase())
                .or_insert_with(|| id.clone());
        }

        self.trusted.insert(id.clone(), trusted);
        self.parsers.insert(
            id,
            ParserSlot {
                parser: Arc::from(parser),
                analyzers: IndexMap::new(),
            },
        );
        Ok(true)
    }

    /// Initialize and register an analyzer. Returns false if the id is taken.
    ///
    /// The analyzer stays inert until [`AddInRegistry::wire`] finds its parser.
    pub fn register_analyzer(
        &mut self,
        mut analyzer: Box<dyn Analyzer>,
        descriptors: &[InitDescriptor],
        trusted: bool,
    ) -> Result<bool, AddInError> {
        let id = analyzer.id().to_string();
        if self.contains(&id) {
            return Ok(false);
        }

        apply_descriptors(analyzer.as_mut(), descriptors, trusted)?;
        self.synthesize_options(&id, analyzer.rules());

        self.trusted.insert(id.clone(), trusted);
        self.analyzers.insert(
            id,
            AnalyzerSlot {
                analyzer: Arc::from(analyzer),
                parser: None,
            },
        );
        Ok(true)
    }

    fn synthesize_options(&mut self, addin_id: &str, rules: &[Rule]) {
        let options = self.options.entry(addin_id.to_string()).or_default();
        for rule in rules {
            options.insert(rule.enabled_option(), rule.enabled);
            self.rule_defaults
                .entry(rule.id.clone())
                .or_insert(rule.enabled);
        }
    }

    /// Attach every analyzer to the parser it declares.
    ///
    /// Analyzers whose parser is unknown are left unattached.
    pub fn wire(&mut self) {
        for (id, slot) in self.analyzers.iter_mut() {
            let owner = slot.analyzer.parser_id().to_string();
            match self.parsers.get_mut(&owner) {
                Some(parser_slot) => {
                    parser_slot
                        .analyzers
                        .insert(id.clone(), Arc::clone(&slot.analyzer));
                    slot.parser = Some(owner);
                }
                None => {
                    log::debug!("Analyzer {} has no parser {}, leaving it inert", id, owner);
                }
            }
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.parsers.contains_key(id) || self.analyzers.contains_key(id)
    }

    pub fn parser(&self, id: &str) -> Option<Arc<dyn Parser>> {
        self.parsers.get(id).map(|slot| Arc::clone(&slot.parser))
    }

    pub fn analyzer(&self, id: &str) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(id).map(|slot| Arc::clone(&slot.analyzer))
    }

    pub fn addin(&self, id: &str) -> Option<AddInRef> {
        self.parser(id)
            .map(AddInRef::Parser)
            .or_else(|| self.analyzer(id).map(AddInRef::Analyzer))
    }

    /// Parser that owns a file extension
    pub fn parser_for_extension(&self, ext: &str) -> Option<Arc<dyn Parser>> {
        self.extension_map
            .get(&ext.to_lowercase())
            .and_then(|id| self.parser(id))
    }

    pub fn parser_for_path(&self, path: &Path) -> Option<Arc<dyn Parser>> {
        let ext = path.extension()?.to_str()?;
        self.parser_for_extension(ext)
    }

    /// Analyzers wired to a parser, in registration order
    pub fn analyzers_of(&self, parser_id: &str) -> Vec<Arc<dyn Analyzer>> {
        self.parsers
            .get(parser_id)
            .map(|slot| slot.analyzers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Back-reference of an analyzer, set by `wire`
    pub fn owner_of(&self, analyzer_id: &str) -> Option<&str> {
        self.analyzers
            .get(analyzer_id)
            .and_then(|slot| slot.parser.as_deref())
    }

    pub fn parsers(&self) -> Vec<Arc<dyn Parser>> {
        self.parsers
            .values()
            .map(|slot| Arc::clone(&slot.parser))
            .collect()
    }

    pub fn analyzers(&self) -> Vec<Arc<dyn Analyzer>> {
        self.analyzers
            .values()
            .map(|slot| Arc::clone(&slot.analyzer))
            .collect()
    }

    /// Every rule exposed by every add-in
    pub fn rules(&self) -> Vec<&Rule> {
        let parser_rules = self.parsers.values().flat_map(|s| s.parser.rules());
        let analyzer_rules = self.analyzers.values().flat_map(|s| s.analyzer.rules());
        parser_rules.chain(analyzer_rules).collect()
    }

    /// Default of the synthesized Enabled option of a rule
    pub fn rule_default(&self, rule_id: &str) -> Option<bool> {
        self.rule_defaults.get(rule_id).copied()
    }

    /// Look up a synthesized option of an add-in
    pub fn option(&self, addin_id: &str, name: &str) -> Option<bool> {
        self.options.get(addin_id)?.get(name).copied()
    }

    pub fn is_trusted(&self, addin_id: &str) -> bool {
        self.trusted.get(addin_id).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.parsers.len() + self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Apply descriptors most specific first, then signal readiness
fn apply_descriptors<T: AddIn + ?Sized>(
    addin: &mut T,
    descriptors: &[InitDescriptor],
    trusted: bool,
) -> Result<(), AddInError> {
    for (i, descriptor) in descriptors.iter().enumerate() {
        addin.initialize(descriptor, i == 0, trusted)?;
    }
    addin.ready()
}

/// Byte-exact, length-sensitive key comparison
pub fn is_trusted(module_key: Option<&str>, host_key: &[u8]) -> bool {
    module_key.is_some_and(|key| key.as_bytes() == host_key)
}

fn is_module_candidate(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if !matches!(ext, "yaml" | "yml" | "json") {
        return false;
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    // Settings files and rule files live next to modules
    !(stem.starts_with('.') || stem.ends_with("-rules") || RESERVED_MODULES.contains(&stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addin::{ParseOutcome, SettingsPage};
    use crate::project::SourceFile;
    use crate::run::FileContext;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Parser that records the initialization calls it receives
    struct RecordingParser {
        id: String,
        calls: Arc<Mutex<Vec<String>>>,
        rules: Vec<Rule>,
        extensions: Vec<String>,
    }

    impl RecordingParser {
        fn new(id: &str, calls: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                id: id.to_string(),
                calls,
                rules: Vec::new(),
                extensions: vec!["cs".to_string()],
            }
        }
    }

    impl AddIn for RecordingParser {
        fn id(&self) -> &str {
            &self.id
        }

        fn initialize(
            &mut self,
            descriptor: &InitDescriptor,
            primary: bool,
            trusted: bool,
        ) -> Result<(), AddInError> {
            self.calls
                .lock()
                .push(format!("{}:{}:{}", descriptor.id, primary, trusted));
            self.rules.extend(descriptor.rules.iter().cloned());
            Ok(())
        }

        fn ready(&mut self) -> Result<(), AddInError> {
            self.calls.lock().push("ready".to_string());
            Ok(())
        }

        fn rules(&self) -> &[Rule] {
            &self.rules
        }

        fn settings_pages(&self) -> Vec<SettingsPage> {
            vec![SettingsPage {
                id: "general".to_string(),
                title: "General".to_string(),
            }]
        }
    }

    impl Parser for RecordingParser {
        fn extensions(&self) -> &[String] {
            &self.extensions
        }

        fn parse_file(
            &self,
            _file: &SourceFile,
            _ctx: &FileContext<'_>,
        ) -> Result<ParseOutcome, AddInError> {
            Ok(ParseOutcome::Complete)
        }
    }

    fn write_module(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    const READABILITY_MODULE: &str = r##"
module:
  name: readability
  key: "host-key"
addins:
  - id: text
    kind: parser
    factory: text
    extensions: ["cs"]
  - id: readability-rules
    kind: analyzer
    factory: pattern
    parser: text
    descriptors:
      - id: ReadabilityRules
        rules:
          - id: AvoidGoto
            context: "Do not use goto"
            pattern: "\\bgoto\\b"
          - id: AvoidRegions
            context: "Do not use regions"
            pattern: "#region"
            enabled: false
"##;

    #[test]
    fn test_descriptors_applied_most_specific_first() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = AddInRegistry::new();

        let descriptors = vec![
            InitDescriptor::new("Derived"),
            InitDescriptor::new("Base"),
        ];
        let registered = registry
            .register_parser(
                Box::new(RecordingParser::new("cs", Arc::clone(&calls))),
                &descriptors,
                true,
            )
            .unwrap();

        assert!(registered);
        assert_eq!(
            *calls.lock(),
            vec!["Derived:true:true", "Base:false:true", "ready"]
        );
    }

    #[test]
    fn test_enabled_options_synthesized() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = AddInRegistry::new();
        let descriptor = InitDescriptor::new("Rules")
            .with_rule(Rule::new("OnRule", "on"))
            .with_rule(Rule::new("OffRule", "off").enabled_by_default(false));

        registry
            .register_parser(Box::new(RecordingParser::new("cs", calls)), &[descriptor], false)
            .unwrap();

        assert_eq!(registry.option("cs", "OnRule#Enabled"), Some(true));
        assert_eq!(registry.option("cs", "OffRule#Enabled"), Some(false));
        assert_eq!(registry.rule_default("OffRule"), Some(false));
        assert_eq!(registry.option("cs", "Missing#Enabled"), None);
    }

    #[test]
    fn test_duplicate_identifier_first_wins() {
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        let mut registry = AddInRegistry::new();

        let d = [InitDescriptor::new("D")];
        assert!(registry
            .register_parser(Box::new(RecordingParser::new("cs", Arc::clone(&first))), &d, false)
            .unwrap());
        assert!(!registry
            .register_parser(Box::new(RecordingParser::new("cs", Arc::clone(&second))), &d, false)
            .unwrap());

        assert_eq!(registry.len(), 1);
        assert!(second.lock().is_empty());
        assert_eq!(first.lock().len(), 2);
    }

    #[test]
    fn test_load_module_and_wire() {
        let temp = TempDir::new().unwrap();
        write_module(temp.path(), "readability.yaml", READABILITY_MODULE);

        let mut registry = AddInRegistry::with_builtin_factories();
        let report = registry.load_addins(temp.path(), b"host-key").unwrap();
        assert_eq!(report.loaded, vec!["text", "readability-rules"]);
        assert!(report.skipped.is_empty());

        assert!(registry.analyzers_of("text").is_empty());
        assert_eq!(registry.owner_of("readability-rules"), None);

        registry.wire();
        assert_eq!(registry.analyzers_of("text").len(), 1);
        assert_eq!(registry.owner_of("readability-rules"), Some("text"));
        assert!(registry.is_trusted("readability-rules"));
        assert!(registry.parser_for_path(Path::new("src/Program.CS")).is_some());
        assert_eq!(registry.rule_default("AvoidRegions"), Some(false));
        assert_eq!(registry.rules().len(), 2);
    }

    #[test]
    fn test_untrusted_key() {
        let temp = TempDir::new().unwrap();
        write_module(temp.path(), "readability.yaml", READABILITY_MODULE);

        let mut registry = AddInRegistry::with_builtin_factories();
        registry.load_addins(temp.path(), b"host-key-2").unwrap();
        assert!(!registry.is_trusted("text"));
    }

    #[test]
    fn test_key_comparison_is_exact() {
        assert!(is_trusted(Some("abc"), b"abc"));
        assert!(!is_trusted(Some("abc"), b"abcd"));
        assert!(!is_trusted(Some("abcd"), b"abc"));
        assert!(!is_trusted(Some("ABC"), b"abc"));
        assert!(!is_trusted(None, b""));
    }

    #[test]
    fn test_unresolved_owner_stays_inert() {
        let temp = TempDir::new().unwrap();
        write_module(
            temp.path(),
            "orphan.yaml",
            r#"
module:
  name: orphan
addins:
  - id: orphan-rules
    kind: analyzer
    factory: pattern
    parser: vb
"#,
        );

        let mut registry = AddInRegistry::with_builtin_factories();
        registry.load_addins(temp.path(), b"").unwrap();
        registry.wire();

        assert!(registry.analyzer("orphan-rules").is_some());
        assert_eq!(registry.owner_of("orphan-rules"), None);
        assert!(registry.parser("vb").is_none());
    }

    #[test]
    fn test_broken_modules_are_skipped() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("nested").join("deeper");
        std::fs::create_dir_all(&nested).unwrap();

        write_module(temp.path(), "broken.yaml", "module: [not, a, map");
        write_module(
            temp.path(),
            "unknown.yaml",
            "module:\n  name: u\naddins:\n  - id: x\n    kind: parser\n    factory: nope\n",
        );
        write_module(&nested, "readability.yaml", READABILITY_MODULE);

        let mut registry = AddInRegistry::with_builtin_factories();
        let report = registry.load_addins(temp.path(), b"").unwrap();

        assert_eq!(report.loaded.len(), 2);
        assert_eq!(report.skipped.len(), 2);
        assert!(registry.parser("text").is_some());
    }

    #[test]
    fn test_reserved_and_rule_files_are_not_modules() {
        assert!(!is_module_candidate(Path::new("addins/stylecheck.yaml")));
        assert!(!is_module_candidate(Path::new("addins/stylecheck-cache.json")));
        assert!(!is_module_candidate(Path::new("addins/naming-rules.yaml")));
        assert!(!is_module_candidate(Path::new("addins/.stylecheck.yaml")));
        assert!(!is_module_candidate(Path::new("addins/readme.md")));
        assert!(is_module_candidate(Path::new("addins/naming.yml")));
    }

    #[test]
    fn test_duplicate_across_modules() {
        let temp = TempDir::new().unwrap();
        write_module(temp.path(), "a.yaml", READABILITY_MODULE);
        write_module(temp.path(), "b.yaml", READABILITY_MODULE);

        let mut registry = AddInRegistry::with_builtin_factories();
        let report = registry.load_addins(temp.path(), b"").unwrap();

        assert_eq!(report.loaded.len(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lookup_never_panics() {
        let registry = AddInRegistry::new();
        assert!(registry.addin("missing").is_none());
        assert!(registry.parser("missing").is_none());
        assert!(registry.analyzer("missing").is_none());
        assert!(registry.analyzers_of("missing").is_empty());
        assert!(registry.is_empty());
    }
}
