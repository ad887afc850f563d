//! Add-in capability: parsers that build code models and analyzers that
//! check them

use crate::project::SourceFile;
use crate::rule::Rule;
use crate::run::FileContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Error raised by an add-in or while loading one
#[derive(Debug, Error)]
pub enum AddInError {
    #[error("IO error: {0}")]
    Io(std::io::Error),

    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Invalid add-in: {0}")]
    Invalid(String),

    #[error("Unknown add-in factory: {0}")]
    UnknownFactory(String),

    #[error("Add-in {addin} failed to initialize: {message}")]
    Initialization { addin: String, message: String },

    #[error("{0}")]
    Failed(String),

    #[error("Resources exhausted: {0}")]
    ResourceExhausted(String),
}

impl AddInError {
    /// Whether no further work can safely proceed
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, AddInError::ResourceExhausted(_))
    }
}

impl From<std::io::Error> for AddInError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::OutOfMemory {
            AddInError::ResourceExhausted(err.to_string())
        } else {
            AddInError::Io(err)
        }
    }
}

/// One layer of add-in initialization data
///
/// An add-in carries an ordered list of these, most specific first. Each
/// layer may contribute rules and free-form properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitDescriptor {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub rules: Vec<Rule>,

    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl InitDescriptor {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }
}

/// A settings page an add-in offers to a host UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsPage {
    pub id: String,
    pub title: String,
}

/// Capabilities shared by parsers and analyzers
pub trait AddIn: Send + Sync {
    /// Add-in identifier
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str {
        self.id()
    }

    /// Apply one initialization descriptor.
    ///
    /// Called once per descriptor, most specific first; `primary` is true
    /// only for the first call. `trusted` tells whether the module the
    /// add-in came from carries the host's key.
    fn initialize(
        &mut self,
        descriptor: &InitDescriptor,
        primary: bool,
        trusted: bool,
    ) -> Result<(), AddInError>;

    /// Called once after every descriptor has been applied
    fn ready(&mut self) -> Result<(), AddInError> {
        Ok(())
    }

    /// Rules this add-in can report
    fn rules(&self) -> &[Rule];

    fn settings_pages(&self) -> Vec<SettingsPage> {
        Vec::new()
    }
}

/// Result of one parse attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Model is complete, analyzers may run
    Complete,
    /// Needs facts from other files; try again next pass
    Deferred,
}

/// Builds code models for the file types it owns
pub trait Parser: AddIn {
    /// File extensions this parser handles (lower-case, without dot)
    fn extensions(&self) -> &[String];

    fn pre_parse(&self) {}

    /// Parse one file, storing the model on it
    fn parse_file(
        &self,
        file: &SourceFile,
        ctx: &FileContext<'_>,
    ) -> Result<ParseOutcome, AddInError>;

    fn post_parse(&self) {}
}

/// Checks parsed files and reports violations
pub trait Analyzer: AddIn {
    /// Identifier of the parser whose models this analyzer understands
    fn parser_id(&self) -> &str;

    /// Snapshot state before any file is touched
    fn pre_analyze(&self) {}

    fn analyze_file(&self, file: &SourceFile, ctx: &FileContext<'_>) -> Result<(), AddInError>;

    /// Release whatever `pre_analyze` captured
    fn post_analyze(&self) {}
}

/// Either kind of add-in, as returned by registry lookups
#[derive(Clone)]
pub enum AddInRef {
    Parser(Arc<dyn Parser>),
    Analyzer(Arc<dyn Analyzer>),
}

impl AddInRef {
    pub fn id(&self) -> &str {
        match self {
            AddInRef::Parser(p) => p.id(),
            AddInRef::Analyzer(a) => a.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AddInRef::Parser(p) => p.name(),
            AddInRef::Analyzer(a) => a.name(),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        match self {
            AddInRef::Parser(p) => p.rules(),
            AddInRef::Analyzer(a) => a.rules(),
        }
    }

    pub fn is_parser(&self) -> bool {
        matches!(self, AddInRef::Parser(_))
    }
}

impl std::fmt::Debug for AddInRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddInRef::Parser(p) => write!(f, "Parser({})", p.id()),
            AddInRef::Analyzer(a) => write!(f, "Analyzer({})", a.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AddInError::Parse {
            file: "naming.yaml".to_string(),
            message: "invalid syntax".to_string(),
        };
        assert_eq!(err.to_string(), "Parse error in naming.yaml: invalid syntax");
    }

    #[test]
    fn test_out_of_memory_maps_to_exhaustion() {
        let err: AddInError = std::io::Error::from(std::io::ErrorKind::OutOfMemory).into();
        assert!(err.is_resource_exhaustion());

        let err: AddInError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(!err.is_resource_exhaustion());
    }

    #[test]
    fn test_descriptor_deserialize() {
        let yaml = r#"
id: NamingRules
rules:
  - id: FieldNamesMustNotBeginWithUnderscore
    context: "Field '{0}' begins with an underscore"
    enabled: false
properties:
  prefix: "m_"
"#;
        let descriptor: InitDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptor.id, "NamingRules");
        assert_eq!(descriptor.rules.len(), 1);
        assert!(!descriptor.rules[0].enabled);
        assert_eq!(descriptor.properties.get("prefix").map(String::as_str), Some("m_"));
    }
}
