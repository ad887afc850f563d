//! Analysis settings
//!
//! Reads settings from:
//! - `.stylecheck.yaml` / `.stylecheck.yml` / `.stylecheck.json` in the project root
//! - an explicit settings file handed to the engine
//!
//! Settings files may `extends` other settings files; later files win.

use crate::violation::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File names looked up in a project root, in order
pub const SETTINGS_FILE_NAMES: [&str; 3] =
    [".stylecheck.yaml", ".stylecheck.yml", ".stylecheck.json"];

/// Settings error
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Number of workers (0 = auto-detect)
    pub jobs: usize,

    /// Run a single worker for deterministic debugging
    pub single_worker: bool,

    /// Write results of this project to the results cache
    pub write_cache: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            jobs: 0,
            single_worker: false,
            write_cache: true,
        }
    }
}

/// Rule settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesSettings {
    /// Disabled rules
    pub disabled: Vec<String>,

    /// Rules enabled even when off by default
    pub enabled: Vec<String>,

    /// Ignore rules by prefix (case-insensitive)
    pub ignore: Vec<String>,

    /// Severity overrides (rule_id -> severity)
    pub severity: BTreeMap<String, Severity>,

    /// Per-file rule ignores (glob pattern -> rule IDs, "all" for every rule)
    pub per_file: BTreeMap<String, Vec<String>>,
}

/// Per-add-in switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddInSettings {
    pub enabled: bool,
}

impl Default for AddInSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Settings for one project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Settings files this one builds on
    pub extends: Vec<String>,

    /// Engine settings
    pub engine: EngineSettings,

    /// Rule settings
    pub rules: RulesSettings,

    /// Add-in switches keyed by add-in id
    pub addins: BTreeMap<String, AddInSettings>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        Self::load_with_depth(path, 0)
    }

    fn load_with_depth(path: &Path, depth: usize) -> Result<Self, SettingsError> {
        const MAX_DEPTH: usize = 10;
        if depth >= MAX_DEPTH {
            return Err(SettingsError::Invalid(
                "Maximum settings inheritance depth exceeded".to_string(),
            ));
        }

        let content = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let mut settings: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                return Err(SettingsError::Invalid(format!(
                    "Unknown settings file format: {}",
                    ext
                )))
            }
        };

        if !settings.extends.is_empty() {
            let base_dir = path.parent().unwrap_or(Path::new("."));
            let mut base = Self::default();

            for extend in &settings.extends.clone() {
                let extend_path = if Path::new(extend).is_absolute() {
                    PathBuf::from(extend)
                } else {
                    base_dir.join(extend)
                };
                base.merge(Self::load_with_depth(&extend_path, depth + 1)?);
            }

            base.merge(settings);
            settings = base;
        }

        Ok(settings)
    }

    /// Find the settings file in a project root
    pub fn discover(root: &Path) -> Option<PathBuf> {
        SETTINGS_FILE_NAMES
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.is_file())
    }

    /// Merge another settings value into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.engine.jobs != 0 {
            self.engine.jobs = other.engine.jobs;
        }
        if other.engine.single_worker {
            self.engine.single_worker = true;
        }
        self.engine.write_cache = other.engine.write_cache;

        self.rules.disabled.extend(other.rules.disabled);
        self.rules.enabled.extend(other.rules.enabled);
        self.rules.ignore.extend(other.rules.ignore);
        self.rules.severity.extend(other.rules.severity);
        for (pattern, rules) in other.rules.per_file {
            self.rules.per_file.entry(pattern).or_default().extend(rules);
        }

        self.addins.extend(other.addins);
    }

    /// Whether a rule is enabled, given the rule's default
    pub fn is_rule_enabled(&self, rule_id: &str, default_enabled: bool) -> bool {
        if self.rules.disabled.iter().any(|r| r == rule_id) {
            return false;
        }

        let rule_upper = rule_id.to_uppercase();
        if self
            .rules
            .ignore
            .iter()
            .any(|prefix| rule_upper.starts_with(&prefix.to_uppercase()))
        {
            return false;
        }

        if self.rules.enabled.iter().any(|r| r == rule_id) {
            return true;
        }

        default_enabled
    }

    /// Whether an add-in is switched on
    pub fn is_addin_enabled(&self, addin_id: &str) -> bool {
        self.addins.get(addin_id).is_none_or(|a| a.enabled)
    }

    pub fn severity_override(&self, rule_id: &str) -> Option<Severity> {
        self.rules.severity.get(rule_id).copied()
    }

    /// Check if a rule should be ignored for a file
    pub fn should_ignore_rule_for_file(&self, rule_id: &str, file_path: &Path) -> bool {
        let file_str = file_path.to_string_lossy();

        for (pattern, rules) in &self.rules.per_file {
            if let Ok(glob) = globset::Glob::new(pattern) {
                let matcher = glob.compile_matcher();
                if matcher.is_match(file_str.as_ref())
                    && rules.iter().any(|r| r == "all" || r == rule_id)
                {
                    return true;
                }
            }
        }

        false
    }

    /// Stable digest of the effective settings
    pub fn digest(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
