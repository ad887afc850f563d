//! Host environment the engine consults for settings, add-in locations and
//! writing fixed sources

use crate::addin::Parser;
use crate::project::Project;
use crate::settings::{Settings, SettingsError};
use std::path::{Path, PathBuf};

/// Services the host provides to the engine
///
/// Called only before a run starts or after it ends, never from workers.
pub trait Environment: Send + Sync {
    /// Settings for a project. An explicit path takes precedence over
    /// settings discovered in the project root.
    fn settings_for(
        &self,
        project: &Project,
        settings_path: Option<&Path>,
    ) -> Result<Settings, SettingsError>;

    /// Directories scanned for add-in modules when defaults are loaded
    fn addin_search_paths(&self) -> Vec<PathBuf>;

    /// Whether a directory may be scanned for add-ins
    fn validate_addin_path(&self, path: &Path) -> bool;

    /// Notification that a parser was registered
    fn parser_registered(&self, _parser: &dyn Parser) {}

    /// Persist rewritten source text
    fn write_source(&self, path: &Path, text: &str) -> std::io::Result<()>;
}

/// Filesystem-backed environment
#[derive(Debug, Clone)]
pub struct FileEnvironment {
    search_paths: Vec<PathBuf>,
}

impl Default for FileEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl FileEnvironment {
    pub fn new() -> Self {
        let mut search_paths = vec![
            PathBuf::from(".stylecheck/addins"),
            PathBuf::from("addins"),
        ];

        // Add user config directory
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("stylecheck").join("addins"));
        }

        // Add home directory
        if let Some(home_dir) = dirs::home_dir() {
            search_paths.push(home_dir.join(".stylecheck").join("addins"));
        }

        Self { search_paths }
    }

    /// Environment with an explicit list of add-in directories
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.push(path);
    }
}

impl Environment for FileEnvironment {
    fn settings_for(
        &self,
        project: &Project,
        settings_path: Option<&Path>,
    ) -> Result<Settings, SettingsError> {
        if let Some(path) = settings_path {
            return Settings::load(path);
        }

        match Settings::discover(project.root()) {
            Some(path) => {
                log::debug!("Using settings {} for {}", path.display(), project.name());
                Settings::load(&path)
            }
            None => Ok(Settings::default()),
        }
    }

    fn addin_search_paths(&self) -> Vec<PathBuf> {
        self.search_paths.clone()
    }

    fn validate_addin_path(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn parser_registered(&self, parser: &dyn Parser) {
        log::debug!(
            "Parser {} handles {}",
            parser.id(),
            parser.extensions().join(", ")
        );
    }

    fn write_source(&self, path: &Path, text: &str) -> std::io::Result<()> {
        std::fs::write(path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_discovered_in_root() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".stylecheck.yaml"),
            "rules:\n  disabled: [AvoidGoto]\n",
        )
        .unwrap();

        let env = FileEnvironment::with_search_paths(vec![]);
        let project = Project::new("p", temp.path());
        let settings = env.settings_for(&project, None).unwrap();
        assert!(!settings.is_rule_enabled("AvoidGoto", true));
    }

    #[test]
    fn test_explicit_settings_path_wins() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".stylecheck.yaml"), "rules:\n  disabled: [A]\n").unwrap();
        let explicit = temp.path().join("ci.json");
        std::fs::write(&explicit, r#"{"rules": {"disabled": ["B"]}}"#).unwrap();

        let env = FileEnvironment::with_search_paths(vec![]);
        let project = Project::new("p", temp.path());
        let settings = env.settings_for(&project, Some(&explicit)).unwrap();
        assert!(settings.is_rule_enabled("A", true));
        assert!(!settings.is_rule_enabled("B", true));
    }

    #[test]
    fn test_missing_settings_default() {
        let temp = TempDir::new().unwrap();
        let env = FileEnvironment::with_search_paths(vec![]);
        let settings = env
            .settings_for(&Project::new("p", temp.path()), None)
            .unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_validate_addin_path() {
        let temp = TempDir::new().unwrap();
        let env = FileEnvironment::new();
        assert!(env.validate_addin_path(temp.path()));
        assert!(!env.validate_addin_path(&temp.path().join("missing")));
        assert!(env.addin_search_paths().len() >= 2);
    }
}
