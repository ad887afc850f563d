//! Results cache for incremental analysis
//!
//! Keeps, per project, the configuration fingerprint and settings digest the
//! project was last analyzed under, and per file the violations found under
//! that fingerprint and settings digest. A file entry is only trusted while
//! both still match and the file content is unchanged.

use crate::project::{Project, SourceFile};
use crate::violation::Violation;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Current cache format version
pub const CACHE_VERSION: u32 = 2;

/// Cache storage error
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cached state of one project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntry {
    /// Semicolon-joined configuration flags
    pub configuration: String,
    /// Digest of the effective settings
    #[serde(default)]
    pub settings_digest: String,
}

/// Cached results of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub configuration: String,
    /// Digest of the settings the violations were computed under
    #[serde(default)]
    pub settings_digest: String,
    pub content_digest: String,
    pub violations: Vec<Violation>,
}

/// Everything the cache persists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDocument {
    /// Cache version (bump to invalidate all caches)
    pub version: u32,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectEntry>,
    #[serde(default)]
    pub files: BTreeMap<String, FileEntry>,
}

impl Default for CacheDocument {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            projects: BTreeMap::new(),
            files: BTreeMap::new(),
        }
    }
}

/// Durable storage behind the results cache
pub trait CacheStore: Send + Sync {
    /// Load the stored document; `None` when nothing usable is stored
    fn load(&self) -> Result<Option<CacheDocument>, CacheError>;

    fn save(&self, document: &CacheDocument) -> Result<(), CacheError>;
}

/// JSON file store
///
/// Writes go to a sibling temp file which is then renamed over the cache
/// file, so a reader sees either the old or the new document.
#[derive(Debug, Clone)]
pub struct JsonCacheStore {
    path: PathBuf,
}

impl JsonCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for JsonCacheStore {
    fn load(&self) -> Result<Option<CacheDocument>, CacheError> {
        let content = match fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let document: CacheDocument = match serde_json::from_slice(&content) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Ignoring unreadable cache {}: {}", self.path.display(), e);
                return Ok(None);
            }
        };

        // Invalidate if version mismatch
        if document.version != CACHE_VERSION {
            log::info!(
                "Ignoring cache {} with version {}",
                self.path.display(),
                document.version
            );
            return Ok(None);
        }

        Ok(Some(document))
    }

    fn save(&self, document: &CacheDocument) -> Result<(), CacheError> {
        // Create parent directories if needed
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_vec(document)?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, content)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

/// In-memory store for hosts that do not persist results
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    document: Mutex<Option<CacheDocument>>,
    saves: std::sync::atomic::AtomicUsize,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `save` was called
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Acquire)
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self) -> Result<Option<CacheDocument>, CacheError> {
        Ok(self.document.lock().clone())
    }

    fn save(&self, document: &CacheDocument) -> Result<(), CacheError> {
        *self.document.lock() = Some(document.clone());
        self.saves.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

impl<T: CacheStore + ?Sized> CacheStore for std::sync::Arc<T> {
    fn load(&self) -> Result<Option<CacheDocument>, CacheError> {
        (**self).load()
    }

    fn save(&self, document: &CacheDocument) -> Result<(), CacheError> {
        (**self).save(document)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total_projects: usize,
    pub total_entries: usize,
    pub total_violations: usize,
}

/// The results cache shared by all workers of a run
pub struct ResultsCache {
    store: Box<dyn CacheStore>,
    document: Mutex<CacheDocument>,
    dirty: AtomicBool,
}

impl ResultsCache {
    /// Open a cache over a store. A store that cannot be read starts empty.
    pub fn open(store: impl CacheStore + 'static) -> Self {
        let document = match store.load() {
            Ok(Some(document)) => document,
            Ok(None) => CacheDocument::default(),
            Err(e) => {
                log::warn!("Cache could not be loaded, starting empty: {}", e);
                CacheDocument::default()
            }
        };

        Self {
            store: Box::new(store),
            document: Mutex::new(document),
            dirty: AtomicBool::new(false),
        }
    }

    /// Fingerprint stored for a project, if any
    pub fn load_project(&self, project: &Project) -> Option<String> {
        self.document
            .lock()
            .projects
            .get(&project_key(project))
            .map(|entry| entry.configuration.clone())
    }

    /// Whether the project's cached results can be used for this run
    pub fn is_project_valid(&self, project: &Project, settings_digest: &str) -> bool {
        let document = self.document.lock();
        document
            .projects
            .get(&project_key(project))
            .is_some_and(|entry| {
                entry.settings_digest == settings_digest
                    && compare_cached_configuration(&entry.configuration, project.configuration())
            })
    }

    /// Record the project's current fingerprint and settings digest
    pub fn save_project(&self, project: &Project, settings_digest: &str) {
        let entry = ProjectEntry {
            configuration: project.fingerprint(),
            settings_digest: settings_digest.to_string(),
        };

        let mut document = self.document.lock();
        let previous = document.projects.insert(project_key(project), entry.clone());
        if previous.as_ref() != Some(&entry) {
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Cached violations of a file, if the entry is still valid
    pub fn load_file(
        &self,
        project: &Project,
        file: &SourceFile,
        settings_digest: &str,
    ) -> Option<Vec<Violation>> {
        let document = self.document.lock();
        let entry = document.files.get(&file_key(file.path()))?;

        if entry.content_digest != file.digest()
            || entry.settings_digest != settings_digest
            || !compare_cached_configuration(&entry.configuration, project.configuration())
        {
            return None;
        }

        Some(entry.violations.clone())
    }

    /// Store the violations a file produced under the project's configuration
    pub fn save_file(
        &self,
        project: &Project,
        file: &SourceFile,
        settings_digest: &str,
        violations: &[Violation],
    ) {
        let entry = FileEntry {
            configuration: project.fingerprint(),
            settings_digest: settings_digest.to_string(),
            content_digest: file.digest(),
            violations: violations.to_vec(),
        };

        let mut document = self.document.lock();
        let previous = document.files.insert(file_key(file.path()), entry.clone());
        if previous.as_ref() != Some(&entry) {
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Drop a file's entry, e.g. after it was analyzed without a cacheable result
    pub fn remove_file(&self, path: &Path) {
        if self.document.lock().files.remove(&file_key(path)).is_some() {
            self.dirty.store(true, Ordering::Release);
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Write pending changes to the store. Nothing to write is not an error.
    pub fn flush(&self) -> Result<(), CacheError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let document = self.document.lock();
        if let Err(e) = self.store.save(&document) {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    /// Remove entries for files that no longer exist
    pub fn prune(&self) -> usize {
        let mut document = self.document.lock();
        let before = document.files.len();
        document.files.retain(|path, _| Path::new(path).exists());

        let removed = before - document.files.len();
        if removed > 0 {
            self.dirty.store(true, Ordering::Release);
        }
        removed
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let document = self.document.lock();
        CacheStats {
            total_projects: document.projects.len(),
            total_entries: document.files.len(),
            total_violations: document.files.values().map(|e| e.violations.len()).sum(),
        }
    }

    /// Clear all entries
    pub fn clear(&self) {
        let mut document = self.document.lock();
        if !document.projects.is_empty() || !document.files.is_empty() {
            document.projects.clear();
            document.files.clear();
            self.dirty.store(true, Ordering::Release);
        }
    }
}

impl std::fmt::Debug for ResultsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultsCache")
            .field("stats", &self.stats())
            .field("dirty", &self.is_dirty())
            .finish_non_exhaustive()
    }
}

/// Compare a cached fingerprint with the current configuration.
///
/// The cached value is a semicolon-delimited set of flags. It matches when
/// it has as many flags as the current configuration and every one of them
/// is present there.
pub fn compare_cached_configuration(cached: &str, current: &BTreeSet<String>) -> bool {
    let cached: BTreeSet<&str> = cached
        .split(';')
        .map(str::trim)
        .filter(|flag| !flag.is_empty())
        .collect();

    cached.len() == current.len() && cached.iter().all(|flag| current.contains(*flag))
}

fn project_key(project: &Project) -> String {
    format!("{}|{}", project.root().display(), project.name())
}

fn file_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Default cache file location
pub fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stylecheck")
        .join("cache.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn flags(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn project_with(file: SourceFile) -> Project {
        Project::new("app", "/src/app").with_flag("DEBUG").with_file(file)
    }

    #[test]
    fn test_compare_cached_configuration() {
        assert!(compare_cached_configuration("", &flags(&[])));
        assert!(compare_cached_configuration("DEBUG;TRACE", &flags(&["TRACE", "DEBUG"])));
        assert!(!compare_cached_configuration("DEBUG", &flags(&["DEBUG", "TRACE"])));
        assert!(!compare_cached_configuration("DEBUG;TRACE", &flags(&["DEBUG"])));
        assert!(!compare_cached_configuration("DEBUG;RELEASE", &flags(&["DEBUG", "TRACE"])));
        assert!(!compare_cached_configuration("DEBUG", &flags(&[])));
    }

    #[test]
    fn test_changing_one_flag_invalidates() {
        let cached = flags(&["A", "B", "C"]);
        let fingerprint = cached.iter().cloned().collect::<Vec<_>>().join(";");
        assert!(compare_cached_configuration(&fingerprint, &cached));

        for flag in ["A", "B", "C"] {
            let mut changed = cached.clone();
            changed.remove(flag);
            changed.insert(format!("{flag}2"));
            assert!(!compare_cached_configuration(&fingerprint, &changed));
        }
    }

    #[test]
    fn test_project_validity() {
        let cache = ResultsCache::open(MemoryCacheStore::new());
        let project = project_with(SourceFile::new("/src/app/a.cs", "x"));

        assert_eq!(cache.load_project(&project), None);
        assert!(!cache.is_project_valid(&project, "s1"));

        cache.save_project(&project, "s1");
        assert_eq!(cache.load_project(&project).as_deref(), Some("DEBUG"));
        assert!(cache.is_project_valid(&project, "s1"));
        assert!(!cache.is_project_valid(&project, "s2"));

        let release = Project::new("app", "/src/app").with_flag("RELEASE");
        assert!(!cache.is_project_valid(&release, "s1"));
    }

    #[test]
    fn test_file_entry_requires_same_content() {
        let cache = ResultsCache::open(MemoryCacheStore::new());
        let project = project_with(SourceFile::new("/src/app/a.cs", "goto x;"));
        let file = &project.files()[0];
        let violation = Violation::new("AvoidGoto", "goto", file.path(), 1);

        cache.save_file(&project, file, "s", std::slice::from_ref(&violation));
        assert_eq!(cache.load_file(&project, file, "s"), Some(vec![violation]));

        let edited = project_with(SourceFile::new("/src/app/a.cs", "return;"));
        assert_eq!(cache.load_file(&edited, &edited.files()[0], "s"), None);
    }

    #[test]
    fn test_file_entry_requires_same_settings() {
        let cache = ResultsCache::open(MemoryCacheStore::new());
        let project = project_with(SourceFile::new("/src/app/a.cs", "goto x;"));
        let file = &project.files()[0];

        cache.save_file(&project, file, "before", &[]);
        assert_eq!(cache.load_file(&project, file, "after"), None);

        // Entries written before settings were recorded never match
        cache.save_file(&project, file, "", &[]);
        assert_eq!(cache.load_file(&project, file, "after"), None);
    }

    #[test]
    fn test_remove_file_drops_entry() {
        let cache = ResultsCache::open(MemoryCacheStore::new());
        let project = project_with(SourceFile::new("/src/app/a.cs", "goto x;"));
        let file = &project.files()[0];

        cache.save_file(&project, file, "s", &[]);
        cache.flush().unwrap();
        cache.remove_file(file.path());

        assert!(cache.is_dirty());
        assert_eq!(cache.load_file(&project, file, "s"), None);
    }

    #[test]
    fn test_flush_without_changes_is_noop() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = ResultsCache::open(Arc::clone(&store));

        cache.flush().unwrap();
        assert_eq!(store.save_count(), 0);

        let project = project_with(SourceFile::new("/src/app/a.cs", ""));
        cache.save_project(&project, "s");
        cache.flush().unwrap();
        cache.flush().unwrap();
        assert_eq!(store.save_count(), 1);

        // Identical content does not dirty the cache
        cache.save_project(&project, "s");
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_json_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("cache.json");
        let project = project_with(SourceFile::new("/src/app/a.cs", "goto x;"));

        let cache = ResultsCache::open(JsonCacheStore::new(&path));
        cache.save_project(&project, "s");
        cache.save_file(&project, &project.files()[0], "s", &[]);
        cache.flush().unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = ResultsCache::open(JsonCacheStore::new(&path));
        assert_eq!(reopened.load_project(&project).as_deref(), Some("DEBUG"));
        assert_eq!(reopened.load_file(&project, &project.files()[0], "s"), Some(vec![]));
    }

    #[test]
    fn test_corrupt_cache_is_absent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");
        fs::write(&path, "{\"version\": 1, \"projects\": {").unwrap();

        let store = JsonCacheStore::new(&path);
        assert!(store.load().unwrap().is_none());

        let cache = ResultsCache::open(store);
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[test]
    fn test_version_mismatch_is_absent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");
        fs::write(&path, r#"{"version": 0, "projects": {}, "files": {}}"#).unwrap();

        assert!(JsonCacheStore::new(&path).load().unwrap().is_none());
    }

    #[test]
    fn test_prune_and_stats() {
        let temp = TempDir::new().unwrap();
        let existing = temp.path().join("kept.cs");
        fs::write(&existing, "goto x;").unwrap();

        let project = Project::new("p", temp.path())
            .with_file(SourceFile::load(&existing).unwrap())
            .with_file(SourceFile::new(temp.path().join("gone.cs"), ""));
        let cache = ResultsCache::open(MemoryCacheStore::new());

        let kept = &project.files()[0];
        cache.save_file(
            &project,
            kept,
            "s",
            &[Violation::new("AvoidGoto", "goto", kept.path(), 1)],
        );
        cache.save_file(&project, &project.files()[1], "s", &[]);

        assert_eq!(
            cache.stats(),
            CacheStats {
                total_projects: 0,
                total_entries: 2,
                total_violations: 1,
            }
        );
        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.stats().total_entries, 1);
    }

    #[test]
    fn test_default_cache_path() {
        assert!(default_cache_path().ends_with("stylecheck/cache.json"));
    }
}
