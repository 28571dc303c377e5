//! Wildcard store
//!
//! Definitions are read from an ordered list of directories:
//!
//! ```text
//! wildcards/
//! ├── animal.json     # full format
//! ├── color.txt       # legacy, one choice per line
//! └── nsfw/           # listed after wildcards/ in config, overrides same names
//! ```
//!
//! Later directories override earlier ones. For a single name `.json` wins over `.txt`.
//!
//! Every load produces an immutable [`WildcardSnapshot`]. [`WildcardStore::reload`] builds a
//! new snapshot and swaps the shared pointer; expansions holding the old `Arc` keep a
//! consistent view until they finish.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::config::WildcardsConfig;
use crate::definition::{SourceFormat, WildcardDefinition};
use crate::error::StoreError;
use crate::tokenizer::is_valid_name;

/// Raw content of one wildcard file
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub name: String,
    pub format: SourceFormat,
    pub content: String,
    pub path: Option<PathBuf>,
    pub modified: Option<SystemTime>,
    /// On-disk size, tracked separately because `content` may be lossily decoded
    pub len: Option<u64>,
    /// Set when the file could not be read as text; the entry loads as broken
    pub read_error: Option<String>,
}

impl SourceEntry {
    pub fn json(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: SourceFormat::Json,
            content: content.into(),
            path: None,
            modified: None,
            len: None,
            read_error: None,
        }
    }

    pub fn text(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: SourceFormat::Text,
            content: content.into(),
            path: None,
            modified: None,
            len: None,
            read_error: None,
        }
    }
}

/// Tracked file for hot-reload detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub len: u64,
}

/// Where definitions come from
pub trait DefinitionSource {
    /// Read every definition this source provides. Later entries override earlier ones.
    fn read_entries(&self) -> Result<Vec<SourceEntry>, StoreError>;

    /// Whether the source differs from what `tracked` recorded at the last load
    fn has_changes(&self, _tracked: &[TrackedFile]) -> bool {
        false
    }
}

/// Fixed in-memory definitions
#[derive(Debug, Clone, Default)]
pub struct MemorySource(pub Vec<SourceEntry>);

impl DefinitionSource for MemorySource {
    fn read_entries(&self) -> Result<Vec<SourceEntry>, StoreError> {
        Ok(self.0.clone())
    }
}

/// Layered wildcard directories
#[derive(Debug, Clone)]
pub struct DirectorySource {
    paths: Vec<PathBuf>,
}

impl DirectorySource {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn from_config(config: &WildcardsConfig) -> Self {
        Self::new(config.expanded_paths())
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Winning file per wildcard name: later directories override, `.json` beats `.txt`
    fn scan(&self) -> Result<BTreeMap<String, PathBuf>, StoreError> {
        let mut found: BTreeMap<String, (Option<PathBuf>, Option<PathBuf>)> = BTreeMap::new();

        for dir in &self.paths {
            if !dir.is_dir() {
                debug!(?dir, "DirectorySource::scan: directory does not exist, skipping");
                continue;
            }
            let entries = fs::read_dir(dir).map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                let Some(format) = wildcard_format(&path) else {
                    continue;
                };
                let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                    continue;
                };
                if !is_valid_name(&name) {
                    let error = StoreError::InvalidName { name, path };
                    warn!(%error, "Skipping wildcard file");
                    continue;
                }
                let slot = found.entry(name).or_default();
                match format {
                    SourceFormat::Json => slot.0 = Some(path),
                    SourceFormat::Text => slot.1 = Some(path),
                }
            }
        }

        Ok(found
            .into_iter()
            .filter_map(|(name, (json, text))| json.or(text).map(|path| (name, path)))
            .collect())
    }
}

impl DefinitionSource for DirectorySource {
    fn read_entries(&self) -> Result<Vec<SourceEntry>, StoreError> {
        debug!(paths = ?self.paths, "DirectorySource::read_entries: called");
        let mut entries = Vec::new();

        for (name, path) in self.scan()? {
            let format = wildcard_format(&path).unwrap_or(SourceFormat::Json);
            let metadata = fs::metadata(&path).ok();
            let modified = metadata.as_ref().and_then(|m| m.modified().ok());
            let len = metadata.as_ref().map(|m| m.len());

            // Unreadable files surface as broken definitions, not load failures
            let (content, read_error) = match fs::read(&path) {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(content) => (content, None),
                    Err(e) => {
                        let error = format!("file is not valid UTF-8: {}", e.utf8_error());
                        (String::from_utf8_lossy(e.as_bytes()).into_owned(), Some(error))
                    }
                },
                Err(e) => (String::new(), Some(format!("failed to read file: {}", e))),
            };
            if let Some(error) = &read_error {
                warn!(?path, %error, "Failed to read wildcard file");
            }

            entries.push(SourceEntry {
                name,
                format,
                content,
                path: Some(path),
                modified,
                len,
                read_error,
            });
        }

        Ok(entries)
    }

    fn has_changes(&self, tracked: &[TrackedFile]) -> bool {
        for file in tracked {
            match fs::metadata(&file.path) {
                Ok(meta) => {
                    let modified = meta.modified().ok();
                    if modified != Some(file.modified) || meta.len() != file.len {
                        debug!(path = ?file.path, "has_changes: file modified");
                        return true;
                    }
                }
                Err(_) => {
                    debug!(path = ?file.path, "has_changes: file removed");
                    return true;
                }
            }
        }

        match self.scan() {
            Ok(current) => {
                let changed = current.len() != tracked.len()
                    || current.values().any(|path| !tracked.iter().any(|t| &t.path == path));
                if changed {
                    debug!("has_changes: file set changed");
                }
                changed
            }
            Err(e) => {
                warn!(error = %e, "Failed to scan wildcard directories");
                false
            }
        }
    }
}

fn wildcard_format(path: &Path) -> Option<SourceFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Some(SourceFormat::Json),
        Some("txt") => Some(SourceFormat::Text),
        _ => None,
    }
}

/// A definition that failed to parse; kept so editors can repair it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenWildcard {
    pub name: String,
    pub path: Option<PathBuf>,
    pub raw: String,
    pub error: String,
}

/// Immutable set of definitions as of one load
#[derive(Debug, Clone, Default)]
pub struct WildcardSnapshot {
    definitions: BTreeMap<String, Arc<WildcardDefinition>>,
    broken: BTreeMap<String, Arc<BrokenWildcard>>,
    tracked: Vec<TrackedFile>,
}

impl WildcardSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse entries into a snapshot. Later entries with the same name win.
    pub fn from_entries(entries: impl IntoIterator<Item = SourceEntry>) -> Self {
        let mut snapshot = Self::default();

        for entry in entries {
            if let (Some(path), Some(modified), Some(len)) = (&entry.path, entry.modified, entry.len) {
                snapshot.tracked.push(TrackedFile {
                    path: path.clone(),
                    modified,
                    len,
                });
            }

            let parsed = match (&entry.read_error, entry.format) {
                (Some(error), _) => Err(error.clone()),
                (None, SourceFormat::Json) => {
                    WildcardDefinition::from_json(&entry.name, &entry.content).map_err(|e| e.to_string())
                }
                (None, SourceFormat::Text) => Ok(WildcardDefinition::from_lines(&entry.name, &entry.content)),
            };

            match parsed {
                Ok(definition) => {
                    snapshot.broken.remove(&entry.name);
                    snapshot.definitions.insert(entry.name, Arc::new(definition));
                }
                Err(e) => {
                    warn!(name = %entry.name, error = %e, "Wildcard file is broken");
                    snapshot.definitions.remove(&entry.name);
                    snapshot.broken.insert(
                        entry.name.clone(),
                        Arc::new(BrokenWildcard {
                            name: entry.name,
                            path: entry.path,
                            raw: entry.content,
                            error: e.to_string(),
                        }),
                    );
                }
            }
        }

        snapshot
    }

    /// Read a source and parse everything it provides
    pub fn load(source: &dyn DefinitionSource) -> Result<Self, StoreError> {
        let snapshot = Self::from_entries(source.read_entries()?);
        info!(
            count = snapshot.definitions.len(),
            broken = snapshot.broken.len(),
            "Loaded wildcard definitions"
        );
        Ok(snapshot)
    }

    /// Look up a usable definition
    pub fn get(&self, name: &str) -> Result<&Arc<WildcardDefinition>, StoreError> {
        if let Some(definition) = self.definitions.get(name) {
            return Ok(definition);
        }
        match self.broken.get(name) {
            Some(broken) => Err(StoreError::Broken {
                name: name.to_string(),
                reason: broken.error.clone(),
            }),
            None => Err(StoreError::MissingWildcard { name: name.to_string() }),
        }
    }

    /// Whether `name` is loaded and not broken
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Every known name, broken ones included
    pub fn list_names(&self) -> BTreeSet<String> {
        self.definitions.keys().chain(self.broken.keys()).cloned().collect()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &WildcardDefinition> {
        self.definitions.values().map(|d| d.as_ref())
    }

    pub fn broken(&self, name: &str) -> Option<&BrokenWildcard> {
        self.broken.get(name).map(|b| b.as_ref())
    }

    pub fn broken_entries(&self) -> impl Iterator<Item = &BrokenWildcard> {
        self.broken.values().map(|b| b.as_ref())
    }

    pub fn tracked_files(&self) -> &[TrackedFile] {
        &self.tracked
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Copy of this snapshot with `definition` added or replaced
    pub fn with_definition(&self, definition: WildcardDefinition) -> Self {
        let mut next = self.clone();
        next.broken.remove(&definition.name);
        next.definitions.insert(definition.name.clone(), Arc::new(definition));
        next
    }
}

/// Shared handle to the currently visible snapshot
#[derive(Debug, Default)]
pub struct WildcardStore {
    current: RwLock<Arc<WildcardSnapshot>>,
}

impl WildcardStore {
    pub fn new(snapshot: WildcardSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Load a store from a source
    pub fn open(source: &dyn DefinitionSource) -> Result<Self, StoreError> {
        Ok(Self::new(WildcardSnapshot::load(source)?))
    }

    /// The snapshot expansions should capture for their whole run
    pub fn snapshot(&self) -> Arc<WildcardSnapshot> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Look up a usable definition in the current snapshot
    pub fn load(&self, name: &str) -> Result<Arc<WildcardDefinition>, StoreError> {
        self.snapshot().get(name).cloned()
    }

    pub fn list_names(&self) -> BTreeSet<String> {
        self.snapshot().list_names()
    }

    /// Make `snapshot` the visible one
    pub fn replace(&self, snapshot: WildcardSnapshot) -> Arc<WildcardSnapshot> {
        let next = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        next
    }

    /// Re-read everything from `source` and swap it in
    pub fn reload(&self, source: &dyn DefinitionSource) -> Result<Arc<WildcardSnapshot>, StoreError> {
        debug!("WildcardStore::reload: called");
        let snapshot = WildcardSnapshot::load(source)?;
        info!(count = snapshot.len(), "Swapped in new wildcard snapshot");
        Ok(self.replace(snapshot))
    }

    pub fn has_changes(&self, source: &dyn DefinitionSource) -> bool {
        source.has_changes(self.snapshot().tracked_files())
    }

    /// Reload only if the source changed since the last load
    pub fn reload_if_changed(&self, source: &dyn DefinitionSource) -> Result<bool, StoreError> {
        if !self.has_changes(source) {
            debug!("reload_if_changed: no changes, skipping");
            return Ok(false);
        }
        info!("Hot-reloading wildcard definitions");
        self.reload(source)?;
        Ok(true)
    }
}
