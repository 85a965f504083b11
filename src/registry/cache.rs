// src/registry/cache.rs
//
// Directory-backed manifest cache
//
// RULES:
// - Nothing is read until the first list/get
// - reload() is the only way to pick up changed files
// - A manifest that fails to parse is logged and skipped, never fatal
// - Owned by the composition root and passed by reference

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use walkdir::WalkDir;

use crate::error::{AppError, AppResult};

const MANIFEST_EXTENSION: &str = "json";

/// One parsed manifest and the id it is addressed by
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry<T> {
    /// File stem of the manifest
    pub id: String,
    pub path: PathBuf,
    pub manifest: T,
}

type Entries<T> = Arc<Vec<ManifestEntry<T>>>;

pub struct ManifestCache<T> {
    /// `None` means the cache is always empty
    dir: Option<PathBuf>,
    entries: RwLock<Option<Entries<T>>>,
}

impl<T: DeserializeOwned> ManifestCache<T> {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            entries: RwLock::new(None),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// All manifests, ordered by path
    pub fn list(&self) -> AppResult<Entries<T>> {
        if let Some(entries) = self.read_lock()?.as_ref() {
            return Ok(Arc::clone(entries));
        }

        let mut slot = self
            .entries
            .write()
            .map_err(|_| AppError::Other("Manifest cache lock poisoned".to_string()))?;
        // another caller may have loaded while we waited
        if let Some(entries) = slot.as_ref() {
            return Ok(Arc::clone(entries));
        }

        let entries = Arc::new(self.load()?);
        *slot = Some(Arc::clone(&entries));
        Ok(entries)
    }

    pub fn get(&self, id: &str) -> AppResult<Option<ManifestEntry<T>>>
    where
        T: Clone,
    {
        Ok(self.list()?.iter().find(|entry| entry.id == id).cloned())
    }

    /// Drop cached manifests and read the directory again
    pub fn reload(&self) -> AppResult<Entries<T>> {
        self.invalidate()?;
        self.list()
    }

    /// Drop cached manifests; the next list/get reads the directory
    pub fn invalidate(&self) -> AppResult<()> {
        let mut slot = self
            .entries
            .write()
            .map_err(|_| AppError::Other("Manifest cache lock poisoned".to_string()))?;
        *slot = None;
        Ok(())
    }

    fn read_lock(&self) -> AppResult<std::sync::RwLockReadGuard<'_, Option<Entries<T>>>> {
        self.entries
            .read()
            .map_err(|_| AppError::Other("Manifest cache lock poisoned".to_string()))
    }

    fn load(&self) -> AppResult<Vec<ManifestEntry<T>>> {
        let Some(dir) = &self.dir else {
            return Ok(Vec::new());
        };
        if !dir.is_dir() {
            log::warn!("Manifest directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }

        log::debug!("Reading manifests from {}", dir.display());
        let mut entries: Vec<ManifestEntry<T>> = Vec::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXTENSION)
            {
                continue;
            }

            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if entries.iter().any(|e| e.id == id) {
                log::warn!("Skipping {}: manifest id '{}' already loaded", path.display(), id);
                continue;
            }

            match read_manifest(path) {
                Ok(manifest) => entries.push(ManifestEntry {
                    id,
                    path: path.to_path_buf(),
                    manifest,
                }),
                Err(e) => log::error!("Error loading manifest {}: {}", path.display(), e),
            }
        }

        Ok(entries)
    }
}

fn read_manifest<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Named {
        name: String,
    }

    fn write(dir: &Path, file: &str, contents: &str) {
        let path = dir.join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_loads_lazily_and_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let cache: ManifestCache<Named> = ManifestCache::new(Some(dir.path().to_path_buf()));

        write(dir.path(), "a.json", r#"{ "name": "Alpha" }"#);
        write(dir.path(), "nested/b.json", r#"{ "name": "Beta" }"#);
        write(dir.path(), "broken.json", "{ not json");
        write(dir.path(), "readme.txt", "ignored");

        let entries = cache.list().unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(cache.get("b").unwrap().unwrap().manifest.name, "Beta");
        assert!(cache.get("broken").unwrap().is_none());
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let cache: ManifestCache<Named> = ManifestCache::new(Some(dir.path().to_path_buf()));
        write(dir.path(), "a.json", r#"{ "name": "Alpha" }"#);
        assert_eq!(cache.list().unwrap().len(), 1);

        write(dir.path(), "c.json", r#"{ "name": "Gamma" }"#);
        assert_eq!(cache.list().unwrap().len(), 1);
        assert_eq!(cache.reload().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache: ManifestCache<Named> = ManifestCache::new(Some(dir.path().join("absent")));
        assert!(cache.list().unwrap().is_empty());

        let unset: ManifestCache<Named> = ManifestCache::new(None);
        assert!(unset.list().unwrap().is_empty());
    }
}
