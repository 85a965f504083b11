// src/config.rs
//
// Application configuration
//
// PRINCIPLES:
// - Every field has a default, so a partial file is valid
// - Loaded once by the composition root and passed down explicitly
// - No global configuration state

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub library: LibraryConfig,
    /// Directory holding plugin manifests
    pub plugins_path: Option<PathBuf>,
    /// Directory holding scraper manifests
    pub scrapers_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file. Defaults to {APP_DATA}/medialib/medialib.db
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    pub busy_timeout_ms: u32,
    /// How long to wait for a pooled connection before giving up
    pub acquire_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 15,
            busy_timeout_ms: 5000,
            acquire_timeout_ms: 30_000,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root directories to scan
    pub roots: Vec<PathBuf>,
    pub video_extensions: Vec<String>,
    pub image_extensions: Vec<String>,
    pub gallery_extensions: Vec<String>,
    /// Regexes matched against full paths; matching files are skipped
    pub excludes: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let owned = |exts: &[&str]| exts.iter().map(|e| e.to_string()).collect();
        Self {
            roots: Vec::new(),
            video_extensions: owned(&[
                "m4v", "mp4", "mov", "wmv", "avi", "mpg", "mpeg", "rmvb", "rm", "flv", "asf",
                "mkv", "webm",
            ]),
            image_extensions: owned(&["png", "jpg", "jpeg", "gif", "webp"]),
            gallery_extensions: owned(&["zip", "cbz"]),
            excludes: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is absent
    pub fn load_or_default(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Resolve the database file path
    ///
    /// Path structure when unset: {APP_DATA}/medialib/medialib.db
    pub fn database_path(&self) -> AppResult<PathBuf> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }

        let app_data_dir = dirs::data_dir()
            .ok_or_else(|| AppError::Other("Could not determine app data directory".to_string()))?;

        let medialib_dir = app_data_dir.join("medialib");
        std::fs::create_dir_all(&medialib_dir)?;

        Ok(medialib_dir.join("medialib.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "database": {{ "max_connections": 4 }}, "library": {{ "roots": ["/media"] }} }}"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();

        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.library.roots, vec![PathBuf::from("/media")]);
        assert!(config.library.video_extensions.contains(&"mkv".to_string()));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.database.max_connections, 15);
        assert!(config.plugins_path.is_none());
    }

    #[test]
    fn test_explicit_database_path_wins() {
        let mut config = AppConfig::default();
        config.database.path = Some(PathBuf::from("/tmp/library.db"));
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/library.db"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(AppConfig::load(file.path()), Err(AppError::Serialization(_))));
    }
}
