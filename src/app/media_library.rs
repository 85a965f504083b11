// src/app/media_library.rs
//
// Composition root
//
// CRITICAL RULES:
// - Built once from an AppConfig
// - Owns the pool (through LibraryService) and both manifest caches
// - Consumers borrow from it; nothing here is global

use std::path::Path;

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::registry::{PluginRegistry, ScraperRegistry};
use crate::scanner::{MetadataProber, ScanSummary};
use crate::services::LibraryService;

pub struct MediaLibrary {
    config: AppConfig,
    library: LibraryService,
    plugins: PluginRegistry,
    scrapers: ScraperRegistry,
}

impl MediaLibrary {
    /// Open the store and prepare (but do not read) the registries
    pub fn open(config: AppConfig) -> AppResult<Self> {
        let library = LibraryService::open(&config)?;
        let plugins = PluginRegistry::new(config.plugins_path.clone());
        let scrapers = ScraperRegistry::new(config.scrapers_path.clone());

        log::info!(
            "Media library ready ({} library roots)",
            config.library.roots.len()
        );

        Ok(Self {
            config,
            library,
            plugins,
            scrapers,
        })
    }

    /// Load configuration from `config_path` (defaults when absent) and open
    pub fn open_from_file(config_path: &Path) -> AppResult<Self> {
        Self::open(AppConfig::load_or_default(config_path)?)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn library(&self) -> &LibraryService {
        &self.library
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn scrapers(&self) -> &ScraperRegistry {
        &self.scrapers
    }

    /// Scan the configured library roots
    pub fn scan(&self, prober: &dyn MetadataProber) -> AppResult<ScanSummary> {
        self.library.scan(&self.config.library, prober)
    }
}
