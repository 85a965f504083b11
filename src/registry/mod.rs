// src/registry/mod.rs
//
// Plugin and scraper registries
//
// Each registry is a ManifestCache over one directory of JSON manifests.

pub mod cache;
pub mod plugin;
pub mod scraper;

pub use cache::{ManifestCache, ManifestEntry};
pub use plugin::{PluginInterface, PluginManifest, PluginOperation, PluginRegistry, PluginTask};
pub use scraper::{ScrapeType, ScraperManifest, ScraperRegistry, ScraperSpec};
