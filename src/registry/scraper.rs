// src/registry/scraper.rs
//
// Scraper manifests
//
// A scraper declares which lookups it supports and which sites its URL
// scrapers accept. Executing a scrape is out of scope here.

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::registry::cache::{ManifestCache, ManifestEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeType {
    Name,
    Fragment,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScraperAction {
    Script,
    Stash,
    ScrapeXPath,
}

/// How one lookup is carried out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScraperTypeConfig {
    pub action: ScraperAction,
    #[serde(default)]
    pub script: Vec<String>,
    #[serde(default)]
    pub scraper: Option<String>,
    #[serde(default, rename = "queryURL")]
    pub query_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeByUrlConfig {
    #[serde(flatten)]
    pub config: ScraperTypeConfig,
    /// URL fragments this scraper accepts
    #[serde(default)]
    pub url: Vec<String>,
}

impl ScrapeByUrlConfig {
    pub fn matches_url(&self, url: &str) -> bool {
        self.url.iter().any(|fragment| url.contains(fragment.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScraperManifest {
    pub name: String,
    #[serde(default)]
    pub performer_by_name: Option<ScraperTypeConfig>,
    #[serde(default)]
    pub performer_by_fragment: Option<ScraperTypeConfig>,
    #[serde(default, rename = "performerByURL")]
    pub performer_by_url: Vec<ScrapeByUrlConfig>,
    #[serde(default)]
    pub scene_by_fragment: Option<ScraperTypeConfig>,
    #[serde(default, rename = "sceneByURL")]
    pub scene_by_url: Vec<ScrapeByUrlConfig>,
}

/// What a scraper can do for one entity type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScraperSpec {
    pub supported_scrapes: Vec<ScrapeType>,
    pub urls: Vec<String>,
}

impl ScraperSpec {
    fn is_empty(&self) -> bool {
        self.supported_scrapes.is_empty()
    }
}

fn urls(configs: &[ScrapeByUrlConfig]) -> Vec<String> {
    configs.iter().flat_map(|c| c.url.iter().cloned()).collect()
}

impl ScraperManifest {
    /// `None` when the scraper has no performer lookups
    pub fn performer_spec(&self) -> Option<ScraperSpec> {
        let mut spec = ScraperSpec::default();
        if self.performer_by_name.is_some() {
            spec.supported_scrapes.push(ScrapeType::Name);
        }
        if self.performer_by_fragment.is_some() {
            spec.supported_scrapes.push(ScrapeType::Fragment);
        }
        if !self.performer_by_url.is_empty() {
            spec.supported_scrapes.push(ScrapeType::Url);
            spec.urls = urls(&self.performer_by_url);
        }
        (!spec.is_empty()).then_some(spec)
    }

    /// `None` when the scraper has no scene lookups
    pub fn scene_spec(&self) -> Option<ScraperSpec> {
        let mut spec = ScraperSpec::default();
        if self.scene_by_fragment.is_some() {
            spec.supported_scrapes.push(ScrapeType::Fragment);
        }
        if !self.scene_by_url.is_empty() {
            spec.supported_scrapes.push(ScrapeType::Url);
            spec.urls = urls(&self.scene_by_url);
        }
        (!spec.is_empty()).then_some(spec)
    }

    pub fn supports_performers(&self) -> bool {
        self.performer_spec().is_some()
    }

    pub fn supports_scenes(&self) -> bool {
        self.scene_spec().is_some()
    }

    pub fn matches_performer_url(&self, url: &str) -> bool {
        self.performer_by_url.iter().any(|c| c.matches_url(url))
    }

    pub fn matches_scene_url(&self, url: &str) -> bool {
        self.scene_by_url.iter().any(|c| c.matches_url(url))
    }
}

pub type ScraperRegistry = ManifestCache<ScraperManifest>;

impl ManifestCache<ScraperManifest> {
    pub fn performer_scrapers(&self) -> AppResult<Vec<ManifestEntry<ScraperManifest>>> {
        Ok(self
            .list()?
            .iter()
            .filter(|e| e.manifest.supports_performers())
            .cloned()
            .collect())
    }

    pub fn scene_scrapers(&self) -> AppResult<Vec<ManifestEntry<ScraperManifest>>> {
        Ok(self
            .list()?
            .iter()
            .filter(|e| e.manifest.supports_scenes())
            .cloned()
            .collect())
    }

    /// First scraper whose performer URL patterns accept `url`
    pub fn performer_scraper_for_url(&self, url: &str) -> AppResult<Option<ManifestEntry<ScraperManifest>>> {
        Ok(self
            .list()?
            .iter()
            .find(|e| e.manifest.matches_performer_url(url))
            .cloned())
    }

    /// First scraper whose scene URL patterns accept `url`
    pub fn scene_scraper_for_url(&self, url: &str) -> AppResult<Option<ManifestEntry<ScraperManifest>>> {
        Ok(self
            .list()?
            .iter()
            .find(|e| e.manifest.matches_scene_url(url))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FREEONES: &str = r#"{
        "name": "FreeOnes",
        "performerByName": { "action": "scrapeXPath", "scraper": "performerSearch" },
        "performerByURL": [
            { "action": "scrapeXPath", "url": ["freeones.xxx", "freeones.com"], "scraper": "performer" }
        ]
    }"#;

    const SCENES: &str = r#"{
        "name": "Scenes",
        "sceneByFragment": { "action": "script", "script": ["python", "scene.py"] },
        "sceneByURL": [ { "action": "script", "url": ["example.org/videos"], "script": ["python", "url.py"] } ]
    }"#;

    #[test]
    fn test_performer_spec() {
        let scraper: ScraperManifest = serde_json::from_str(FREEONES).unwrap();

        let spec = scraper.performer_spec().unwrap();
        assert_eq!(spec.supported_scrapes, vec![ScrapeType::Name, ScrapeType::Url]);
        assert_eq!(spec.urls, vec!["freeones.xxx", "freeones.com"]);
        assert!(scraper.scene_spec().is_none());
        assert!(scraper.matches_performer_url("https://www.freeones.com/someone"));
        assert!(!scraper.matches_scene_url("https://www.freeones.com/someone"));
    }

    #[test]
    fn test_registry_url_lookup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("freeones.json"), FREEONES).unwrap();
        std::fs::write(dir.path().join("scenes.json"), SCENES).unwrap();
        let registry = ScraperRegistry::new(Some(dir.path().to_path_buf()));

        let found = registry
            .scene_scraper_for_url("https://example.org/videos/42")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "scenes");
        assert_eq!(
            found.manifest.scene_spec().unwrap().supported_scrapes,
            vec![ScrapeType::Fragment, ScrapeType::Url]
        );
        assert!(registry.scene_scraper_for_url("https://nowhere").unwrap().is_none());

        let performer_ids: Vec<String> = registry
            .performer_scrapers()
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(performer_ids, vec!["freeones"]);
    }
}
