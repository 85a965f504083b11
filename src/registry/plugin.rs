// src/registry/plugin.rs
//
// Plugin manifests
//
// Describes what a plugin offers. Running a plugin is out of scope here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AppResult;
use crate::registry::cache::{ManifestCache, ManifestEntry};

/// How the host talks to the plugin process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginInterface {
    #[default]
    Raw,
    Rpc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginTask {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Arguments passed when the caller supplies none of its own
    #[serde(default, rename = "defaultArgs")]
    pub default_args: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Command line; the first element is the executable
    #[serde(default)]
    pub exec: Vec<String>,
    #[serde(default)]
    pub interface: PluginInterface,
    #[serde(default)]
    pub tasks: Vec<PluginTask>,
}

/// One runnable task of one plugin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginOperation {
    pub plugin_id: String,
    pub name: String,
    pub description: Option<String>,
}

impl PluginManifest {
    pub fn task(&self, name: &str) -> Option<&PluginTask> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Arguments for `task`: the defaults overlaid with `args`
    pub fn task_args(
        &self,
        task: &str,
        args: &BTreeMap<String, serde_json::Value>,
    ) -> Option<BTreeMap<String, serde_json::Value>> {
        let mut merged = self.task(task)?.default_args.clone();
        merged.extend(args.iter().map(|(k, v)| (k.clone(), v.clone())));
        Some(merged)
    }
}

impl ManifestEntry<PluginManifest> {
    pub fn operations(&self) -> Vec<PluginOperation> {
        self.manifest
            .tasks
            .iter()
            .map(|task| PluginOperation {
                plugin_id: self.id.clone(),
                name: task.name.clone(),
                description: task.description.clone(),
            })
            .collect()
    }
}

pub type PluginRegistry = ManifestCache<PluginManifest>;

impl ManifestCache<PluginManifest> {
    /// Every task of every loaded plugin
    pub fn operations(&self) -> AppResult<Vec<PluginOperation>> {
        Ok(self.list()?.iter().flat_map(|entry| entry.operations()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MANIFEST: &str = r#"{
        "name": "Tagger",
        "version": "1.2",
        "exec": ["python", "tagger.py"],
        "interface": "rpc",
        "tasks": [
            { "name": "Scan", "description": "Tag everything", "defaultArgs": { "mode": "all", "dry": true } },
            { "name": "Clear" }
        ]
    }"#;

    #[test]
    fn test_parse_and_operations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tagger.json"), MANIFEST).unwrap();
        let registry = PluginRegistry::new(Some(dir.path().to_path_buf()));

        let plugin = registry.get("tagger").unwrap().unwrap();
        assert_eq!(plugin.manifest.interface, PluginInterface::Rpc);
        assert_eq!(plugin.manifest.exec, vec!["python", "tagger.py"]);

        let names: Vec<String> = registry
            .operations()
            .unwrap()
            .into_iter()
            .map(|op| format!("{}:{}", op.plugin_id, op.name))
            .collect();
        assert_eq!(names, vec!["tagger:Scan", "tagger:Clear"]);
    }

    #[test]
    fn test_task_args_overlay_defaults() {
        let plugin: PluginManifest = serde_json::from_str(MANIFEST).unwrap();
        let mut args = BTreeMap::new();
        args.insert("dry".to_string(), json!(false));

        let merged = plugin.task_args("Scan", &args).unwrap();
        assert_eq!(merged.get("mode"), Some(&json!("all")));
        assert_eq!(merged.get("dry"), Some(&json!(false)));
        assert!(plugin.task_args("Missing", &args).is_none());
    }

    #[test]
    fn test_interface_defaults_to_raw() {
        let plugin: PluginManifest = serde_json::from_str(r#"{ "name": "Bare" }"#).unwrap();
        assert_eq!(plugin.interface, PluginInterface::Raw);
        assert!(plugin.tasks.is_empty());
    }
}
