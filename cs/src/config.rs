//! Configuration for contextstore

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::store::{MAX_CACHED_CONTEXTS, MAX_INSIGHTS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory containing one subdirectory per project.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Max insights retained per project before the oldest is dropped.
    #[serde(default = "default_max_insights")]
    pub max_insights: usize,

    /// Max project contexts cached in memory at once.
    #[serde(default = "default_max_cached_contexts")]
    pub max_cached_contexts: usize,
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("forgecore")
        .join("projects")
}

fn default_max_insights() -> usize {
    MAX_INSIGHTS
}

fn default_max_cached_contexts() -> usize {
    MAX_CACHED_CONTEXTS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            max_insights: default_max_insights(),
            max_cached_contexts: default_max_cached_contexts(),
        }
    }
}

impl Config {
    /// Load config from an explicit path, falling back to well-known
    /// locations, falling back to built-in defaults.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            return Ok(config);
        }

        let default_paths = [
            dirs::config_dir().map(|p| p.join("contextstore").join("config.yml")),
            Some(PathBuf::from("contextstore.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                return Ok(config);
            }
        }

        Ok(Config::default())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
