//! Node configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use veil_nodedb::NodeDbConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory path
    pub data_dir: String,

    /// Node database configuration. A missing `root` means
    /// `<data_dir>/nodedb`.
    pub nodedb: NodeDbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "~/.veil".to_string(),
            nodedb: NodeDbConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Expand ~ in data_dir path
    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.data_dir)
    }

    /// The node database configuration with its root resolved
    pub fn nodedb(&self) -> NodeDbConfig {
        let mut nodedb = self.nodedb.clone();
        nodedb.root = Some(match &nodedb.root {
            Some(root) => expand_path(&root.to_string_lossy()),
            None => self.data_dir().join("nodedb"),
        });
        nodedb
    }
}

pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
