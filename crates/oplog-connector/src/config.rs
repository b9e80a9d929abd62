//! View configuration, loaded from TOML.
//!
//! ```toml
//! instance_id = "laptop"
//! expand_budget = 5
//! rebuild_debounce_ms = 100
//! resync_delay_ms = 1000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use oplog_hierarchy::{ExpansionPolicy, TreeMode, TreeOptions, DEFAULT_EXPAND_BUDGET};

use crate::ConnectorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Instance whose history is expanded by default; others stay collapsed.
    pub instance_id: Option<String>,
    /// Nodes auto-expanded per plan (per day list in plan views).
    pub expand_budget: usize,
    pub rebuild_debounce_ms: u64,
    /// Wait before re-fetching after the change stream drops.
    pub resync_delay_ms: u64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            instance_id: None,
            expand_budget: DEFAULT_EXPAND_BUDGET,
            rebuild_debounce_ms: 100,
            resync_delay_ms: 1000,
        }
    }
}

impl ViewConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConnectorError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConnectorError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded view config");
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else
    /// fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConnectorError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/oplog-view/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("oplog-view").join("config.toml"))
    }

    pub fn rebuild_debounce(&self) -> Duration {
        Duration::from_millis(self.rebuild_debounce_ms)
    }

    pub fn resync_delay(&self) -> Duration {
        Duration::from_millis(self.resync_delay_ms)
    }

    pub fn tree_options(&self, mode: TreeMode) -> TreeOptions {
        TreeOptions {
            expansion: Some(ExpansionPolicy::for_mode(mode).with_budget(self.expand_budget)),
            expand_instance: self.instance_id.clone(),
        }
    }
}
