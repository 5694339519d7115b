use std::path::{Path, PathBuf};

use anyhow::Context;
use depot_datastore::{EmbeddedConfig, ManagerConfig, RestoreConfig};
use serde::{Deserialize, Serialize};

/// Settings read from `depot.toml`. Every field is optional in the file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepotConfig {
    /// Root of the embedded stores' data files.
    pub data_dir: PathBuf,
    /// Directory scanned for backup archives at startup.
    pub backup_dir: PathBuf,
    /// One persisted store configuration per file.
    pub config_dir: PathBuf,
    pub datastores_enabled: bool,
    pub log_level: String,
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/db"),
            backup_dir: PathBuf::from("data/backup"),
            config_dir: PathBuf::from("data/stores"),
            datastores_enabled: true,
            log_level: "info".into(),
        }
    }
}

impl DepotConfig {
    /// Read the file at `path`, or fall back to defaults when it is absent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            enabled: self.datastores_enabled,
        }
    }

    pub fn embedded_config(&self) -> EmbeddedConfig {
        EmbeddedConfig::new(&self.data_dir)
    }

    pub fn restore_config(&self) -> RestoreConfig {
        RestoreConfig::new(&self.backup_dir, &self.data_dir)
    }
}
