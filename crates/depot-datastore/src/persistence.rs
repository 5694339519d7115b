//! Durable storage of named store configurations.
//!
//! [`ConfigurationStore`] is the seam between the manager and wherever
//! configurations live. Two backends are provided:
//!
//! - [`InMemoryConfigurationStore`] -- `BTreeMap`-based, for tests and embedding
//! - [`FileConfigurationStore`] -- one TOML document per store in a directory

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use depot_types::{StoreConfiguration, StoreKey};

use crate::error::{DataStoreError, DataStoreResult};

/// Loads, saves and deletes named store configurations.
pub trait ConfigurationStore: Send + Sync {
    /// Every persisted configuration.
    fn load(&self) -> DataStoreResult<Vec<StoreConfiguration>>;

    /// Insert or replace the configuration stored under `config.name`.
    fn save(&self, config: &StoreConfiguration) -> DataStoreResult<()>;

    /// Remove the configuration stored under `config.name`. Removing an
    /// absent configuration is not an error.
    fn delete(&self, config: &StoreConfiguration) -> DataStoreResult<()>;
}

/// In-memory configuration store.
#[derive(Debug, Default)]
pub struct InMemoryConfigurationStore {
    configs: RwLock<BTreeMap<StoreKey, StoreConfiguration>>,
}

impl InMemoryConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing configurations.
    pub fn with_configurations(configs: impl IntoIterator<Item = StoreConfiguration>) -> Self {
        let store = Self::new();
        {
            let mut map = store.configs.write().expect("lock poisoned");
            for config in configs {
                map.insert(config.key(), config);
            }
        }
        store
    }

    /// Look up a persisted configuration by (case-insensitive) name.
    pub fn get(&self, name: &str) -> Option<StoreConfiguration> {
        self.configs
            .read()
            .expect("lock poisoned")
            .get(&StoreKey::new(name))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.configs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.read().expect("lock poisoned").is_empty()
    }
}

impl ConfigurationStore for InMemoryConfigurationStore {
    fn load(&self) -> DataStoreResult<Vec<StoreConfiguration>> {
        Ok(self
            .configs
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect())
    }

    fn save(&self, config: &StoreConfiguration) -> DataStoreResult<()> {
        self.configs
            .write()
            .expect("lock poisoned")
            .insert(config.key(), config.clone());
        Ok(())
    }

    fn delete(&self, config: &StoreConfiguration) -> DataStoreResult<()> {
        self.configs
            .write()
            .expect("lock poisoned")
            .remove(&config.key());
        Ok(())
    }
}

/// Configuration store backed by a directory of TOML files.
///
/// Each store is kept in `<dir>/<lowercase-name>.toml`. Writes go to a
/// temporary file in the same directory which is then renamed into place,
/// so a crash never leaves a half-written configuration behind.
#[derive(Debug)]
pub struct FileConfigurationStore {
    dir: PathBuf,
}

impl FileConfigurationStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: &Path) -> DataStoreResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, config: &StoreConfiguration) -> PathBuf {
        self.dir.join(format!("{}.toml", config.key()))
    }
}

impl ConfigurationStore for FileConfigurationStore {
    fn load(&self) -> DataStoreResult<Vec<StoreConfiguration>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut configs = Vec::with_capacity(paths.len());
        for path in paths {
            let text = fs::read_to_string(&path)?;
            match toml::from_str::<StoreConfiguration>(&text) {
                Ok(config) => configs.push(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable store configuration");
                }
            }
        }
        Ok(configs)
    }

    fn save(&self, config: &StoreConfiguration) -> DataStoreResult<()> {
        config.validate_name()?;
        let text =
            toml::to_string(config).map_err(|e| DataStoreError::Serialization(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(config))
            .map_err(|e| DataStoreError::Io(e.error))?;
        tracing::debug!(store = %config.name, "configuration saved");
        Ok(())
    }

    fn delete(&self, config: &StoreConfiguration) -> DataStoreResult<()> {
        match fs::remove_file(self.path_for(config)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
