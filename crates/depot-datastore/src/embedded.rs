//! Embedded, file-backed reference data store.
//!
//! [`EmbeddedDataStore`] keeps a key/value document in a single data file
//! `<directory>/<name>.mv.db`. The whole document is loaded on start and
//! rewritten atomically on every commit. It is small enough to reason about
//! and complete enough to exercise the manager end to end: sessions with
//! isolation levels, auto-commit connections, the frozen barrier, and zip
//! backups in exactly the layout [`DataStoreRestorer`] consumes.
//!
//! [`DataStoreRestorer`]: crate::DataStoreRestorer

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use depot_types::StoreConfiguration;
use serde::{Deserialize, Serialize};

use crate::descriptor::DataStoreDescriptor;
use crate::error::{DataStoreError, DataStoreResult};
use crate::restore::{data_file_name, DEFAULT_DATA_EXTENSION};
use crate::traits::{DataConnection, DataSession, DataStore, IsolationLevel};

/// Store type name of the embedded store.
pub const EMBEDDED_TYPE: &str = "embedded";

/// Attribute overriding the data directory of one store.
pub const DIRECTORY_ATTRIBUTE: &str = "directory";

/// Attribute bounding concurrent sessions.
pub const POOL_SIZE_ATTRIBUTE: &str = "maximumPoolSize";

const MAX_POOL_SIZE: u32 = 1000;

/// Process-wide settings shared by every embedded store instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddedConfig {
    /// Directory holding data files unless a store overrides it.
    pub data_dir: PathBuf,
    /// Data file extension, without the leading dot.
    pub extension: String,
}

impl EmbeddedConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            extension: DEFAULT_DATA_EXTENSION.to_string(),
        }
    }

    /// Directory holding the data file for `config`.
    pub fn directory_for(&self, config: &StoreConfiguration) -> PathBuf {
        config
            .attribute(DIRECTORY_ATTRIBUTE)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir.clone())
    }

    /// Full path of the data file for `config`.
    pub fn data_file_for(&self, config: &StoreConfiguration) -> PathBuf {
        self.directory_for(config)
            .join(data_file_name(&config.name, &self.extension))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    New,
    Started,
    Stopped,
    Shutdown,
}

/// The open engine: the loaded document and where it lives.
struct Engine {
    path: PathBuf,
    data: BTreeMap<String, Vec<u8>>,
    /// Incremented on every commit.
    version: u64,
}

impl Engine {
    fn open(path: PathBuf) -> DataStoreResult<Self> {
        let data = if path.exists() {
            let bytes = fs::read(&path)?;
            if bytes.is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_slice(&bytes)
                    .map_err(|e| DataStoreError::Serialization(e.to_string()))?
            }
        } else {
            BTreeMap::new()
        };
        let engine = Self {
            path,
            data,
            version: 0,
        };
        engine.flush()?;
        Ok(engine)
    }

    fn encode(&self) -> DataStoreResult<Vec<u8>> {
        serde_json::to_vec(&self.data).map_err(|e| DataStoreError::Serialization(e.to_string()))
    }

    fn flush(&self) -> DataStoreResult<()> {
        let bytes = self.encode()?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| DataStoreError::Io(e.error))?;
        Ok(())
    }

    /// Apply a batch of writes and persist. On persist failure the in-memory
    /// document is restored.
    fn apply(&mut self, writes: BTreeMap<String, Option<Vec<u8>>>) -> DataStoreResult<()> {
        let previous = self.data.clone();
        for (key, value) in writes {
            match value {
                Some(v) => {
                    self.data.insert(key, v);
                }
                None => {
                    self.data.remove(&key);
                }
            }
        }
        if let Err(e) = self.flush() {
            self.data = previous;
            return Err(e);
        }
        self.version += 1;
        Ok(())
    }
}

/// State shared between the store and the sessions/connections it hands out.
struct Shared {
    name: RwLock<String>,
    engine: RwLock<Option<Engine>>,
    frozen: AtomicBool,
}

impl Shared {
    fn name(&self) -> String {
        self.name.read().expect("lock poisoned").clone()
    }

    fn check_writable(&self) -> DataStoreResult<()> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(DataStoreError::Frozen(self.name()));
        }
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Engine) -> T) -> DataStoreResult<T> {
        let engine = self.engine.read().expect("lock poisoned");
        match engine.as_ref() {
            Some(engine) => Ok(f(engine)),
            None => Err(DataStoreError::NotStarted(self.name())),
        }
    }

    fn write(
        &self,
        writes: BTreeMap<String, Option<Vec<u8>>>,
        expected_version: Option<u64>,
    ) -> DataStoreResult<()> {
        self.check_writable()?;
        let mut engine = self.engine.write().expect("lock poisoned");
        let engine = engine
            .as_mut()
            .ok_or_else(|| DataStoreError::NotStarted(self.name()))?;
        if let Some(expected) = expected_version {
            if engine.version != expected {
                return Err(DataStoreError::Conflict(self.name()));
            }
        }
        engine.apply(writes)
    }
}

/// File-backed data store; see the module docs.
pub struct EmbeddedDataStore {
    settings: EmbeddedConfig,
    config: RwLock<Option<StoreConfiguration>>,
    state: Mutex<State>,
    shared: Arc<Shared>,
}

impl EmbeddedDataStore {
    pub fn new(settings: EmbeddedConfig) -> Self {
        Self {
            settings,
            config: RwLock::new(None),
            state: Mutex::new(State::New),
            shared: Arc::new(Shared {
                name: RwLock::new(String::new()),
                engine: RwLock::new(None),
                frozen: AtomicBool::new(false),
            }),
        }
    }

    /// A prototype producing fresh embedded stores with shared settings.
    pub fn prototype(settings: EmbeddedConfig) -> impl Fn() -> Arc<dyn DataStore> + Send + Sync {
        move || Arc::new(EmbeddedDataStore::new(settings.clone())) as Arc<dyn DataStore>
    }

    /// Path of the data file, once configured.
    pub fn data_file(&self) -> Option<PathBuf> {
        self.configuration()
            .map(|config| self.settings.data_file_for(&config))
    }
}

impl DataStore for EmbeddedDataStore {
    fn configuration(&self) -> Option<StoreConfiguration> {
        self.config.read().expect("lock poisoned").clone()
    }

    fn set_configuration(&self, config: StoreConfiguration) -> DataStoreResult<()> {
        let state = self.state.lock().expect("lock poisoned");
        if *state == State::Started {
            return Err(DataStoreError::lifecycle(
                &config.name,
                "cannot reconfigure a started store",
            ));
        }
        let mut current = self.config.write().expect("lock poisoned");
        if let Some(existing) = current.as_ref() {
            if existing.name != config.name {
                return Err(DataStoreError::InvalidConfig(format!(
                    "store name is immutable: {} cannot become {}",
                    existing.name, config.name
                )));
            }
        }
        *self.shared.name.write().expect("lock poisoned") = config.name.clone();
        *current = Some(config);
        Ok(())
    }

    fn start(&self) -> DataStoreResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        let config = self
            .configuration()
            .ok_or_else(|| DataStoreError::lifecycle("<unnamed>", "no configuration applied"))?;
        match *state {
            State::Started => return Ok(()),
            State::Shutdown => {
                return Err(DataStoreError::lifecycle(&config.name, "store was shut down"))
            }
            State::New | State::Stopped => {}
        }

        fs::create_dir_all(self.settings.directory_for(&config))?;
        let engine = Engine::open(self.settings.data_file_for(&config))?;
        tracing::debug!(store = %config.name, path = %engine.path.display(), "embedded store opened");
        *self.shared.engine.write().expect("lock poisoned") = Some(engine);
        *state = State::Started;
        Ok(())
    }

    fn stop(&self) -> DataStoreResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        if *state == State::Started {
            *self.shared.engine.write().expect("lock poisoned") = None;
            *state = State::Stopped;
            tracing::debug!(store = %self.shared.name(), "embedded store closed");
        }
        Ok(())
    }

    fn shutdown(&self) -> DataStoreResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        *self.shared.engine.write().expect("lock poisoned") = None;
        *state = State::Shutdown;
        Ok(())
    }

    fn is_started(&self) -> bool {
        *self.state.lock().expect("lock poisoned") == State::Started
    }

    fn freeze(&self) {
        self.shared.frozen.store(true, Ordering::SeqCst);
    }

    fn unfreeze(&self) {
        self.shared.frozen.store(false, Ordering::SeqCst);
    }

    fn is_frozen(&self) -> bool {
        self.shared.frozen.load(Ordering::SeqCst)
    }

    fn open_session(&self, isolation: IsolationLevel) -> DataStoreResult<Box<dyn DataSession>> {
        let snapshot_version = self.shared.read(|engine| engine.version)?;
        Ok(Box::new(EmbeddedSession {
            shared: Arc::clone(&self.shared),
            isolation,
            snapshot_version,
            writes: BTreeMap::new(),
        }))
    }

    fn open_connection(&self) -> DataStoreResult<Box<dyn DataConnection>> {
        self.shared.read(|_| ())?;
        Ok(Box::new(EmbeddedConnection {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn backup(&self, dir: &Path) -> DataStoreResult<PathBuf> {
        let name = self.shared.name();
        let bytes = self.shared.read(|engine| engine.encode())??;
        fs::create_dir_all(dir)?;

        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S%3f");
        let archive_path = dir.join(format!("{name}-{stamp}.zip"));
        let file = fs::File::create(&archive_path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        zip.start_file(data_file_name(&name, &self.settings.extension), options)?;
        zip.write_all(&bytes)?;
        zip.finish()?;

        tracing::info!(store = %name, archive = %archive_path.display(), "backup written");
        Ok(archive_path)
    }
}

impl std::fmt::Debug for EmbeddedDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedDataStore")
            .field("name", &self.shared.name())
            .field("started", &self.is_started())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

struct EmbeddedSession {
    shared: Arc<Shared>,
    isolation: IsolationLevel,
    snapshot_version: u64,
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

impl DataSession for EmbeddedSession {
    fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    fn get(&self, key: &str) -> DataStoreResult<Option<Vec<u8>>> {
        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }
        self.shared.read(|engine| engine.data.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> DataStoreResult<()> {
        self.shared.check_writable()?;
        self.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn remove(&mut self, key: &str) -> DataStoreResult<bool> {
        self.shared.check_writable()?;
        let visible = self.get(key)?.is_some();
        self.writes.insert(key.to_string(), None);
        Ok(visible)
    }

    fn commit(self: Box<Self>) -> DataStoreResult<()> {
        if self.writes.is_empty() {
            return Ok(());
        }
        let expected = match self.isolation {
            IsolationLevel::Serializable => Some(self.snapshot_version),
            IsolationLevel::ReadCommitted => None,
        };
        self.shared.write(self.writes, expected)
    }
}

struct EmbeddedConnection {
    shared: Arc<Shared>,
}

impl DataConnection for EmbeddedConnection {
    fn get(&self, key: &str) -> DataStoreResult<Option<Vec<u8>>> {
        self.shared.read(|engine| engine.data.get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> DataStoreResult<()> {
        self.shared
            .write(BTreeMap::from([(key.to_string(), Some(value))]), None)
    }

    fn remove(&self, key: &str) -> DataStoreResult<bool> {
        let existed = self.get(key)?.is_some();
        if existed {
            self.shared
                .write(BTreeMap::from([(key.to_string(), None)]), None)?;
        }
        Ok(existed)
    }

    fn keys(&self) -> DataStoreResult<Vec<String>> {
        self.shared.read(|engine| engine.data.keys().cloned().collect())
    }
}

/// Descriptor for the embedded store type.
#[derive(Clone, Debug)]
pub struct EmbeddedDescriptor {
    enabled: bool,
}

impl EmbeddedDescriptor {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Default for EmbeddedDescriptor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DataStoreDescriptor for EmbeddedDescriptor {
    fn store_type(&self) -> &str {
        EMBEDDED_TYPE
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn validate(&self, config: &StoreConfiguration) -> DataStoreResult<()> {
        config.validate_name()?;
        if config.store_type != EMBEDDED_TYPE {
            return Err(DataStoreError::InvalidConfig(format!(
                "expected type {EMBEDDED_TYPE}, got {}",
                config.store_type
            )));
        }
        if let Some(raw) = config.attribute(POOL_SIZE_ATTRIBUTE) {
            let size: u32 = raw.trim().parse().map_err(|_| {
                DataStoreError::InvalidConfig(format!("{POOL_SIZE_ATTRIBUTE} is not a number: {raw}"))
            })?;
            if !(1..=MAX_POOL_SIZE).contains(&size) {
                return Err(DataStoreError::InvalidConfig(format!(
                    "{POOL_SIZE_ATTRIBUTE} must be between 1 and {MAX_POOL_SIZE}, got {size}"
                )));
            }
        }
        if let Some(dir) = config.attribute(DIRECTORY_ATTRIBUTE) {
            if dir.trim().is_empty() {
                return Err(DataStoreError::InvalidConfig(format!(
                    "{DIRECTORY_ATTRIBUTE} must not be blank"
                )));
            }
        }
        Ok(())
    }
}
