use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use depot_types::{StoreConfiguration, StoreKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::descriptor::{DataStoreDescriptor, DescriptorRegistry};
use crate::error::{DataStoreError, DataStoreResult};
use crate::persistence::ConfigurationStore;
use crate::prototype::PrototypeRegistry;
use crate::restore::DataStoreRestorer;
use crate::traits::{
    DataConnection, DataSession, DataStore, IsolationLevel, NeverInUse, UsageChecker,
};

/// Configuration for the data store manager.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Whether data stores are enabled at all. When `false`, startup loads
    /// nothing and every mutating operation fails with `FeatureDisabled`.
    pub enabled: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Where a configuration change came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Requested on this node.
    #[default]
    Local,
    /// Replayed from another node; observers are not notified.
    Replicated,
}

/// Emitted after an update has been committed.
#[derive(Clone, Debug)]
pub struct ConfigurationChanged {
    pub previous: StoreConfiguration,
    pub current: StoreConfiguration,
}

/// Callback invoked synchronously after a local update commits.
pub trait ConfigurationObserver: Send + Sync {
    fn configuration_changed(&self, event: &ConfigurationChanged);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ManagerState {
    New,
    Started,
    Stopped,
}

/// Registry of live, started data stores.
///
/// Structural mutations (publishing a created store, removing a deleted
/// one, freeze and unfreeze) are linearised by one mutex. Lookups read the
/// map without taking that mutex. Updates and deletes are additionally
/// serialised among themselves so a store is never reconfigured and
/// removed at the same time.
pub struct DataStoreManager {
    config: ManagerConfig,
    descriptors: DescriptorRegistry,
    prototypes: PrototypeRegistry,
    persistence: Arc<dyn ConfigurationStore>,
    restorer: Option<DataStoreRestorer>,
    usage: Arc<dyn UsageChecker>,
    observers: RwLock<Vec<Arc<dyn ConfigurationObserver>>>,
    state: RwLock<ManagerState>,
    stores: RwLock<HashMap<StoreKey, Arc<dyn DataStore>>>,
    /// Held for every insert/remove on `stores` and every freeze transition.
    structure: Mutex<()>,
    /// Written only while `structure` is held.
    frozen: AtomicBool,
    /// Serialises update and delete.
    reconfigure: Mutex<()>,
}

/// Assembles a [`DataStoreManager`] from its collaborators.
pub struct DataStoreManagerBuilder {
    config: ManagerConfig,
    descriptors: DescriptorRegistry,
    prototypes: PrototypeRegistry,
    persistence: Arc<dyn ConfigurationStore>,
    restorer: Option<DataStoreRestorer>,
    usage: Arc<dyn UsageChecker>,
}

impl DataStoreManagerBuilder {
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn descriptor(mut self, descriptor: Arc<dyn DataStoreDescriptor>) -> Self {
        self.descriptors.register(descriptor);
        self
    }

    pub fn prototype<F>(mut self, store_type: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn DataStore> + Send + Sync + 'static,
    {
        self.prototypes.register(store_type, factory);
        self
    }

    pub fn restorer(mut self, restorer: DataStoreRestorer) -> Self {
        self.restorer = Some(restorer);
        self
    }

    pub fn usage_checker(mut self, usage: Arc<dyn UsageChecker>) -> Self {
        self.usage = usage;
        self
    }

    pub fn build(self) -> DataStoreManager {
        DataStoreManager {
            config: self.config,
            descriptors: self.descriptors,
            prototypes: self.prototypes,
            persistence: self.persistence,
            restorer: self.restorer,
            usage: self.usage,
            observers: RwLock::new(Vec::new()),
            state: RwLock::new(ManagerState::New),
            stores: RwLock::new(HashMap::new()),
            structure: Mutex::new(()),
            frozen: AtomicBool::new(false),
            reconfigure: Mutex::new(()),
        }
    }
}

impl DataStoreManager {
    /// Start assembling a manager around a configuration store.
    pub fn builder(persistence: Arc<dyn ConfigurationStore>) -> DataStoreManagerBuilder {
        DataStoreManagerBuilder {
            config: ManagerConfig::default(),
            descriptors: DescriptorRegistry::new(),
            prototypes: PrototypeRegistry::new(),
            persistence,
            restorer: None,
            usage: Arc::new(NeverInUse),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn ConfigurationObserver>) {
        self.observers
            .write()
            .expect("lock poisoned")
            .push(observer);
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start the manager and bring up every persisted store.
    ///
    /// A store whose restore or creation fails is logged and skipped; the
    /// rest still come up.
    pub fn start(&self) -> DataStoreResult<()> {
        if self.is_started() {
            return Ok(());
        }
        let configs = if self.config.enabled {
            self.persistence.load()?
        } else {
            Vec::new()
        };
        *self.state.write().expect("lock poisoned") = ManagerState::Started;

        if !self.config.enabled {
            info!("data stores disabled; nothing to start");
            return Ok(());
        }

        for config in configs {
            if let Some(restorer) = &self.restorer {
                if let Err(e) = restorer.maybe_restore(&config) {
                    warn!(store = %config.name, error = %e, "restore failed; skipping store");
                    continue;
                }
            }
            if let Err(e) = self.create(config.clone()) {
                warn!(store = %config.name, error = %e, "failed to start store; skipping");
            }
        }
        info!(
            count = self.stores.read().expect("lock poisoned").len(),
            "data store manager started"
        );
        Ok(())
    }

    /// Shut down every registered store, then clear the registry.
    ///
    /// A store that fails to shut down is logged; the rest are still
    /// attempted.
    pub fn stop(&self) -> DataStoreResult<()> {
        {
            let mut state = self.state.write().expect("lock poisoned");
            if *state != ManagerState::Started {
                return Ok(());
            }
            *state = ManagerState::Stopped;
        }

        let _guard = self.structure.lock().expect("lock poisoned");
        let snapshot: Vec<(StoreKey, Arc<dyn DataStore>)> = self
            .stores
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();
        for (key, store) in snapshot {
            if let Err(e) = store.shutdown() {
                warn!(store = %key, error = %e, "failed to shut down store");
            }
        }
        self.stores.write().expect("lock poisoned").clear();
        info!("data store manager stopped");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        *self.state.read().expect("lock poisoned") == ManagerState::Started
    }

    fn require_started(&self) -> DataStoreResult<()> {
        if self.is_started() {
            Ok(())
        } else {
            Err(DataStoreError::NotStarted("data store manager".into()))
        }
    }

    fn require_enabled(&self) -> DataStoreResult<()> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(DataStoreError::FeatureDisabled("data stores".into()))
        }
    }

    // -----------------------------------------------------------------------
    // CRUD
    // -----------------------------------------------------------------------

    /// Create, start and register a store.
    ///
    /// The configuration is persisted before the store starts. If starting
    /// fails nothing becomes visible. If a concurrent create of the same
    /// name publishes first, this call's store is stopped and
    /// `DuplicateCreate` is returned.
    pub fn create(&self, config: StoreConfiguration) -> DataStoreResult<Arc<dyn DataStore>> {
        self.require_started()?;
        self.require_enabled()?;

        let key = config.key();
        if self.stores.read().expect("lock poisoned").contains_key(&key) {
            return Err(DataStoreError::AlreadyExists(config.name));
        }
        self.validate(&config)?;

        self.persistence.save(&config)?;
        let store = self
            .prototypes
            .instantiate(&config.store_type)
            .ok_or_else(|| {
                DataStoreError::InvalidConfig(format!(
                    "no prototype for store type {}",
                    config.store_type
                ))
            })?;
        store.set_configuration(config.clone())?;
        store.start()?;
        debug!(store = %config.name, "store started");

        self.publish(key, &config.name, store)
    }

    fn publish(
        &self,
        key: StoreKey,
        name: &str,
        store: Arc<dyn DataStore>,
    ) -> DataStoreResult<Arc<dyn DataStore>> {
        let guard = self.structure.lock().expect("lock poisoned");
        if self.frozen.load(Ordering::SeqCst) {
            store.freeze();
        }
        let mut stores = self.stores.write().expect("lock poisoned");
        if let Some(winner) = stores.get(&key).cloned() {
            drop(stores);
            drop(guard);
            if let Err(e) = store.stop() {
                warn!(store = %name, error = %e, "failed to stop duplicate store");
            }
            // Our configuration was saved before start; restore the winner's.
            if let Some(current) = winner.configuration() {
                if let Err(e) = self.persistence.save(&current) {
                    warn!(store = %name, error = %e, "failed to re-persist winning configuration");
                }
            }
            return Err(DataStoreError::DuplicateCreate(name.to_string()));
        }
        stores.insert(key, Arc::clone(&store));
        info!(store = %name, "data store created");
        Ok(store)
    }

    /// Reconfigure a live store. See [`DataStoreManager::update_from`].
    pub fn update(&self, config: StoreConfiguration) -> DataStoreResult<Arc<dyn DataStore>> {
        self.update_from(config, ChangeOrigin::Local)
    }

    /// Stop the store, apply `config`, and restart it.
    ///
    /// If any step after persisting fails, the previous configuration is
    /// persisted and applied again and the store restarted with it before
    /// `UpdateFailed` is returned carrying the original cause. Observers
    /// are notified only for [`ChangeOrigin::Local`] updates.
    pub fn update_from(
        &self,
        mut config: StoreConfiguration,
        origin: ChangeOrigin,
    ) -> DataStoreResult<Arc<dyn DataStore>> {
        self.require_started()?;
        self.require_enabled()?;
        let _guard = self.reconfigure.lock().expect("lock poisoned");

        let store = self
            .lookup(&config.name)
            .ok_or_else(|| DataStoreError::NotFound(config.name.clone()))?;
        let previous = store.configuration().ok_or_else(|| {
            DataStoreError::lifecycle(&config.name, "store has no configuration")
        })?;
        // Lookup is case-insensitive but the registered spelling is kept.
        if config.name != previous.name {
            debug!(requested = %config.name, store = %previous.name, "keeping registered store name");
            config.name = previous.name.clone();
        }
        self.validate(&config)?;

        self.persistence.save(&config)?;
        if let Err(cause) = self.apply(&store, config.clone()) {
            warn!(store = %config.name, error = %cause, "update failed; rolling back");
            self.rollback(&store, &previous);
            return Err(DataStoreError::UpdateFailed {
                name: config.name,
                source: Box::new(cause),
            });
        }
        info!(store = %config.name, ?origin, "data store updated");

        if origin == ChangeOrigin::Local {
            let event = ConfigurationChanged {
                previous,
                current: config,
            };
            for observer in self.observers.read().expect("lock poisoned").iter() {
                observer.configuration_changed(&event);
            }
        }
        Ok(store)
    }

    fn apply(&self, store: &Arc<dyn DataStore>, config: StoreConfiguration) -> DataStoreResult<()> {
        store.stop()?;
        store.set_configuration(config)?;
        store.start()?;
        self.sync_frozen(store);
        Ok(())
    }

    /// Match a store's freeze state to the manager's flag.
    fn sync_frozen(&self, store: &Arc<dyn DataStore>) {
        let _guard = self.structure.lock().expect("lock poisoned");
        if self.frozen.load(Ordering::SeqCst) {
            store.freeze();
        } else {
            store.unfreeze();
        }
    }

    /// Best effort: every step is attempted and failures are logged, so
    /// the caller can still report the original cause.
    fn rollback(&self, store: &Arc<dyn DataStore>, previous: &StoreConfiguration) {
        if let Err(e) = self.persistence.save(previous) {
            error!(store = %previous.name, error = %e, "failed to persist previous configuration");
        }
        if store.is_started() {
            if let Err(e) = store.stop() {
                error!(store = %previous.name, error = %e, "failed to stop store during rollback");
            }
        }
        if let Err(e) = store.set_configuration(previous.clone()) {
            error!(store = %previous.name, error = %e, "failed to reapply previous configuration");
        }
        if let Err(e) = store.start() {
            error!(store = %previous.name, error = %e, "failed to restart store during rollback");
        }
        self.sync_frozen(store);
    }

    /// Remove, shut down and forget a store.
    ///
    /// Returns `Ok(false)` if no such store is registered. The persisted
    /// configuration is deleted even if shutdown fails.
    pub fn delete(&self, name: &str) -> DataStoreResult<bool> {
        self.require_started()?;
        self.require_enabled()?;
        if self.usage.is_store_in_use(name) {
            return Err(DataStoreError::InUse(name.to_string()));
        }
        let _guard = self.reconfigure.lock().expect("lock poisoned");

        let removed = {
            let _structure = self.structure.lock().expect("lock poisoned");
            self.stores
                .write()
                .expect("lock poisoned")
                .remove(&StoreKey::new(name))
        };
        let Some(store) = removed else {
            return Ok(false);
        };

        let config = store
            .configuration()
            .unwrap_or_else(|| StoreConfiguration::new(name, ""));
        let shutdown = store.shutdown();
        let deleted = self.persistence.delete(&config);
        if let Err(e) = &shutdown {
            warn!(store = %name, error = %e, "failed to shut down deleted store");
        }
        shutdown?;
        deleted?;
        info!(store = %name, "data store deleted");
        Ok(true)
    }

    fn validate(&self, config: &StoreConfiguration) -> DataStoreResult<()> {
        config.validate_name()?;
        let descriptor = self.descriptors.get(&config.store_type).ok_or_else(|| {
            DataStoreError::InvalidConfig(format!("unknown store type {}", config.store_type))
        })?;
        if !descriptor.is_enabled() {
            return Err(DataStoreError::InvalidConfig(format!(
                "store type {} is disabled",
                config.store_type
            )));
        }
        descriptor.validate(config)
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    fn lookup(&self, name: &str) -> Option<Arc<dyn DataStore>> {
        self.stores
            .read()
            .expect("lock poisoned")
            .get(&StoreKey::new(name))
            .cloned()
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> DataStoreResult<Option<Arc<dyn DataStore>>> {
        self.require_started()?;
        Ok(self.lookup(name))
    }

    pub fn exists(&self, name: &str) -> DataStoreResult<bool> {
        self.require_started()?;
        Ok(self
            .stores
            .read()
            .expect("lock poisoned")
            .contains_key(&StoreKey::new(name)))
    }

    /// Point-in-time snapshot of registered stores, ordered by key.
    pub fn browse(&self) -> DataStoreResult<Vec<Arc<dyn DataStore>>> {
        self.require_started()?;
        let stores = self.stores.read().expect("lock poisoned");
        let mut entries: Vec<(&StoreKey, &Arc<dyn DataStore>)> = stores.iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(entries.into_iter().map(|(_, s)| Arc::clone(s)).collect())
    }

    // -----------------------------------------------------------------------
    // Freeze
    // -----------------------------------------------------------------------

    /// Freeze every current store, and every store created from now on.
    pub fn freeze(&self) -> DataStoreResult<()> {
        self.set_frozen(true)
    }

    pub fn unfreeze(&self) -> DataStoreResult<()> {
        self.set_frozen(false)
    }

    fn set_frozen(&self, frozen: bool) -> DataStoreResult<()> {
        self.require_started()?;
        let _guard = self.structure.lock().expect("lock poisoned");
        self.frozen.store(frozen, Ordering::SeqCst);
        for store in self.stores.read().expect("lock poisoned").values() {
            if frozen {
                store.freeze();
            } else {
                store.unfreeze();
            }
        }
        info!(frozen, "data stores freeze state changed");
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Sessions and connections
    // -----------------------------------------------------------------------

    fn require_store(&self, name: &str) -> DataStoreResult<Arc<dyn DataStore>> {
        self.get(name)?
            .ok_or_else(|| DataStoreError::NotFound(name.to_string()))
    }

    pub fn open_session(&self, name: &str) -> DataStoreResult<Box<dyn DataSession>> {
        self.require_store(name)?
            .open_session(IsolationLevel::default())
    }

    pub fn open_serializable_session(&self, name: &str) -> DataStoreResult<Box<dyn DataSession>> {
        self.require_store(name)?
            .open_session(IsolationLevel::Serializable)
    }

    pub fn open_connection(&self, name: &str) -> DataStoreResult<Box<dyn DataConnection>> {
        self.require_store(name)?.open_connection()
    }

    /// Write a backup archive of one store into `dir`.
    pub fn backup(&self, name: &str, dir: &Path) -> DataStoreResult<PathBuf> {
        self.require_store(name)?.backup(dir)
    }
}

impl std::fmt::Debug for DataStoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.stores.read().expect("lock poisoned").len();
        f.debug_struct("DataStoreManager")
            .field("enabled", &self.config.enabled)
            .field("started", &self.is_started())
            .field("frozen", &self.is_frozen())
            .field("store_count", &count)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedded::{EmbeddedConfig, EmbeddedDataStore, EmbeddedDescriptor, EMBEDDED_TYPE};
    use crate::persistence::InMemoryConfigurationStore;
    use crate::restore::RestoreConfig;
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;

    const SCRIPTED: &str = "scripted";
    const FAIL_START: &str = "failStart";
    const FAIL_SHUTDOWN: &str = "failShutdown";
    const INVALID: &str = "invalid";

    #[derive(Default)]
    struct Counters {
        starts: AtomicUsize,
        stops: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    /// Test double whose behaviour is driven by configuration attributes.
    struct ScriptedStore {
        config: RwLock<Option<StoreConfiguration>>,
        started: AtomicBool,
        frozen: AtomicBool,
        counters: Arc<Counters>,
        rendezvous: Option<Arc<Barrier>>,
    }

    impl ScriptedStore {
        fn flag(&self, key: &str) -> bool {
            self.configuration()
                .and_then(|c| c.attribute(key).map(|v| v == "true"))
                .unwrap_or(false)
        }
    }

    impl DataStore for ScriptedStore {
        fn configuration(&self) -> Option<StoreConfiguration> {
            self.config.read().unwrap().clone()
        }

        fn set_configuration(&self, config: StoreConfiguration) -> DataStoreResult<()> {
            *self.config.write().unwrap() = Some(config);
            Ok(())
        }

        fn start(&self) -> DataStoreResult<()> {
            self.counters.starts.fetch_add(1, Ordering::SeqCst);
            if let Some(barrier) = &self.rendezvous {
                barrier.wait();
            }
            if self.flag(FAIL_START) {
                return Err(DataStoreError::lifecycle(self.name(), "scripted start failure"));
            }
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) -> DataStoreResult<()> {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
            self.started.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn shutdown(&self) -> DataStoreResult<()> {
            self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
            self.started.store(false, Ordering::SeqCst);
            if self.flag(FAIL_SHUTDOWN) {
                return Err(DataStoreError::lifecycle(self.name(), "scripted shutdown failure"));
            }
            Ok(())
        }

        fn is_started(&self) -> bool {
            self.started.load(Ordering::SeqCst)
        }

        fn freeze(&self) {
            self.frozen.store(true, Ordering::SeqCst);
        }

        fn unfreeze(&self) {
            self.frozen.store(false, Ordering::SeqCst);
        }

        fn is_frozen(&self) -> bool {
            self.frozen.load(Ordering::SeqCst)
        }

        fn open_session(&self, _isolation: IsolationLevel) -> DataStoreResult<Box<dyn DataSession>> {
            Err(DataStoreError::lifecycle(self.name(), "scripted store has no engine"))
        }

        fn open_connection(&self) -> DataStoreResult<Box<dyn DataConnection>> {
            Err(DataStoreError::lifecycle(self.name(), "scripted store has no engine"))
        }

        fn backup(&self, _dir: &Path) -> DataStoreResult<PathBuf> {
            Err(DataStoreError::lifecycle(self.name(), "scripted store has no engine"))
        }
    }

    struct ScriptedDescriptor {
        enabled: bool,
    }

    impl DataStoreDescriptor for ScriptedDescriptor {
        fn store_type(&self) -> &str {
            SCRIPTED
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn validate(&self, config: &StoreConfiguration) -> DataStoreResult<()> {
            if config.attribute(INVALID).is_some() {
                return Err(DataStoreError::InvalidConfig("scripted rejection".into()));
            }
            Ok(())
        }
    }

    struct NamedInUse(&'static str);

    impl UsageChecker for NamedInUse {
        fn is_store_in_use(&self, name: &str) -> bool {
            name.eq_ignore_ascii_case(self.0)
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<ConfigurationChanged>>,
    }

    impl ConfigurationObserver for RecordingObserver {
        fn configuration_changed(&self, event: &ConfigurationChanged) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    struct Harness {
        manager: DataStoreManager,
        persistence: Arc<InMemoryConfigurationStore>,
        counters: Arc<Counters>,
    }

    fn builder_for(
        persistence: &Arc<InMemoryConfigurationStore>,
        counters: &Arc<Counters>,
        rendezvous: Option<Arc<Barrier>>,
    ) -> DataStoreManagerBuilder {
        let counters = Arc::clone(counters);
        DataStoreManager::builder(Arc::clone(persistence) as Arc<dyn ConfigurationStore>)
            .descriptor(Arc::new(ScriptedDescriptor { enabled: true }))
            .prototype(SCRIPTED, move || {
                Arc::new(ScriptedStore {
                    config: RwLock::new(None),
                    started: AtomicBool::new(false),
                    frozen: AtomicBool::new(false),
                    counters: Arc::clone(&counters),
                    rendezvous: rendezvous.clone(),
                }) as Arc<dyn DataStore>
            })
    }

    fn harness_from(configs: Vec<StoreConfiguration>) -> Harness {
        let persistence = Arc::new(InMemoryConfigurationStore::with_configurations(configs));
        let counters = Arc::new(Counters::default());
        let manager = builder_for(&persistence, &counters, None).build();
        manager.start().unwrap();
        Harness {
            manager,
            persistence,
            counters,
        }
    }

    fn harness() -> Harness {
        harness_from(Vec::new())
    }

    fn config(name: &str) -> StoreConfiguration {
        StoreConfiguration::new(name, SCRIPTED)
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    #[test]
    fn create_registers_started_store() {
        let h = harness();
        let store = h.manager.create(config("content")).unwrap();
        assert!(store.is_started());
        assert_eq!(store.name(), "content");
        assert_eq!(h.persistence.get("content").unwrap(), config("content"));
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let h = harness();
        h.manager.create(config("Foo")).unwrap();
        assert!(h.manager.get("foo").unwrap().is_some());
        assert!(h.manager.exists("FOO").unwrap());
        assert!(!h.manager.exists("bar").unwrap());
    }

    #[test]
    fn create_same_name_twice_fails() {
        let h = harness();
        h.manager.create(config("content")).unwrap();
        let err = h.manager.create(config("CONTENT")).unwrap_err();
        assert!(matches!(err, DataStoreError::AlreadyExists(_)));
        assert_eq!(h.manager.browse().unwrap().len(), 1);
    }

    #[test]
    fn create_rejects_unknown_type_and_invalid_config() {
        let h = harness();
        let err = h
            .manager
            .create(StoreConfiguration::new("x", "nope"))
            .unwrap_err();
        assert!(matches!(err, DataStoreError::InvalidConfig(_)));

        let err = h
            .manager
            .create(config("x").with_attribute(INVALID, "yes"))
            .unwrap_err();
        assert!(matches!(err, DataStoreError::InvalidConfig(_)));

        let err = h.manager.create(config("bad/name")).unwrap_err();
        assert!(matches!(err, DataStoreError::InvalidConfig(_)));

        assert!(h.persistence.is_empty());
    }

    #[test]
    fn create_rejects_disabled_type() {
        let persistence = Arc::new(InMemoryConfigurationStore::new());
        let manager = DataStoreManager::builder(persistence)
            .descriptor(Arc::new(ScriptedDescriptor { enabled: false }))
            .build();
        manager.start().unwrap();
        let err = manager.create(config("x")).unwrap_err();
        assert!(matches!(err, DataStoreError::InvalidConfig(_)));
    }

    #[test]
    fn create_fails_when_feature_disabled() {
        let persistence = Arc::new(InMemoryConfigurationStore::with_configurations(vec![config("a")]));
        let counters = Arc::new(Counters::default());
        let manager = builder_for(&persistence, &counters, None)
            .config(ManagerConfig { enabled: false })
            .build();
        manager.start().unwrap();
        assert!(manager.browse().unwrap().is_empty());
        assert!(matches!(
            manager.create(config("b")),
            Err(DataStoreError::FeatureDisabled(_))
        ));
    }

    #[test]
    fn operations_require_started_manager() {
        let persistence = Arc::new(InMemoryConfigurationStore::new());
        let counters = Arc::new(Counters::default());
        let manager = builder_for(&persistence, &counters, None).build();
        assert!(matches!(manager.create(config("a")), Err(DataStoreError::NotStarted(_))));
        assert!(matches!(manager.get("a"), Err(DataStoreError::NotStarted(_))));
        assert!(matches!(manager.freeze(), Err(DataStoreError::NotStarted(_))));
    }

    #[test]
    fn failed_start_leaves_nothing_visible() {
        let h = harness();
        let err = h
            .manager
            .create(config("broken").with_attribute(FAIL_START, "true"))
            .unwrap_err();
        assert!(matches!(err, DataStoreError::Lifecycle { .. }));
        assert!(!h.manager.exists("broken").unwrap());

        // A corrected configuration can be created afterwards.
        h.manager.create(config("broken")).unwrap();
        assert!(h.manager.exists("broken").unwrap());
    }

    #[test]
    fn concurrent_create_publishes_exactly_one() {
        let persistence = Arc::new(InMemoryConfigurationStore::new());
        let counters = Arc::new(Counters::default());
        let barrier = Arc::new(Barrier::new(2));
        let manager = builder_for(&persistence, &counters, Some(barrier)).build();
        manager.start().unwrap();

        let (a, b) = thread::scope(|s| {
            let a = s.spawn(|| manager.create(config("race")));
            let b = s.spawn(|| manager.create(config("RACE")));
            (a.join().unwrap(), b.join().unwrap())
        });

        let (winner, loser) = if a.is_ok() { (a, b) } else { (b, a) };
        let winner = winner.unwrap();
        assert!(matches!(loser, Err(DataStoreError::DuplicateCreate(_))));

        let visible = manager.browse().unwrap();
        assert_eq!(visible.len(), 1);
        assert!(Arc::ptr_eq(&visible[0], &winner));
        assert!(winner.is_started());
        assert_eq!(counters.starts.load(Ordering::SeqCst), 2);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn losing_create_leaves_winner_configuration_persisted() {
        let persistence = Arc::new(InMemoryConfigurationStore::new());
        let counters = Arc::new(Counters::default());
        let barrier = Arc::new(Barrier::new(2));
        let manager = builder_for(&persistence, &counters, Some(barrier)).build();
        manager.start().unwrap();

        let (a, b) = thread::scope(|s| {
            let a = s.spawn(|| manager.create(config("race").with_attribute("side", "a")));
            let b = s.spawn(|| manager.create(config("RACE").with_attribute("side", "b")));
            (a.join().unwrap(), b.join().unwrap())
        });

        let winner = a.or(b).unwrap();
        assert_eq!(persistence.get("race"), winner.configuration());
        assert_eq!(persistence.len(), 1);
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    #[test]
    fn update_restarts_with_new_configuration() {
        let h = harness();
        let observer = Arc::new(RecordingObserver::default());
        h.manager.add_observer(observer.clone());
        h.manager.create(config("content")).unwrap();

        let updated = config("content").with_attribute("k", "v");
        let store = h.manager.update(updated.clone()).unwrap();

        assert!(store.is_started());
        assert_eq!(store.configuration().unwrap(), updated);
        assert_eq!(h.persistence.get("content").unwrap(), updated);
        assert_eq!(h.counters.stops.load(Ordering::SeqCst), 1);
        assert_eq!(h.counters.starts.load(Ordering::SeqCst), 2);

        let events = observer.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].previous, config("content"));
        assert_eq!(events[0].current, updated);
    }

    #[test]
    fn replicated_update_does_not_notify() {
        let h = harness();
        let observer = Arc::new(RecordingObserver::default());
        h.manager.add_observer(observer.clone());
        h.manager.create(config("content")).unwrap();

        h.manager
            .update_from(config("content").with_attribute("k", "v"), ChangeOrigin::Replicated)
            .unwrap();
        assert!(observer.events.lock().unwrap().is_empty());
    }

    #[test]
    fn update_missing_store_is_not_found() {
        let h = harness();
        assert!(matches!(
            h.manager.update(config("ghost")),
            Err(DataStoreError::NotFound(_))
        ));
    }

    #[test]
    fn update_rejects_invalid_configuration_without_touching_store() {
        let h = harness();
        h.manager.create(config("content")).unwrap();
        let err = h
            .manager
            .update(config("content").with_attribute(INVALID, "yes"))
            .unwrap_err();
        assert!(matches!(err, DataStoreError::InvalidConfig(_)));
        assert_eq!(h.counters.stops.load(Ordering::SeqCst), 0);
        assert_eq!(h.persistence.get("content").unwrap(), config("content"));
    }

    #[test]
    fn failed_update_rolls_back() {
        let h = harness();
        let observer = Arc::new(RecordingObserver::default());
        h.manager.add_observer(observer.clone());
        let original = config("content").with_attribute("generation", "1");
        h.manager.create(original.clone()).unwrap();

        let err = h
            .manager
            .update(config("content").with_attribute(FAIL_START, "true"))
            .unwrap_err();
        match err {
            DataStoreError::UpdateFailed { name, source } => {
                assert_eq!(name, "content");
                assert!(matches!(*source, DataStoreError::Lifecycle { .. }));
            }
            other => panic!("expected UpdateFailed, got {other:?}"),
        }

        let store = h.manager.get("content").unwrap().unwrap();
        assert!(store.is_started());
        assert_eq!(store.configuration().unwrap(), original);
        assert_eq!(h.persistence.get("content").unwrap(), original);
        assert!(observer.events.lock().unwrap().is_empty());
    }

    #[test]
    fn update_keeps_frozen_store_frozen() {
        let h = harness();
        h.manager.create(config("content")).unwrap();
        h.manager.freeze().unwrap();
        let store = h
            .manager
            .update(config("content").with_attribute("k", "v"))
            .unwrap();
        assert!(store.is_frozen());
    }

    #[test]
    fn unfreeze_racing_an_update_leaves_store_unfrozen() {
        let persistence = Arc::new(InMemoryConfigurationStore::new());
        let counters = Arc::new(Counters::default());
        let barrier = Arc::new(Barrier::new(2));
        let manager = builder_for(&persistence, &counters, Some(Arc::clone(&barrier))).build();
        manager.start().unwrap();

        thread::scope(|s| {
            s.spawn(|| barrier.wait());
            manager.create(config("content")).unwrap();
        });
        manager.freeze().unwrap();

        // The unfreeze lands while the update is restarting the store.
        thread::scope(|s| {
            s.spawn(|| {
                barrier.wait();
                manager.unfreeze().unwrap();
            });
            manager
                .update(config("content").with_attribute("k", "v"))
                .unwrap();
        });

        assert!(!manager.is_frozen());
        assert!(!manager.get("content").unwrap().unwrap().is_frozen());
    }

    #[test]
    fn update_keeps_registered_name_spelling() {
        let h = harness();
        h.manager.create(config("content")).unwrap();
        let store = h
            .manager
            .update(config("CONTENT").with_attribute("k", "v"))
            .unwrap();
        assert_eq!(store.name(), "content");
        assert_eq!(store.configuration().unwrap().attribute("k"), Some("v"));
        assert_eq!(h.persistence.get("content").unwrap().name, "content");
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    #[test]
    fn delete_removes_store_and_configuration() {
        let h = harness();
        let store = h.manager.create(config("content")).unwrap();
        assert!(h.manager.delete("CONTENT").unwrap());
        assert!(!h.manager.exists("content").unwrap());
        assert!(h.persistence.get("content").is_none());
        assert!(!store.is_started());
        assert_eq!(h.counters.shutdowns.load(Ordering::SeqCst), 1);
        assert!(!h.manager.delete("content").unwrap());
    }

    #[test]
    fn delete_in_use_store_is_refused() {
        let persistence = Arc::new(InMemoryConfigurationStore::new());
        let counters = Arc::new(Counters::default());
        let manager = builder_for(&persistence, &counters, None)
            .usage_checker(Arc::new(NamedInUse("content")))
            .build();
        manager.start().unwrap();
        manager.create(config("content")).unwrap();

        assert!(matches!(manager.delete("Content"), Err(DataStoreError::InUse(_))));
        assert!(manager.exists("content").unwrap());
        assert!(persistence.get("content").is_some());
    }

    #[test]
    fn delete_removes_configuration_even_if_shutdown_fails() {
        let h = harness();
        h.manager
            .create(config("content").with_attribute(FAIL_SHUTDOWN, "true"))
            .unwrap();
        let err = h.manager.delete("content").unwrap_err();
        assert!(matches!(err, DataStoreError::Lifecycle { .. }));
        assert!(!h.manager.exists("content").unwrap());
        assert!(h.persistence.get("content").is_none());
    }

    // -----------------------------------------------------------------------
    // Freeze
    // -----------------------------------------------------------------------

    #[test]
    fn freeze_propagates_to_existing_and_new_stores() {
        let h = harness();
        let before = h.manager.create(config("before")).unwrap();
        h.manager.freeze().unwrap();
        assert!(h.manager.is_frozen());
        assert!(before.is_frozen());

        let after = h.manager.create(config("after")).unwrap();
        assert!(after.is_frozen());

        h.manager.unfreeze().unwrap();
        assert!(!h.manager.is_frozen());
        assert!(!before.is_frozen());
        assert!(!after.is_frozen());
    }

    #[test]
    fn stores_created_concurrently_with_freeze_end_up_frozen() {
        let h = harness();
        let start = Barrier::new(9);
        thread::scope(|s| {
            for i in 0..8 {
                let manager = &h.manager;
                let start = &start;
                s.spawn(move || {
                    start.wait();
                    manager.create(config(&format!("s{i}"))).unwrap();
                });
            }
            start.wait();
            h.manager.freeze().unwrap();
        });

        let stores = h.manager.browse().unwrap();
        assert_eq!(stores.len(), 8);
        assert!(stores.iter().all(|s| s.is_frozen()));
    }

    // -----------------------------------------------------------------------
    // Start / stop
    // -----------------------------------------------------------------------

    #[test]
    fn start_brings_up_persisted_stores_and_skips_failures() {
        let h = harness_from(vec![
            config("a"),
            config("b").with_attribute(FAIL_START, "true"),
            config("c"),
        ]);
        let names: Vec<String> = h.manager.browse().unwrap().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn stop_shuts_down_every_store_despite_failures() {
        let h = harness_from(vec![
            config("a"),
            config("b").with_attribute(FAIL_SHUTDOWN, "true"),
            config("c"),
        ]);
        let stores = h.manager.browse().unwrap();
        h.manager.stop().unwrap();

        assert_eq!(h.counters.shutdowns.load(Ordering::SeqCst), 3);
        assert!(stores.iter().all(|s| !s.is_started()));
        assert!(!h.manager.is_started());
        h.manager.stop().unwrap();

        h.manager.start().unwrap();
        assert_eq!(h.manager.browse().unwrap().len(), 3);
    }

    #[test]
    fn sessions_on_missing_store_are_not_found() {
        let h = harness();
        assert!(matches!(h.manager.open_session("x"), Err(DataStoreError::NotFound(_))));
        assert!(matches!(
            h.manager.open_serializable_session("x"),
            Err(DataStoreError::NotFound(_))
        ));
        assert!(matches!(h.manager.open_connection("x"), Err(DataStoreError::NotFound(_))));
    }

    // -----------------------------------------------------------------------
    // Embedded store, restore and backup end to end
    // -----------------------------------------------------------------------

    fn embedded_manager(
        root: &Path,
        persistence: Arc<InMemoryConfigurationStore>,
    ) -> DataStoreManager {
        let db = root.join("db");
        let manager = DataStoreManager::builder(persistence)
            .descriptor(Arc::new(EmbeddedDescriptor::default()))
            .prototype(EMBEDDED_TYPE, EmbeddedDataStore::prototype(EmbeddedConfig::new(&db)))
            .restorer(DataStoreRestorer::new(RestoreConfig::new(root.join("backup"), &db)))
            .build();
        manager.start().unwrap();
        manager
    }

    #[test]
    fn restored_file_is_used_by_created_store() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("backup");
        std::fs::create_dir_all(&backup).unwrap();
        let entry = br#"{"greeting":[104,105]}"#;
        {
            let file = std::fs::File::create(backup.join("archive1.zip")).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("content.mv.db", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(entry).unwrap();
            zip.finish().unwrap();
        }

        let manager = embedded_manager(dir.path(), Arc::new(InMemoryConfigurationStore::new()));
        let config = StoreConfiguration::new("content", EMBEDDED_TYPE);
        let restorer = DataStoreRestorer::new(RestoreConfig::new(&backup, dir.path().join("db")));

        assert!(restorer.maybe_restore(&config).unwrap());
        assert_eq!(std::fs::read(dir.path().join("db/content.mv.db")).unwrap(), entry);

        manager.create(config).unwrap();
        let conn = manager.open_connection("content").unwrap();
        assert_eq!(conn.get("greeting").unwrap(), Some(b"hi".to_vec()));
    }

    #[test]
    fn backup_then_restore_on_restart() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(InMemoryConfigurationStore::new());

        let manager = embedded_manager(dir.path(), Arc::clone(&persistence));
        manager
            .create(StoreConfiguration::new("content", EMBEDDED_TYPE))
            .unwrap();
        let mut session = manager.open_serializable_session("content").unwrap();
        session.put("k", b"v".to_vec()).unwrap();
        session.commit().unwrap();
        manager.backup("content", &dir.path().join("backup")).unwrap();
        manager.stop().unwrap();

        std::fs::remove_file(dir.path().join("db/content.mv.db")).unwrap();

        let manager = embedded_manager(dir.path(), persistence);
        let session = manager.open_session("content").unwrap();
        assert_eq!(session.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn frozen_manager_blocks_embedded_writes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = embedded_manager(dir.path(), Arc::new(InMemoryConfigurationStore::new()));
        manager
            .create(StoreConfiguration::new("content", EMBEDDED_TYPE))
            .unwrap();
        manager.freeze().unwrap();
        let conn = manager.open_connection("content").unwrap();
        assert!(matches!(conn.put("k", vec![1]), Err(DataStoreError::Frozen(_))));
        manager.unfreeze().unwrap();
        conn.put("k", vec![1]).unwrap();
    }

    #[test]
    fn case_changing_update_keeps_embedded_data() {
        let dir = tempfile::tempdir().unwrap();
        let manager = embedded_manager(dir.path(), Arc::new(InMemoryConfigurationStore::new()));
        manager
            .create(StoreConfiguration::new("content", EMBEDDED_TYPE))
            .unwrap();
        manager
            .open_connection("content")
            .unwrap()
            .put("k", b"v".to_vec())
            .unwrap();

        let store = manager
            .update(StoreConfiguration::new("CONTENT", EMBEDDED_TYPE))
            .unwrap();
        assert_eq!(store.name(), "content");
        let value = manager.open_connection("content").unwrap().get("k").unwrap();
        assert_eq!(value, Some(b"v".to_vec()));

        let files: Vec<String> = std::fs::read_dir(dir.path().join("db"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec!["content.mv.db".to_string()]);
    }

    #[test]
    fn corrupt_backup_skips_only_that_store() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("backup");
        std::fs::create_dir_all(&backup).unwrap();
        std::fs::write(backup.join("broken.zip"), b"not a zip").unwrap();

        // "config" already has a data file, so its restore is skipped before
        // any archive is opened.
        let db = dir.path().join("db");
        std::fs::create_dir_all(&db).unwrap();
        std::fs::write(db.join("config.mv.db"), b"{}").unwrap();

        let persistence = Arc::new(InMemoryConfigurationStore::with_configurations(vec![
            StoreConfiguration::new("config", EMBEDDED_TYPE),
            StoreConfiguration::new("content", EMBEDDED_TYPE),
        ]));
        let manager = embedded_manager(dir.path(), persistence);
        assert!(manager.exists("config").unwrap());
        assert!(!manager.exists("content").unwrap());
    }
}
