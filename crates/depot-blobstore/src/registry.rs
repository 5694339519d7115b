use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::config::BlobStoreConfiguration;
use crate::traits::BlobStore;

/// Inventory of named blob stores, independent of grouping.
pub trait BlobStoreRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<dyn BlobStore>>;

    /// Name of the group that lists `name` as a member, if any.
    fn parent(&self, name: &str) -> Option<String>;

    /// Number of repositories using `name` as their storage.
    fn usage_count(&self, name: &str) -> usize;

    /// Current configuration of a registered store.
    fn configuration(&self, name: &str) -> Option<BlobStoreConfiguration> {
        self.get(name).map(|store| store.configuration())
    }
}

/// In-memory [`BlobStoreRegistry`].
#[derive(Default)]
pub struct InMemoryBlobStoreRegistry {
    stores: RwLock<BTreeMap<String, Arc<dyn BlobStore>>>,
    usage: RwLock<HashMap<String, usize>>,
}

impl InMemoryBlobStoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store under its configured name, replacing any previous one.
    pub fn register(&self, store: Arc<dyn BlobStore>) {
        let name = store.name();
        tracing::debug!(store = %name, "blob store registered");
        self.stores
            .write()
            .expect("lock poisoned")
            .insert(name, store);
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn BlobStore>> {
        self.stores.write().expect("lock poisoned").remove(name)
    }

    pub fn set_usage_count(&self, name: &str, count: usize) {
        let mut usage = self.usage.write().expect("lock poisoned");
        if count == 0 {
            usage.remove(name);
        } else {
            usage.insert(name.to_string(), count);
        }
    }

    /// Registered store names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.stores
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl BlobStoreRegistry for InMemoryBlobStoreRegistry {
    fn get(&self, name: &str) -> Option<Arc<dyn BlobStore>> {
        self.stores.read().expect("lock poisoned").get(name).cloned()
    }

    fn parent(&self, name: &str) -> Option<String> {
        self.stores
            .read()
            .expect("lock poisoned")
            .values()
            .map(|store| store.configuration())
            .find(|config| config.is_group() && config.has_member(name))
            .map(|config| config.name)
    }

    fn usage_count(&self, name: &str) -> usize {
        self.usage
            .read()
            .expect("lock poisoned")
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for InMemoryBlobStoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStoreRegistry")
            .field("stores", &self.names())
            .finish()
    }
}
