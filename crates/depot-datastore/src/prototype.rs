use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::DataStore;

/// Produces a fresh, unconfigured store instance.
pub type DataStorePrototype = Arc<dyn Fn() -> Arc<dyn DataStore> + Send + Sync>;

/// Maps a store type name to the factory for its instances.
#[derive(Clone, Default)]
pub struct PrototypeRegistry {
    prototypes: HashMap<String, DataStorePrototype>,
}

impl PrototypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, store_type: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn DataStore> + Send + Sync + 'static,
    {
        self.prototypes.insert(store_type.into(), Arc::new(factory));
    }

    pub fn get(&self, store_type: &str) -> Option<DataStorePrototype> {
        self.prototypes.get(store_type).cloned()
    }

    /// Instantiate a new store of the given type.
    pub fn instantiate(&self, store_type: &str) -> Option<Arc<dyn DataStore>> {
        self.prototypes.get(store_type).map(|factory| factory())
    }
}

impl std::fmt::Debug for PrototypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.prototypes.keys().collect();
        types.sort();
        f.debug_struct("PrototypeRegistry")
            .field("types", &types)
            .finish()
    }
}
