use std::collections::HashMap;
use std::sync::Arc;

use depot_types::StoreConfiguration;

use crate::error::DataStoreResult;

/// Knows how to validate configurations of one store type.
pub trait DataStoreDescriptor: Send + Sync {
    /// The store type this descriptor handles (e.g. `"embedded"`).
    fn store_type(&self) -> &str;

    /// Whether stores of this type may currently be created or updated.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Reject malformed configurations with
    /// [`DataStoreError::InvalidConfig`](crate::DataStoreError::InvalidConfig).
    fn validate(&self, config: &StoreConfiguration) -> DataStoreResult<()>;
}

/// Maps a store type name to its descriptor.
#[derive(Clone, Default)]
pub struct DescriptorRegistry {
    descriptors: HashMap<String, Arc<dyn DataStoreDescriptor>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under its own store type, replacing any
    /// previous registration.
    pub fn register(&mut self, descriptor: Arc<dyn DataStoreDescriptor>) {
        self.descriptors
            .insert(descriptor.store_type().to_string(), descriptor);
    }

    pub fn get(&self, store_type: &str) -> Option<Arc<dyn DataStoreDescriptor>> {
        self.descriptors.get(store_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl std::fmt::Debug for DescriptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.descriptors.keys().collect();
        types.sort();
        f.debug_struct("DescriptorRegistry")
            .field("types", &types)
            .finish()
    }
}
