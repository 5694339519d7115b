//! Lifecycle management of named data stores for depot.
//!
//! A data store is a named, typed, pluggable persistence engine. The
//! [`DataStoreManager`] owns every live store: it persists configurations,
//! instantiates stores from per-type prototypes, starts and stops them,
//! reconfigures them with rollback, and propagates the frozen flag. Before
//! a store starts for the first time on a node, the [`DataStoreRestorer`]
//! may materialise its data file from a zip backup.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use depot_datastore::{
//!     DataStoreManager, EmbeddedConfig, EmbeddedDataStore, EmbeddedDescriptor,
//!     InMemoryConfigurationStore, EMBEDDED_TYPE,
//! };
//! use depot_types::StoreConfiguration;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let manager = DataStoreManager::builder(Arc::new(InMemoryConfigurationStore::new()))
//!     .descriptor(Arc::new(EmbeddedDescriptor::default()))
//!     .prototype(EMBEDDED_TYPE, EmbeddedDataStore::prototype(EmbeddedConfig::new(dir.path())))
//!     .build();
//! manager.start().unwrap();
//!
//! manager.create(StoreConfiguration::new("content", EMBEDDED_TYPE)).unwrap();
//! let conn = manager.open_connection("CONTENT").unwrap();
//! conn.put("greeting", b"hello".to_vec()).unwrap();
//! assert_eq!(conn.get("greeting").unwrap(), Some(b"hello".to_vec()));
//! ```
//!
//! # Guarantees
//!
//! 1. At most one store per case-insensitive name is ever visible.
//! 2. A store is visible only after it started successfully.
//! 3. Every store published after `freeze` returns is frozen.
//! 4. A failed update leaves the previous configuration live and persisted.
//! 5. Restore never overwrites an existing data file.

pub mod descriptor;
pub mod embedded;
pub mod error;
pub mod manager;
pub mod persistence;
pub mod prototype;
pub mod restore;
pub mod traits;

pub use descriptor::{DataStoreDescriptor, DescriptorRegistry};
pub use embedded::{
    EmbeddedConfig, EmbeddedDataStore, EmbeddedDescriptor, DIRECTORY_ATTRIBUTE, EMBEDDED_TYPE,
    POOL_SIZE_ATTRIBUTE,
};
pub use error::{DataStoreError, DataStoreResult};
pub use manager::{
    ChangeOrigin, ConfigurationChanged, ConfigurationObserver, DataStoreManager,
    DataStoreManagerBuilder, ManagerConfig,
};
pub use persistence::{ConfigurationStore, FileConfigurationStore, InMemoryConfigurationStore};
pub use prototype::{DataStorePrototype, PrototypeRegistry};
pub use restore::{data_file_name, DataStoreRestorer, RestoreConfig, DEFAULT_DATA_EXTENSION};
pub use traits::{
    DataConnection, DataSession, DataStore, IsolationLevel, NeverInUse, UsageChecker,
};
