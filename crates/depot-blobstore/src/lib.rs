//! Blob store groups and fill policies for depot.
//!
//! A [`BlobStoreGroup`] presents several physical blob stores as one. Its
//! configuration names the members, in order, and a fill policy that picks
//! the member receiving each write:
//!
//! - [`RoundRobinFillPolicy`] -- rotate across eligible members
//! - [`WriteToFirstFillPolicy`] -- first eligible member in order
//! - [`TwoTierCacheFillPolicy`] -- temporary blobs to member 0, the rest to member 1
//!
//! Members are resolved through a [`BlobStoreRegistry`] on every call.
//! [`BlobStoreGroupDescriptor`] checks a group's structural invariants
//! before a configuration is committed.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use depot_blobstore::{
//!     BlobStore, BlobStoreConfiguration, BlobStoreGroup, BlobStoreRegistry,
//!     FillPolicyRegistry, InMemoryBlobStore, InMemoryBlobStoreRegistry,
//! };
//! use depot_types::BlobHeaders;
//!
//! let registry = Arc::new(InMemoryBlobStoreRegistry::new());
//! registry.register(Arc::new(InMemoryBlobStore::new("fast")));
//! registry.register(Arc::new(InMemoryBlobStore::new("bulk")));
//!
//! let shared: Arc<dyn BlobStoreRegistry> = registry.clone();
//! let group = BlobStoreGroup::new(
//!     BlobStoreConfiguration::group("all", ["fast", "bulk"], "roundRobin"),
//!     &shared,
//!     Arc::new(FillPolicyRegistry::with_defaults()),
//! )
//! .unwrap();
//!
//! let blob = group.create(Bytes::from_static(b"hello"), &BlobHeaders::new()).unwrap();
//! assert!(registry.get("fast").unwrap().exists(blob.id()).unwrap());
//! ```

pub mod blob;
pub mod config;
pub mod error;
pub mod group;
pub mod memory;
pub mod metrics;
pub mod policy;
pub mod registry;
pub mod traits;
pub mod validator;

pub use blob::{Blob, BlobId};
pub use config::{BlobStoreConfiguration, FILL_POLICY_KEY, GROUP_SECTION, GROUP_TYPE, MEMBERS_KEY};
pub use error::{BlobStoreError, BlobStoreResult};
pub use group::{BlobStoreGroup, FALLBACK_FILL_POLICY};
pub use memory::{InMemoryBlobStore, MEMORY_TYPE};
pub use metrics::BlobStoreMetrics;
pub use policy::{
    FillPolicy, FillPolicyFactory, FillPolicyRegistry, RoundRobinFillPolicy,
    TwoTierCacheFillPolicy, WriteToFirstFillPolicy,
};
pub use registry::{BlobStoreRegistry, InMemoryBlobStoreRegistry};
pub use traits::BlobStore;
pub use validator::BlobStoreGroupDescriptor;
