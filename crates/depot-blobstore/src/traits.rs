use std::fmt;

use bytes::Bytes;
use depot_types::BlobHeaders;

use crate::blob::{Blob, BlobId};
use crate::config::BlobStoreConfiguration;
use crate::error::BlobStoreResult;
use crate::metrics::BlobStoreMetrics;

/// A named store of immutable blobs.
///
/// Implementations must be safe to share across threads; a group holds
/// its members only through the registry and may call any of them
/// concurrently.
pub trait BlobStore: Send + Sync {
    /// Name of the store, taken from its configuration.
    fn name(&self) -> String {
        self.configuration().name
    }

    fn configuration(&self) -> BlobStoreConfiguration;

    /// Store new content under a freshly generated id.
    fn create(&self, bytes: Bytes, headers: &BlobHeaders) -> BlobStoreResult<Blob>;

    /// Duplicate an existing blob under a new id within this store.
    ///
    /// `headers` are layered over the source blob's headers.
    fn copy(&self, id: &BlobId, headers: &BlobHeaders) -> BlobStoreResult<Blob>;

    /// Read a blob. Soft-deleted blobs are returned only when
    /// `include_deleted` is set.
    fn get(&self, id: &BlobId, include_deleted: bool) -> BlobStoreResult<Option<Blob>>;

    /// Whether the store holds the blob, deleted or not.
    fn exists(&self, id: &BlobId) -> BlobStoreResult<bool>;

    /// Soft-delete. Returns `true` if the blob was present.
    fn delete(&self, id: &BlobId, reason: &str) -> BlobStoreResult<bool>;

    /// Remove the blob permanently. Returns `true` if it was present.
    fn delete_hard(&self, id: &BlobId) -> BlobStoreResult<bool>;

    /// Reverse a soft delete. Returns `true` if a deleted blob was restored.
    fn undelete(&self, id: &BlobId) -> BlobStoreResult<bool>;

    /// Every blob id held by the store.
    fn blob_ids(&self) -> BlobStoreResult<Vec<BlobId>>;

    fn is_writable(&self) -> bool;

    /// Whether the backing storage has room and is reachable.
    fn is_storage_available(&self) -> bool;

    /// Whether the store may be nested as a member of a group.
    fn is_groupable(&self) -> bool {
        true
    }

    fn is_empty(&self) -> BlobStoreResult<bool>;

    fn metrics(&self) -> BlobStoreResult<BlobStoreMetrics>;
}

impl fmt::Debug for dyn BlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStore")
            .field("name", &self.name())
            .field("writable", &self.is_writable())
            .field("available", &self.is_storage_available())
            .finish()
    }
}

/// Whether a store can take a write right now.
pub(crate) fn is_eligible(store: &dyn BlobStore) -> bool {
    store.is_writable() && store.is_storage_available()
}
