use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use bytes::Bytes;
use depot_types::BlobHeaders;

use crate::blob::{Blob, BlobId};
use crate::config::BlobStoreConfiguration;
use crate::error::{BlobStoreError, BlobStoreResult};
use crate::metrics::BlobStoreMetrics;
use crate::traits::BlobStore;

/// Store type of [`InMemoryBlobStore`].
pub const MEMORY_TYPE: &str = "Memory";

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Writability and storage availability
/// can be toggled at runtime to exercise fill policies.
pub struct InMemoryBlobStore {
    config: BlobStoreConfiguration,
    blobs: RwLock<HashMap<BlobId, Blob>>,
    writable: AtomicBool,
    available: AtomicBool,
}

impl InMemoryBlobStore {
    /// Create an empty, writable store.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_configuration(BlobStoreConfiguration::new(name, MEMORY_TYPE))
    }

    pub fn with_configuration(config: BlobStoreConfiguration) -> Self {
        Self {
            config,
            blobs: RwLock::new(HashMap::new()),
            writable: AtomicBool::new(true),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    pub fn set_storage_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of blobs held, including soft-deleted ones.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Store an existing blob under its own id, as when migrating content
    /// between stores.
    pub fn import(&self, blob: Blob) -> BlobStoreResult<()> {
        self.check_writable()?;
        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(blob.id().clone(), blob);
        Ok(())
    }

    fn check_writable(&self) -> BlobStoreResult<()> {
        if !self.writable.load(Ordering::SeqCst) {
            return Err(BlobStoreError::ReadOnly(self.config.name.clone()));
        }
        Ok(())
    }

    fn insert(&self, bytes: Bytes, headers: BlobHeaders) -> Blob {
        let blob = Blob::new(BlobId::generate(), bytes, headers);
        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(blob.id().clone(), blob.clone());
        blob
    }
}

impl BlobStore for InMemoryBlobStore {
    fn name(&self) -> String {
        self.config.name.clone()
    }

    fn configuration(&self) -> BlobStoreConfiguration {
        self.config.clone()
    }

    fn create(&self, bytes: Bytes, headers: &BlobHeaders) -> BlobStoreResult<Blob> {
        self.check_writable()?;
        let blob = self.insert(bytes, headers.clone());
        tracing::trace!(store = %self.config.name, blob = %blob.id(), "blob created");
        Ok(blob)
    }

    fn copy(&self, id: &BlobId, headers: &BlobHeaders) -> BlobStoreResult<Blob> {
        self.check_writable()?;
        let source = self
            .get(id, false)?
            .ok_or_else(|| BlobStoreError::BlobNotFound(id.clone()))?;
        let mut merged = source.headers().clone();
        for (key, value) in headers.iter() {
            merged.insert(key, value);
        }
        Ok(self.insert(source.bytes().clone(), merged))
    }

    fn get(&self, id: &BlobId, include_deleted: bool) -> BlobStoreResult<Option<Blob>> {
        let blobs = self.blobs.read().expect("lock poisoned");
        Ok(blobs
            .get(id)
            .filter(|blob| include_deleted || !blob.is_deleted())
            .cloned())
    }

    fn exists(&self, id: &BlobId) -> BlobStoreResult<bool> {
        Ok(self.blobs.read().expect("lock poisoned").contains_key(id))
    }

    fn delete(&self, id: &BlobId, reason: &str) -> BlobStoreResult<bool> {
        let mut blobs = self.blobs.write().expect("lock poisoned");
        match blobs.get_mut(id) {
            Some(blob) => {
                blob.mark_deleted();
                tracing::debug!(store = %self.config.name, blob = %id, reason, "blob soft-deleted");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_hard(&self, id: &BlobId) -> BlobStoreResult<bool> {
        Ok(self
            .blobs
            .write()
            .expect("lock poisoned")
            .remove(id)
            .is_some())
    }

    fn undelete(&self, id: &BlobId) -> BlobStoreResult<bool> {
        let mut blobs = self.blobs.write().expect("lock poisoned");
        match blobs.get_mut(id) {
            Some(blob) if blob.is_deleted() => {
                blob.mark_undeleted();
                tracing::debug!(store = %self.config.name, blob = %id, "blob undeleted");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn blob_ids(&self) -> BlobStoreResult<Vec<BlobId>> {
        let mut ids: Vec<BlobId> = self
            .blobs
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }

    fn is_storage_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn is_empty(&self) -> BlobStoreResult<bool> {
        Ok(self.blobs.read().expect("lock poisoned").is_empty())
    }

    fn metrics(&self) -> BlobStoreResult<BlobStoreMetrics> {
        Ok(self
            .blobs
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|blob| !blob.is_deleted())
            .map(|blob| BlobStoreMetrics {
                blob_count: 1,
                total_size: blob.len() as u64,
            })
            .sum())
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("name", &self.config.name)
            .field("blob_count", &self.len())
            .field("writable", &self.is_writable())
            .finish()
    }
}
