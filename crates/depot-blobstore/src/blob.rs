use std::fmt;

use bytes::Bytes;
use depot_types::BlobHeaders;
use serde::{Deserialize, Serialize};

/// Identifier of a blob, unique across every blob store.
///
/// New identifiers are time-ordered UUIDv7 strings.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BlobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BlobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.0)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored content plus the headers it was written with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    id: BlobId,
    bytes: Bytes,
    headers: BlobHeaders,
    deleted: bool,
}

impl Blob {
    pub fn new(id: BlobId, bytes: Bytes, headers: BlobHeaders) -> Self {
        Self {
            id,
            bytes,
            headers,
            deleted: false,
        }
    }

    pub fn id(&self) -> &BlobId {
        &self.id
    }

    /// Content. Cloning the returned `Bytes` is cheap.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn headers(&self) -> &BlobHeaders {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the blob has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    pub(crate) fn mark_undeleted(&mut self) {
        self.deleted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        let a = BlobId::generate();
        let b = BlobId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn id_serializes_as_plain_string() {
        let id = BlobId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        assert_eq!(format!("{id}"), "abc");
        assert_eq!(format!("{id:?}"), "BlobId(abc)");
    }

    #[test]
    fn new_blob_is_live() {
        let mut blob = Blob::new(BlobId::from("x"), Bytes::from_static(b"data"), BlobHeaders::new());
        assert_eq!(blob.len(), 4);
        assert!(!blob.is_deleted());
        blob.mark_deleted();
        assert!(blob.is_deleted());
    }
}
