use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Marks a blob as short-lived staging content.
pub const TEMPORARY_BLOB_HEADER: &str = "BlobStore.temporary-blob";

/// Logical name of the blob (typically the repository path).
pub const BLOB_NAME_HEADER: &str = "BlobStore.blob-name";

/// Principal that created the blob.
pub const CREATED_BY_HEADER: &str = "BlobStore.created-by";

/// Out-of-band hints attached to a blob write.
///
/// Headers are stored alongside the blob and are consulted by fill
/// policies when choosing where a write should land.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobHeaders(BTreeMap<String, String>);

impl BlobHeaders {
    /// Empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers for a temporary blob.
    pub fn temporary() -> Self {
        Self::new().with(TEMPORARY_BLOB_HEADER, "true")
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether the temporary-blob header is present.
    ///
    /// Presence is what counts, not the value.
    pub fn is_temporary(&self) -> bool {
        self.0.contains_key(TEMPORARY_BLOB_HEADER)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for BlobHeaders {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
