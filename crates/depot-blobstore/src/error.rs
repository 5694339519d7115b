use crate::blob::BlobId;

/// Errors from blob store and group operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    /// A group configuration violates a structural invariant, or a fill
    /// policy's precondition is unmet.
    #[error("invalid blob store group configuration: {0}")]
    InvalidGroupConfiguration(String),

    /// No member can accept the write and there is no safe fallback.
    #[error("no storage available: {0}")]
    StorageUnavailable(String),

    /// No blob store is registered under this name.
    #[error("blob store not found: {0}")]
    NotFound(String),

    /// The blob does not exist in the store.
    #[error("blob not found: {0}")]
    BlobNotFound(BlobId),

    /// The owning feature flag is off.
    #[error("feature disabled: {0}")]
    FeatureDisabled(String),

    /// The store does not accept writes.
    #[error("blob store is read-only: {0}")]
    ReadOnly(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for blob store operations.
pub type BlobStoreResult<T> = Result<T, BlobStoreError>;
