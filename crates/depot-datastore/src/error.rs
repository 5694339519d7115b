use depot_types::TypeError;

/// Errors from data store management operations.
#[derive(Debug, thiserror::Error)]
pub enum DataStoreError {
    /// The descriptor rejected the configuration, or no enabled descriptor
    /// exists for its type.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A store with this name is already registered.
    #[error("data store already exists: {0}")]
    AlreadyExists(String),

    /// A concurrent create of the same name won the registration race.
    #[error("data store was concurrently created: {0}")]
    DuplicateCreate(String),

    /// No live store is registered under this name.
    #[error("data store not found: {0}")]
    NotFound(String),

    /// The owning feature flag is off.
    #[error("feature disabled: {0}")]
    FeatureDisabled(String),

    /// A dependent resource still references the store.
    #[error("data store is in use: {0}")]
    InUse(String),

    /// Applying a new configuration failed. The store was rolled back to
    /// its previous configuration before this error was raised.
    #[error("failed to update data store {name}")]
    UpdateFailed {
        name: String,
        #[source]
        source: Box<DataStoreError>,
    },

    /// Restoring a store's data file from a backup archive failed.
    #[error("failed to restore data store {name}: {source}")]
    RestoreFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The store is frozen and rejects mutating operations.
    #[error("data store is frozen: {0}")]
    Frozen(String),

    /// A serializable session observed a concurrent commit.
    #[error("serialization conflict in {0}")]
    Conflict(String),

    /// The manager or store is not in the started state.
    #[error("not started: {0}")]
    NotStarted(String),

    /// A store failed to start, stop, or shut down.
    #[error("lifecycle failure for {name}: {reason}")]
    Lifecycle { name: String, reason: String },

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Reading or writing a backup archive failed.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl DataStoreError {
    /// Create a lifecycle error with a store name and reason.
    pub fn lifecycle(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lifecycle {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<TypeError> for DataStoreError {
    fn from(e: TypeError) -> Self {
        Self::InvalidConfig(e.to_string())
    }
}

/// Result alias for data store operations.
pub type DataStoreResult<T> = Result<T, DataStoreError>;
