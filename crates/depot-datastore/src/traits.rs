use std::fmt;
use std::path::{Path, PathBuf};

use depot_types::StoreConfiguration;

use crate::error::DataStoreResult;

/// Transaction isolation requested when opening a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Reads see committed data only.
    #[default]
    ReadCommitted,
    /// Strictest level: the session behaves as if run alone.
    Serializable,
}

/// A unit of work against one data store.
///
/// Writes are buffered until [`DataSession::commit`]. Dropping a session
/// without committing discards its writes.
pub trait DataSession: Send {
    /// Isolation level this session was opened with.
    fn isolation(&self) -> IsolationLevel;

    /// Read a value, observing this session's own uncommitted writes.
    fn get(&self, key: &str) -> DataStoreResult<Option<Vec<u8>>>;

    /// Buffer a write.
    fn put(&mut self, key: &str, value: Vec<u8>) -> DataStoreResult<()>;

    /// Buffer a removal. Returns `true` if the key was visible to this session.
    fn remove(&mut self, key: &str) -> DataStoreResult<bool>;

    /// Apply all buffered writes atomically.
    fn commit(self: Box<Self>) -> DataStoreResult<()>;
}

/// Direct, auto-committing access to one data store.
pub trait DataConnection: Send {
    fn get(&self, key: &str) -> DataStoreResult<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: Vec<u8>) -> DataStoreResult<()>;

    fn remove(&self, key: &str) -> DataStoreResult<bool>;

    /// All keys, sorted.
    fn keys(&self) -> DataStoreResult<Vec<String>>;
}

/// A named, lifecycle-managed wrapper around one persistence engine.
///
/// Lifecycle: constructed (from a prototype) → configured → started →
/// (optionally frozen) → stopped → shut down. Once registered with the
/// [`DataStoreManager`](crate::DataStoreManager) only the manager drives
/// these transitions.
///
/// All methods take `&self`: a published store is shared and is responsible
/// for its own internal synchronisation.
pub trait DataStore: Send + Sync {
    /// Name of the store, taken from its configuration.
    ///
    /// Empty until a configuration has been applied.
    fn name(&self) -> String {
        self.configuration().map(|c| c.name).unwrap_or_default()
    }

    /// The configuration currently applied, if any.
    fn configuration(&self) -> Option<StoreConfiguration>;

    /// Attach a configuration. Only legal while the store is not started.
    fn set_configuration(&self, config: StoreConfiguration) -> DataStoreResult<()>;

    /// Open the underlying engine so sessions can be created.
    fn start(&self) -> DataStoreResult<()>;

    /// Close the underlying engine. The store may be started again.
    fn stop(&self) -> DataStoreResult<()>;

    /// Permanently stop the store regardless of its current state.
    fn shutdown(&self) -> DataStoreResult<()>;

    fn is_started(&self) -> bool;

    /// Enter the read-mostly barrier state; mutating operations are rejected.
    fn freeze(&self);

    fn unfreeze(&self);

    fn is_frozen(&self) -> bool;

    fn open_session(&self, isolation: IsolationLevel) -> DataStoreResult<Box<dyn DataSession>>;

    fn open_connection(&self) -> DataStoreResult<Box<dyn DataConnection>>;

    /// Write a backup archive of the store into `dir`, returning its path.
    fn backup(&self, dir: &Path) -> DataStoreResult<PathBuf>;
}

impl fmt::Debug for dyn DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStore")
            .field("name", &self.name())
            .field("started", &self.is_started())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

/// Consulted before a store is deleted.
pub trait UsageChecker: Send + Sync {
    /// Whether any dependent resource still references the named store.
    fn is_store_in_use(&self, name: &str) -> bool;
}

/// A [`UsageChecker`] that never reports a store as in use.
pub struct NeverInUse;

impl UsageChecker for NeverInUse {
    fn is_store_in_use(&self, _name: &str) -> bool {
        false
    }
}
