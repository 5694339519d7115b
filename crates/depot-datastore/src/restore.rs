//! Restore of missing data files from backup archives.
//!
//! Backups are zip archives dropped into a well-known directory. Each
//! archive holds flat entries named `<lowercase store name>.<extension>`. When a store is
//! about to start and its data file is missing, [`DataStoreRestorer`]
//! extracts the entry from the newest archive that carries it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use depot_types::{StoreConfiguration, StoreKey};
use serde::{Deserialize, Serialize};

use crate::embedded::DIRECTORY_ATTRIBUTE;
use crate::error::{DataStoreError, DataStoreResult};

/// Extension of data files (and of the matching archive entries).
pub const DEFAULT_DATA_EXTENSION: &str = "mv.db";

/// File name of a store's data file.
///
/// Derived from the store's case-insensitive key, so every spelling of a
/// name maps to the same file.
pub fn data_file_name(store_name: &str, extension: &str) -> String {
    format!("{}.{extension}", StoreKey::new(store_name))
}

/// Where backups are found and where data files are restored to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Directory scanned for backup archives. Absent means "nothing to restore".
    pub backup_dir: PathBuf,
    /// Default destination directory for data files.
    pub data_dir: PathBuf,
    /// Data file extension, without the leading dot.
    pub extension: String,
}

impl RestoreConfig {
    pub fn new(backup_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            data_dir: data_dir.into(),
            extension: DEFAULT_DATA_EXTENSION.to_string(),
        }
    }
}

/// Materialises a store's data file from backup before the store starts.
#[derive(Clone, Debug)]
pub struct DataStoreRestorer {
    config: RestoreConfig,
}

impl DataStoreRestorer {
    pub fn new(config: RestoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RestoreConfig {
        &self.config
    }

    /// Restore the data file for `store` if it is missing and a backup holds it.
    ///
    /// Returns `Ok(true)` only if a file was extracted. A missing backup
    /// directory, an existing data file, or no matching archive entry all
    /// yield `Ok(false)`. Every I/O failure on the way is fatal and reported
    /// as [`DataStoreError::RestoreFailed`].
    pub fn maybe_restore(&self, store: &StoreConfiguration) -> DataStoreResult<bool> {
        let backup_dir = &self.config.backup_dir;
        if !backup_dir.is_dir() {
            tracing::debug!(dir = %backup_dir.display(), "no backup directory; nothing to restore");
            return Ok(false);
        }

        let failed = |source: io::Error| DataStoreError::RestoreFailed {
            name: store.name.clone(),
            source,
        };

        let file_name = data_file_name(&store.name, &self.config.extension);
        let dest_dir = store
            .attribute(DIRECTORY_ATTRIBUTE)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config.data_dir.clone());
        if !dest_dir.exists() {
            fs::create_dir_all(&dest_dir).map_err(failed)?;
        }

        let dest = dest_dir.join(&file_name);
        if dest.exists() {
            tracing::info!(store = %store.name, path = %dest.display(), "data file present; skipping restore");
            return Ok(false);
        }

        for archive in archives_newest_first(backup_dir).map_err(failed)? {
            if extract_entry(&archive, &file_name, &dest).map_err(failed)? {
                tracing::info!(
                    store = %store.name,
                    archive = %archive.display(),
                    "restored data file from backup"
                );
                return Ok(true);
            }
        }

        tracing::debug!(store = %store.name, "no backup archive contains {file_name}");
        Ok(false)
    }
}

/// Regular files in `dir`, newest modification time first, ties by name.
fn archives_newest_first(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut archives: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            archives.push((metadata.modified()?, entry.path()));
        }
    }
    archives.sort_by(|(ta, pa), (tb, pb)| tb.cmp(ta).then_with(|| pa.cmp(pb)));
    Ok(archives.into_iter().map(|(_, path)| path).collect())
}

/// Extract `entry_name` from the zip at `archive` into `dest`.
///
/// Returns `Ok(false)` if the archive has no such entry. The entry is
/// written to a temporary file beside `dest` and renamed into place, so a
/// failed extraction never leaves a partial data file.
fn extract_entry(archive: &Path, entry_name: &str, dest: &Path) -> io::Result<bool> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(zip_to_io)?;
    let mut entry = match zip.by_name(entry_name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(false),
        Err(e) => return Err(zip_to_io(e)),
    };

    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    io::copy(&mut entry, &mut tmp)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(true)
}

fn zip_to_io(e: zip::result::ZipError) -> io::Error {
    match e {
        zip::result::ZipError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}
