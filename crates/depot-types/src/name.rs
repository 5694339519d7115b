//! Store names and their case-insensitive registry keys.
//!
//! Valid store names:
//! - Must be non-empty and at most [`MAX_STORE_NAME_LEN`] characters
//! - Must contain only ASCII alphanumerics, `-`, `_` and `.`
//! - Must not start with `.`
//!
//! Names become file names (persisted configuration, data files, backup
//! archive entries), which is why the alphabet is this narrow.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Longest accepted store name.
pub const MAX_STORE_NAME_LEN: usize = 255;

/// Validate a store name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use depot_types::validate_store_name;
///
/// assert!(validate_store_name("content").is_ok());
/// assert!(validate_store_name("config-2.db").is_ok());
/// assert!(validate_store_name("").is_err());
/// assert!(validate_store_name("../escape").is_err());
/// ```
pub fn validate_store_name(name: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("store name must not be empty"));
    }
    if name.len() > MAX_STORE_NAME_LEN {
        return Err(invalid("store name is too long"));
    }
    if name.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(TypeError::InvalidName {
            name: name.to_string(),
            reason: format!("contains forbidden character: {ch:?}"),
        });
    }
    Ok(())
}

/// Case-insensitive key under which a named store is registered.
///
/// Two names that differ only in ASCII case map to the same key, so
/// `"Content"`, `"content"` and `"CONTENT"` all address one store.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreKey(String);

impl StoreKey {
    /// Normalise a store name into its registry key.
    pub fn new(name: &str) -> Self {
        Self(name.to_ascii_lowercase())
    }

    /// The normalised (lowercase) key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StoreKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey({})", self.0)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
