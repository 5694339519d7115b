use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::name::{validate_store_name, StoreKey};

/// Origin tag for configurations created on this node.
pub const LOCAL_SOURCE: &str = "local";

/// Attribute keys whose values are masked in `Debug` output.
const SECRET_MARKERS: &[&str] = &["password", "secret", "token", "credential"];

/// Configuration of a named data store.
///
/// This is an immutable value exchanged between the data store manager and
/// configuration persistence. A running store holds the configuration that
/// is currently applied to it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfiguration {
    /// Unique store name. Lookups are case-insensitive; see [`StoreKey`].
    pub name: String,
    /// Selects the descriptor and prototype for this store.
    #[serde(rename = "type")]
    pub store_type: String,
    /// Origin tag, e.g. `local` or a replication peer.
    #[serde(default = "default_source")]
    pub source: String,
    /// Opaque type-specific attributes. May contain secrets.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

fn default_source() -> String {
    LOCAL_SOURCE.to_string()
}

impl StoreConfiguration {
    /// Create a local configuration with no attributes.
    pub fn new(name: impl Into<String>, store_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_type: store_type.into(),
            source: default_source(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style origin tag.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Builder-style attribute insert.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The case-insensitive registry key for this store.
    pub fn key(&self) -> StoreKey {
        StoreKey::new(&self.name)
    }

    /// Look up an attribute value.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Look up an attribute that must be present.
    pub fn require_attribute(&self, key: &str) -> Result<&str, TypeError> {
        self.attribute(key)
            .ok_or_else(|| TypeError::MissingAttribute(key.to_string()))
    }

    /// Validate the store name.
    pub fn validate_name(&self) -> Result<(), TypeError> {
        validate_store_name(&self.name)
    }
}

fn is_secret(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SECRET_MARKERS.iter().any(|marker| key.contains(marker))
}

impl fmt::Debug for StoreConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attributes: BTreeMap<&str, &str> = self
            .attributes
            .iter()
            .map(|(k, v)| {
                let shown = if is_secret(k) { "****" } else { v.as_str() };
                (k.as_str(), shown)
            })
            .collect();
        f.debug_struct("StoreConfiguration")
            .field("name", &self.name)
            .field("type", &self.store_type)
            .field("source", &self.source)
            .field("attributes", &attributes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_to_local_source() {
        let config = StoreConfiguration::new("content", "embedded");
        assert_eq!(config.source, LOCAL_SOURCE);
        assert!(config.attributes.is_empty());
    }

    #[test]
    fn key_is_lowercase() {
        let config = StoreConfiguration::new("Content", "embedded");
        assert_eq!(config.key().as_str(), "content");
    }

    #[test]
    fn require_attribute_reports_missing_key() {
        let config = StoreConfiguration::new("content", "embedded").with_attribute("a", "1");
        assert_eq!(config.require_attribute("a").unwrap(), "1");
        assert_eq!(
            config.require_attribute("b").unwrap_err(),
            TypeError::MissingAttribute("b".into())
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = StoreConfiguration::new("content", "embedded")
            .with_attribute("password", "hunter2")
            .with_attribute("apiToken", "abc")
            .with_attribute("maximumPoolSize", "10");
        let shown = format!("{config:?}");
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("abc"));
        assert!(shown.contains("maximumPoolSize"));
        assert!(shown.contains("10"));
    }

    #[test]
    fn toml_round_trip_uses_type_key() {
        let config = StoreConfiguration::new("content", "embedded").with_attribute("k", "v");
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("type = \"embedded\""));
        let back: StoreConfiguration = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn missing_source_deserializes_as_local() {
        let back: StoreConfiguration =
            serde_json::from_str(r#"{"name":"x","type":"embedded"}"#).unwrap();
        assert_eq!(back.source, LOCAL_SOURCE);
    }
}
