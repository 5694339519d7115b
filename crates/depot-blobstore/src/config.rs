//! Blob store configuration and the group attribute layout.
//!
//! Attributes are grouped into sections. A group keeps its settings in the
//! `group` section:
//!
//! ```toml
//! name = "all"
//! type = "Group"
//!
//! [attributes.group]
//! members = ["fast", "bulk"]
//! fillPolicy = "roundRobin"
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Store type of a blob store group.
pub const GROUP_TYPE: &str = "Group";

/// Attribute section holding group settings.
pub const GROUP_SECTION: &str = "group";

/// Ordered list of member store names.
pub const MEMBERS_KEY: &str = "members";

/// Identifier of the group's fill policy.
pub const FILL_POLICY_KEY: &str = "fillPolicy";

/// Named, typed configuration of one blob store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlobStoreConfiguration {
    pub name: String,
    #[serde(rename = "type")]
    pub store_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, BTreeMap<String, Value>>,
}

impl BlobStoreConfiguration {
    pub fn new(name: impl Into<String>, store_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_type: store_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Configuration of a group with the given members and fill policy.
    pub fn group<I, S>(name: impl Into<String>, members: I, fill_policy: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Self::new(name, GROUP_TYPE);
        config.set_member_names(members);
        config.set_fill_policy(fill_policy);
        config
    }

    pub fn is_group(&self) -> bool {
        self.store_type == GROUP_TYPE
    }

    pub fn attribute(&self, section: &str, key: &str) -> Option<&Value> {
        self.attributes.get(section)?.get(key)
    }

    pub fn set_attribute(&mut self, section: &str, key: &str, value: Value) {
        self.attributes
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Member names in configured order. Non-string entries are ignored.
    pub fn member_names(&self) -> Vec<String> {
        match self.attribute(GROUP_SECTION, MEMBERS_KEY) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn set_member_names<I, S>(&mut self, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members = members
            .into_iter()
            .map(|m| Value::String(m.into()))
            .collect();
        self.set_attribute(GROUP_SECTION, MEMBERS_KEY, Value::Array(members));
    }

    pub fn fill_policy(&self) -> Option<&str> {
        self.attribute(GROUP_SECTION, FILL_POLICY_KEY)?.as_str()
    }

    pub fn set_fill_policy(&mut self, policy: &str) {
        self.set_attribute(GROUP_SECTION, FILL_POLICY_KEY, Value::String(policy.to_string()));
    }

    /// Whether `store_name` is one of this configuration's group members.
    pub fn has_member(&self, store_name: &str) -> bool {
        self.member_names().iter().any(|m| m == store_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_helpers_round_trip() {
        let config = BlobStoreConfiguration::group("all", ["fast", "bulk"], "roundRobin");
        assert!(config.is_group());
        assert_eq!(config.member_names(), vec!["fast", "bulk"]);
        assert_eq!(config.fill_policy(), Some("roundRobin"));
        assert!(config.has_member("bulk"));
        assert!(!config.has_member("all"));
    }

    #[test]
    fn leaf_store_has_no_members() {
        let config = BlobStoreConfiguration::new("fast", "Memory");
        assert!(!config.is_group());
        assert!(config.member_names().is_empty());
        assert!(config.fill_policy().is_none());
    }

    #[test]
    fn non_string_members_are_ignored() {
        let mut config = BlobStoreConfiguration::new("g", GROUP_TYPE);
        config.set_attribute(
            GROUP_SECTION,
            MEMBERS_KEY,
            serde_json::json!(["a", 7, null, "b"]),
        );
        assert_eq!(config.member_names(), vec!["a", "b"]);
    }

    #[test]
    fn parses_from_json_document() {
        let config: BlobStoreConfiguration = serde_json::from_str(
            r#"{"name":"all","type":"Group","attributes":{"group":{"members":["x"],"fillPolicy":"writeToFirst"}}}"#,
        )
        .unwrap();
        assert_eq!(config.member_names(), vec!["x"]);
        assert_eq!(config.fill_policy(), Some("writeToFirst"));
    }
}
