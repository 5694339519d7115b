//! Structural checks applied before a group configuration is committed.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{BlobStoreConfiguration, GROUP_TYPE};
use crate::error::{BlobStoreError, BlobStoreResult};
use crate::policy::FillPolicyRegistry;
use crate::registry::BlobStoreRegistry;

/// Descriptor of the group store type.
///
/// Enforces that a group:
///
/// 1. has at least one member and does not list itself,
/// 2. lists each member once,
/// 3. names a registered fill policy whose own requirements are met,
/// 4. only contains groupable stores that belong to no other group and
///    back no repository directly,
/// 5. never drops a member that is writable or still holds data.
pub struct BlobStoreGroupDescriptor {
    registry: Arc<dyn BlobStoreRegistry>,
    policies: Arc<FillPolicyRegistry>,
    enabled: bool,
}

impl BlobStoreGroupDescriptor {
    pub fn new(
        registry: Arc<dyn BlobStoreRegistry>,
        policies: Arc<FillPolicyRegistry>,
        enabled: bool,
    ) -> Self {
        Self {
            registry,
            policies,
            enabled,
        }
    }

    pub fn store_type(&self) -> &'static str {
        GROUP_TYPE
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Group configurations may only be edited while groups are enabled.
    pub fn is_modifiable(&self) -> bool {
        self.enabled
    }

    /// Whether `config` lists `store_name` as a member.
    pub fn config_has_dependency_on(config: &BlobStoreConfiguration, store_name: &str) -> bool {
        config.has_member(store_name)
    }

    /// Validate a new or updated group configuration.
    pub fn validate(&self, config: &BlobStoreConfiguration) -> BlobStoreResult<()> {
        if !self.enabled {
            return Err(BlobStoreError::FeatureDisabled("blob store groups".into()));
        }
        let name = &config.name;
        let members = config.member_names();
        if members.is_empty() {
            return Err(invalid(format!("group {name} must contain at least one member")));
        }
        if members.iter().any(|m| m == name) {
            return Err(invalid(format!("group {name} cannot contain itself")));
        }
        let mut seen = HashSet::new();
        for member in &members {
            if !seen.insert(member) {
                return Err(invalid(format!("group {name} lists {member} more than once")));
            }
        }

        for member in &members {
            self.validate_member(name, member)?;
        }

        let policy_type = config
            .fill_policy()
            .ok_or_else(|| invalid(format!("group {name} has no fill policy")))?;
        let policy = self
            .policies
            .create(policy_type)
            .ok_or_else(|| invalid(format!("unknown fill policy {policy_type}")))?;
        policy.validate(config)?;

        if let Some(current) = self.registry.configuration(name) {
            if current.is_group() {
                self.validate_dropped_members(&current, &members)?;
            }
        }
        Ok(())
    }

    fn validate_member(&self, group: &str, member: &str) -> BlobStoreResult<()> {
        let store = self
            .registry
            .get(member)
            .ok_or_else(|| invalid(format!("blob store {member} does not exist")))?;
        if !store.is_groupable() {
            return Err(invalid(format!("blob store {member} cannot be a group member")));
        }
        if let Some(parent) = self.registry.parent(member) {
            if parent != group {
                return Err(invalid(format!(
                    "blob store {member} is already a member of group {parent}"
                )));
            }
        }
        let usage = self.registry.usage_count(member);
        if usage > 0 {
            return Err(invalid(format!(
                "blob store {member} is in use by {usage} repositories"
            )));
        }
        Ok(())
    }

    fn validate_dropped_members(
        &self,
        current: &BlobStoreConfiguration,
        members: &[String],
    ) -> BlobStoreResult<()> {
        let dropped = current
            .member_names()
            .into_iter()
            .filter(|m| !members.contains(m));
        for member in dropped {
            let Some(store) = self.registry.get(&member) else {
                continue;
            };
            if store.is_writable() {
                return Err(invalid(format!(
                    "blob store {member} cannot be removed from group {} while writable",
                    current.name
                )));
            }
            if !store.is_empty()? {
                return Err(invalid(format!(
                    "blob store {member} cannot be removed from group {} while it holds blobs",
                    current.name
                )));
            }
        }
        Ok(())
    }
}

fn invalid(reason: String) -> BlobStoreError {
    BlobStoreError::InvalidGroupConfiguration(reason)
}

impl std::fmt::Debug for BlobStoreGroupDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStoreGroupDescriptor")
            .field("enabled", &self.enabled)
            .field("policies", &self.policies)
            .finish()
    }
}
