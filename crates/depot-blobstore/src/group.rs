//! A virtual blob store composed of member stores.
//!
//! Members are looked up by name in the [`BlobStoreRegistry`] on every
//! call, so a membership change is visible to the very next operation.
//! Writes go to the member chosen by the group's [`FillPolicy`]. Reads fan
//! out across members, preferring writable ones, and remember where a
//! blob was found as long as that member is writable.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use bytes::Bytes;
use depot_types::BlobHeaders;
use tracing::{debug, trace, warn};

use crate::blob::{Blob, BlobId};
use crate::config::BlobStoreConfiguration;
use crate::error::{BlobStoreError, BlobStoreResult};
use crate::metrics::BlobStoreMetrics;
use crate::policy::{write_to_first, FillPolicy, FillPolicyRegistry};
use crate::registry::BlobStoreRegistry;
use crate::traits::BlobStore;

/// Fill policy used when a group names one that is not registered.
pub const FALLBACK_FILL_POLICY: &str = write_to_first::TYPE;

struct GroupState {
    config: BlobStoreConfiguration,
    fill_policy: Arc<dyn FillPolicy>,
}

/// Blob store group; see the module docs.
pub struct BlobStoreGroup {
    registry: Weak<dyn BlobStoreRegistry>,
    policies: Arc<FillPolicyRegistry>,
    state: RwLock<GroupState>,
    /// Blob id to the name of the writable member holding it.
    located: RwLock<HashMap<BlobId, String>>,
}

impl BlobStoreGroup {
    /// Create a group from its configuration.
    ///
    /// The group holds the registry weakly; the registry normally owns
    /// the group.
    pub fn new(
        config: BlobStoreConfiguration,
        registry: &Arc<dyn BlobStoreRegistry>,
        policies: Arc<FillPolicyRegistry>,
    ) -> BlobStoreResult<Self> {
        let fill_policy = resolve_policy(&config, &policies)?;
        Ok(Self {
            registry: Arc::downgrade(registry),
            policies,
            state: RwLock::new(GroupState {
                config,
                fill_policy,
            }),
            located: RwLock::new(HashMap::new()),
        })
    }

    /// Swap in a new member list and fill policy.
    ///
    /// The located-blob cache is cleared.
    pub fn reconfigure(&self, config: BlobStoreConfiguration) -> BlobStoreResult<()> {
        let fill_policy = resolve_policy(&config, &self.policies)?;
        {
            let mut state = self.state.write().expect("lock poisoned");
            if state.config.name != config.name {
                return Err(BlobStoreError::InvalidGroupConfiguration(format!(
                    "group name is immutable: {} cannot become {}",
                    state.config.name, config.name
                )));
            }
            state.config = config;
            state.fill_policy = fill_policy;
        }
        self.located.write().expect("lock poisoned").clear();
        debug!(group = %self.name(), "blob store group reconfigured");
        Ok(())
    }

    /// Identifier of the fill policy in effect.
    pub fn fill_policy_type(&self) -> &'static str {
        self.policy().policy_type()
    }

    pub fn member_names(&self) -> Vec<String> {
        self.state
            .read()
            .expect("lock poisoned")
            .config
            .member_names()
    }

    /// Members resolved from the registry, in configured order.
    pub fn members(&self) -> BlobStoreResult<Vec<Arc<dyn BlobStore>>> {
        let registry = self.registry()?;
        self.member_names()
            .into_iter()
            .map(|name| {
                registry
                    .get(&name)
                    .ok_or(BlobStoreError::NotFound(name))
            })
            .collect()
    }

    fn registry(&self) -> BlobStoreResult<Arc<dyn BlobStoreRegistry>> {
        self.registry.upgrade().ok_or_else(|| {
            BlobStoreError::StorageUnavailable("blob store registry has been dropped".into())
        })
    }

    fn policy(&self) -> Arc<dyn FillPolicy> {
        Arc::clone(&self.state.read().expect("lock poisoned").fill_policy)
    }

    fn remember(&self, id: &BlobId, member: &dyn BlobStore) {
        if member.is_writable() {
            let name = member.name();
            trace!(blob = %id, member = %name, "caching blob location");
            self.located
                .write()
                .expect("lock poisoned")
                .insert(id.clone(), name);
        }
    }

    fn forget(&self, id: &BlobId) {
        self.located.write().expect("lock poisoned").remove(id);
    }

    /// Find the member holding `id`.
    pub fn locate(&self, id: &BlobId) -> BlobStoreResult<Option<Arc<dyn BlobStore>>> {
        let cached = self.located.read().expect("lock poisoned").get(id).cloned();
        if let Some(name) = cached {
            if self.member_names().contains(&name) {
                if let Some(store) = self.registry()?.get(&name) {
                    trace!(blob = %id, member = %name, "blob location was cached");
                    return Ok(Some(store));
                }
            }
            self.forget(id);
        }

        let mut members = self.members()?;
        // Stable: writable members first, otherwise configured order.
        members.sort_by_key(|member| !member.is_writable());
        for member in members {
            if member.exists(id)? {
                self.remember(id, member.as_ref());
                return Ok(Some(member));
            }
        }
        Ok(None)
    }

    fn holders(&self, id: &BlobId) -> BlobStoreResult<Vec<Arc<dyn BlobStore>>> {
        let mut holders = Vec::new();
        for member in self.members()? {
            if member.exists(id)? {
                holders.push(member);
            }
        }
        Ok(holders)
    }
}

fn resolve_policy(
    config: &BlobStoreConfiguration,
    policies: &FillPolicyRegistry,
) -> BlobStoreResult<Arc<dyn FillPolicy>> {
    if !config.is_group() {
        return Err(BlobStoreError::InvalidGroupConfiguration(format!(
            "{} has type {}, not a group",
            config.name, config.store_type
        )));
    }
    let requested = config.fill_policy().unwrap_or(FALLBACK_FILL_POLICY);
    if let Some(policy) = policies.create(requested) {
        return Ok(policy);
    }
    warn!(
        group = %config.name,
        policy = requested,
        fallback = FALLBACK_FILL_POLICY,
        "unknown fill policy; using fallback"
    );
    policies.create(FALLBACK_FILL_POLICY).ok_or_else(|| {
        BlobStoreError::InvalidGroupConfiguration(format!(
            "neither fill policy {requested} nor {FALLBACK_FILL_POLICY} is registered"
        ))
    })
}

impl BlobStore for BlobStoreGroup {
    fn name(&self) -> String {
        self.state.read().expect("lock poisoned").config.name.clone()
    }

    fn configuration(&self) -> BlobStoreConfiguration {
        self.state.read().expect("lock poisoned").config.clone()
    }

    fn create(&self, bytes: Bytes, headers: &BlobHeaders) -> BlobStoreResult<Blob> {
        let members = self.members()?;
        let target = self
            .policy()
            .choose_for_create(&members, headers)?
            .ok_or_else(|| {
                BlobStoreError::StorageUnavailable(format!(
                    "no member of group {} can accept a new blob",
                    self.name()
                ))
            })?;
        let blob = target.create(bytes, headers)?;
        self.remember(blob.id(), target.as_ref());
        Ok(blob)
    }

    fn copy(&self, id: &BlobId, headers: &BlobHeaders) -> BlobStoreResult<Blob> {
        let source = self
            .locate(id)?
            .ok_or_else(|| BlobStoreError::BlobNotFound(id.clone()))?;
        let members = self.members()?;
        let target = self
            .policy()
            .choose_for_copy(&members, &source, headers)?
            .ok_or_else(|| {
                BlobStoreError::StorageUnavailable(format!(
                    "no member of group {} can accept a copy of {id}",
                    self.name()
                ))
            })?;

        let blob = if target.name() == source.name() {
            target.copy(id, headers)?
        } else {
            let original = source
                .get(id, false)?
                .ok_or_else(|| BlobStoreError::BlobNotFound(id.clone()))?;
            let mut merged = original.headers().clone();
            for (key, value) in headers.iter() {
                merged.insert(key, value);
            }
            debug!(
                blob = %id,
                from = %source.name(),
                to = %target.name(),
                "copying blob across group members"
            );
            target.create(original.bytes().clone(), &merged)?
        };
        self.remember(blob.id(), target.as_ref());
        Ok(blob)
    }

    fn get(&self, id: &BlobId, include_deleted: bool) -> BlobStoreResult<Option<Blob>> {
        if include_deleted {
            for member in self.holders(id)? {
                if let Some(blob) = member.get(id, true)? {
                    return Ok(Some(blob));
                }
            }
            return Ok(None);
        }
        match self.locate(id)? {
            Some(member) => member.get(id, false),
            None => Ok(None),
        }
    }

    fn exists(&self, id: &BlobId) -> BlobStoreResult<bool> {
        for member in self.members()? {
            if member.exists(id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn delete(&self, id: &BlobId, reason: &str) -> BlobStoreResult<bool> {
        self.forget(id);
        let holders = self.holders(id)?;
        if holders.is_empty() {
            return Ok(false);
        }
        let mut all = true;
        for member in holders {
            all &= member.delete(id, reason)?;
        }
        Ok(all)
    }

    fn delete_hard(&self, id: &BlobId) -> BlobStoreResult<bool> {
        self.forget(id);
        let holders = self.holders(id)?;
        if holders.is_empty() {
            return Ok(false);
        }
        let mut all = true;
        for member in holders {
            all &= member.delete_hard(id)?;
        }
        Ok(all)
    }

    /// Undeletes in every member holding the blob; true if any restored it.
    fn undelete(&self, id: &BlobId) -> BlobStoreResult<bool> {
        let mut any = false;
        for member in self.holders(id)? {
            any |= member.undelete(id)?;
        }
        Ok(any)
    }

    fn blob_ids(&self) -> BlobStoreResult<Vec<BlobId>> {
        let mut ids = Vec::new();
        for member in self.members()? {
            ids.extend(member.blob_ids()?);
        }
        Ok(ids)
    }

    /// A group accepts writes only through its members.
    fn is_writable(&self) -> bool {
        false
    }

    fn is_storage_available(&self) -> bool {
        true
    }

    fn is_groupable(&self) -> bool {
        false
    }

    fn is_empty(&self) -> BlobStoreResult<bool> {
        for member in self.members()? {
            if !member.is_empty()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn metrics(&self) -> BlobStoreResult<BlobStoreMetrics> {
        self.members()?.iter().map(|member| member.metrics()).sum()
    }
}

impl std::fmt::Debug for BlobStoreGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStoreGroup")
            .field("name", &self.name())
            .field("members", &self.member_names())
            .field("fill_policy", &self.fill_policy_type())
            .finish()
    }
}
