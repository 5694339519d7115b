//! Fill policies: which group member receives a write.
//!
//! A policy is selected per group by the identifier stored in the group's
//! `fillPolicy` attribute. Each group gets its own policy instance, so a
//! policy may keep per-group state (the round-robin counter).

pub mod round_robin;
pub mod two_tier;
pub mod write_to_first;

use std::collections::HashMap;
use std::sync::Arc;

use depot_types::BlobHeaders;

use crate::config::BlobStoreConfiguration;
use crate::error::BlobStoreResult;
use crate::traits::BlobStore;

pub use round_robin::RoundRobinFillPolicy;
pub use two_tier::TwoTierCacheFillPolicy;
pub use write_to_first::WriteToFirstFillPolicy;

/// Chooses the member of a group that receives a new or copied blob.
///
/// `members` is the group's member list resolved from the registry for
/// this call, in configured order.
pub trait FillPolicy: Send + Sync {
    /// Identifier stored in group configurations.
    fn policy_type(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// Check the group's structural requirements for this policy.
    fn validate(&self, _group: &BlobStoreConfiguration) -> BlobStoreResult<()> {
        Ok(())
    }

    /// Member to receive a brand-new blob, or `None` if no member qualifies.
    fn choose_for_create(
        &self,
        members: &[Arc<dyn BlobStore>],
        headers: &BlobHeaders,
    ) -> BlobStoreResult<Option<Arc<dyn BlobStore>>>;

    /// Member to receive a blob copied from `source`.
    fn choose_for_copy(
        &self,
        members: &[Arc<dyn BlobStore>],
        _source: &Arc<dyn BlobStore>,
        headers: &BlobHeaders,
    ) -> BlobStoreResult<Option<Arc<dyn BlobStore>>> {
        self.choose_for_create(members, headers)
    }
}

/// Produces a fresh policy instance for one group.
pub type FillPolicyFactory = Arc<dyn Fn() -> Arc<dyn FillPolicy> + Send + Sync>;

/// Maps policy identifiers to factories.
#[derive(Clone, Default)]
pub struct FillPolicyRegistry {
    factories: HashMap<String, FillPolicyFactory>,
}

impl FillPolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the three built-in policies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(round_robin::TYPE, || {
            Arc::new(RoundRobinFillPolicy::new()) as Arc<dyn FillPolicy>
        });
        registry.register(write_to_first::TYPE, || {
            Arc::new(WriteToFirstFillPolicy) as Arc<dyn FillPolicy>
        });
        registry.register(two_tier::TYPE, || {
            Arc::new(TwoTierCacheFillPolicy) as Arc<dyn FillPolicy>
        });
        registry
    }

    pub fn register<F>(&mut self, policy_type: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn FillPolicy> + Send + Sync + 'static,
    {
        self.factories.insert(policy_type.into(), Arc::new(factory));
    }

    pub fn contains(&self, policy_type: &str) -> bool {
        self.factories.contains_key(policy_type)
    }

    /// New policy instance of the given type.
    pub fn create(&self, policy_type: &str) -> Option<Arc<dyn FillPolicy>> {
        self.factories.get(policy_type).map(|factory| factory())
    }

    /// Registered identifiers, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for FillPolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillPolicyRegistry")
            .field("types", &self.types())
            .finish()
    }
}
