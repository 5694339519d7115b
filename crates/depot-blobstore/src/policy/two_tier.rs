use std::sync::Arc;

use depot_types::BlobHeaders;

use super::FillPolicy;
use crate::config::BlobStoreConfiguration;
use crate::error::{BlobStoreError, BlobStoreResult};
use crate::traits::{is_eligible, BlobStore};

pub const TYPE: &str = "twoTierCache";

const TEMPORARY_TIER: usize = 0;
const PERMANENT_TIER: usize = 1;

/// Splits writes between a staging tier and a permanent tier.
///
/// Member 0 receives temporary blobs while it can take writes; otherwise
/// they fall through to member 1. Everything else, copies included, goes
/// to member 1, and if member 1 cannot take it the write fails with
/// [`BlobStoreError::StorageUnavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TwoTierCacheFillPolicy;

impl FillPolicy for TwoTierCacheFillPolicy {
    fn policy_type(&self) -> &'static str {
        TYPE
    }

    fn name(&self) -> &'static str {
        "First Two Tier Cache"
    }

    fn validate(&self, group: &BlobStoreConfiguration) -> BlobStoreResult<()> {
        let count = group.member_names().len();
        if count < 2 {
            return Err(BlobStoreError::InvalidGroupConfiguration(format!(
                "fill policy {TYPE} requires at least two members, group {} has {count}",
                group.name
            )));
        }
        Ok(())
    }

    fn choose_for_create(
        &self,
        members: &[Arc<dyn BlobStore>],
        headers: &BlobHeaders,
    ) -> BlobStoreResult<Option<Arc<dyn BlobStore>>> {
        require_two(members)?;

        if headers.is_temporary() {
            let temp = &members[TEMPORARY_TIER];
            if is_eligible(temp.as_ref()) {
                return Ok(Some(Arc::clone(temp)));
            }
            tracing::warn!(
                store = %temp.name(),
                "temporary tier unavailable; writing temporary blob to permanent tier"
            );
        }

        permanent_tier(members)
    }

    /// Copies are promotions: they always target the permanent tier,
    /// whatever their headers say.
    fn choose_for_copy(
        &self,
        members: &[Arc<dyn BlobStore>],
        _source: &Arc<dyn BlobStore>,
        _headers: &BlobHeaders,
    ) -> BlobStoreResult<Option<Arc<dyn BlobStore>>> {
        require_two(members)?;
        permanent_tier(members)
    }
}

fn require_two(members: &[Arc<dyn BlobStore>]) -> BlobStoreResult<()> {
    if members.len() <= PERMANENT_TIER {
        return Err(BlobStoreError::InvalidGroupConfiguration(format!(
            "fill policy {TYPE} requires at least two members, got {}",
            members.len()
        )));
    }
    Ok(())
}

fn permanent_tier(members: &[Arc<dyn BlobStore>]) -> BlobStoreResult<Option<Arc<dyn BlobStore>>> {
    let permanent = &members[PERMANENT_TIER];
    if is_eligible(permanent.as_ref()) {
        Ok(Some(Arc::clone(permanent)))
    } else {
        Err(BlobStoreError::StorageUnavailable(format!(
            "permanent tier {} cannot accept writes",
            permanent.name()
        )))
    }
}
