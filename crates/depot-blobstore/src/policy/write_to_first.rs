use std::sync::Arc;

use depot_types::BlobHeaders;

use super::FillPolicy;
use crate::error::BlobStoreResult;
use crate::traits::{is_eligible, BlobStore};

pub const TYPE: &str = "writeToFirst";

/// Always writes to the first member, in configured order, that can take it.
#[derive(Debug, Default, Clone, Copy)]
pub struct WriteToFirstFillPolicy;

impl FillPolicy for WriteToFirstFillPolicy {
    fn policy_type(&self) -> &'static str {
        TYPE
    }

    fn name(&self) -> &'static str {
        "Write to First"
    }

    fn choose_for_create(
        &self,
        members: &[Arc<dyn BlobStore>],
        _headers: &BlobHeaders,
    ) -> BlobStoreResult<Option<Arc<dyn BlobStore>>> {
        Ok(members
            .iter()
            .find(|member| is_eligible(member.as_ref()))
            .cloned())
    }
}
