use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use depot_types::BlobHeaders;

use super::FillPolicy;
use crate::error::BlobStoreResult;
use crate::traits::{is_eligible, BlobStore};

pub const TYPE: &str = "roundRobin";

/// Rotates writes across members.
///
/// Call `n` starts its search at member `n mod len` and walks forward in
/// configured order, skipping members that cannot take the write. The
/// counter advances on every call, whether or not a member was found,
/// and restarts at zero instead of overflowing.
#[derive(Debug, Default)]
pub struct RoundRobinFillPolicy {
    next: AtomicUsize,
}

impl RoundRobinFillPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy whose first call starts at `counter`.
    pub fn starting_at(counter: usize) -> Self {
        Self {
            next: AtomicUsize::new(counter),
        }
    }

    fn advance(&self) -> usize {
        // The closure never returns None, so fetch_update cannot fail.
        match self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.checked_add(1).unwrap_or(0))
            }) {
            Ok(previous) | Err(previous) => previous,
        }
    }
}

impl FillPolicy for RoundRobinFillPolicy {
    fn policy_type(&self) -> &'static str {
        TYPE
    }

    fn name(&self) -> &'static str {
        "Round Robin"
    }

    fn choose_for_create(
        &self,
        members: &[Arc<dyn BlobStore>],
        _headers: &BlobHeaders,
    ) -> BlobStoreResult<Option<Arc<dyn BlobStore>>> {
        let counter = self.advance();
        if members.is_empty() {
            return Ok(None);
        }
        let start = counter % members.len();
        Ok(members[start..]
            .iter()
            .chain(&members[..start])
            .find(|member| is_eligible(member.as_ref()))
            .cloned())
    }
}
