use std::iter::Sum;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Content totals of a blob store.
///
/// Soft-deleted blobs are not counted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobStoreMetrics {
    pub blob_count: u64,
    /// Total content size in bytes.
    pub total_size: u64,
}

impl Add for BlobStoreMetrics {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            blob_count: self.blob_count.saturating_add(other.blob_count),
            total_size: self.total_size.saturating_add(other.total_size),
        }
    }
}

impl Sum for BlobStoreMetrics {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}
