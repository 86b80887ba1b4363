//! Movement log query interface for audit and reporting.
//!
//! The log is history, not live state: nothing here is used to decide whether
//! a commit may proceed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{BranchId, ProductId};
use stockroom_inventory::{Movement, MovementKind};

use super::r#trait::StoreError;

/// Pagination parameters for movement queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of movements to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).clamp(1, 1000),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria for movement queries. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    /// Matches movements leaving or entering the branch.
    pub branch_id: Option<BranchId>,
    pub kind: Option<MovementKind>,
    /// Inclusive lower bound on `occurred_at`.
    pub occurred_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `occurred_at`.
    pub occurred_before: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    pub fn for_branch(branch_id: BranchId) -> Self {
        Self {
            branch_id: Some(branch_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, m: &Movement) -> bool {
        self.product_id.is_none_or(|p| m.product_id == p)
            && self.branch_id.is_none_or(|b| m.touches(b))
            && self.kind.is_none_or(|k| m.kind == k)
            && self.occurred_after.is_none_or(|t| m.occurred_at >= t)
            && self.occurred_before.is_none_or(|t| m.occurred_at <= t)
    }
}

/// Paginated movement query result, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementPage {
    pub movements: Vec<Movement>,
    /// Total number of movements matching the filter (across all pages).
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl MovementPage {
    pub(crate) fn new(movements: Vec<Movement>, total: u64, pagination: Pagination) -> Self {
        let has_more = total > u64::from(pagination.offset) + u64::from(pagination.limit);
        Self {
            movements,
            total,
            pagination,
            has_more,
        }
    }
}

/// Read-only access to the append-only movement log.
#[async_trait::async_trait]
pub trait MovementLog: Send + Sync {
    /// Query movements with optional filters, ordered by sequence (newest first).
    async fn query_movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError>;

    /// Full log in sequence order (oldest first), optionally for one product.
    async fn replay(&self, product_id: Option<ProductId>) -> Result<Vec<Movement>, StoreError>;
}

#[async_trait::async_trait]
impl<S> MovementLog for Arc<S>
where
    S: MovementLog + ?Sized,
{
    async fn query_movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        (**self).query_movements(filter, pagination).await
    }

    async fn replay(&self, product_id: Option<ProductId>) -> Result<Vec<Movement>, StoreError> {
        (**self).replay(product_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_is_capped_and_floored() {
        assert_eq!(Pagination::new(Some(5000), None).limit, 1000);
        assert_eq!(Pagination::new(Some(0), Some(3)), Pagination { limit: 1, offset: 3 });
        assert_eq!(Pagination::new(None, None), Pagination::default());
    }

    #[test]
    fn has_more_reflects_remaining_rows() {
        let p = Pagination::new(Some(10), Some(0));
        assert!(MovementPage::new(vec![], 11, p).has_more);
        assert!(!MovementPage::new(vec![], 10, p).has_more);
    }
}
