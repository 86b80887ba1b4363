use std::sync::Arc;

use thiserror::Error;

use stockroom_core::{BranchId, ProductId, StockError};
use stockroom_inventory::{InventoryRecord, Movement, RecordKey, RowChange, StockPlan};

/// Store operation error.
///
/// These are **infrastructure errors** as seen by a backend. The engine maps
/// them onto the caller-facing [`StockError`] taxonomy.
///
/// ## Error Categories
///
/// - **InsufficientStock**: a conditional decrement found too little stock (nothing committed)
/// - **Conflict**: a concurrent writer invalidated the commit (nothing committed, retry is safe)
/// - **Timeout**: a row lock could not be acquired in time (nothing committed)
/// - **Invalid**: the store rejected the data (unknown reference, malformed movement)
/// - **Unavailable**: the backend failed; the commit outcome must be re-queried
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("insufficient stock at {key}: requested {requested}, available {available}")]
    InsufficientStock {
        key: RecordKey,
        requested: i64,
        available: i64,
    },

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("lock timeout: {0}")]
    Timeout(String),

    #[error("rejected by store: {0}")]
    Invalid(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for StockError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::InsufficientStock {
                key,
                requested,
                available,
            } => StockError::InsufficientStock {
                product_id: key.product_id,
                branch_id: key.branch_id,
                requested,
                available,
            },
            StoreError::Conflict(msg) => StockError::ConcurrencyConflict(msg),
            StoreError::Timeout(msg) => StockError::ConcurrencyConflict(format!("lock timeout: {msg}")),
            StoreError::Invalid(msg) => StockError::InvalidArgument(msg),
            StoreError::Unavailable(msg) => StockError::PersistenceFailure(msg),
        }
    }
}

/// Apply a row change to the current quantity, expressed as a store error.
pub(crate) fn apply_change(change: &RowChange, current: i64) -> Result<i64, StoreError> {
    change.apply(current).map_err(|e| match e {
        StockError::InsufficientStock {
            requested,
            available,
            ..
        } => StoreError::InsufficientStock {
            key: change.key,
            requested,
            available,
        },
        other => StoreError::Invalid(other.to_string()),
    })
}

/// Inventory ledger backend.
///
/// The ledger is the single shared mutable resource. A store owns two things:
/// the current quantity per `(product, branch)` row, and the atomic commit that
/// changes those rows together with the movement log.
///
/// ## Commit Semantics
///
/// `commit()`:
/// - applies every row change of the plan, or none of them
/// - evaluates each debit against the row's committed quantity in the same
///   step as the mutation (no stale read can pass validation)
/// - appends exactly one movement in the same atomic unit
/// - creates missing rows on credit; rows are never deleted
/// - never blocks forever: lock waits are bounded and surface as `Timeout`
///
/// Commits on disjoint rows must not block each other.
#[async_trait::async_trait]
pub trait StockStore: Send + Sync {
    /// Committed quantity of one row (0 when the row does not exist).
    async fn quantity(&self, key: RecordKey) -> Result<i64, StoreError>;

    async fn records_for_product(&self, product_id: ProductId) -> Result<Vec<InventoryRecord>, StoreError>;

    async fn records_at_branch(&self, branch_id: BranchId) -> Result<Vec<InventoryRecord>, StoreError>;

    async fn all_records(&self) -> Result<Vec<InventoryRecord>, StoreError>;

    /// Atomically apply the plan's row changes and append its movement.
    async fn commit(&self, plan: StockPlan) -> Result<Movement, StoreError>;
}

#[async_trait::async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    async fn quantity(&self, key: RecordKey) -> Result<i64, StoreError> {
        (**self).quantity(key).await
    }

    async fn records_for_product(&self, product_id: ProductId) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).records_for_product(product_id).await
    }

    async fn records_at_branch(&self, branch_id: BranchId) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).records_at_branch(branch_id).await
    }

    async fn all_records(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).all_records().await
    }

    async fn commit(&self, plan: StockPlan) -> Result<Movement, StoreError> {
        (**self).commit(plan).await
    }
}
