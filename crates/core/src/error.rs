//! Stock operation error model.

use thiserror::Error;

use crate::id::{BranchId, ProductId};

/// Result type used by every ledger-facing operation.
pub type StockResult<T> = Result<T, StockError>;

/// Failure of an assign/transfer/withdraw operation (or of a ledger read).
///
/// Every variant is reported to the immediate caller. None of them leaves a
/// half-applied operation behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Rejected input (non-positive quantity, identical branches, unknown ids).
    /// Nothing was changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The source branch holds less than requested. Nothing was changed.
    #[error(
        "insufficient stock for product {product_id} at branch {branch_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        branch_id: BranchId,
        requested: i64,
        available: i64,
    },

    /// A concurrent writer (or a lock timeout) prevented the commit.
    /// Nothing was committed; the whole operation may be retried from scratch.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// The backing store failed. State is either fully pre- or fully
    /// post-operation; re-query the ledger before retrying.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

impl StockError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConcurrencyConflict(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::PersistenceFailure(msg.into())
    }

    /// Stable machine-readable code (used in logs and HTTP bodies).
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::ConcurrencyConflict(_) => "concurrency_conflict",
            Self::PersistenceFailure(_) => "persistence_failure",
        }
    }

    /// Whether re-running the whole operation from scratch is known to be safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}
