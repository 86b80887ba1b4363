//! Stock ledger domain module.
//!
//! This crate contains the business rules for branch stock (branches, ledger
//! records, movements, intent validation, reconciliation), implemented purely
//! as deterministic domain logic (no IO, no storage).

pub mod branch;
pub mod movement;
pub mod plan;
pub mod reconcile;
pub mod record;
pub mod summary;

pub use branch::{Branch, BranchRegistry};
pub use movement::{Movement, MovementKind, NewMovement};
pub use plan::{
    AssignStock, ChangeDirection, RowChange, StockIntent, StockPlan, TransferStock, WithdrawStock,
};
pub use reconcile::{reconcile, Discrepancy, ProductBalance, ReconciliationReport};
pub use record::{InventoryRecord, RecordKey};
pub use summary::{quantities_by_branch, summarize, BranchQuantity, BranchSummary, InventoryOverview};
