use serde::{Deserialize, Serialize};

use stockroom_core::{BranchId, ProductId};

/// Composite ledger key. Ordering (product, then branch) is the global lock order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub product_id: ProductId,
    pub branch_id: BranchId,
}

impl RecordKey {
    pub fn new(product_id: ProductId, branch_id: BranchId) -> Self {
        Self {
            product_id,
            branch_id,
        }
    }
}

impl core::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.branch_id)
    }
}

/// Quantity on hand of one product at one branch. Never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub quantity: i64,
}

impl InventoryRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.product_id, self.branch_id)
    }
}
