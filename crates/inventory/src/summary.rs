//! Read-side groupings over ledger records.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use stockroom_core::{BranchId, ProductId};

use crate::branch::BranchRegistry;
use crate::record::InventoryRecord;

/// Quantity of one product at one branch, with the branch's display data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchQuantity {
    pub branch_id: BranchId,
    pub branch_name: String,
    pub is_main: bool,
    pub quantity: i64,
}

/// Per-branch stock totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSummary {
    pub branch_id: BranchId,
    pub name: String,
    pub is_main: bool,
    /// Products with a positive quantity at this branch.
    pub product_count: usize,
    pub total_units: i128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryOverview {
    pub branches: Vec<BranchSummary>,
    /// Distinct products with a positive quantity at any branch.
    pub product_count: usize,
    pub total_units: i128,
}

/// Quantities of `product_id` at every registered branch (zero where no record exists).
pub fn quantities_by_branch(
    registry: &BranchRegistry,
    product_id: ProductId,
    records: &[InventoryRecord],
) -> Vec<BranchQuantity> {
    let held: HashMap<BranchId, i64> = records
        .iter()
        .filter(|r| r.product_id == product_id)
        .map(|r| (r.branch_id, r.quantity))
        .collect();

    registry
        .list()
        .into_iter()
        .map(|b| BranchQuantity {
            quantity: held.get(&b.id).copied().unwrap_or(0),
            branch_id: b.id,
            branch_name: b.name,
            is_main: b.is_main,
        })
        .collect()
}

/// Totals per registered branch, ordered by branch name.
pub fn summarize(registry: &BranchRegistry, records: &[InventoryRecord]) -> InventoryOverview {
    let mut per_branch: HashMap<BranchId, (usize, i128)> = HashMap::new();
    let mut stocked: HashSet<ProductId> = HashSet::new();
    for record in records.iter().filter(|r| r.quantity > 0) {
        let entry = per_branch.entry(record.branch_id).or_default();
        entry.0 += 1;
        entry.1 += i128::from(record.quantity);
        stocked.insert(record.product_id);
    }

    let branches: Vec<BranchSummary> = registry
        .list()
        .into_iter()
        .map(|b| {
            let (product_count, total_units) = per_branch.get(&b.id).copied().unwrap_or((0, 0));
            BranchSummary {
                branch_id: b.id,
                name: b.name,
                is_main: b.is_main,
                product_count,
                total_units,
            }
        })
        .collect();

    let total_units = branches.iter().map(|b| b.total_units).sum();
    InventoryOverview {
        branches,
        product_count: stocked.len(),
        total_units,
    }
}
