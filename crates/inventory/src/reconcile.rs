//! Audit replay: rebuild balances from the movement log and compare with the ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockroom_core::{BranchId, ProductId};

use crate::movement::{Movement, MovementKind};
use crate::record::{InventoryRecord, RecordKey};

/// Conservation check for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductBalance {
    pub product_id: ProductId,
    /// Sum of ledger quantities across branches. Totals are widened so that
    /// several rows near `i64::MAX` still add up exactly.
    pub on_hand: i128,
    pub inbound: i128,
    pub outbound: i128,
    /// `on_hand == inbound - outbound`.
    pub balanced: bool,
}

/// A ledger row that disagrees with the replayed log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub recorded: i128,
    pub replayed: i128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub products: Vec<ProductBalance>,
    pub discrepancies: Vec<Discrepancy>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty() && self.products.iter().all(|p| p.balanced)
    }
}

#[derive(Default)]
struct Totals {
    on_hand: i128,
    inbound: i128,
    outbound: i128,
}

/// Replay `movements` per (product, branch) and compare against `records`.
pub fn reconcile(records: &[InventoryRecord], movements: &[Movement]) -> ReconciliationReport {
    let mut replayed: BTreeMap<RecordKey, i128> = BTreeMap::new();
    let mut totals: BTreeMap<ProductId, Totals> = BTreeMap::new();

    for m in movements {
        let t = totals.entry(m.product_id).or_default();
        match m.kind {
            MovementKind::Inbound => t.inbound += i128::from(m.quantity),
            MovementKind::Outbound => t.outbound += i128::from(m.quantity),
            MovementKind::Transfer => {}
        }
        if let Some(from) = m.from_branch_id {
            *replayed.entry(RecordKey::new(m.product_id, from)).or_default() -= i128::from(m.quantity);
        }
        if let Some(to) = m.to_branch_id {
            *replayed.entry(RecordKey::new(m.product_id, to)).or_default() += i128::from(m.quantity);
        }
    }

    let mut recorded: BTreeMap<RecordKey, i128> = BTreeMap::new();
    for r in records {
        recorded.insert(r.key(), i128::from(r.quantity));
        totals.entry(r.product_id).or_default().on_hand += i128::from(r.quantity);
    }

    let mut keys: Vec<RecordKey> = replayed.keys().chain(recorded.keys()).copied().collect();
    keys.sort();
    keys.dedup();

    let discrepancies = keys
        .into_iter()
        .filter_map(|key| {
            let recorded = recorded.get(&key).copied().unwrap_or(0);
            let replayed = replayed.get(&key).copied().unwrap_or(0);
            (recorded != replayed).then_some(Discrepancy {
                product_id: key.product_id,
                branch_id: key.branch_id,
                recorded,
                replayed,
            })
        })
        .collect();

    let products = totals
        .into_iter()
        .map(|(product_id, t)| ProductBalance {
            product_id,
            on_hand: t.on_hand,
            inbound: t.inbound,
            outbound: t.outbound,
            balanced: t.on_hand == t.inbound - t.outbound,
        })
        .collect();

    ReconciliationReport {
        products,
        discrepancies,
    }
}
