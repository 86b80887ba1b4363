//! Stock intents and the row-level plans they compile to.
//!
//! An intent is validated here without looking at any ledger state. The
//! resulting [`StockPlan`] is what a store commits atomically: every row change
//! plus the single movement that records it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{ActorId, BranchId, ProductId, StockError, StockResult};

use crate::movement::{MovementKind, NewMovement};
use crate::record::RecordKey;

/// Intent: new stock enters a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignStock {
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub quantity: i64,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Intent: existing stock moves between two branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStock {
    pub product_id: ProductId,
    pub from_branch_id: BranchId,
    pub to_branch_id: BranchId,
    pub quantity: i64,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Intent: stock leaves the system from a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawStock {
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub quantity: i64,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockIntent {
    Assign(AssignStock),
    Transfer(TransferStock),
    Withdraw(WithdrawStock),
}

impl StockIntent {
    pub fn kind(&self) -> MovementKind {
        match self {
            StockIntent::Assign(_) => MovementKind::Inbound,
            StockIntent::Transfer(_) => MovementKind::Transfer,
            StockIntent::Withdraw(_) => MovementKind::Outbound,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            StockIntent::Assign(i) => i.product_id,
            StockIntent::Transfer(i) => i.product_id,
            StockIntent::Withdraw(i) => i.product_id,
        }
    }

    pub fn quantity(&self) -> i64 {
        match self {
            StockIntent::Assign(i) => i.quantity,
            StockIntent::Transfer(i) => i.quantity,
            StockIntent::Withdraw(i) => i.quantity,
        }
    }

    /// Branches the intent references (for existence checks).
    pub fn branches(&self) -> Vec<BranchId> {
        match self {
            StockIntent::Assign(i) => vec![i.branch_id],
            StockIntent::Transfer(i) => vec![i.from_branch_id, i.to_branch_id],
            StockIntent::Withdraw(i) => vec![i.branch_id],
        }
    }

    /// Validate the intent and compile it into row changes plus a movement.
    ///
    /// This is pure: stock sufficiency is decided by the store at commit time.
    pub fn plan(&self) -> StockResult<StockPlan> {
        let quantity = self.quantity();
        if quantity <= 0 {
            return Err(StockError::invalid(format!(
                "quantity must be positive (got {quantity})"
            )));
        }

        let (changes, movement) = match self {
            StockIntent::Assign(i) => (
                vec![RowChange::credit(i.product_id, i.branch_id, quantity)],
                NewMovement {
                    product_id: i.product_id,
                    from_branch_id: None,
                    to_branch_id: Some(i.branch_id),
                    quantity,
                    kind: MovementKind::Inbound,
                    actor: i.actor,
                    occurred_at: i.occurred_at,
                },
            ),
            StockIntent::Transfer(i) => {
                if i.from_branch_id == i.to_branch_id {
                    return Err(StockError::invalid(
                        "source and destination branch must differ",
                    ));
                }
                (
                    vec![
                        RowChange::debit(i.product_id, i.from_branch_id, quantity),
                        RowChange::credit(i.product_id, i.to_branch_id, quantity),
                    ],
                    NewMovement {
                        product_id: i.product_id,
                        from_branch_id: Some(i.from_branch_id),
                        to_branch_id: Some(i.to_branch_id),
                        quantity,
                        kind: MovementKind::Transfer,
                        actor: i.actor,
                        occurred_at: i.occurred_at,
                    },
                )
            }
            StockIntent::Withdraw(i) => (
                vec![RowChange::debit(i.product_id, i.branch_id, quantity)],
                NewMovement {
                    product_id: i.product_id,
                    from_branch_id: Some(i.branch_id),
                    to_branch_id: None,
                    quantity,
                    kind: MovementKind::Outbound,
                    actor: i.actor,
                    occurred_at: i.occurred_at,
                },
            ),
        };

        movement.validate()?;
        Ok(StockPlan::new(changes, movement))
    }
}

/// Direction of a single ledger row change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDirection {
    Debit,
    Credit,
}

/// One increment or decrement of a ledger row. `quantity` is always positive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowChange {
    pub key: RecordKey,
    pub direction: ChangeDirection,
    pub quantity: i64,
}

impl RowChange {
    pub fn debit(product_id: ProductId, branch_id: BranchId, quantity: i64) -> Self {
        Self {
            key: RecordKey::new(product_id, branch_id),
            direction: ChangeDirection::Debit,
            quantity,
        }
    }

    pub fn credit(product_id: ProductId, branch_id: BranchId, quantity: i64) -> Self {
        Self {
            key: RecordKey::new(product_id, branch_id),
            direction: ChangeDirection::Credit,
            quantity,
        }
    }

    pub fn is_debit(&self) -> bool {
        self.direction == ChangeDirection::Debit
    }

    /// Apply to the row's current quantity, returning the new quantity.
    ///
    /// Debits fail with `InsufficientStock` rather than going negative.
    pub fn apply(&self, current: i64) -> StockResult<i64> {
        match self.direction {
            ChangeDirection::Debit => {
                if current < self.quantity {
                    return Err(StockError::InsufficientStock {
                        product_id: self.key.product_id,
                        branch_id: self.key.branch_id,
                        requested: self.quantity,
                        available: current,
                    });
                }
                Ok(current - self.quantity)
            }
            ChangeDirection::Credit => current.checked_add(self.quantity).ok_or_else(|| {
                StockError::invalid(format!("quantity overflow at {}", self.key))
            }),
        }
    }
}

/// Everything one atomic commit must do.
///
/// Row changes are kept sorted by key so every store acquires row locks in the
/// same global order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPlan {
    changes: Vec<RowChange>,
    movement: NewMovement,
}

impl StockPlan {
    fn new(mut changes: Vec<RowChange>, movement: NewMovement) -> Self {
        changes.sort_by_key(|c| c.key);
        Self { changes, movement }
    }

    pub fn changes(&self) -> &[RowChange] {
        &self.changes
    }

    pub fn movement(&self) -> &NewMovement {
        &self.movement
    }

    pub fn into_movement(self) -> NewMovement {
        self.movement
    }

    pub fn keys(&self) -> impl Iterator<Item = RecordKey> + '_ {
        self.changes.iter().map(|c| c.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(from: BranchId, to: BranchId, quantity: i64) -> StockIntent {
        StockIntent::Transfer(TransferStock {
            product_id: ProductId::new(),
            from_branch_id: from,
            to_branch_id: to,
            quantity,
            actor: ActorId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn assign_plans_single_credit_and_inbound_movement() {
        let branch = BranchId::new();
        let intent = StockIntent::Assign(AssignStock {
            product_id: ProductId::new(),
            branch_id: branch,
            quantity: 100,
            actor: ActorId::new(),
            occurred_at: Utc::now(),
        });

        let plan = intent.plan().unwrap();
        assert_eq!(plan.changes().len(), 1);
        assert_eq!(plan.changes()[0].direction, ChangeDirection::Credit);
        assert_eq!(plan.movement().kind, MovementKind::Inbound);
        assert_eq!(plan.movement().to_branch_id, Some(branch));
        assert_eq!(plan.movement().from_branch_id, None);
    }

    #[test]
    fn zero_quantity_is_invalid() {
        let branch = BranchId::new();
        let intent = StockIntent::Assign(AssignStock {
            product_id: ProductId::new(),
            branch_id: branch,
            quantity: 0,
            actor: ActorId::new(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(intent.plan(), Err(StockError::InvalidArgument(_))));
    }

    #[test]
    fn transfer_to_same_branch_is_invalid() {
        let a = BranchId::new();
        assert!(matches!(transfer(a, a, 5).plan(), Err(StockError::InvalidArgument(_))));
    }

    #[test]
    fn transfer_changes_are_sorted_by_key() {
        let a = BranchId::new();
        let b = BranchId::new();
        let plan = transfer(b, a, 5).plan().unwrap();

        let keys: Vec<_> = plan.keys().collect();
        assert_eq!(keys.len(), 2);
        assert!(keys[0] < keys[1]);
        assert_eq!(plan.changes().iter().filter(|c| c.is_debit()).count(), 1);
    }

    #[test]
    fn debit_refuses_to_go_negative() {
        let change = RowChange::debit(ProductId::new(), BranchId::new(), 10);
        assert_eq!(change.apply(10).unwrap(), 0);
        match change.apply(9).unwrap_err() {
            StockError::InsufficientStock { requested, available, .. } => {
                assert_eq!(requested, 10);
                assert_eq!(available, 9);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn credit_overflow_is_rejected() {
        let change = RowChange::credit(ProductId::new(), BranchId::new(), 1);
        assert!(change.apply(i64::MAX).is_err());
    }
}
