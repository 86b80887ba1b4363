use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{ActorId, BranchId, MovementId, ProductId, StockError, StockResult};

/// Classification of a quantity change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// New stock entering a branch (e.g. a received import).
    Inbound,
    /// Stock leaving the system from a branch.
    Outbound,
    /// Zero-sum relocation between two branches.
    Transfer,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Inbound => "inbound",
            MovementKind::Outbound => "outbound",
            MovementKind::Transfer => "transfer",
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inbound" => Ok(MovementKind::Inbound),
            "outbound" => Ok(MovementKind::Outbound),
            "transfer" => Ok(MovementKind::Transfer),
            other => Err(StockError::invalid(format!(
                "unknown movement kind '{other}' (expected inbound, outbound or transfer)"
            ))),
        }
    }
}

/// A movement ready to be appended (not yet assigned an id or sequence number).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub product_id: ProductId,
    pub from_branch_id: Option<BranchId>,
    pub to_branch_id: Option<BranchId>,
    pub quantity: i64,
    pub kind: MovementKind,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

impl NewMovement {
    /// Check the shape invariant for the movement's kind.
    pub fn validate(&self) -> StockResult<()> {
        if self.quantity <= 0 {
            return Err(StockError::invalid("movement quantity must be positive"));
        }

        match (self.kind, self.from_branch_id, self.to_branch_id) {
            (MovementKind::Inbound, None, Some(_)) => Ok(()),
            (MovementKind::Outbound, Some(_), None) => Ok(()),
            (MovementKind::Transfer, Some(from), Some(to)) if from != to => Ok(()),
            (MovementKind::Transfer, Some(_), Some(_)) => Err(StockError::invalid(
                "transfer source and destination must differ",
            )),
            (kind, from, to) => Err(StockError::invalid(format!(
                "{kind} movement has invalid branches (from: {from:?}, to: {to:?})"
            ))),
        }
    }

    /// Finalize into a stored movement (store-assigned id and sequence).
    pub fn commit(self, id: MovementId, sequence: u64) -> Movement {
        Movement {
            id,
            sequence,
            product_id: self.product_id,
            from_branch_id: self.from_branch_id,
            to_branch_id: self.to_branch_id,
            quantity: self.quantity,
            kind: self.kind,
            actor: self.actor,
            occurred_at: self.occurred_at,
        }
    }
}

/// Immutable, append-only audit record of one quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    /// Strictly increasing position in the log.
    pub sequence: u64,
    pub product_id: ProductId,
    pub from_branch_id: Option<BranchId>,
    pub to_branch_id: Option<BranchId>,
    pub quantity: i64,
    pub kind: MovementKind,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

impl Movement {
    /// True when the movement leaves or enters `branch_id`.
    pub fn touches(&self, branch_id: BranchId) -> bool {
        self.from_branch_id == Some(branch_id) || self.to_branch_id == Some(branch_id)
    }

    /// Change in the product's system-wide total caused by this movement.
    pub fn net_total_delta(&self) -> i64 {
        match self.kind {
            MovementKind::Inbound => self.quantity,
            MovementKind::Outbound => -self.quantity,
            MovementKind::Transfer => 0,
        }
    }
}
