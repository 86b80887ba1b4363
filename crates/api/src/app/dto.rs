use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{BranchId, ProductId, StockError};
use stockroom_inventory::{BranchQuantity, Movement, MovementKind};
use stockroom_infra::{BulkUnassignReport, MovementFilter, Pagination, UnassignOutcome};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub product_id: ProductId,
    pub from_branch_id: BranchId,
    pub to_branch_id: BranchId,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateBranchRequest {
    pub name: String,
    #[serde(default)]
    pub main: bool,
}

#[derive(Debug, Deserialize)]
pub struct RenameBranchRequest {
    pub name: String,
}

/// Declare a product; a fresh id is minted when none is given.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterProductRequest {
    pub product_id: Option<ProductId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementQuery {
    pub product_id: Option<ProductId>,
    pub branch_id: Option<BranchId>,
    pub kind: Option<MovementKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl MovementQuery {
    pub fn filter(&self) -> MovementFilter {
        MovementFilter {
            product_id: self.product_id,
            branch_id: self.branch_id,
            kind: self.kind,
            occurred_after: self.from,
            occurred_before: self.to,
        }
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.limit, self.offset)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileQuery {
    pub product_id: Option<ProductId>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct QuantityResponse {
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct ProductStockResponse {
    pub product_id: ProductId,
    /// Widened so branch quantities near `i64::MAX` still add up.
    pub total: i128,
    pub branches: Vec<BranchQuantity>,
}

impl ProductStockResponse {
    pub fn new(product_id: ProductId, branches: Vec<BranchQuantity>) -> Self {
        let total = branches.iter().map(|b| i128::from(b.quantity)).sum();
        Self {
            product_id,
            total,
            branches,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub product_id: ProductId,
    pub created: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl From<&StockError> for ErrorBody {
    fn from(value: &StockError) -> Self {
        Self {
            error: value.code(),
            message: value.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Moved,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct UnassignOutcomeDto {
    pub product_id: ProductId,
    pub quantity: i64,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movement: Option<Movement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl From<UnassignOutcome> for UnassignOutcomeDto {
    fn from(value: UnassignOutcome) -> Self {
        match value.result {
            Ok(movement) => Self {
                product_id: value.product_id,
                quantity: value.quantity,
                status: OutcomeStatus::Moved,
                movement: Some(movement),
                error: None,
            },
            Err(err) => Self {
                product_id: value.product_id,
                quantity: value.quantity,
                status: OutcomeStatus::Failed,
                movement: None,
                error: Some(ErrorBody::from(&err)),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BulkUnassignResponse {
    pub branch_id: BranchId,
    pub main_branch_id: BranchId,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<UnassignOutcomeDto>,
}

impl From<BulkUnassignReport> for BulkUnassignResponse {
    fn from(value: BulkUnassignReport) -> Self {
        Self {
            branch_id: value.branch_id,
            main_branch_id: value.main_branch_id,
            succeeded: value.succeeded(),
            failed: value.failed(),
            outcomes: value.outcomes.into_iter().map(UnassignOutcomeDto::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_total_sums_past_i64_max() {
        let branch = |quantity| BranchQuantity {
            branch_id: BranchId::new(),
            branch_name: "x".to_string(),
            is_main: false,
            quantity,
        };
        let resp = ProductStockResponse::new(ProductId::new(), vec![branch(i64::MAX), branch(2)]);
        assert_eq!(resp.total, i128::from(i64::MAX) + 2);

        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""total":9223372036854775809"#));
    }
}
