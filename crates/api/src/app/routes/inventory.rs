use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use stockroom_core::{BranchId, ProductId};
use stockroom_inventory::{AssignStock, Movement, TransferStock, WithdrawStock};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn read_routes() -> Router {
    Router::new()
        .route("/inventory/reconcile", get(reconcile))
        .route("/inventory/:product_id", get(product_stock))
        .route("/inventory/:product_id/:branch_id", get(quantity))
}

pub fn write_routes() -> Router {
    Router::new()
        .route("/inventory/assign", post(assign))
        .route("/inventory/transfer", post(transfer))
        .route("/inventory/withdraw", post(withdraw))
}

fn committed(result: stockroom_core::StockResult<Movement>) -> axum::response::Response {
    match result {
        Ok(movement) => (StatusCode::CREATED, Json(movement)).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn assign(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    body: Result<Json<dto::AssignRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };

    let result = services
        .engine
        .assign(AssignStock {
            product_id: body.product_id,
            branch_id: body.branch_id,
            quantity: body.quantity,
            actor: actor.actor_id(),
            occurred_at: Utc::now(),
        })
        .await;
    committed(result)
}

pub async fn transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    body: Result<Json<dto::TransferRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };

    let result = services
        .engine
        .transfer(TransferStock {
            product_id: body.product_id,
            from_branch_id: body.from_branch_id,
            to_branch_id: body.to_branch_id,
            quantity: body.quantity,
            actor: actor.actor_id(),
            occurred_at: Utc::now(),
        })
        .await;
    committed(result)
}

pub async fn withdraw(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    body: Result<Json<dto::WithdrawRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };

    let result = services
        .engine
        .withdraw(WithdrawStock {
            product_id: body.product_id,
            branch_id: body.branch_id,
            quantity: body.quantity,
            actor: actor.actor_id(),
            occurred_at: Utc::now(),
        })
        .await;
    committed(result)
}

pub async fn product_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match product_id.parse() {
        Ok(v) => v,
        Err(e) => return errors::stock_error_to_response(e),
    };

    match services.engine.quantities_by_branch(product_id).await {
        Ok(branches) => Json(dto::ProductStockResponse::new(product_id, branches)).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Path((product_id, branch_id)): Path<(String, String)>,
) -> axum::response::Response {
    let product_id: ProductId = match product_id.parse() {
        Ok(v) => v,
        Err(e) => return errors::stock_error_to_response(e),
    };
    let branch_id: BranchId = match branch_id.parse() {
        Ok(v) => v,
        Err(e) => return errors::stock_error_to_response(e),
    };

    match services.engine.quantity(product_id, branch_id).await {
        Ok(quantity) => Json(dto::QuantityResponse {
            product_id,
            branch_id,
            quantity,
        })
        .into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn reconcile(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::ReconcileQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return errors::query_rejection(e),
    };

    match services.engine.reconcile(query.product_id).await {
        Ok(report) => Json(serde_json::json!({
            "consistent": report.is_consistent(),
            "products": report.products,
            "discrepancies": report.discrepancies,
        }))
        .into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}
