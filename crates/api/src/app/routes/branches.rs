use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockroom_core::BranchId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn read_routes() -> Router {
    Router::new()
        .route("/branches", get(list_branches))
        .route("/branches/summary", get(summary))
}

pub fn write_routes() -> Router {
    Router::new()
        .route("/branches", post(create_branch))
        .route("/branches/:id/rename", post(rename_branch))
        .route("/branches/:id/main", post(set_main_branch))
        .route("/branches/:id/unassign", post(bulk_unassign))
}

fn parse_branch(id: &str) -> Result<BranchId, axum::response::Response> {
    id.parse().map_err(errors::stock_error_to_response)
}

pub async fn list_branches(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.engine.list_branches().await {
        Ok(branches) => Json(branches).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

/// Per-branch product counts and unit totals, plus the grand total.
pub async fn summary(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.engine.overview().await {
        Ok(overview) => Json(overview).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn create_branch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    body: Result<Json<dto::CreateBranchRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };

    match services.engine.register_branch(&body.name, body.main).await {
        Ok(branch) => {
            tracing::info!(branch_id = %branch.id, actor = %actor.actor_id(), "branch created");
            (StatusCode::CREATED, Json(branch)).into_response()
        }
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn rename_branch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::RenameBranchRequest>, JsonRejection>,
) -> axum::response::Response {
    let id = match parse_branch(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };

    match services.engine.rename_branch(id, &body.name).await {
        Ok(branch) => {
            tracing::info!(branch_id = %branch.id, actor = %actor.actor_id(), "branch renamed");
            Json(branch).into_response()
        }
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn set_main_branch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_branch(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.engine.set_main_branch(id).await {
        Ok(branch) => {
            tracing::info!(branch_id = %branch.id, actor = %actor.actor_id(), "main branch changed");
            Json(branch).into_response()
        }
        Err(e) => errors::stock_error_to_response(e),
    }
}

/// Move every product held at the branch back to the main branch.
///
/// Responds 200 with one outcome per product even when some transfers fail.
pub async fn bulk_unassign(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_branch(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.engine.bulk_unassign(id, actor.actor_id()).await {
        Ok(report) => Json(dto::BulkUnassignResponse::from(report)).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}
