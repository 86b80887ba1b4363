use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Extension, Query},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn read_routes() -> Router {
    Router::new().route("/movements", get(list_movements))
}

/// Movement history, newest first.
///
/// Query: `product_id`, `branch_id`, `kind` (inbound|outbound|transfer),
/// `from` / `to` (RFC 3339, inclusive), `limit` (1..=1000, default 50), `offset`.
pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::MovementQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return errors::query_rejection(e),
    };

    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return errors::invalid("`from` must not be after `to`");
        }
    }

    match services.engine.history(query.filter(), query.pagination()).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}
