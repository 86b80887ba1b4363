use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use stockroom_core::ProductId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn write_routes() -> Router {
    Router::new().route("/products", post(register_product))
}

/// Declare a product identity. An empty body mints a new id.
pub async fn register_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    body: Bytes,
) -> axum::response::Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        dto::RegisterProductRequest::default()
    } else {
        match serde_json::from_slice::<dto::RegisterProductRequest>(&body) {
            Ok(r) => r,
            Err(e) => return errors::invalid(format!("invalid product body: {e}")),
        }
    };
    let product_id = request.product_id.unwrap_or_else(ProductId::new);

    match services.engine.register_product(product_id).await {
        Ok(created) => {
            tracing::info!(%product_id, actor = %actor.actor_id(), created, "product declared");
            let status = if created { StatusCode::CREATED } else { StatusCode::OK };
            (status, Json(dto::ProductResponse { product_id, created })).into_response()
        }
        Err(e) => errors::stock_error_to_response(e),
    }
}
