use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockroom_core::StockError;

pub fn status_for(err: &StockError) -> StatusCode {
    match err {
        StockError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        StockError::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        StockError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
        StockError::PersistenceFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub fn stock_error_to_response(err: StockError) -> axum::response::Response {
    let status = status_for(&err);
    let mut body = json!({
        "error": err.code(),
        "message": err.to_string(),
    });

    if let StockError::InsufficientStock {
        requested,
        available,
        ..
    } = &err
    {
        body["requested"] = json!(requested);
        body["available"] = json!(available);
    }

    (status, axum::Json(body)).into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn invalid(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_argument", message)
}

pub fn json_rejection(err: JsonRejection) -> axum::response::Response {
    invalid(err.body_text())
}

pub fn query_rejection(err: QueryRejection) -> axum::response::Response {
    invalid(err.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::{BranchId, ProductId};

    #[test]
    fn taxonomy_maps_to_distinct_statuses() {
        assert_eq!(status_for(&StockError::invalid("x")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&StockError::InsufficientStock {
                product_id: ProductId::new(),
                branch_id: BranchId::new(),
                requested: 2,
                available: 1,
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for(&StockError::conflict("x")), StatusCode::CONFLICT);
        assert_eq!(status_for(&StockError::persistence("x")), StatusCode::SERVICE_UNAVAILABLE);
    }
}
