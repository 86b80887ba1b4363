//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: backend selection and engine construction
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use stockroom_infra::config::StockroomConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router from configuration (entrypoint used by `main.rs`).
pub async fn build_app(config: &StockroomConfig) -> anyhow::Result<Router> {
    let services = services::build_services(config).await?;
    Ok(router(Arc::new(services)))
}

/// Router over already-built services.
pub fn router(services: Arc<services::AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
