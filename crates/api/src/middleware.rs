use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use stockroom_core::ActorId;

use crate::app::errors;
use crate::context::ActorContext;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// Require an `x-actor-id` header (UUID) and expose it as [`ActorContext`].
pub async fn actor_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let actor = match extract_actor(req.headers()) {
        Ok(actor) => actor,
        Err(message) => return errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", message),
    };

    req.extensions_mut().insert(ActorContext::new(actor));
    next.run(req).await
}

fn extract_actor(headers: &HeaderMap) -> Result<ActorId, &'static str> {
    let header = headers
        .get(ACTOR_HEADER)
        .ok_or("missing x-actor-id header")?;

    let header = header
        .to_str()
        .map_err(|_| "x-actor-id header is not valid text")?;

    header
        .trim()
        .parse()
        .map_err(|_| "x-actor-id header must be a UUID")
}
