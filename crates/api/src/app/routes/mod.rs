use axum::Router;

use crate::middleware;

pub mod branches;
pub mod inventory;
pub mod movements;
pub mod products;
pub mod system;

/// Router for all ledger endpoints. Mutating routes require an actor.
pub fn router() -> Router {
    let reads = Router::new()
        .merge(branches::read_routes())
        .merge(inventory::read_routes())
        .merge(movements::read_routes());

    let writes = Router::new()
        .merge(branches::write_routes())
        .merge(inventory::write_routes())
        .merge(products::write_routes())
        .layer(axum::middleware::from_fn(middleware::actor_middleware));

    reads.merge(writes)
}
