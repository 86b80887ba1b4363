//! `stockroom-core` — identifiers and the error taxonomy shared by every layer.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{StockError, StockResult};
pub use id::{ActorId, BranchId, MovementId, ProductId};
