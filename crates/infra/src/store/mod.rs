//! Ledger storage: the current quantity per (product, branch) row plus the
//! append-only movement log, committed together.

mod r#trait;
mod query;
mod in_memory;
mod postgres;

pub use in_memory::{InMemoryStockStore, DEFAULT_LOCK_TIMEOUT};
pub use postgres::{connect_pool, PostgresStockStore};
pub(crate) use postgres::map_sqlx_error;
pub use query::{MovementFilter, MovementLog, MovementPage, Pagination};
pub use r#trait::{StockStore, StoreError};

/// A backend that provides both the ledger and its movement log.
pub trait LedgerStore: StockStore + MovementLog {}

impl<T> LedgerStore for T where T: StockStore + MovementLog + ?Sized {}
