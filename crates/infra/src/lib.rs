//! Infrastructure layer: ledger storage, catalog and branch adapters,
//! configuration, and the transfer engine that composes them.

pub mod branches;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod store;


pub use branches::{BranchDirectory, InMemoryBranchDirectory, PostgresBranchDirectory};
pub use catalog::{InMemoryCatalog, PostgresCatalog, ProductCatalog};
pub use config::{StockroomConfig, StorageBackend};
pub use engine::{BulkUnassignReport, EngineSettings, TransferEngine, UnassignOutcome};
pub use store::{
    InMemoryStockStore, LedgerStore, MovementFilter, MovementLog, MovementPage, Pagination, PostgresStockStore,
    StockStore, StoreError,
};
