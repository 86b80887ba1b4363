//! Infrastructure wiring: picks the storage backend from configuration and
//! builds the transfer engine the handlers share.

use std::sync::Arc;

use anyhow::Context;

use stockroom_infra::{
    config::StockroomConfig,
    store::connect_pool,
    BranchDirectory, EngineSettings, InMemoryBranchDirectory, InMemoryCatalog, InMemoryStockStore,
    LedgerStore, PostgresBranchDirectory, PostgresCatalog, PostgresStockStore, ProductCatalog,
    StorageBackend, TransferEngine,
};

/// Engine over type-erased backends, so one handler set serves every backend.
pub type Engine = TransferEngine<Arc<dyn LedgerStore>, Arc<dyn ProductCatalog>, Arc<dyn BranchDirectory>>;

pub struct AppServices {
    pub engine: Engine,
    pub backend: StorageBackend,
}

impl AppServices {
    /// In-memory services with the configured seed branches.
    pub async fn in_memory(config: &StockroomConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn LedgerStore> =
            Arc::new(InMemoryStockStore::with_lock_timeout(config.ledger.lock_timeout()));
        let catalog: Arc<dyn ProductCatalog> = Arc::new(InMemoryCatalog::new());
        let branches: Arc<dyn BranchDirectory> = Arc::new(InMemoryBranchDirectory::new());

        Self::assemble(config, StorageBackend::Memory, store, catalog, branches).await
    }

    /// Postgres-backed services; applies the schema first when configured to.
    pub async fn postgres(config: &StockroomConfig) -> anyhow::Result<Self> {
        let pool = connect_pool(&config.database)
            .await
            .context("failed to connect to postgres")?;

        let store = PostgresStockStore::new(pool.clone(), config.ledger.lock_timeout());
        if config.database.migrate {
            store.migrate().await.context("failed to apply ledger schema")?;
        }

        let store: Arc<dyn LedgerStore> = Arc::new(store);
        let catalog: Arc<dyn ProductCatalog> = Arc::new(PostgresCatalog::new(pool.clone()));
        let branches: Arc<dyn BranchDirectory> = Arc::new(PostgresBranchDirectory::new(pool));

        Self::assemble(config, StorageBackend::Postgres, store, catalog, branches).await
    }

    async fn assemble(
        config: &StockroomConfig,
        backend: StorageBackend,
        store: Arc<dyn LedgerStore>,
        catalog: Arc<dyn ProductCatalog>,
        branches: Arc<dyn BranchDirectory>,
    ) -> anyhow::Result<Self> {
        let seeded = branches
            .seed(&config.branches)
            .await
            .context("failed to seed branches")?;
        if seeded > 0 {
            tracing::info!(seeded, "seeded branch directory from configuration");
        }

        let engine = TransferEngine::with_settings(store, catalog, branches, EngineSettings::from(&config.ledger));
        Ok(Self { engine, backend })
    }
}

/// Build services for the configured backend.
pub async fn build_services(config: &StockroomConfig) -> anyhow::Result<AppServices> {
    let services = match config.storage.backend {
        StorageBackend::Memory => AppServices::in_memory(config).await?,
        StorageBackend::Postgres => AppServices::postgres(config).await?,
    };
    tracing::info!(backend = ?services.backend, "services ready");
    Ok(services)
}
