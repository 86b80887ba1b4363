//! Transfer engine: application-level orchestration of stock operations.
//!
//! ```text
//! intent (Assign / Transfer / Withdraw)
//!   ↓
//! 1. Plan (pure: quantity > 0, distinct branches, ordered row changes)
//!   ↓
//! 2. Check references (product in catalog, branches in registry)
//!   ↓
//! 3. Commit (store: row changes + movement append, one atomic unit)
//!   ↓
//! 4. On write conflict: re-run the commit against fresh state (bounded)
//! ```
//!
//! The engine holds no ledger state of its own; every balance decision is made
//! by the store inside the commit.

use chrono::Utc;
use tracing::{info, instrument, warn};

use stockroom_core::{ActorId, BranchId, ProductId, StockError, StockResult};
use stockroom_inventory::{
    quantities_by_branch, reconcile, summarize, AssignStock, Branch, BranchQuantity, InventoryOverview,
    Movement, ReconciliationReport, RecordKey, StockIntent, StockPlan, TransferStock, WithdrawStock,
};

use crate::branches::BranchDirectory;
use crate::catalog::ProductCatalog;
use crate::config::LedgerSettings;
use crate::store::{LedgerStore, MovementFilter, MovementPage, Pagination, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Extra commit attempts after a write conflict.
    pub conflict_retries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { conflict_retries: 2 }
    }
}

impl From<&LedgerSettings> for EngineSettings {
    fn from(value: &LedgerSettings) -> Self {
        Self {
            conflict_retries: value.conflict_retries,
        }
    }
}

/// Result of moving one product out of a branch during a bulk unassign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnassignOutcome {
    pub product_id: ProductId,
    /// Quantity the branch held when the batch was planned.
    pub quantity: i64,
    pub result: Result<Movement, StockError>,
}

impl UnassignOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-product outcomes of a bulk unassign. Each transfer commits on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkUnassignReport {
    pub branch_id: BranchId,
    pub main_branch_id: BranchId,
    pub outcomes: Vec<UnassignOutcome>,
}

impl BulkUnassignReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }
}

/// Orchestrates assign / transfer / withdraw over a ledger store, a product
/// catalog and a branch directory.
///
/// ## Generic Parameters
///
/// - `S`: ledger backend (`InMemoryStockStore`, `PostgresStockStore`, or `Arc<dyn LedgerStore>`)
/// - `C`: product catalog
/// - `B`: branch directory
#[derive(Debug)]
pub struct TransferEngine<S, C, B> {
    store: S,
    catalog: C,
    branches: B,
    settings: EngineSettings,
}

impl<S, C, B> TransferEngine<S, C, B> {
    pub fn new(store: S, catalog: C, branches: B) -> Self {
        Self::with_settings(store, catalog, branches, EngineSettings::default())
    }

    pub fn with_settings(store: S, catalog: C, branches: B, settings: EngineSettings) -> Self {
        Self {
            store,
            catalog,
            branches,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn branches(&self) -> &B {
        &self.branches
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }
}

impl<S, C, B> TransferEngine<S, C, B>
where
    S: LedgerStore,
    C: ProductCatalog,
    B: BranchDirectory,
{
    /// Record new stock entering a branch.
    pub async fn assign(&self, cmd: AssignStock) -> StockResult<Movement> {
        self.execute(StockIntent::Assign(cmd)).await
    }

    /// Move stock between two branches.
    pub async fn transfer(&self, cmd: TransferStock) -> StockResult<Movement> {
        self.execute(StockIntent::Transfer(cmd)).await
    }

    /// Record stock leaving the system from a branch.
    pub async fn withdraw(&self, cmd: WithdrawStock) -> StockResult<Movement> {
        self.execute(StockIntent::Withdraw(cmd)).await
    }

    /// Plan, check references, and commit one intent atomically.
    #[instrument(
        skip(self, intent),
        fields(kind = %intent.kind(), product_id = %intent.product_id(), quantity = intent.quantity()),
        err
    )]
    pub async fn execute(&self, intent: StockIntent) -> StockResult<Movement> {
        let plan = intent.plan()?;
        self.ensure_references(&intent).await?;
        let movement = self.commit(plan).await?;

        info!(
            movement_id = %movement.id,
            sequence = movement.sequence,
            from = ?movement.from_branch_id,
            to = ?movement.to_branch_id,
            "movement committed"
        );
        Ok(movement)
    }

    async fn ensure_references(&self, intent: &StockIntent) -> StockResult<()> {
        let product_id = intent.product_id();
        if !self.catalog.contains(product_id).await? {
            return Err(StockError::invalid(format!("unknown product {product_id}")));
        }

        let registry = self.branches.snapshot().await?;
        for branch_id in intent.branches() {
            registry.ensure_known(branch_id)?;
        }
        Ok(())
    }

    async fn commit(&self, plan: StockPlan) -> StockResult<Movement> {
        let mut attempt = 0;
        loop {
            match self.store.commit(plan.clone()).await {
                Ok(movement) => return Ok(movement),
                Err(StoreError::Conflict(msg)) if attempt < self.settings.conflict_retries => {
                    attempt += 1;
                    warn!(attempt, error = %msg, "write conflict, retrying commit");
                }
                Err(err) => {
                    if matches!(err, StoreError::Conflict(_) | StoreError::Timeout(_)) {
                        warn!(attempt, error = %err, "commit abandoned");
                    }
                    return Err(err.into());
                }
            }
        }
    }

    /// Move every positive record at `branch_id` to the main branch.
    ///
    /// Each product is an independent transfer; the report lists one outcome
    /// per product and the batch is never rolled back as a whole.
    #[instrument(skip(self), err)]
    pub async fn bulk_unassign(&self, branch_id: BranchId, actor: ActorId) -> StockResult<BulkUnassignReport> {
        let registry = self.branches.snapshot().await?;
        registry.ensure_known(branch_id)?;
        let main_branch_id = registry.main_id()?;
        if branch_id == main_branch_id {
            return Err(StockError::invalid("cannot unassign stock from the main branch"));
        }

        let mut records = self.store.records_at_branch(branch_id).await?;
        records.retain(|r| r.quantity > 0);
        records.sort_by_key(|r| r.product_id);

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let result = self
                .transfer(TransferStock {
                    product_id: record.product_id,
                    from_branch_id: branch_id,
                    to_branch_id: main_branch_id,
                    quantity: record.quantity,
                    actor,
                    occurred_at: Utc::now(),
                })
                .await;

            if let Err(err) = &result {
                warn!(product_id = %record.product_id, error = %err, "unassign transfer failed");
            }
            outcomes.push(UnassignOutcome {
                product_id: record.product_id,
                quantity: record.quantity,
                result,
            });
        }

        let report = BulkUnassignReport {
            branch_id,
            main_branch_id,
            outcomes,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "bulk unassign finished"
        );
        Ok(report)
    }

    /// Committed quantity (0 when no record exists).
    pub async fn quantity(&self, product_id: ProductId, branch_id: BranchId) -> StockResult<i64> {
        Ok(self.store.quantity(RecordKey::new(product_id, branch_id)).await?)
    }

    /// One entry per registered branch, zero where the product is absent.
    pub async fn quantities_by_branch(&self, product_id: ProductId) -> StockResult<Vec<BranchQuantity>> {
        let registry = self.branches.snapshot().await?;
        let records = self.store.records_for_product(product_id).await?;
        Ok(quantities_by_branch(&registry, product_id, &records))
    }

    pub async fn overview(&self) -> StockResult<InventoryOverview> {
        let registry = self.branches.snapshot().await?;
        let records = self.store.all_records().await?;
        Ok(summarize(&registry, &records))
    }

    pub async fn history(&self, filter: MovementFilter, pagination: Pagination) -> StockResult<MovementPage> {
        Ok(self.store.query_movements(filter, pagination).await?)
    }

    /// Replay the movement log and compare it against the ledger.
    ///
    /// Not isolated from concurrent commits; run it on a quiet ledger for an
    /// exact answer.
    #[instrument(skip(self), err)]
    pub async fn reconcile(&self, product_id: Option<ProductId>) -> StockResult<ReconciliationReport> {
        let records = match product_id {
            Some(p) => self.store.records_for_product(p).await?,
            None => self.store.all_records().await?,
        };
        let movements = self.store.replay(product_id).await?;
        let report = reconcile(&records, &movements);

        if !report.is_consistent() {
            warn!(discrepancies = report.discrepancies.len(), "ledger does not match movement log");
        }
        Ok(report)
    }

    pub async fn list_branches(&self) -> StockResult<Vec<Branch>> {
        Ok(self.branches.snapshot().await?.list())
    }

    pub async fn register_branch(&self, name: &str, main: bool) -> StockResult<Branch> {
        Ok(self.branches.register(name, main).await?)
    }

    pub async fn rename_branch(&self, id: BranchId, name: &str) -> StockResult<Branch> {
        Ok(self.branches.rename(id, name).await?)
    }

    pub async fn set_main_branch(&self, id: BranchId) -> StockResult<Branch> {
        Ok(self.branches.set_main(id).await?)
    }

    /// Declare a product identity. Returns `false` when it was already known.
    pub async fn register_product(&self, product_id: ProductId) -> StockResult<bool> {
        Ok(self.catalog.register(product_id).await?)
    }
}
