use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};
use tracing::instrument;

use stockroom_core::{BranchId, MovementId, ProductId};
use stockroom_inventory::{InventoryRecord, Movement, RecordKey, StockPlan};

use super::query::{MovementFilter, MovementLog, MovementPage, Pagination};
use super::r#trait::{apply_change, StockStore, StoreError};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// One ledger row. `present` flips on the first committed credit; a slot that
/// was only ever locked (e.g. by a failed debit) is not reported as a record.
#[derive(Debug, Default)]
struct Slot {
    quantity: i64,
    present: bool,
}

type Row = Arc<RowMutex<Slot>>;

/// In-memory ledger + movement log.
///
/// Intended for tests/dev and single-process deployments. Each row carries its
/// own async mutex, so commits on disjoint rows proceed in parallel while
/// commits on the same row serialize. Locks are taken in `RecordKey` order and
/// every wait is bounded by `lock_timeout`.
#[derive(Debug)]
pub struct InMemoryStockStore {
    rows: RwLock<HashMap<RecordKey, Row>>,
    log: Mutex<Vec<Movement>>,
    lock_timeout: Duration,
}

impl Default for InMemoryStockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            lock_timeout,
        }
    }

    fn poisoned(what: &str) -> StoreError {
        StoreError::Unavailable(format!("{what} lock poisoned"))
    }

    /// Get (or lazily create) the slot for `key`.
    fn row(&self, key: RecordKey) -> Result<Row, StoreError> {
        {
            let rows = self.rows.read().map_err(|_| Self::poisoned("ledger"))?;
            if let Some(row) = rows.get(&key) {
                return Ok(row.clone());
            }
        }

        let mut rows = self.rows.write().map_err(|_| Self::poisoned("ledger"))?;
        Ok(rows.entry(key).or_default().clone())
    }

    fn existing_rows(&self, pred: impl Fn(&RecordKey) -> bool) -> Result<Vec<(RecordKey, Row)>, StoreError> {
        let rows = self.rows.read().map_err(|_| Self::poisoned("ledger"))?;
        let mut out: Vec<(RecordKey, Row)> = rows
            .iter()
            .filter(|(k, _)| pred(k))
            .map(|(k, r)| (*k, r.clone()))
            .collect();
        out.sort_by_key(|(k, _)| *k);
        Ok(out)
    }

    async fn lock(&self, key: RecordKey, row: Row) -> Result<OwnedMutexGuard<Slot>, StoreError> {
        tokio::time::timeout(self.lock_timeout, row.lock_owned())
            .await
            .map_err(|_| {
                StoreError::Timeout(format!(
                    "row {key} busy for more than {}ms",
                    self.lock_timeout.as_millis()
                ))
            })
    }

    async fn collect_records(&self, rows: Vec<(RecordKey, Row)>) -> Result<Vec<InventoryRecord>, StoreError> {
        let mut out = Vec::with_capacity(rows.len());
        for (key, row) in rows {
            let slot = self.lock(key, row).await?;
            if slot.present {
                out.push(InventoryRecord {
                    product_id: key.product_id,
                    branch_id: key.branch_id,
                    quantity: slot.quantity,
                });
            }
        }
        Ok(out)
    }

    fn log_snapshot(&self) -> Result<Vec<Movement>, StoreError> {
        self.log
            .lock()
            .map(|log| log.clone())
            .map_err(|_| Self::poisoned("movement log"))
    }
}

#[async_trait::async_trait]
impl StockStore for InMemoryStockStore {
    async fn quantity(&self, key: RecordKey) -> Result<i64, StoreError> {
        let row = {
            let rows = self.rows.read().map_err(|_| Self::poisoned("ledger"))?;
            rows.get(&key).cloned()
        };
        match row {
            Some(row) => Ok(self.lock(key, row).await?.quantity),
            None => Ok(0),
        }
    }

    async fn records_for_product(&self, product_id: ProductId) -> Result<Vec<InventoryRecord>, StoreError> {
        let rows = self.existing_rows(|k| k.product_id == product_id)?;
        self.collect_records(rows).await
    }

    async fn records_at_branch(&self, branch_id: BranchId) -> Result<Vec<InventoryRecord>, StoreError> {
        let rows = self.existing_rows(|k| k.branch_id == branch_id)?;
        self.collect_records(rows).await
    }

    async fn all_records(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let rows = self.existing_rows(|_| true)?;
        self.collect_records(rows).await
    }

    #[instrument(
        skip(self, plan),
        fields(
            product_id = %plan.movement().product_id,
            kind = %plan.movement().kind,
            quantity = plan.movement().quantity
        ),
        err
    )]
    async fn commit(&self, plan: StockPlan) -> Result<Movement, StoreError> {
        plan.movement()
            .validate()
            .map_err(|e| StoreError::Invalid(e.to_string()))?;

        // 1) Lock every touched row, in key order (plans are pre-sorted).
        let mut guards = Vec::with_capacity(plan.changes().len());
        for change in plan.changes() {
            let row = self.row(change.key)?;
            guards.push(self.lock(change.key, row).await?);
        }

        // 2) Validate against the locked, committed quantities. Nothing mutated yet.
        let mut next = Vec::with_capacity(guards.len());
        for (change, slot) in plan.changes().iter().zip(&guards) {
            next.push(apply_change(change, slot.quantity)?);
        }

        // 3) Apply rows and append the movement while still holding the row locks.
        let mut log = self.log.lock().map_err(|_| Self::poisoned("movement log"))?;
        for (slot, quantity) in guards.iter_mut().zip(next) {
            slot.quantity = quantity;
            slot.present = true;
        }
        let sequence = log.len() as u64 + 1;
        let movement = plan.into_movement().commit(MovementId::new(), sequence);
        log.push(movement.clone());

        Ok(movement)
    }
}

#[async_trait::async_trait]
impl MovementLog for InMemoryStockStore {
    async fn query_movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let matching: Vec<Movement> = self
            .log_snapshot()?
            .into_iter()
            .rev()
            .filter(|m| filter.matches(m))
            .collect();

        let total = matching.len() as u64;
        let movements = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();

        Ok(MovementPage::new(movements, total, pagination))
    }

    async fn replay(&self, product_id: Option<ProductId>) -> Result<Vec<Movement>, StoreError> {
        Ok(self
            .log_snapshot()?
            .into_iter()
            .filter(|m| product_id.is_none_or(|p| m.product_id == p))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockroom_core::ActorId;
    use stockroom_inventory::{AssignStock, MovementKind, StockIntent, TransferStock, WithdrawStock};

    fn assign(product_id: ProductId, branch_id: BranchId, quantity: i64) -> StockPlan {
        StockIntent::Assign(AssignStock {
            product_id,
            branch_id,
            quantity,
            actor: ActorId::new(),
            occurred_at: Utc::now(),
        })
        .plan()
        .unwrap()
    }

    fn transfer(product_id: ProductId, from: BranchId, to: BranchId, quantity: i64) -> StockPlan {
        StockIntent::Transfer(TransferStock {
            product_id,
            from_branch_id: from,
            to_branch_id: to,
            quantity,
            actor: ActorId::new(),
            occurred_at: Utc::now(),
        })
        .plan()
        .unwrap()
    }

    #[tokio::test]
    async fn commit_assigns_sequence_and_updates_rows() {
        let store = InMemoryStockStore::new();
        let p = ProductId::new();
        let a = BranchId::new();
        let b = BranchId::new();

        let first = store.commit(assign(p, a, 100)).await.unwrap();
        let second = store.commit(transfer(p, a, b, 30)).await.unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(second.kind, MovementKind::Transfer);
        assert_eq!(store.quantity(RecordKey::new(p, a)).await.unwrap(), 70);
        assert_eq!(store.quantity(RecordKey::new(p, b)).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn failed_debit_changes_nothing_and_creates_no_record() {
        let store = InMemoryStockStore::new();
        let p = ProductId::new();
        let a = BranchId::new();
        let b = BranchId::new();

        let err = store.commit(transfer(p, a, b, 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { available: 0, .. }));

        assert!(store.all_records().await.unwrap().is_empty());
        assert!(store.replay(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zeroed_record_stays_present() {
        let store = InMemoryStockStore::new();
        let p = ProductId::new();
        let a = BranchId::new();

        store.commit(assign(p, a, 5)).await.unwrap();
        let withdraw = StockIntent::Withdraw(WithdrawStock {
            product_id: p,
            branch_id: a,
            quantity: 5,
            actor: ActorId::new(),
            occurred_at: Utc::now(),
        })
        .plan()
        .unwrap();
        store.commit(withdraw).await.unwrap();

        let records = store.records_for_product(p).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].quantity, 0);
    }

    #[tokio::test]
    async fn busy_row_times_out_without_committing() {
        let store = InMemoryStockStore::with_lock_timeout(Duration::from_millis(20));
        let p = ProductId::new();
        let a = BranchId::new();
        store.commit(assign(p, a, 10)).await.unwrap();

        let key = RecordKey::new(p, a);
        let held = store.row(key).unwrap().lock_owned().await;

        let err = store.commit(assign(p, a, 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        drop(held);

        assert_eq!(store.quantity(key).await.unwrap(), 10);
        assert_eq!(store.replay(Some(p)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn query_filters_by_branch_and_kind_newest_first() {
        let store = InMemoryStockStore::new();
        let p = ProductId::new();
        let a = BranchId::new();
        let b = BranchId::new();
        let c = BranchId::new();

        store.commit(assign(p, a, 10)).await.unwrap();
        store.commit(assign(p, c, 10)).await.unwrap();
        store.commit(transfer(p, a, b, 4)).await.unwrap();

        let page = store
            .query_movements(MovementFilter::for_branch(a), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.movements[0].sequence, 3);
        assert_eq!(page.movements[1].sequence, 1);

        let filter = MovementFilter {
            kind: Some(MovementKind::Inbound),
            ..Default::default()
        };
        let page = store
            .query_movements(filter, Pagination::new(Some(1), Some(0)))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.movements.len(), 1);
        assert!(page.has_more);
    }
}
