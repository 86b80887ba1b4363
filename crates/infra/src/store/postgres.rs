//! Postgres-backed ledger and movement log.
//!
//! Every commit is one transaction. Debits are conditional updates evaluated
//! by the server (`quantity >= n`), so the check and the mutation happen in a
//! single statement against the committed row; credits are upserts. Rows are
//! touched in `RecordKey` order so two transfers over the same pair of rows
//! cannot deadlock.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (serialization failure) | `40001` | `Conflict` | Concurrent writer won |
//! | Database (deadlock detected) | `40P01` | `Conflict` | Lock cycle broken by the server |
//! | Database (lock not available) | `55P03` | `Timeout` | `lock_timeout` expired |
//! | Database (foreign key violation) | `23503` | `Invalid` | Unknown product or branch |
//! | Database (check violation) | `23514` | `Invalid` | Malformed row (negative quantity, bad shape) |
//! | Database (unique violation) | `23505` | `Conflict` | Concurrent insert of the same key |
//! | Database (other) / PoolTimedOut / PoolClosed / Io | N/A | `Unavailable` | Backend down |

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{instrument, Span};

use stockroom_core::{ActorId, BranchId, MovementId, ProductId};
use stockroom_inventory::{ChangeDirection, InventoryRecord, Movement, MovementKind, RecordKey, StockPlan};

use crate::config::DatabaseSettings;

use super::query::{MovementFilter, MovementLog, MovementPage, Pagination};
use super::r#trait::{StockStore, StoreError};

const MIGRATION: &str = include_str!("../../migrations/0001_stock_ledger.sql");

/// Postgres-backed ledger store.
///
/// ## Thread Safety
///
/// Uses the SQLx connection pool (Arc + Send + Sync); any number of stateless
/// service instances may share one database.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
    lock_timeout: Duration,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self {
            pool: Arc::new(pool),
            lock_timeout,
        }
    }

    /// Open a pool from settings.
    pub async fn connect(settings: &DatabaseSettings, lock_timeout: Duration) -> Result<Self, StoreError> {
        let pool = connect_pool(settings).await?;
        Ok(Self::new(pool, lock_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables, indexes and the append-only trigger (idempotent).
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn fetch_records(&self, query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>, operation: &str) -> Result<Vec<InventoryRecord>, StoreError> {
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        rows.iter().map(record_from_row).collect()
    }
}

/// Build a pool with the configured bounds.
pub async fn connect_pool(settings: &DatabaseSettings) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .connect(&settings.url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

#[async_trait::async_trait]
impl StockStore for PostgresStockStore {
    async fn quantity(&self, key: RecordKey) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT quantity FROM inventory WHERE product_id = $1 AND branch_id = $2")
            .bind(key.product_id.as_uuid())
            .bind(key.branch_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("quantity", e))?;

        match row {
            Some(row) => row
                .try_get::<i64, _>("quantity")
                .map_err(|e| StoreError::Unavailable(format!("failed to read quantity: {e}"))),
            None => Ok(0),
        }
    }

    async fn records_for_product(&self, product_id: ProductId) -> Result<Vec<InventoryRecord>, StoreError> {
        let query = sqlx::query(
            "SELECT product_id, branch_id, quantity FROM inventory WHERE product_id = $1 ORDER BY branch_id",
        )
        .bind(*product_id.as_uuid());
        self.fetch_records(query, "records_for_product").await
    }

    async fn records_at_branch(&self, branch_id: BranchId) -> Result<Vec<InventoryRecord>, StoreError> {
        let query = sqlx::query(
            "SELECT product_id, branch_id, quantity FROM inventory WHERE branch_id = $1 ORDER BY product_id",
        )
        .bind(*branch_id.as_uuid());
        self.fetch_records(query, "records_at_branch").await
    }

    async fn all_records(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let query = sqlx::query(
            "SELECT product_id, branch_id, quantity FROM inventory ORDER BY product_id, branch_id",
        );
        self.fetch_records(query, "all_records").await
    }

    #[instrument(
        skip(self, plan),
        fields(
            product_id = %plan.movement().product_id,
            kind = %plan.movement().kind,
            quantity = plan.movement().quantity,
            sequence = tracing::field::Empty
        ),
        err
    )]
    async fn commit(&self, plan: StockPlan) -> Result<Movement, StoreError> {
        plan.movement()
            .validate()
            .map_err(|e| StoreError::Invalid(e.to_string()))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Bound every row-lock wait inside this transaction.
        sqlx::query(&set_lock_timeout_sql(self.lock_timeout))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        for change in plan.changes() {
            match change.direction {
                ChangeDirection::Debit => {
                    let debited = sqlx::query(
                        r#"
                        UPDATE inventory
                        SET quantity = quantity - $3, updated_at = NOW()
                        WHERE product_id = $1 AND branch_id = $2 AND quantity >= $3
                        RETURNING quantity
                        "#,
                    )
                    .bind(change.key.product_id.as_uuid())
                    .bind(change.key.branch_id.as_uuid())
                    .bind(change.quantity)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("debit", e))?;

                    if debited.is_none() {
                        let available = current_quantity(&mut tx, change.key).await?;
                        tx.rollback()
                            .await
                            .map_err(|e| map_sqlx_error("rollback", e))?;
                        return Err(StoreError::InsufficientStock {
                            key: change.key,
                            requested: change.quantity,
                            available,
                        });
                    }
                }
                ChangeDirection::Credit => {
                    sqlx::query(
                        r#"
                        INSERT INTO inventory (product_id, branch_id, quantity)
                        VALUES ($1, $2, $3)
                        ON CONFLICT (product_id, branch_id)
                        DO UPDATE SET
                            quantity = inventory.quantity + EXCLUDED.quantity,
                            updated_at = NOW()
                        "#,
                    )
                    .bind(change.key.product_id.as_uuid())
                    .bind(change.key.branch_id.as_uuid())
                    .bind(change.quantity)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("credit", e))?;
                }
            }
        }

        let movement = plan.into_movement();
        let movement_id = MovementId::new();
        let row = sqlx::query(
            r#"
            INSERT INTO inventory_movements (
                id,
                product_id,
                from_branch_id,
                to_branch_id,
                quantity,
                kind,
                actor,
                occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING sequence
            "#,
        )
        .bind(movement_id.as_uuid())
        .bind(movement.product_id.as_uuid())
        .bind(movement.from_branch_id.map(uuid::Uuid::from))
        .bind(movement.to_branch_id.map(uuid::Uuid::from))
        .bind(movement.quantity)
        .bind(movement.kind.as_str())
        .bind(movement.actor.as_uuid())
        .bind(movement.occurred_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;

        let sequence: i64 = row
            .try_get("sequence")
            .map_err(|e| StoreError::Unavailable(format!("failed to read sequence: {e}")))?;

        // Commit transaction
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("sequence", sequence);
        Ok(movement.commit(movement_id, sequence as u64))
    }
}

#[async_trait::async_trait]
impl MovementLog for PostgresStockStore {
    async fn query_movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        // Optional filters collapse to TRUE when the parameter is NULL, so one
        // parameterized statement covers every combination.
        const WHERE: &str = r#"
            WHERE ($1::uuid IS NULL OR product_id = $1)
                AND ($2::uuid IS NULL OR from_branch_id = $2 OR to_branch_id = $2)
                AND ($3::text IS NULL OR kind = $3)
                AND ($4::timestamptz IS NULL OR occurred_at >= $4)
                AND ($5::timestamptz IS NULL OR occurred_at <= $5)
        "#;

        let product = filter.product_id.map(uuid::Uuid::from);
        let branch = filter.branch_id.map(uuid::Uuid::from);
        let kind = filter.kind.map(MovementKind::as_str);

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM inventory_movements {WHERE}"))
            .bind(product)
            .bind(branch)
            .bind(kind)
            .bind(filter.occurred_after)
            .bind(filter.occurred_before)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_movements", e))?;

        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| StoreError::Unavailable(format!("failed to read count: {e}")))?;

        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements {WHERE} ORDER BY sequence DESC LIMIT $6 OFFSET $7"
        ))
        .bind(product)
        .bind(branch)
        .bind(kind)
        .bind(filter.occurred_after)
        .bind(filter.occurred_before)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_movements", e))?;

        let movements = rows.iter().map(movement_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(MovementPage::new(movements, total as u64, pagination))
    }

    async fn replay(&self, product_id: Option<ProductId>) -> Result<Vec<Movement>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements WHERE ($1::uuid IS NULL OR product_id = $1) ORDER BY sequence ASC"
        ))
        .bind(product_id.map(uuid::Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("replay", e))?;

        rows.iter().map(movement_from_row).collect()
    }
}

const MOVEMENT_COLUMNS: &str =
    "sequence, id, product_id, from_branch_id, to_branch_id, quantity, kind, actor, occurred_at";

async fn current_quantity(tx: &mut Transaction<'_, Postgres>, key: RecordKey) -> Result<i64, StoreError> {
    let row = sqlx::query("SELECT quantity FROM inventory WHERE product_id = $1 AND branch_id = $2")
        .bind(key.product_id.as_uuid())
        .bind(key.branch_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("current_quantity", e))?;

    match row {
        Some(row) => row
            .try_get("quantity")
            .map_err(|e| StoreError::Unavailable(format!("failed to read quantity: {e}"))),
        None => Ok(0),
    }
}

fn record_from_row(row: &PgRow) -> Result<InventoryRecord, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Unavailable(format!("failed to decode inventory row: {e}"));
    Ok(InventoryRecord {
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode)?),
        branch_id: BranchId::from_uuid(row.try_get("branch_id").map_err(decode)?),
        quantity: row.try_get("quantity").map_err(decode)?,
    })
}

fn movement_from_row(row: &PgRow) -> Result<Movement, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Unavailable(format!("failed to decode movement row: {e}"));

    let kind: String = row.try_get("kind").map_err(decode)?;
    let kind: MovementKind = kind
        .parse()
        .map_err(|e| StoreError::Unavailable(format!("corrupt movement kind: {e}")))?;
    let sequence: i64 = row.try_get("sequence").map_err(decode)?;
    let from: Option<uuid::Uuid> = row.try_get("from_branch_id").map_err(decode)?;
    let to: Option<uuid::Uuid> = row.try_get("to_branch_id").map_err(decode)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(decode)?;

    Ok(Movement {
        id: MovementId::from_uuid(row.try_get("id").map_err(decode)?),
        sequence: sequence as u64,
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode)?),
        from_branch_id: from.map(BranchId::from_uuid),
        to_branch_id: to.map(BranchId::from_uuid),
        quantity: row.try_get("quantity").map_err(decode)?,
        kind,
        actor: ActorId::from_uuid(row.try_get("actor").map_err(decode)?),
        occurred_at,
    })
}

/// `lock_timeout = 0` disables the limit in Postgres, so sub-millisecond
/// values are raised to 1ms.
fn set_lock_timeout_sql(timeout: Duration) -> String {
    format!("SET LOCAL lock_timeout = '{}ms'", timeout.as_millis().max(1))
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some(code) => map_sqlstate(code, msg),
                None => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

fn map_sqlstate(code: &str, msg: String) -> StoreError {
    match code {
        // serialization_failure, deadlock_detected, unique_violation
        "40001" | "40P01" | "23505" => StoreError::Conflict(msg),
        // lock_not_available (lock_timeout)
        "55P03" => StoreError::Timeout(msg),
        // foreign_key_violation, check_violation
        "23503" | "23514" => StoreError::Invalid(msg),
        _ => StoreError::Unavailable(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_is_never_disabled() {
        assert_eq!(set_lock_timeout_sql(Duration::ZERO), "SET LOCAL lock_timeout = '1ms'");
        assert_eq!(set_lock_timeout_sql(Duration::from_micros(300)), "SET LOCAL lock_timeout = '1ms'");
        assert_eq!(set_lock_timeout_sql(Duration::from_secs(2)), "SET LOCAL lock_timeout = '2000ms'");
    }

    #[test]
    fn sqlstates_map_to_store_errors() {
        assert!(matches!(map_sqlstate("40001", String::new()), StoreError::Conflict(_)));
        assert!(matches!(map_sqlstate("40P01", String::new()), StoreError::Conflict(_)));
        assert!(matches!(map_sqlstate("55P03", String::new()), StoreError::Timeout(_)));
        assert!(matches!(map_sqlstate("23503", String::new()), StoreError::Invalid(_)));
        assert!(matches!(map_sqlstate("08006", String::new()), StoreError::Unavailable(_)));
    }

    #[test]
    fn pool_errors_are_unavailable() {
        assert!(matches!(
            map_sqlx_error("commit", sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error("commit", sqlx::Error::RowNotFound),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn migration_declares_append_only_log() {
        assert!(MIGRATION.contains("CREATE TABLE IF NOT EXISTS inventory_movements"));
        assert!(MIGRATION.contains("BEFORE UPDATE OR DELETE ON inventory_movements"));
        assert!(MIGRATION.contains("CHECK (quantity >= 0)"));
    }
}
