//! Branch directory: where the authoritative `BranchRegistry` lives.
//!
//! Mutations validate against a fresh registry snapshot, so the registry
//! invariants (unique names, a single main branch) hold for every backend.

use std::sync::{Arc, RwLock};

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{info, instrument};

use stockroom_core::{BranchId, StockError};
use stockroom_inventory::{Branch, BranchRegistry};

use crate::config::{seed_branches, BranchSeed};
use crate::store::{map_sqlx_error, StoreError};

#[async_trait::async_trait]
pub trait BranchDirectory: Send + Sync {
    /// Current registry.
    async fn snapshot(&self) -> Result<BranchRegistry, StoreError>;

    /// Register a branch. With `main`, the flag moves to the new branch.
    async fn register(&self, name: &str, main: bool) -> Result<Branch, StoreError>;

    async fn rename(&self, id: BranchId, name: &str) -> Result<Branch, StoreError>;

    async fn set_main(&self, id: BranchId) -> Result<Branch, StoreError>;

    /// Populate an empty directory. Returns the number of branches created.
    async fn seed(&self, seeds: &[BranchSeed]) -> Result<usize, StoreError>;
}

#[async_trait::async_trait]
impl<D> BranchDirectory for Arc<D>
where
    D: BranchDirectory + ?Sized,
{
    async fn snapshot(&self) -> Result<BranchRegistry, StoreError> {
        (**self).snapshot().await
    }

    async fn register(&self, name: &str, main: bool) -> Result<Branch, StoreError> {
        (**self).register(name, main).await
    }

    async fn rename(&self, id: BranchId, name: &str) -> Result<Branch, StoreError> {
        (**self).rename(id, name).await
    }

    async fn set_main(&self, id: BranchId) -> Result<Branch, StoreError> {
        (**self).set_main(id).await
    }

    async fn seed(&self, seeds: &[BranchSeed]) -> Result<usize, StoreError> {
        (**self).seed(seeds).await
    }
}

fn rejected(err: StockError) -> StoreError {
    match err {
        StockError::InvalidArgument(msg) => StoreError::Invalid(msg),
        other => StoreError::Invalid(other.to_string()),
    }
}

/// Branch writes run under an exclusive table lock, so the only conflict a
/// name write can raise is the `lower(name)` unique index.
fn name_write_error(operation: &str, err: sqlx::Error) -> StoreError {
    match map_sqlx_error(operation, err) {
        StoreError::Conflict(msg) => StoreError::Invalid(format!("branch name already in use: {msg}")),
        other => other,
    }
}

fn lookup(registry: &BranchRegistry, id: BranchId) -> Result<Branch, StoreError> {
    registry.ensure_known(id).cloned().map_err(rejected)
}

#[derive(Debug, Default)]
pub struct InMemoryBranchDirectory {
    registry: RwLock<BranchRegistry>,
}

impl InMemoryBranchDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: BranchRegistry) -> Self {
        Self {
            registry: RwLock::new(registry),
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut BranchRegistry) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut registry = self
            .registry
            .write()
            .map_err(|_| StoreError::Unavailable("branch registry lock poisoned".into()))?;
        // Mutate a copy so a rejected change leaves the registry untouched.
        let mut next = registry.clone();
        let out = f(&mut next)?;
        *registry = next;
        Ok(out)
    }
}

#[async_trait::async_trait]
impl BranchDirectory for InMemoryBranchDirectory {
    async fn snapshot(&self) -> Result<BranchRegistry, StoreError> {
        self.registry
            .read()
            .map(|r| r.clone())
            .map_err(|_| StoreError::Unavailable("branch registry lock poisoned".into()))
    }

    async fn register(&self, name: &str, main: bool) -> Result<Branch, StoreError> {
        self.write(|registry| registry.register(name, main).map_err(rejected))
    }

    async fn rename(&self, id: BranchId, name: &str) -> Result<Branch, StoreError> {
        self.write(|registry| {
            registry.rename(id, name).map_err(rejected)?;
            lookup(registry, id)
        })
    }

    async fn set_main(&self, id: BranchId) -> Result<Branch, StoreError> {
        self.write(|registry| {
            registry.set_main(id).map_err(rejected)?;
            lookup(registry, id)
        })
    }

    async fn seed(&self, seeds: &[BranchSeed]) -> Result<usize, StoreError> {
        self.write(|registry| {
            if !registry.is_empty() {
                return Ok(0);
            }
            for seed in seeds {
                registry.register(&seed.name, seed.main).map_err(rejected)?;
            }
            Ok(seeds.len())
        })
    }
}

/// Directory backed by the `branches` table.
///
/// Every mutation runs in a transaction holding an exclusive table lock, so
/// concurrent registrations validate against each other's results.
#[derive(Debug, Clone)]
pub struct PostgresBranchDirectory {
    pool: PgPool,
}

impl PostgresBranchDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_locked(&self) -> Result<(Transaction<'static, Postgres>, BranchRegistry), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("LOCK TABLE branches IN EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_branches", e))?;

        let rows = sqlx::query("SELECT id, name, is_main FROM branches ORDER BY created_at, id")
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("load_branches", e))?;

        let branches = rows.iter().map(branch_from_row).collect::<Result<Vec<_>, _>>()?;
        let registry = BranchRegistry::from_branches(branches).map_err(rejected)?;
        Ok((tx, registry))
    }

    async fn insert(tx: &mut Transaction<'static, Postgres>, branch: &Branch) -> Result<(), StoreError> {
        if branch.is_main {
            clear_main(tx).await?;
        }
        sqlx::query("INSERT INTO branches (id, name, is_main) VALUES ($1, $2, $3)")
            .bind(branch.id.as_uuid())
            .bind(&branch.name)
            .bind(branch.is_main)
            .execute(&mut **tx)
            .await
            .map_err(|e| name_write_error("insert_branch", e))?;
        Ok(())
    }
}

async fn clear_main(tx: &mut Transaction<'static, Postgres>) -> Result<(), StoreError> {
    sqlx::query("UPDATE branches SET is_main = FALSE WHERE is_main")
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("clear_main", e))?;
    Ok(())
}

fn branch_from_row(row: &PgRow) -> Result<Branch, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Unavailable(format!("failed to decode branch row: {e}"));
    Ok(Branch {
        id: BranchId::from_uuid(row.try_get("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        is_main: row.try_get("is_main").map_err(decode)?,
    })
}

#[async_trait::async_trait]
impl BranchDirectory for PostgresBranchDirectory {
    async fn snapshot(&self) -> Result<BranchRegistry, StoreError> {
        let rows = sqlx::query("SELECT id, name, is_main FROM branches ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_branches", e))?;

        let branches = rows.iter().map(branch_from_row).collect::<Result<Vec<_>, _>>()?;
        BranchRegistry::from_branches(branches).map_err(rejected)
    }

    #[instrument(skip(self), err)]
    async fn register(&self, name: &str, main: bool) -> Result<Branch, StoreError> {
        let (mut tx, mut registry) = self.begin_locked().await?;
        let branch = registry.register(name, main).map_err(rejected)?;
        Self::insert(&mut tx, &branch).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        info!(branch_id = %branch.id, is_main = branch.is_main, "branch registered");
        Ok(branch)
    }

    #[instrument(skip(self), err)]
    async fn rename(&self, id: BranchId, name: &str) -> Result<Branch, StoreError> {
        let (mut tx, mut registry) = self.begin_locked().await?;
        registry.rename(id, name).map_err(rejected)?;
        let branch = lookup(&registry, id)?;

        sqlx::query("UPDATE branches SET name = $2 WHERE id = $1")
            .bind(branch.id.as_uuid())
            .bind(&branch.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| name_write_error("rename_branch", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(branch)
    }

    #[instrument(skip(self), err)]
    async fn set_main(&self, id: BranchId) -> Result<Branch, StoreError> {
        let (mut tx, mut registry) = self.begin_locked().await?;
        registry.set_main(id).map_err(rejected)?;

        clear_main(&mut tx).await?;
        sqlx::query("UPDATE branches SET is_main = TRUE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_main", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        lookup(&registry, id)
    }

    #[instrument(skip(self, seeds), fields(seeds = seeds.len()), err)]
    async fn seed(&self, seeds: &[BranchSeed]) -> Result<usize, StoreError> {
        let (mut tx, registry) = self.begin_locked().await?;
        if !registry.is_empty() {
            return Ok(0);
        }

        let branches = seed_branches(seeds).map_err(rejected)?;
        // Insert the main branch first so the single-main index never trips.
        let (main, rest): (Vec<_>, Vec<_>) = branches.into_iter().partition(|b| b.is_main);
        for branch in main.iter().chain(rest.iter()) {
            Self::insert(&mut tx, branch).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(main.len() + rest.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeds() -> Vec<BranchSeed> {
        vec![
            BranchSeed { name: "Cucuta".into(), main: true },
            BranchSeed { name: "Bogota".into(), main: false },
        ]
    }

    #[tokio::test]
    async fn seed_only_fills_an_empty_directory() {
        let dir = InMemoryBranchDirectory::new();
        assert_eq!(dir.seed(&seeds()).await.unwrap(), 2);
        assert_eq!(dir.seed(&seeds()).await.unwrap(), 0);

        let registry = dir.snapshot().await.unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.main().unwrap().name, "Cucuta");
    }

    #[tokio::test]
    async fn rejected_registration_leaves_registry_untouched() {
        let dir = InMemoryBranchDirectory::new();
        dir.seed(&seeds()).await.unwrap();

        let err = dir.register("  bogota ", false).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert_eq!(dir.snapshot().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn set_main_moves_the_flag() {
        let dir = InMemoryBranchDirectory::new();
        dir.seed(&seeds()).await.unwrap();
        let bogota = dir.snapshot().await.unwrap().by_name("Bogota").unwrap().id;

        let branch = dir.set_main(bogota).await.unwrap();
        assert!(branch.is_main);

        let registry = dir.snapshot().await.unwrap();
        assert_eq!(registry.main_id().unwrap(), bogota);
        assert!(!registry.by_name("Cucuta").unwrap().is_main);
    }

    #[tokio::test]
    async fn unknown_branch_cannot_be_renamed() {
        let dir = InMemoryBranchDirectory::new();
        let err = dir.rename(BranchId::new(), "x").await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }
}
