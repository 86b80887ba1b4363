//! Product identities known to the ledger.
//!
//! The catalog owns product attributes; the ledger only needs to know which
//! product ids exist so that a mutation cannot invent one.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use sqlx::PgPool;

use stockroom_core::ProductId;

use crate::store::{map_sqlx_error, StoreError};

#[async_trait::async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn contains(&self, product_id: ProductId) -> Result<bool, StoreError>;

    /// Declare a product. Returns `false` when it was already known.
    async fn register(&self, product_id: ProductId) -> Result<bool, StoreError>;
}

#[async_trait::async_trait]
impl<C> ProductCatalog for Arc<C>
where
    C: ProductCatalog + ?Sized,
{
    async fn contains(&self, product_id: ProductId) -> Result<bool, StoreError> {
        (**self).contains(product_id).await
    }

    async fn register(&self, product_id: ProductId) -> Result<bool, StoreError> {
        (**self).register(product_id).await
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashSet<ProductId>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = ProductId>) -> Self {
        Self {
            products: RwLock::new(products.into_iter().collect()),
        }
    }
}

#[async_trait::async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn contains(&self, product_id: ProductId) -> Result<bool, StoreError> {
        let products = self
            .products
            .read()
            .map_err(|_| StoreError::Unavailable("catalog lock poisoned".into()))?;
        Ok(products.contains(&product_id))
    }

    async fn register(&self, product_id: ProductId) -> Result<bool, StoreError> {
        let mut products = self
            .products
            .write()
            .map_err(|_| StoreError::Unavailable("catalog lock poisoned".into()))?;
        Ok(products.insert(product_id))
    }
}

/// Catalog backed by the `products` table.
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProductCatalog for PostgresCatalog {
    async fn contains(&self, product_id: ProductId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM products WHERE id = $1")
            .bind(product_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("catalog_contains", e))?;
        Ok(row.is_some())
    }

    async fn register(&self, product_id: ProductId) -> Result<bool, StoreError> {
        let result = sqlx::query("INSERT INTO products (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(product_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("catalog_register", e))?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_is_idempotent() {
        let catalog = InMemoryCatalog::new();
        let p = ProductId::new();

        assert!(!catalog.contains(p).await.unwrap());
        assert!(catalog.register(p).await.unwrap());
        assert!(!catalog.register(p).await.unwrap());
        assert!(catalog.contains(p).await.unwrap());
    }
}
