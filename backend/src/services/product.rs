//! Product stock accessor service
//!
//! Products are an external aggregate; this service only reads them and
//! applies guarded stock deltas on behalf of the inventory ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use shared::models::Product;

use crate::error::{AppError, AppResult};

/// Service for product lookups and stock access
#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    code: String,
    name: String,
    current_stock: i32,
    minimum_stock: i32,
    unit_price: Decimal,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self) -> Product {
        Product {
            id: self.id,
            code: self.code,
            name: self.name,
            current_stock: self.current_stock,
            minimum_stock: self.minimum_stock,
            unit_price: self.unit_price,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const PRODUCT_COLUMNS: &str =
    "id, code, name, current_stock, minimum_stock, unit_price, active, created_at, updated_at";

impl ProductService {
    /// Create a new ProductService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Get a product by id
    pub async fn get_product(&self, product_id: Uuid) -> AppResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        Ok(row.into_product())
    }

    /// Latest committed stock for a product
    pub async fn current_stock(&self, product_id: Uuid) -> AppResult<i32> {
        let stock =
            sqlx::query_scalar::<_, i32>("SELECT current_stock FROM products WHERE id = $1")
                .bind(product_id)
                .fetch_optional(&self.db)
                .await?
                .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        Ok(stock)
    }

    /// Active products at or below their minimum stock threshold
    pub async fn low_stock(&self) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            SELECT {}
            FROM products
            WHERE active = true
            ORDER BY code
            "#,
            PRODUCT_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(ProductRow::into_product)
            .filter(Product::is_low_on_stock)
            .collect())
    }

    /// Apply a signed stock delta as one guarded statement.
    ///
    /// The guard keeps the resulting stock non-negative atomically; the update
    /// also takes the row lock for the remainder of the caller's transaction.
    /// The product must be known to exist.
    pub async fn adjust_stock(
        exec: impl PgExecutor<'_>,
        product_id: Uuid,
        delta: i32,
    ) -> AppResult<i32> {
        let new_stock = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE products
            SET current_stock = current_stock + $2, updated_at = NOW()
            WHERE id = $1 AND current_stock + $2 >= 0
            RETURNING current_stock
            "#,
        )
        .bind(product_id)
        .bind(delta)
        .fetch_optional(exec)
        .await?;

        new_stock.ok_or_else(|| {
            AppError::InsufficientStock(format!(
                "stock of product {} cannot go below zero",
                product_id
            ))
        })
    }
}
