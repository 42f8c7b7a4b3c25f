//! Inventory ledger service
//!
//! Every stock change goes through `post_movement`: the product row is locked,
//! the resulting stock is derived from the stock observed under that lock, and
//! the movement append plus the stock update commit in the same transaction.
//! Movements are never updated or deleted afterwards.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::models::{stock_after, InventoryMovement, MovementType};
use shared::types::{PaginatedResponse, Pagination};
use shared::validation;

use crate::error::{AppError, AppResult};
use crate::services::product::ProductService;
use crate::services::{is_serialization_failure, MAX_TX_ATTEMPTS};

/// Inventory service managing the movement ledger
#[derive(Clone)]
pub struct InventoryService {
    db: PgPool,
}

/// Fully resolved movement ready to be posted
#[derive(Debug, Clone)]
pub(crate) struct MovementRequest {
    pub product_id: Uuid,
    pub movement_type: MovementType,
    /// Magnitude; the direction comes from the type
    pub quantity: i32,
    pub reason: Option<String>,
    pub external_reference: Option<String>,
    pub user_id: Uuid,
    pub unit_cost: Option<Decimal>,
}

/// Input for a manual stock adjustment (signed quantity)
#[derive(Debug, Deserialize)]
pub struct AdjustmentInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub reason: String,
    pub user_id: Uuid,
    pub unit_cost: Option<Decimal>,
}

/// Input for a direct purchase receipt into stock
#[derive(Debug, Deserialize)]
pub struct PurchaseReceiptInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub order_reference: String,
    pub user_id: Uuid,
    pub unit_cost: Option<Decimal>,
}

/// Input for a sale leaving stock
#[derive(Debug, Deserialize)]
pub struct SaleInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub sale_reference: String,
    pub user_id: Uuid,
}

/// Input for a return (into stock from a customer, or out to a supplier)
#[derive(Debug, Deserialize)]
pub struct ReturnInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub reference: Option<String>,
    pub reason: Option<String>,
    pub user_id: Uuid,
}

/// Input for an opening balance
#[derive(Debug, Deserialize)]
pub struct InitialStockInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub user_id: Uuid,
    pub unit_cost: Option<Decimal>,
}

/// Search criteria for movement queries
#[derive(Debug, Default, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<Uuid>,
    pub movement_type: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub user_id: Option<Uuid>,
}

/// Movement counts and unit totals for one month
#[derive(Debug, Serialize)]
pub struct InventoryStatistics {
    pub year: i32,
    pub month: u32,
    pub total_movements: i64,
    pub units_in: i64,
    pub units_out: i64,
    pub movements_by_type: Vec<TypeCount>,
}

#[derive(Debug, Serialize)]
pub struct TypeCount {
    pub movement_type: String,
    pub count: i64,
    pub units: i64,
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    product_id: Uuid,
    movement_type: String,
    quantity: i32,
    stock_before: i32,
    stock_after: i32,
    reason: Option<String>,
    external_reference: Option<String>,
    user_id: Uuid,
    unit_cost: Option<Decimal>,
    total_cost: Option<Decimal>,
    created_at: DateTime<Utc>,
}

impl MovementRow {
    fn into_movement(self) -> AppResult<InventoryMovement> {
        let movement_type = MovementType::from_str(&self.movement_type).ok_or_else(|| {
            AppError::Internal(format!("unknown movement type '{}'", self.movement_type))
        })?;
        Ok(InventoryMovement {
            id: self.id,
            product_id: self.product_id,
            movement_type,
            quantity: self.quantity,
            stock_before: self.stock_before,
            stock_after: self.stock_after,
            reason: self.reason,
            external_reference: self.external_reference,
            user_id: self.user_id,
            unit_cost: self.unit_cost,
            total_cost: self.total_cost,
            created_at: self.created_at,
        })
    }
}

const MOVEMENT_COLUMNS: &str = "id, product_id, movement_type, quantity, stock_before, \
     stock_after, reason, external_reference, user_id, unit_cost, total_cost, created_at";

impl InventoryService {
    /// Create a new InventoryService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record a manual stock correction. The sign of `quantity` picks the
    /// movement type; the stored quantity is the magnitude.
    pub async fn register_adjustment(&self, input: AdjustmentInput) -> AppResult<InventoryMovement> {
        tracing::debug!(
            product_id = %input.product_id,
            quantity = input.quantity,
            "Registering manual adjustment"
        );

        validation::validate_adjustment_quantity(input.quantity).map_err(|msg| {
            AppError::validation("quantity", msg, "La cantidad del ajuste no puede ser cero")
        })?;
        if input.reason.trim().is_empty() {
            return Err(AppError::validation(
                "reason",
                "Adjustment reason is required",
                "El motivo del ajuste es obligatorio",
            ));
        }

        let movement_type = if input.quantity > 0 {
            MovementType::ManualAdjustmentIn
        } else {
            MovementType::ManualAdjustmentOut
        };

        let movement = self
            .post_with_retry(MovementRequest {
                product_id: input.product_id,
                movement_type,
                quantity: input.quantity.abs(),
                reason: Some(input.reason),
                external_reference: None,
                user_id: input.user_id,
                unit_cost: input.unit_cost,
            })
            .await?;

        tracing::info!(movement_id = %movement.id, "Manual adjustment recorded");
        Ok(movement)
    }

    /// Record goods received against a purchase order
    pub async fn register_purchase_receipt(
        &self,
        input: PurchaseReceiptInput,
    ) -> AppResult<InventoryMovement> {
        tracing::debug!(
            product_id = %input.product_id,
            order_reference = %input.order_reference,
            "Registering purchase receipt"
        );

        validation::validate_movement_quantity(input.quantity).map_err(|msg| {
            AppError::validation("quantity", msg, "La cantidad debe ser mayor que cero")
        })?;

        let movement = self
            .post_with_retry(MovementRequest {
                product_id: input.product_id,
                movement_type: MovementType::PurchaseReceipt,
                quantity: input.quantity,
                reason: Some(format!("Recepción de compra {}", input.order_reference)),
                external_reference: Some(input.order_reference),
                user_id: input.user_id,
                unit_cost: input.unit_cost,
            })
            .await?;

        tracing::info!(movement_id = %movement.id, "Purchase receipt recorded");
        Ok(movement)
    }

    /// Record units sold to a customer
    pub async fn register_sale(&self, input: SaleInput) -> AppResult<InventoryMovement> {
        tracing::debug!(
            product_id = %input.product_id,
            sale_reference = %input.sale_reference,
            "Registering sale"
        );

        validation::validate_movement_quantity(input.quantity).map_err(|msg| {
            AppError::validation("quantity", msg, "La cantidad debe ser mayor que cero")
        })?;

        let movement = self
            .post_with_retry(MovementRequest {
                product_id: input.product_id,
                movement_type: MovementType::SaleOut,
                quantity: input.quantity,
                reason: Some(format!("Venta {}", input.sale_reference)),
                external_reference: Some(input.sale_reference),
                user_id: input.user_id,
                unit_cost: None,
            })
            .await?;

        tracing::info!(movement_id = %movement.id, "Sale recorded");
        Ok(movement)
    }

    /// Record a customer return back into stock
    pub async fn register_return_in(&self, input: ReturnInput) -> AppResult<InventoryMovement> {
        self.register_return(input, MovementType::ReturnIn).await
    }

    /// Record goods returned to a supplier
    pub async fn register_return_out(&self, input: ReturnInput) -> AppResult<InventoryMovement> {
        self.register_return(input, MovementType::ReturnOut).await
    }

    async fn register_return(
        &self,
        input: ReturnInput,
        movement_type: MovementType,
    ) -> AppResult<InventoryMovement> {
        tracing::debug!(
            product_id = %input.product_id,
            movement_type = movement_type.as_str(),
            "Registering return"
        );

        validation::validate_movement_quantity(input.quantity).map_err(|msg| {
            AppError::validation("quantity", msg, "La cantidad debe ser mayor que cero")
        })?;

        let movement = self
            .post_with_retry(MovementRequest {
                product_id: input.product_id,
                movement_type,
                quantity: input.quantity,
                reason: input.reason,
                external_reference: input.reference,
                user_id: input.user_id,
                unit_cost: None,
            })
            .await?;

        tracing::info!(movement_id = %movement.id, "Return recorded");
        Ok(movement)
    }

    /// Record an opening balance for a product entering the catalog
    pub async fn register_initial_stock(
        &self,
        input: InitialStockInput,
    ) -> AppResult<InventoryMovement> {
        tracing::debug!(product_id = %input.product_id, "Registering initial stock");

        validation::validate_movement_quantity(input.quantity).map_err(|msg| {
            AppError::validation("quantity", msg, "La cantidad debe ser mayor que cero")
        })?;

        let movement = self
            .post_with_retry(MovementRequest {
                product_id: input.product_id,
                movement_type: MovementType::InitialStock,
                quantity: input.quantity,
                reason: Some("Stock inicial".to_string()),
                external_reference: None,
                user_id: input.user_id,
                unit_cost: input.unit_cost,
            })
            .await?;

        tracing::info!(movement_id = %movement.id, "Initial stock recorded");
        Ok(movement)
    }

    /// Movement history for one product, newest first
    pub async fn movements_for_product(
        &self,
        product_id: Uuid,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<InventoryMovement>> {
        let product_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                .bind(product_id)
                .fetch_one(&self.db)
                .await?;

        if !product_exists {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM inventory_movements WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            SELECT {}
            FROM inventory_movements
            WHERE product_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(product_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let movements = rows
            .into_iter()
            .map(MovementRow::into_movement)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(movements, &pagination, total as u64))
    }

    /// Search movements by any combination of criteria, newest first
    pub async fn movements_by_criteria(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<InventoryMovement>> {
        if let Some(type_str) = &filter.movement_type {
            if MovementType::from_str(type_str).is_none() {
                return Err(AppError::validation(
                    "movement_type",
                    "Unknown movement type",
                    "Tipo de movimiento desconocido",
                ));
            }
        }

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM inventory_movements
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::varchar IS NULL OR movement_type = $2)
              AND ($3::date IS NULL OR created_at::date >= $3)
              AND ($4::date IS NULL OR created_at::date <= $4)
              AND ($5::uuid IS NULL OR user_id = $5)
            "#,
        )
        .bind(filter.product_id)
        .bind(&filter.movement_type)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.user_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            SELECT {}
            FROM inventory_movements
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::varchar IS NULL OR movement_type = $2)
              AND ($3::date IS NULL OR created_at::date >= $3)
              AND ($4::date IS NULL OR created_at::date <= $4)
              AND ($5::uuid IS NULL OR user_id = $5)
            ORDER BY created_at DESC
            LIMIT $6 OFFSET $7
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(filter.product_id)
        .bind(&filter.movement_type)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.user_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let movements = rows
            .into_iter()
            .map(MovementRow::into_movement)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(movements, &pagination, total as u64))
    }

    /// Movement counts and unit totals for a calendar month
    pub async fn statistics(&self, year: i32, month: u32) -> AppResult<InventoryStatistics> {
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            AppError::validation("month", "Invalid year or month", "Mes o año inválido")
        })?;
        let end = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| {
            AppError::validation("month", "Invalid year or month", "Mes o año inválido")
        })?;

        let start_ts = start.and_time(NaiveTime::MIN).and_utc();
        let end_ts = end.and_time(NaiveTime::MIN).and_utc();

        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT movement_type, COUNT(*), COALESCE(SUM(quantity), 0)::bigint
            FROM inventory_movements
            WHERE created_at >= $1 AND created_at < $2
            GROUP BY movement_type
            ORDER BY movement_type
            "#,
        )
        .bind(start_ts)
        .bind(end_ts)
        .fetch_all(&self.db)
        .await?;

        let mut total_movements = 0i64;
        let mut units_in = 0i64;
        let mut units_out = 0i64;
        let mut movements_by_type = Vec::with_capacity(rows.len());

        for (type_str, count, units) in rows {
            let movement_type = MovementType::from_str(&type_str).ok_or_else(|| {
                AppError::Internal(format!("unknown movement type '{}'", type_str))
            })?;
            total_movements += count;
            if movement_type.is_inbound() {
                units_in += units;
            } else {
                units_out += units;
            }
            movements_by_type.push(TypeCount {
                movement_type: type_str,
                count,
                units,
            });
        }

        Ok(InventoryStatistics {
            year,
            month,
            total_movements,
            units_in,
            units_out,
            movements_by_type,
        })
    }

    /// Post a movement inside the caller's transaction.
    ///
    /// Locks the product row, derives the resulting stock from the locked
    /// value, applies the stock delta and appends the ledger entry. The caller
    /// owns the commit, so multi-line receipts stay all-or-nothing.
    pub(crate) async fn post_movement(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        req: &MovementRequest,
    ) -> AppResult<InventoryMovement> {
        let (stock_before, product_price) = sqlx::query_as::<_, (i32, Decimal)>(
            "SELECT current_stock, unit_price FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(req.product_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let new_stock = stock_after(stock_before, req.quantity, req.movement_type);
        if new_stock < 0 {
            return Err(AppError::InsufficientStock(format!(
                "requested {} units of product {}, only {} in stock",
                req.quantity, req.product_id, stock_before
            )));
        }

        let delta = req.movement_type.sign() * req.quantity;
        let stock_now = ProductService::adjust_stock(&mut **tx, req.product_id, delta).await?;

        let unit_cost = req.unit_cost.unwrap_or(product_price);
        let total_cost = unit_cost * Decimal::from(req.quantity);

        let row = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            INSERT INTO inventory_movements
                (product_id, movement_type, quantity, stock_before, stock_after,
                 reason, external_reference, user_id, unit_cost, total_cost)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(req.product_id)
        .bind(req.movement_type.as_str())
        .bind(req.quantity)
        .bind(stock_before)
        .bind(stock_now)
        .bind(&req.reason)
        .bind(&req.external_reference)
        .bind(req.user_id)
        .bind(unit_cost)
        .bind(total_cost)
        .fetch_one(&mut **tx)
        .await?;

        row.into_movement()
    }

    /// Post a single movement in its own transaction, retrying serialization
    /// failures before surfacing a conflict
    async fn post_with_retry(&self, req: MovementRequest) -> AppResult<InventoryMovement> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.try_post(&req).await {
                Err(err) if is_serialization_failure(&err) => {
                    if attempts < MAX_TX_ATTEMPTS {
                        tracing::warn!(
                            attempt = attempts,
                            product_id = %req.product_id,
                            "Serialization failure posting movement, retrying"
                        );
                        continue;
                    }
                    return Err(AppError::Conflict(format!(
                        "movement for product {}",
                        req.product_id
                    )));
                }
                other => return other,
            }
        }
    }

    async fn try_post(&self, req: &MovementRequest) -> AppResult<InventoryMovement> {
        let mut tx = self.db.begin().await?;
        let movement = self.post_movement(&mut tx, req).await?;
        tx.commit().await?;
        Ok(movement)
    }
}
