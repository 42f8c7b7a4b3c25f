//! Purchase order lifecycle service
//!
//! Orders move Draft -> Pending -> Sent -> Confirmed -> Completed, with
//! cancellation possible from any non-terminal state. Receipts post inventory
//! movements through the ledger inside the same transaction that updates the
//! order, so a failing line leaves nothing half-applied.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::models::{
    compute_line_amounts, MovementType, OrderLine, OrderState, PurchaseOrder, Supplier,
};
use shared::types::{DateRange, MoneyRounding, PaginatedResponse, Pagination};
use shared::validation;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::inventory::{InventoryService, MovementRequest};
use crate::services::{is_serialization_failure, is_unique_violation, MAX_TX_ATTEMPTS};

/// Service managing the purchase order lifecycle
#[derive(Clone)]
pub struct PurchaseOrderService {
    db: PgPool,
    rounding: MoneyRounding,
    default_tax_percent: Decimal,
}

/// Input for creating a purchase order
#[derive(Debug, Deserialize)]
pub struct CreateOrderInput {
    pub supplier_id: Uuid,
    pub buyer_id: Uuid,
    pub order_date: Option<NaiveDate>,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub tax_percent: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub notes: Option<String>,
}

/// Input for adding a line to an order
#[derive(Debug, Deserialize)]
pub struct AddLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Defaults to the product's current price when absent
    pub unit_price: Option<Decimal>,
    pub discount_percent: Option<Decimal>,
}

/// Input for editing an existing line
#[derive(Debug, Deserialize)]
pub struct UpdateLineInput {
    pub quantity: Option<i32>,
    pub unit_price: Option<Decimal>,
    pub discount_percent: Option<Decimal>,
}

/// Input for approving an order
#[derive(Debug, Deserialize)]
pub struct ApproveInput {
    pub approver_id: Uuid,
}

/// Input for a full receipt
#[derive(Debug, Deserialize)]
pub struct ReceiveInput {
    pub receiver_id: Uuid,
}

/// One line quantity within a partial receipt
#[derive(Debug, Deserialize)]
pub struct ReceiveLineItem {
    pub line_id: Uuid,
    pub quantity: i32,
}

/// Input for a partial receipt
#[derive(Debug, Deserialize)]
pub struct ReceivePartialInput {
    pub receiver_id: Uuid,
    pub items: Vec<ReceiveLineItem>,
}

/// Input for cancelling an order
#[derive(Debug, Deserialize)]
pub struct CancelInput {
    pub reason: String,
}

/// Search criteria for order listings
#[derive(Debug, Default, Deserialize)]
pub struct OrderSearchFilter {
    pub supplier_id: Option<Uuid>,
    pub state: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub buyer_id: Option<Uuid>,
}

/// Order listing row without lines
#[derive(Debug, Serialize, FromRow)]
pub struct OrderSummary {
    pub id: Uuid,
    pub order_number: String,
    pub supplier_id: Uuid,
    pub supplier_name: String,
    pub order_date: NaiveDate,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub state: String,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Aggregated purchasing figures for a period
#[derive(Debug, Serialize)]
pub struct PurchaseStatistics {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total_orders: i64,
    pub orders_by_state: Vec<StateCount>,
    /// Sum over non-cancelled orders in the period
    pub total_amount: Decimal,
    pub average_order_amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct StateCount {
    pub state: String,
    pub count: i64,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    supplier_id: Uuid,
    supplier_name: String,
    order_date: NaiveDate,
    estimated_delivery_date: Option<NaiveDate>,
    actual_delivery_date: Option<NaiveDate>,
    state: String,
    buyer_id: Uuid,
    approver_id: Option<Uuid>,
    approved_at: Option<DateTime<Utc>>,
    receiver_id: Option<Uuid>,
    received_at: Option<DateTime<Utc>>,
    subtotal: Decimal,
    tax_percent: Decimal,
    tax_amount: Decimal,
    discount: Decimal,
    total: Decimal,
    notes: Option<String>,
    cancellation_reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLine>) -> AppResult<PurchaseOrder> {
        let state = OrderState::from_str(&self.state)
            .ok_or_else(|| AppError::Internal(format!("unknown order state '{}'", self.state)))?;
        Ok(PurchaseOrder {
            id: self.id,
            order_number: self.order_number,
            supplier_id: self.supplier_id,
            supplier_name: self.supplier_name,
            order_date: self.order_date,
            estimated_delivery_date: self.estimated_delivery_date,
            actual_delivery_date: self.actual_delivery_date,
            state,
            buyer_id: self.buyer_id,
            approver_id: self.approver_id,
            approved_at: self.approved_at,
            receiver_id: self.receiver_id,
            received_at: self.received_at,
            lines,
            subtotal: self.subtotal,
            tax_percent: self.tax_percent,
            tax_amount: self.tax_amount,
            discount: self.discount,
            total: self.total,
            notes: self.notes,
            cancellation_reason: self.cancellation_reason,
            cancelled_at: self.cancelled_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_code: String,
    product_name: String,
    line_number: i32,
    quantity_ordered: i32,
    unit_price: Decimal,
    discount_percent: Decimal,
    discount_amount: Decimal,
    subtotal: Decimal,
    quantity_received: i32,
}

impl LineRow {
    fn into_line(self) -> OrderLine {
        OrderLine {
            id: self.id,
            order_id: self.order_id,
            product_id: self.product_id,
            product_code: self.product_code,
            product_name: self.product_name,
            line_number: self.line_number,
            quantity_ordered: self.quantity_ordered,
            unit_price: self.unit_price,
            discount_percent: self.discount_percent,
            discount_amount: self.discount_amount,
            subtotal: self.subtotal,
            quantity_received: self.quantity_received,
        }
    }
}

#[derive(Debug, FromRow)]
struct SupplierRow {
    id: Uuid,
    tax_id: String,
    name: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl SupplierRow {
    fn into_supplier(self) -> Supplier {
        Supplier {
            id: self.id,
            tax_id: self.tax_id,
            name: self.name,
            active: self.active,
            created_at: self.created_at,
        }
    }
}

const ORDER_COLUMNS: &str = "id, order_number, supplier_id, supplier_name, order_date, \
     estimated_delivery_date, actual_delivery_date, state, buyer_id, approver_id, approved_at, \
     receiver_id, received_at, subtotal, tax_percent, tax_amount, discount, total, notes, \
     cancellation_reason, cancelled_at, created_at, updated_at";

const LINE_COLUMNS: &str = "id, order_id, product_id, product_code, product_name, line_number, \
     quantity_ordered, unit_price, discount_percent, discount_amount, subtotal, quantity_received";

const SUMMARY_COLUMNS: &str = "id, order_number, supplier_id, supplier_name, order_date, \
     estimated_delivery_date, state, subtotal, total, created_at";

impl PurchaseOrderService {
    /// Create a new PurchaseOrderService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            rounding: MoneyRounding::new(config.pricing.rounding_scale),
            default_tax_percent: config.pricing.default_tax_percent,
        }
    }

    /// Create an order in Draft with a freshly assigned order number
    pub async fn create_order(&self, input: CreateOrderInput) -> AppResult<PurchaseOrder> {
        tracing::debug!(supplier_id = %input.supplier_id, "Creating purchase order");

        let tax_percent = input.tax_percent.unwrap_or(self.default_tax_percent);
        validation::validate_tax_percent(tax_percent).map_err(|msg| {
            AppError::validation(
                "tax_percent",
                msg,
                "El porcentaje de impuesto debe estar entre 0 y 100",
            )
        })?;
        let discount = input.discount.unwrap_or(Decimal::ZERO);
        validation::validate_order_discount(discount).map_err(|msg| {
            AppError::validation("discount", msg, "El descuento no puede ser negativo")
        })?;

        let order_date = input.order_date.unwrap_or_else(|| Utc::now().date_naive());

        // The order number is derived from a per-day count; two concurrent
        // creates can collide on the unique index, so retry on 23505
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self
                .try_create_order(&input, order_date, tax_percent, discount)
                .await
            {
                Err(err) if is_unique_violation(&err) && attempts < MAX_TX_ATTEMPTS => continue,
                Ok(order) => {
                    tracing::info!(order_id = %order.id, order_number = %order.order_number, "Purchase order created");
                    return Ok(order);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_create_order(
        &self,
        input: &CreateOrderInput,
        order_date: NaiveDate,
        tax_percent: Decimal,
        discount: Decimal,
    ) -> AppResult<PurchaseOrder> {
        let mut tx = self.db.begin().await?;

        let supplier = sqlx::query_as::<_, SupplierRow>(
            "SELECT id, tax_id, name, active, created_at FROM suppliers WHERE id = $1",
        )
        .bind(input.supplier_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Supplier".to_string()))?
        .into_supplier();

        if !supplier.active {
            return Err(AppError::validation(
                "supplier_id",
                "Supplier is inactive",
                "El proveedor está inactivo",
            ));
        }
        // Orders are tax documents; the supplier RUT must check out
        validation::validate_rut(&supplier.tax_id).map_err(|msg| {
            AppError::validation("supplier_id", msg, "El RUT del proveedor no es válido")
        })?;

        let order_number = Self::next_order_number(&mut *tx, order_date).await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            INSERT INTO purchase_orders
                (order_number, supplier_id, supplier_name, order_date, estimated_delivery_date,
                 state, buyer_id, subtotal, tax_percent, tax_amount, discount, total, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, 0, $9, 0 - $9, $10)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(&order_number)
        .bind(input.supplier_id)
        .bind(&supplier.name)
        .bind(order_date)
        .bind(input.estimated_delivery_date)
        .bind(OrderState::Draft.as_str())
        .bind(input.buyer_id)
        .bind(tax_percent)
        .bind(discount)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.into_order(Vec::new())
    }

    /// Next number in the OC-YYYYMMDD-NNNNNN series for the given day
    async fn next_order_number(
        exec: impl PgExecutor<'_>,
        date: NaiveDate,
    ) -> AppResult<String> {
        let prefix = format!("OC-{}", date.format("%Y%m%d"));
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM purchase_orders WHERE order_number LIKE $1",
        )
        .bind(format!("{}-%", prefix))
        .fetch_one(exec)
        .await?;

        Ok(format!("{}-{:06}", prefix, count + 1))
    }

    /// Get an order with its lines
    pub async fn get_order(&self, order_id: Uuid) -> AppResult<PurchaseOrder> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM purchase_orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?;

        let lines = Self::fetch_lines(&self.db, order_id).await?;
        row.into_order(lines)
    }

    /// Add a line to a modifiable order
    pub async fn add_line(&self, order_id: Uuid, input: AddLineInput) -> AppResult<PurchaseOrder> {
        tracing::debug!(%order_id, product_id = %input.product_id, "Adding order line");

        validation::validate_line_quantity(input.quantity).map_err(|msg| {
            AppError::validation("quantity", msg, "La cantidad debe ser mayor que cero")
        })?;
        let discount_percent = input.discount_percent.unwrap_or(Decimal::ZERO);
        validation::validate_discount_percent(discount_percent).map_err(|msg| {
            AppError::validation(
                "discount_percent",
                msg,
                "El descuento debe estar entre 0 y 100",
            )
        })?;

        let mut tx = self.db.begin().await?;
        let mut order = self.lock_order(&mut tx, order_id).await?;
        Self::ensure_modifiable(&order, "add_line")?;

        let (product_code, product_name, product_price) =
            sqlx::query_as::<_, (String, String, Decimal)>(
                "SELECT code, name, unit_price FROM products WHERE id = $1 AND active = true",
            )
            .bind(input.product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let unit_price = input.unit_price.unwrap_or(product_price);
        validation::validate_unit_price(unit_price).map_err(|msg| {
            AppError::validation(
                "unit_price",
                msg,
                "El precio unitario debe ser mayor que cero",
            )
        })?;

        let (discount_amount, subtotal) =
            compute_line_amounts(input.quantity, unit_price, discount_percent, self.rounding);
        let line_number = order.lines.len() as i32 + 1;

        let line_row = sqlx::query_as::<_, LineRow>(&format!(
            r#"
            INSERT INTO purchase_order_lines
                (order_id, product_id, product_code, product_name, line_number,
                 quantity_ordered, unit_price, discount_percent, discount_amount,
                 subtotal, quantity_received)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0)
            RETURNING {}
            "#,
            LINE_COLUMNS
        ))
        .bind(order_id)
        .bind(input.product_id)
        .bind(&product_code)
        .bind(&product_name)
        .bind(line_number)
        .bind(input.quantity)
        .bind(unit_price)
        .bind(discount_percent)
        .bind(discount_amount)
        .bind(subtotal)
        .fetch_one(&mut *tx)
        .await?;

        order.push_line(line_row.into_line(), self.rounding);
        Self::store_totals(&mut tx, &order).await?;

        tx.commit().await?;
        tracing::info!(%order_id, line_number, "Order line added");
        Ok(order)
    }

    /// Edit quantity, price or discount of a line on a modifiable order
    pub async fn update_line(
        &self,
        order_id: Uuid,
        line_id: Uuid,
        input: UpdateLineInput,
    ) -> AppResult<PurchaseOrder> {
        tracing::debug!(%order_id, %line_id, "Updating order line");

        let mut tx = self.db.begin().await?;
        let mut order = self.lock_order(&mut tx, order_id).await?;
        Self::ensure_modifiable(&order, "update_line")?;

        let rounding = self.rounding;
        let line = order
            .lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| AppError::NotFound("Order line".to_string()))?;

        if let Some(quantity) = input.quantity {
            validation::validate_line_quantity(quantity).map_err(|msg| {
                AppError::validation("quantity", msg, "La cantidad debe ser mayor que cero")
            })?;
            line.quantity_ordered = quantity;
        }
        if let Some(unit_price) = input.unit_price {
            validation::validate_unit_price(unit_price).map_err(|msg| {
                AppError::validation(
                    "unit_price",
                    msg,
                    "El precio unitario debe ser mayor que cero",
                )
            })?;
            line.unit_price = unit_price;
        }
        if let Some(discount_percent) = input.discount_percent {
            validation::validate_discount_percent(discount_percent).map_err(|msg| {
                AppError::validation(
                    "discount_percent",
                    msg,
                    "El descuento debe estar entre 0 y 100",
                )
            })?;
            line.discount_percent = discount_percent;
        }

        line.recalculate(rounding);

        sqlx::query(
            r#"
            UPDATE purchase_order_lines
            SET quantity_ordered = $2, unit_price = $3, discount_percent = $4,
                discount_amount = $5, subtotal = $6
            WHERE id = $1
            "#,
        )
        .bind(line.id)
        .bind(line.quantity_ordered)
        .bind(line.unit_price)
        .bind(line.discount_percent)
        .bind(line.discount_amount)
        .bind(line.subtotal)
        .execute(&mut *tx)
        .await?;

        order.recompute_totals(rounding);
        Self::store_totals(&mut tx, &order).await?;

        tx.commit().await?;
        tracing::info!(%order_id, %line_id, "Order line updated");
        Ok(order)
    }

    /// Remove a line from a modifiable order, renumbering the remainder
    pub async fn remove_line(&self, order_id: Uuid, line_id: Uuid) -> AppResult<PurchaseOrder> {
        tracing::debug!(%order_id, %line_id, "Removing order line");

        let mut tx = self.db.begin().await?;
        let mut order = self.lock_order(&mut tx, order_id).await?;
        Self::ensure_modifiable(&order, "remove_line")?;

        if !order.remove_line(line_id, self.rounding) {
            return Err(AppError::NotFound("Order line".to_string()));
        }

        sqlx::query("DELETE FROM purchase_order_lines WHERE id = $1")
            .bind(line_id)
            .execute(&mut *tx)
            .await?;

        for line in &order.lines {
            sqlx::query("UPDATE purchase_order_lines SET line_number = $2 WHERE id = $1")
                .bind(line.id)
                .bind(line.line_number)
                .execute(&mut *tx)
                .await?;
        }

        Self::store_totals(&mut tx, &order).await?;

        tx.commit().await?;
        tracing::info!(%order_id, %line_id, "Order line removed");
        Ok(order)
    }

    /// Submit a draft for internal review (Draft -> Pending)
    pub async fn submit(&self, order_id: Uuid) -> AppResult<PurchaseOrder> {
        tracing::debug!(%order_id, "Submitting purchase order");

        let mut tx = self.db.begin().await?;
        let mut order = self.lock_order(&mut tx, order_id).await?;

        if order.state != OrderState::Draft {
            return Err(Self::illegal_state(&order, "submit"));
        }
        if order.lines.is_empty() {
            return Err(AppError::validation(
                "lines",
                "Order must have at least one line",
                "La orden debe tener al menos una línea",
            ));
        }
        for line in &order.lines {
            validation::validate_line_quantity(line.quantity_ordered)
                .and(validation::validate_unit_price(line.unit_price))
                .and(validation::validate_discount_percent(line.discount_percent))
                .map_err(|msg| {
                    AppError::validation(
                        &format!("lines[{}]", line.line_number),
                        msg,
                        "La línea contiene valores inválidos",
                    )
                })?;
        }

        Self::set_state(&mut tx, order_id, OrderState::Pending).await?;
        order.state = OrderState::Pending;

        tx.commit().await?;
        tracing::info!(%order_id, "Purchase order submitted");
        Ok(order)
    }

    /// Record managerial approval on a pending order. Leaves the state
    /// untouched; `send` is the transition that moves it along.
    pub async fn approve(&self, order_id: Uuid, input: ApproveInput) -> AppResult<PurchaseOrder> {
        tracing::debug!(%order_id, approver_id = %input.approver_id, "Approving purchase order");

        let mut tx = self.db.begin().await?;
        let mut order = self.lock_order(&mut tx, order_id).await?;

        if !order.is_approvable() {
            return Err(Self::illegal_state(&order, "approve"));
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE purchase_orders SET approver_id = $2, approved_at = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(order_id)
        .bind(input.approver_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        order.approver_id = Some(input.approver_id);
        order.approved_at = Some(now);

        tx.commit().await?;
        tracing::info!(%order_id, "Purchase order approved");
        Ok(order)
    }

    /// Transmit the order to the supplier (Draft/Pending -> Sent)
    pub async fn send(&self, order_id: Uuid) -> AppResult<PurchaseOrder> {
        tracing::debug!(%order_id, "Sending purchase order");

        let mut tx = self.db.begin().await?;
        let mut order = self.lock_order(&mut tx, order_id).await?;

        if !matches!(order.state, OrderState::Draft | OrderState::Pending) {
            return Err(Self::illegal_state(&order, "send"));
        }
        if !order.is_sendable() {
            return Err(AppError::validation(
                "lines",
                "Order must have at least one line",
                "La orden debe tener al menos una línea",
            ));
        }

        Self::set_state(&mut tx, order_id, OrderState::Sent).await?;
        order.state = OrderState::Sent;

        tx.commit().await?;
        tracing::info!(%order_id, "Purchase order sent");
        Ok(order)
    }

    /// Record supplier confirmation (Sent -> Confirmed)
    pub async fn confirm(&self, order_id: Uuid) -> AppResult<PurchaseOrder> {
        tracing::debug!(%order_id, "Confirming purchase order");

        let mut tx = self.db.begin().await?;
        let mut order = self.lock_order(&mut tx, order_id).await?;

        if order.state != OrderState::Sent {
            return Err(Self::illegal_state(&order, "confirm"));
        }

        Self::set_state(&mut tx, order_id, OrderState::Confirmed).await?;
        order.state = OrderState::Confirmed;

        tx.commit().await?;
        tracing::info!(%order_id, "Purchase order confirmed");
        Ok(order)
    }

    /// Receive every pending unit on the order and complete it
    pub async fn receive_full(
        &self,
        order_id: Uuid,
        input: ReceiveInput,
    ) -> AppResult<PurchaseOrder> {
        tracing::debug!(%order_id, receiver_id = %input.receiver_id, "Receiving purchase order in full");

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.try_receive_full(order_id, input.receiver_id).await {
                Err(err) if is_serialization_failure(&err) => {
                    if attempts < MAX_TX_ATTEMPTS {
                        tracing::warn!(attempt = attempts, %order_id, "Serialization failure receiving order, retrying");
                        continue;
                    }
                    return Err(AppError::Conflict(format!("receipt of order {}", order_id)));
                }
                Ok(order) => {
                    tracing::info!(%order_id, "Purchase order fully received");
                    return Ok(order);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_receive_full(
        &self,
        order_id: Uuid,
        receiver_id: Uuid,
    ) -> AppResult<PurchaseOrder> {
        let mut tx = self.db.begin().await?;
        let mut order = self.lock_order(&mut tx, order_id).await?;

        if !order.is_receivable() {
            return Err(Self::illegal_state(&order, "receive_full"));
        }

        let inventory = InventoryService::new(self.db.clone());
        let order_number = order.order_number.clone();

        for line in order.lines.iter_mut() {
            let pending = line.quantity_pending();
            if pending <= 0 {
                continue;
            }
            line.register_receipt(pending)?;

            inventory
                .post_movement(
                    &mut tx,
                    &MovementRequest {
                        product_id: line.product_id,
                        movement_type: MovementType::PurchaseReceipt,
                        quantity: pending,
                        reason: Some(format!("Recepción orden {}", order_number)),
                        external_reference: Some(order_number.clone()),
                        user_id: receiver_id,
                        unit_cost: Some(line.unit_price),
                    },
                )
                .await?;

            sqlx::query("UPDATE purchase_order_lines SET quantity_received = $2 WHERE id = $1")
                .bind(line.id)
                .bind(line.quantity_received)
                .execute(&mut *tx)
                .await?;
        }

        Self::complete_receipt(&mut tx, &mut order, receiver_id).await?;

        tx.commit().await?;
        Ok(order)
    }

    /// Receive specific quantities per line. Completes the order only when
    /// every line is fully received; otherwise the state is left unchanged.
    pub async fn receive_partial(
        &self,
        order_id: Uuid,
        input: ReceivePartialInput,
    ) -> AppResult<PurchaseOrder> {
        tracing::debug!(%order_id, items = input.items.len(), "Receiving purchase order partially");

        if input.items.is_empty() {
            return Err(AppError::validation(
                "items",
                "At least one line quantity is required",
                "Debe indicar al menos una línea a recibir",
            ));
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.try_receive_partial(order_id, &input).await {
                Err(err) if is_serialization_failure(&err) => {
                    if attempts < MAX_TX_ATTEMPTS {
                        tracing::warn!(attempt = attempts, %order_id, "Serialization failure receiving order, retrying");
                        continue;
                    }
                    return Err(AppError::Conflict(format!("receipt of order {}", order_id)));
                }
                Ok(order) => {
                    tracing::info!(%order_id, state = order.state.as_str(), "Partial receipt recorded");
                    return Ok(order);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_receive_partial(
        &self,
        order_id: Uuid,
        input: &ReceivePartialInput,
    ) -> AppResult<PurchaseOrder> {
        let mut tx = self.db.begin().await?;
        let mut order = self.lock_order(&mut tx, order_id).await?;

        if !order.is_receivable() {
            return Err(Self::illegal_state(&order, "receive_partial"));
        }

        let inventory = InventoryService::new(self.db.clone());
        let order_number = order.order_number.clone();

        for item in &input.items {
            let line = order
                .lines
                .iter_mut()
                .find(|l| l.id == item.line_id)
                .ok_or_else(|| AppError::NotFound("Order line".to_string()))?;

            line.register_receipt(item.quantity)?;

            inventory
                .post_movement(
                    &mut tx,
                    &MovementRequest {
                        product_id: line.product_id,
                        movement_type: MovementType::PurchaseReceipt,
                        quantity: item.quantity,
                        reason: Some(format!("Recepción orden {}", order_number)),
                        external_reference: Some(order_number.clone()),
                        user_id: input.receiver_id,
                        unit_cost: Some(line.unit_price),
                    },
                )
                .await?;

            sqlx::query("UPDATE purchase_order_lines SET quantity_received = $2 WHERE id = $1")
                .bind(line.id)
                .bind(line.quantity_received)
                .execute(&mut *tx)
                .await?;
        }

        if order.all_lines_complete() {
            Self::complete_receipt(&mut tx, &mut order, input.receiver_id).await?;
        } else {
            sqlx::query("UPDATE purchase_orders SET updated_at = NOW() WHERE id = $1")
                .bind(order_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    /// Cancel a non-terminal order. Already-posted movements stay in the
    /// ledger; any stock correction is a separate manual adjustment.
    pub async fn cancel(&self, order_id: Uuid, input: CancelInput) -> AppResult<PurchaseOrder> {
        tracing::debug!(%order_id, "Cancelling purchase order");

        if input.reason.trim().is_empty() {
            return Err(AppError::validation(
                "reason",
                "Cancellation reason is required",
                "El motivo de cancelación es obligatorio",
            ));
        }

        let mut tx = self.db.begin().await?;
        let mut order = self.lock_order(&mut tx, order_id).await?;

        if !order.is_cancelable() {
            return Err(Self::illegal_state(&order, "cancel"));
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE purchase_orders
            SET state = $2, cancellation_reason = $3, cancelled_at = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .bind(OrderState::Cancelled.as_str())
        .bind(&input.reason)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        order.state = OrderState::Cancelled;
        order.cancellation_reason = Some(input.reason);
        order.cancelled_at = Some(now);

        tx.commit().await?;
        tracing::info!(%order_id, "Purchase order cancelled");
        Ok(order)
    }

    /// Search orders by supplier, state, date range and buyer
    pub async fn search(
        &self,
        filter: OrderSearchFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<OrderSummary>> {
        if let Some(state) = &filter.state {
            if OrderState::from_str(state).is_none() {
                return Err(AppError::validation(
                    "state",
                    "Unknown order state",
                    "Estado de orden desconocido",
                ));
            }
        }

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM purchase_orders
            WHERE ($1::uuid IS NULL OR supplier_id = $1)
              AND ($2::varchar IS NULL OR state = $2)
              AND ($3::date IS NULL OR order_date >= $3)
              AND ($4::date IS NULL OR order_date <= $4)
              AND ($5::uuid IS NULL OR buyer_id = $5)
            "#,
        )
        .bind(filter.supplier_id)
        .bind(&filter.state)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.buyer_id)
        .fetch_one(&self.db)
        .await?;

        let orders = sqlx::query_as::<_, OrderSummary>(&format!(
            r#"
            SELECT {}
            FROM purchase_orders
            WHERE ($1::uuid IS NULL OR supplier_id = $1)
              AND ($2::varchar IS NULL OR state = $2)
              AND ($3::date IS NULL OR order_date >= $3)
              AND ($4::date IS NULL OR order_date <= $4)
              AND ($5::uuid IS NULL OR buyer_id = $5)
            ORDER BY order_date DESC, created_at DESC
            LIMIT $6 OFFSET $7
            "#,
            SUMMARY_COLUMNS
        ))
        .bind(filter.supplier_id)
        .bind(&filter.state)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.buyer_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(orders, &pagination, total as u64))
    }

    /// Receivable orders whose estimated delivery falls within the next week
    pub async fn upcoming_deliveries(&self) -> AppResult<Vec<OrderSummary>> {
        let orders = sqlx::query_as::<_, OrderSummary>(&format!(
            r#"
            SELECT {}
            FROM purchase_orders
            WHERE state IN ('sent', 'confirmed')
              AND estimated_delivery_date IS NOT NULL
              AND estimated_delivery_date BETWEEN CURRENT_DATE AND CURRENT_DATE + 7
            ORDER BY estimated_delivery_date
            "#,
            SUMMARY_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(orders)
    }

    /// Receivable orders whose estimated delivery date has passed
    pub async fn overdue_orders(&self) -> AppResult<Vec<OrderSummary>> {
        let orders = sqlx::query_as::<_, OrderSummary>(&format!(
            r#"
            SELECT {}
            FROM purchase_orders
            WHERE state IN ('sent', 'confirmed')
              AND estimated_delivery_date IS NOT NULL
              AND estimated_delivery_date < CURRENT_DATE
            ORDER BY estimated_delivery_date
            "#,
            SUMMARY_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(orders)
    }

    /// Order counts and amount totals for a date range
    pub async fn statistics(&self, range: DateRange) -> AppResult<PurchaseStatistics> {
        let counts = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT state, COUNT(*)
            FROM purchase_orders
            WHERE order_date >= $1 AND order_date <= $2
            GROUP BY state
            ORDER BY state
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        let (total_amount, counted) = sqlx::query_as::<_, (Option<Decimal>, i64)>(
            r#"
            SELECT SUM(total), COUNT(*)
            FROM purchase_orders
            WHERE order_date >= $1 AND order_date <= $2 AND state <> 'cancelled'
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&self.db)
        .await?;

        let total_orders = counts.iter().map(|(_, c)| c).sum();
        let total_amount = total_amount.unwrap_or(Decimal::ZERO);
        let average_order_amount = if counted > 0 {
            self.rounding.round(total_amount / Decimal::from(counted))
        } else {
            Decimal::ZERO
        };

        Ok(PurchaseStatistics {
            start: range.start,
            end: range.end,
            total_orders,
            orders_by_state: counts
                .into_iter()
                .map(|(state, count)| StateCount { state, count })
                .collect(),
            total_amount,
            average_order_amount,
        })
    }

    /// Load an order and its lines with the order row locked
    async fn lock_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
    ) -> AppResult<PurchaseOrder> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM purchase_orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?;

        let lines = Self::fetch_lines(&mut **tx, order_id).await?;
        row.into_order(lines)
    }

    async fn fetch_lines(exec: impl PgExecutor<'_>, order_id: Uuid) -> AppResult<Vec<OrderLine>> {
        let rows = sqlx::query_as::<_, LineRow>(&format!(
            r#"
            SELECT {}
            FROM purchase_order_lines
            WHERE order_id = $1
            ORDER BY line_number
            "#,
            LINE_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(exec)
        .await?;

        Ok(rows.into_iter().map(LineRow::into_line).collect())
    }

    async fn store_totals(
        tx: &mut Transaction<'_, Postgres>,
        order: &PurchaseOrder,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE purchase_orders
            SET subtotal = $2, tax_amount = $3, total = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.subtotal)
        .bind(order.tax_amount)
        .bind(order.total)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn set_state(
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        state: OrderState,
    ) -> AppResult<()> {
        sqlx::query("UPDATE purchase_orders SET state = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(state.as_str())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn complete_receipt(
        tx: &mut Transaction<'_, Postgres>,
        order: &mut PurchaseOrder,
        receiver_id: Uuid,
    ) -> AppResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE purchase_orders
            SET state = $2, receiver_id = $3, received_at = $4, actual_delivery_date = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(OrderState::Completed.as_str())
        .bind(receiver_id)
        .bind(now)
        .bind(now.date_naive())
        .execute(&mut **tx)
        .await?;

        order.state = OrderState::Completed;
        order.receiver_id = Some(receiver_id);
        order.received_at = Some(now);
        order.actual_delivery_date = Some(now.date_naive());
        Ok(())
    }

    fn ensure_modifiable(order: &PurchaseOrder, action: &str) -> AppResult<()> {
        if !order.is_modifiable() {
            return Err(Self::illegal_state(order, action));
        }
        Ok(())
    }

    fn illegal_state(order: &PurchaseOrder, action: &str) -> AppError {
        AppError::IllegalState {
            current_state: order.state.as_str().to_string(),
            action: action.to_string(),
        }
    }
}
