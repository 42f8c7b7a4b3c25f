//! HTTP handlers for inventory ledger endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared::models::InventoryMovement;
use shared::types::PaginatedResponse;

use crate::error::AppResult;
use crate::handlers::PageQuery;
use crate::services::inventory::{
    AdjustmentInput, InitialStockInput, InventoryService, InventoryStatistics, MovementFilter,
    PurchaseReceiptInput, ReturnInput, SaleInput,
};
use crate::AppState;

/// Record a manual stock adjustment
pub async fn register_adjustment(
    State(state): State<AppState>,
    Json(input): Json<AdjustmentInput>,
) -> AppResult<Json<InventoryMovement>> {
    let service = InventoryService::new(state.db);
    let movement = service.register_adjustment(input).await?;
    Ok(Json(movement))
}

/// Record a purchase receipt directly against the ledger
pub async fn register_purchase_receipt(
    State(state): State<AppState>,
    Json(input): Json<PurchaseReceiptInput>,
) -> AppResult<Json<InventoryMovement>> {
    let service = InventoryService::new(state.db);
    let movement = service.register_purchase_receipt(input).await?;
    Ok(Json(movement))
}

/// Record a sale leaving stock
pub async fn register_sale(
    State(state): State<AppState>,
    Json(input): Json<SaleInput>,
) -> AppResult<Json<InventoryMovement>> {
    let service = InventoryService::new(state.db);
    let movement = service.register_sale(input).await?;
    Ok(Json(movement))
}

/// Record a customer return back into stock
pub async fn register_return_in(
    State(state): State<AppState>,
    Json(input): Json<ReturnInput>,
) -> AppResult<Json<InventoryMovement>> {
    let service = InventoryService::new(state.db);
    let movement = service.register_return_in(input).await?;
    Ok(Json(movement))
}

/// Record goods returned to a supplier
pub async fn register_return_out(
    State(state): State<AppState>,
    Json(input): Json<ReturnInput>,
) -> AppResult<Json<InventoryMovement>> {
    let service = InventoryService::new(state.db);
    let movement = service.register_return_out(input).await?;
    Ok(Json(movement))
}

/// Record an opening balance
pub async fn register_initial_stock(
    State(state): State<AppState>,
    Json(input): Json<InitialStockInput>,
) -> AppResult<Json<InventoryMovement>> {
    let service = InventoryService::new(state.db);
    let movement = service.register_initial_stock(input).await?;
    Ok(Json(movement))
}

/// Movement history for one product
pub async fn product_movements(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<PaginatedResponse<InventoryMovement>>> {
    let service = InventoryService::new(state.db);
    let movements = service
        .movements_for_product(product_id, page.into_pagination())
        .await?;
    Ok(Json(movements))
}

/// Search movements by criteria
pub async fn search_movements(
    State(state): State<AppState>,
    Query(filter): Query<MovementFilter>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<PaginatedResponse<InventoryMovement>>> {
    let service = InventoryService::new(state.db);
    let movements = service
        .movements_by_criteria(filter, page.into_pagination())
        .await?;
    Ok(Json(movements))
}

/// Query parameters for monthly inventory statistics
#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub year: i32,
    pub month: u32,
}

/// Movement counts and unit totals for a month
pub async fn inventory_statistics(
    State(state): State<AppState>,
    Query(query): Query<MonthQuery>,
) -> AppResult<Json<InventoryStatistics>> {
    let service = InventoryService::new(state.db);
    let stats = service.statistics(query.year, query.month).await?;
    Ok(Json(stats))
}
