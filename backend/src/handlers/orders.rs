//! HTTP handlers for purchase order endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared::models::PurchaseOrder;
use shared::types::{DateRange, PaginatedResponse};

use crate::error::AppResult;
use crate::handlers::PageQuery;
use crate::services::purchase_order::{
    AddLineInput, ApproveInput, CancelInput, CreateOrderInput, OrderSearchFilter, OrderSummary,
    PurchaseOrderService, PurchaseStatistics, ReceiveInput, ReceivePartialInput, UpdateLineInput,
};
use crate::AppState;

fn service(state: AppState) -> PurchaseOrderService {
    PurchaseOrderService::new(state.db.clone(), &state.config)
}

/// Create a purchase order in Draft
pub async fn create_order(
    State(state): State<AppState>,
    Json(input): Json<CreateOrderInput>,
) -> AppResult<Json<PurchaseOrder>> {
    let order = service(state).create_order(input).await?;
    Ok(Json(order))
}

/// Get a purchase order with its lines
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrder>> {
    let order = service(state).get_order(order_id).await?;
    Ok(Json(order))
}

/// Search purchase orders
pub async fn search_orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderSearchFilter>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<PaginatedResponse<OrderSummary>>> {
    let orders = service(state).search(filter, page.into_pagination()).await?;
    Ok(Json(orders))
}

/// Orders expected from suppliers within the next 7 days
pub async fn upcoming_deliveries(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<OrderSummary>>> {
    let orders = service(state).upcoming_deliveries().await?;
    Ok(Json(orders))
}

/// Orders past their estimated delivery date
pub async fn overdue_orders(State(state): State<AppState>) -> AppResult<Json<Vec<OrderSummary>>> {
    let orders = service(state).overdue_orders().await?;
    Ok(Json(orders))
}

/// Query parameters for purchase statistics
#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}

/// Purchasing figures for a date range
pub async fn purchase_statistics(
    State(state): State<AppState>,
    Query(query): Query<StatisticsQuery>,
) -> AppResult<Json<PurchaseStatistics>> {
    let stats = service(state)
        .statistics(DateRange {
            start: query.start,
            end: query.end,
        })
        .await?;
    Ok(Json(stats))
}

/// Add a line to an order
pub async fn add_line(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(input): Json<AddLineInput>,
) -> AppResult<Json<PurchaseOrder>> {
    let order = service(state).add_line(order_id, input).await?;
    Ok(Json(order))
}

/// Edit a line on an order
pub async fn update_line(
    State(state): State<AppState>,
    Path((order_id, line_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateLineInput>,
) -> AppResult<Json<PurchaseOrder>> {
    let order = service(state).update_line(order_id, line_id, input).await?;
    Ok(Json(order))
}

/// Remove a line from an order
pub async fn remove_line(
    State(state): State<AppState>,
    Path((order_id, line_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<PurchaseOrder>> {
    let order = service(state).remove_line(order_id, line_id).await?;
    Ok(Json(order))
}

/// Submit a draft order for review
pub async fn submit_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrder>> {
    let order = service(state).submit(order_id).await?;
    Ok(Json(order))
}

/// Record managerial approval
pub async fn approve_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(input): Json<ApproveInput>,
) -> AppResult<Json<PurchaseOrder>> {
    let order = service(state).approve(order_id, input).await?;
    Ok(Json(order))
}

/// Transmit the order to the supplier
pub async fn send_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrder>> {
    let order = service(state).send(order_id).await?;
    Ok(Json(order))
}

/// Record supplier confirmation
pub async fn confirm_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrder>> {
    let order = service(state).confirm(order_id).await?;
    Ok(Json(order))
}

/// Receive all pending quantities and complete the order
pub async fn receive_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(input): Json<ReceiveInput>,
) -> AppResult<Json<PurchaseOrder>> {
    let order = service(state).receive_full(order_id, input).await?;
    Ok(Json(order))
}

/// Receive specific quantities per line
pub async fn receive_order_partial(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(input): Json<ReceivePartialInput>,
) -> AppResult<Json<PurchaseOrder>> {
    let order = service(state).receive_partial(order_id, input).await?;
    Ok(Json(order))
}

/// Cancel a non-terminal order
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(input): Json<CancelInput>,
) -> AppResult<Json<PurchaseOrder>> {
    let order = service(state).cancel(order_id, input).await?;
    Ok(Json(order))
}
