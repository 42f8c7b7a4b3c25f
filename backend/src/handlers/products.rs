//! HTTP handlers for product stock endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use shared::models::Product;

use crate::error::AppResult;
use crate::services::product::ProductService;
use crate::AppState;

/// Get a product by id
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Product>> {
    let service = ProductService::new(state.db);
    let product = service.get_product(product_id).await?;
    Ok(Json(product))
}

/// Current stock response
#[derive(Serialize)]
pub struct StockResponse {
    pub product_id: Uuid,
    pub current_stock: i32,
}

/// Latest committed stock for a product
pub async fn get_product_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<StockResponse>> {
    let service = ProductService::new(state.db);
    let current_stock = service.current_stock(product_id).await?;
    Ok(Json(StockResponse {
        product_id,
        current_stock,
    }))
}

/// Products at or below their minimum stock threshold
pub async fn low_stock_products(State(state): State<AppState>) -> AppResult<Json<Vec<Product>>> {
    let service = ProductService::new(state.db);
    let products = service.low_stock().await?;
    Ok(Json(products))
}
