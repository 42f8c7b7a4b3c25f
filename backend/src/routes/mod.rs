//! Route definitions for the Commerce Management Platform

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Purchase order lifecycle
        .nest("/orders", order_routes())
        // Inventory ledger
        .nest("/inventory", inventory_routes())
        // Product stock access
        .nest("/products", product_routes())
}

/// Purchase order routes
fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::search_orders).post(handlers::create_order))
        .route("/upcoming-deliveries", get(handlers::upcoming_deliveries))
        .route("/overdue", get(handlers::overdue_orders))
        .route("/statistics", get(handlers::purchase_statistics))
        .route("/:order_id", get(handlers::get_order))
        .route("/:order_id/lines", post(handlers::add_line))
        .route(
            "/:order_id/lines/:line_id",
            put(handlers::update_line).delete(handlers::remove_line),
        )
        .route("/:order_id/submit", post(handlers::submit_order))
        .route("/:order_id/approve", post(handlers::approve_order))
        .route("/:order_id/send", post(handlers::send_order))
        .route("/:order_id/confirm", post(handlers::confirm_order))
        .route("/:order_id/receive", post(handlers::receive_order))
        .route("/:order_id/receive-partial", post(handlers::receive_order_partial))
        .route("/:order_id/cancel", post(handlers::cancel_order))
}

/// Inventory ledger routes
fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/adjustments", post(handlers::register_adjustment))
        .route("/receipts", post(handlers::register_purchase_receipt))
        .route("/sales", post(handlers::register_sale))
        .route("/returns/in", post(handlers::register_return_in))
        .route("/returns/out", post(handlers::register_return_out))
        .route("/initial-stock", post(handlers::register_initial_stock))
        .route("/movements", get(handlers::search_movements))
        .route("/products/:product_id/movements", get(handlers::product_movements))
        .route("/statistics", get(handlers::inventory_statistics))
}

/// Product stock routes
fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/low-stock", get(handlers::low_stock_products))
        .route("/:product_id", get(handlers::get_product))
        .route("/:product_id/stock", get(handlers::get_product_stock))
}
