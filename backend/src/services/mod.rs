//! Business logic services for the Commerce Management Platform

pub mod inventory;
pub mod product;
pub mod purchase_order;

pub use inventory::InventoryService;
pub use product::ProductService;
pub use purchase_order::PurchaseOrderService;

use crate::error::AppError;

/// Attempts per transactional write before a serialization failure is
/// surfaced as a Conflict
pub(crate) const MAX_TX_ATTEMPTS: u32 = 3;

/// Postgres serialization failure (40001) or deadlock (40P01), the one
/// retryable error class
pub(crate) fn is_serialization_failure(err: &AppError) -> bool {
    if let AppError::DatabaseError(sqlx::Error::Database(db_err)) = err {
        matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
    } else {
        false
    }
}

/// Unique constraint violation (23505), retried when generating order numbers
pub(crate) fn is_unique_violation(err: &AppError) -> bool {
    if let AppError::DatabaseError(sqlx::Error::Database(db_err)) = err {
        db_err.code().as_deref() == Some("23505")
    } else {
        false
    }
}
