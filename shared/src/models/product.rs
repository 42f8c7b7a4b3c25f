//! Product and supplier reference models
//!
//! Both are external aggregates from the point of view of the purchasing
//! module: orders and movements reference them by id only.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A catalog product with its running stock counter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    /// Current stock on hand. Never negative after a committed operation.
    pub current_stock: i32,
    /// Threshold below which the product shows up in low-stock listings
    pub minimum_stock: i32,
    pub unit_price: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether stock has fallen to or below the configured minimum
    pub fn is_low_on_stock(&self) -> bool {
        self.current_stock <= self.minimum_stock
    }
}

/// A supplier that purchase orders are placed against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub id: Uuid,
    /// Chilean tax id (RUT)
    pub tax_id: String,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(current_stock: i32, minimum_stock: i32) -> Product {
        Product {
            id: Uuid::new_v4(),
            code: "PRD-001".to_string(),
            name: "Producto".to_string(),
            current_stock,
            minimum_stock,
            unit_price: Decimal::from(100),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_low_stock_threshold_inclusive() {
        assert!(product(0, 5).is_low_on_stock());
        assert!(product(5, 5).is_low_on_stock());
        assert!(!product(6, 5).is_low_on_stock());
    }
}
