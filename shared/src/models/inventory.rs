//! Inventory ledger models
//!
//! Movements are append-only audit records; once created they are never
//! mutated. The sign of a movement is a property of its type, resolved by
//! an explicit lookup rather than behavior attached to the variants.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Types of inventory movements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Goods received against a purchase order
    PurchaseReceipt,
    /// Units sold to a customer
    SaleOut,
    /// Customer return back into stock
    ReturnIn,
    /// Return of goods to a supplier
    ReturnOut,
    /// Manual correction upwards (recount, found stock)
    ManualAdjustmentIn,
    /// Manual correction downwards (shrinkage, damage)
    ManualAdjustmentOut,
    /// Opening balance when a product enters the catalog
    InitialStock,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::PurchaseReceipt => "purchase_receipt",
            MovementType::SaleOut => "sale_out",
            MovementType::ReturnIn => "return_in",
            MovementType::ReturnOut => "return_out",
            MovementType::ManualAdjustmentIn => "manual_adjustment_in",
            MovementType::ManualAdjustmentOut => "manual_adjustment_out",
            MovementType::InitialStock => "initial_stock",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purchase_receipt" => Some(MovementType::PurchaseReceipt),
            "sale_out" => Some(MovementType::SaleOut),
            "return_in" => Some(MovementType::ReturnIn),
            "return_out" => Some(MovementType::ReturnOut),
            "manual_adjustment_in" => Some(MovementType::ManualAdjustmentIn),
            "manual_adjustment_out" => Some(MovementType::ManualAdjustmentOut),
            "initial_stock" => Some(MovementType::InitialStock),
            _ => None,
        }
    }

    /// Sign convention lookup: true when the type adds stock
    pub fn is_inbound(&self) -> bool {
        match self {
            MovementType::PurchaseReceipt
            | MovementType::ReturnIn
            | MovementType::ManualAdjustmentIn
            | MovementType::InitialStock => true,
            MovementType::SaleOut
            | MovementType::ReturnOut
            | MovementType::ManualAdjustmentOut => false,
        }
    }

    pub fn is_outbound(&self) -> bool {
        !self.is_inbound()
    }

    /// +1 for inbound types, -1 for outbound
    pub fn sign(&self) -> i32 {
        if self.is_inbound() {
            1
        } else {
            -1
        }
    }
}

/// One immutable entry in a product's stock ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub movement_type: MovementType,
    /// Always positive; the direction comes from the type
    pub quantity: i32,
    /// Stock observed immediately before this movement, inside the same
    /// transaction that committed it
    pub stock_before: i32,
    /// `stock_before + sign * quantity`; equals the product's stock right
    /// after commit
    pub stock_after: i32,
    pub reason: Option<String>,
    /// Reference to the originating document (e.g. order id), lookup only
    pub external_reference: Option<String>,
    pub user_id: Uuid,
    pub unit_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// Derive the resulting stock for a movement of the given type
pub fn stock_after(stock_before: i32, quantity: i32, movement_type: MovementType) -> i32 {
    stock_before + movement_type.sign() * quantity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_conventions() {
        assert!(MovementType::PurchaseReceipt.is_inbound());
        assert!(MovementType::ReturnIn.is_inbound());
        assert!(MovementType::ManualAdjustmentIn.is_inbound());
        assert!(MovementType::InitialStock.is_inbound());

        assert!(MovementType::SaleOut.is_outbound());
        assert!(MovementType::ReturnOut.is_outbound());
        assert!(MovementType::ManualAdjustmentOut.is_outbound());
    }

    #[test]
    fn test_stock_after_derivation() {
        assert_eq!(stock_after(10, 5, MovementType::PurchaseReceipt), 15);
        assert_eq!(stock_after(10, 5, MovementType::SaleOut), 5);
        assert_eq!(stock_after(0, 20, MovementType::InitialStock), 20);
        assert_eq!(stock_after(7, 7, MovementType::ManualAdjustmentOut), 0);
    }

    #[test]
    fn test_type_round_trip() {
        for t in [
            MovementType::PurchaseReceipt,
            MovementType::SaleOut,
            MovementType::ReturnIn,
            MovementType::ReturnOut,
            MovementType::ManualAdjustmentIn,
            MovementType::ManualAdjustmentOut,
            MovementType::InitialStock,
        ] {
            assert_eq!(MovementType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(MovementType::from_str("teleport"), None);
    }
}
