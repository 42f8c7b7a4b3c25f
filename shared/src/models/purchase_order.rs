//! Purchase order models and calculation rules
//!
//! The order aggregate, its lines, and the lifecycle state live here so the
//! amount/receipt arithmetic can be exercised without a database. The backend
//! services load rows into these types, mutate them through the methods below,
//! and write the results back inside one transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::MoneyRounding;

/// Lifecycle state of a purchase order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Draft,
    Pending,
    Sent,
    Confirmed,
    Completed,
    Cancelled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Draft => "draft",
            OrderState::Pending => "pending",
            OrderState::Sent => "sent",
            OrderState::Confirmed => "confirmed",
            OrderState::Completed => "completed",
            OrderState::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(OrderState::Draft),
            "pending" => Some(OrderState::Pending),
            "sent" => Some(OrderState::Sent),
            "confirmed" => Some(OrderState::Confirmed),
            "completed" => Some(OrderState::Completed),
            "cancelled" => Some(OrderState::Cancelled),
            _ => None,
        }
    }

    /// Lines may be added, edited or removed only in these states
    pub fn is_modifiable(&self) -> bool {
        matches!(self, OrderState::Draft | OrderState::Pending)
    }

    /// Goods may be received only once the order is with the supplier
    pub fn is_receivable(&self) -> bool {
        matches!(self, OrderState::Sent | OrderState::Confirmed)
    }

    /// Anything not already terminal can be cancelled
    pub fn is_cancelable(&self) -> bool {
        !matches!(self, OrderState::Completed | OrderState::Cancelled)
    }

    /// Approval is recorded only while the order awaits review
    pub fn is_approvable(&self) -> bool {
        matches!(self, OrderState::Pending)
    }
}

/// Receipt progress of a single order line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Pending,
    Partial,
    Complete,
}

/// Errors from line-level quantity bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiptError {
    #[error("quantity to receive must be greater than zero")]
    InvalidQuantity,

    #[error(
        "cannot receive {requested} units: ordered {ordered}, already received {received}, pending {pending}"
    )]
    OverReceipt {
        ordered: i32,
        received: i32,
        pending: i32,
        requested: i32,
    },
}

/// One product line within a purchase order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    /// Snapshot of the product code/name at the time the line was added
    pub product_code: String,
    pub product_name: String,
    /// 1-based position within the order
    pub line_number: i32,
    pub quantity_ordered: i32,
    pub unit_price: Decimal,
    /// Line discount in percent, 0..=100
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub subtotal: Decimal,
    pub quantity_received: i32,
}

/// Compute the discount amount and subtotal for a line.
///
/// `discount_amount = quantity * unit_price * discount_percent / 100`, rounded
/// per policy; `subtotal = quantity * unit_price - discount_amount`.
pub fn compute_line_amounts(
    quantity: i32,
    unit_price: Decimal,
    discount_percent: Decimal,
    rounding: MoneyRounding,
) -> (Decimal, Decimal) {
    let gross = unit_price * Decimal::from(quantity);
    let discount_amount = if discount_percent > Decimal::ZERO {
        rounding.round(gross * discount_percent / Decimal::from(100))
    } else {
        Decimal::ZERO
    };
    (discount_amount, gross - discount_amount)
}

impl OrderLine {
    /// Re-derive discount amount and subtotal from the current fields.
    ///
    /// Must be called after any mutation of quantity, price or discount; a
    /// stale subtotal is never valid.
    pub fn recalculate(&mut self, rounding: MoneyRounding) {
        let (discount_amount, subtotal) = compute_line_amounts(
            self.quantity_ordered,
            self.unit_price,
            self.discount_percent,
            rounding,
        );
        self.discount_amount = discount_amount;
        self.subtotal = subtotal;
    }

    /// Units ordered but not yet received
    pub fn quantity_pending(&self) -> i32 {
        self.quantity_ordered - self.quantity_received
    }

    pub fn is_complete(&self) -> bool {
        self.quantity_received == self.quantity_ordered
    }

    pub fn status(&self) -> LineStatus {
        if self.quantity_received == self.quantity_ordered {
            LineStatus::Complete
        } else if self.quantity_received > 0 {
            LineStatus::Partial
        } else {
            LineStatus::Pending
        }
    }

    /// Record that `quantity_to_receive` units arrived.
    ///
    /// Fails without mutating when the quantity is non-positive or would push
    /// the line past its ordered quantity.
    pub fn register_receipt(&mut self, quantity_to_receive: i32) -> Result<(), ReceiptError> {
        if quantity_to_receive <= 0 {
            return Err(ReceiptError::InvalidQuantity);
        }

        match self.quantity_received.checked_add(quantity_to_receive) {
            Some(new_received) if new_received <= self.quantity_ordered => {
                self.quantity_received = new_received;
                Ok(())
            }
            // Overflow can only mean the request exceeds what is pending
            _ => Err(ReceiptError::OverReceipt {
                ordered: self.quantity_ordered,
                received: self.quantity_received,
                pending: self.quantity_pending(),
                requested: quantity_to_receive,
            }),
        }
    }
}

/// A purchase order with its lines and computed totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    /// Assigned once at creation, immutable afterwards. Format OC-YYYYMMDD-NNNNNN.
    pub order_number: String,
    pub supplier_id: Uuid,
    pub supplier_name: String,
    pub order_date: NaiveDate,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub actual_delivery_date: Option<NaiveDate>,
    pub state: OrderState,
    pub buyer_id: Uuid,
    pub approver_id: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub receiver_id: Option<Uuid>,
    pub received_at: Option<DateTime<Utc>>,
    pub lines: Vec<OrderLine>,
    pub subtotal: Decimal,
    pub tax_percent: Decimal,
    pub tax_amount: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PurchaseOrder {
    pub fn is_modifiable(&self) -> bool {
        self.state.is_modifiable()
    }

    pub fn is_receivable(&self) -> bool {
        self.state.is_receivable()
    }

    pub fn is_cancelable(&self) -> bool {
        self.state.is_cancelable()
    }

    pub fn is_approvable(&self) -> bool {
        self.state.is_approvable()
    }

    /// Dispatchable to the supplier: pre-dispatch state and at least one line
    pub fn is_sendable(&self) -> bool {
        matches!(self.state, OrderState::Draft | OrderState::Pending) && !self.lines.is_empty()
    }

    /// Append a line, assigning the next 1-based line number
    pub fn push_line(&mut self, mut line: OrderLine, rounding: MoneyRounding) {
        line.line_number = self.lines.len() as i32 + 1;
        line.recalculate(rounding);
        self.lines.push(line);
        self.recompute_totals(rounding);
    }

    /// Remove a line by id and renumber the remainder contiguously
    pub fn remove_line(&mut self, line_id: Uuid, rounding: MoneyRounding) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.id != line_id);
        if self.lines.len() == before {
            return false;
        }
        for (idx, line) in self.lines.iter_mut().enumerate() {
            line.line_number = idx as i32 + 1;
        }
        self.recompute_totals(rounding);
        true
    }

    /// Re-derive subtotal, tax and total from the lines.
    ///
    /// `total = subtotal + tax_amount - discount` holds after every call.
    pub fn recompute_totals(&mut self, rounding: MoneyRounding) {
        self.subtotal = self
            .lines
            .iter()
            .fold(Decimal::ZERO, |acc, l| acc + l.subtotal);
        self.tax_amount = if self.tax_percent > Decimal::ZERO {
            rounding.round(self.subtotal * self.tax_percent / Decimal::from(100))
        } else {
            Decimal::ZERO
        };
        self.total = self.subtotal + self.tax_amount - self.discount;
    }

    pub fn all_lines_complete(&self) -> bool {
        self.lines.iter().all(OrderLine::is_complete)
    }

    /// Overall receipt progress across all lines, 0 when the order is empty
    pub fn percent_received(&self) -> Decimal {
        let ordered: i32 = self.lines.iter().map(|l| l.quantity_ordered).sum();
        if ordered == 0 {
            return Decimal::ZERO;
        }
        let received: i32 = self.lines.iter().map(|l| l.quantity_received).sum();
        Decimal::from(received) * Decimal::from(100) / Decimal::from(ordered)
    }

    pub fn total_units(&self) -> i32 {
        self.lines.iter().map(|l| l.quantity_ordered).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(qty: i32, price: &str, discount: &str) -> OrderLine {
        let mut l = OrderLine {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_code: "P-001".to_string(),
            product_name: "Producto".to_string(),
            line_number: 1,
            quantity_ordered: qty,
            unit_price: dec(price),
            discount_percent: dec(discount),
            discount_amount: Decimal::ZERO,
            subtotal: Decimal::ZERO,
            quantity_received: 0,
        };
        l.recalculate(MoneyRounding::default());
        l
    }

    fn order_with(lines: Vec<OrderLine>) -> PurchaseOrder {
        let mut order = PurchaseOrder {
            id: Uuid::new_v4(),
            order_number: "OC-20240101-000001".to_string(),
            supplier_id: Uuid::new_v4(),
            supplier_name: "Proveedor".to_string(),
            order_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            estimated_delivery_date: None,
            actual_delivery_date: None,
            state: OrderState::Draft,
            buyer_id: Uuid::new_v4(),
            approver_id: None,
            approved_at: None,
            receiver_id: None,
            received_at: None,
            lines,
            subtotal: Decimal::ZERO,
            tax_percent: dec("19"),
            tax_amount: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::ZERO,
            notes: None,
            cancellation_reason: None,
            cancelled_at: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        order.recompute_totals(MoneyRounding::default());
        order
    }

    #[test]
    fn test_line_amounts_with_discount() {
        // 10 * 100 with 10% discount: discount 100, subtotal 900
        let l = line(10, "100", "10");
        assert_eq!(l.discount_amount, dec("100.00"));
        assert_eq!(l.subtotal, dec("900.00"));
    }

    #[test]
    fn test_line_amounts_no_discount() {
        let l = line(3, "19.99", "0");
        assert_eq!(l.discount_amount, Decimal::ZERO);
        assert_eq!(l.subtotal, dec("59.97"));
    }

    #[test]
    fn test_line_discount_rounds_half_up() {
        // 3 * 9.99 = 29.97; 12.5% = 3.74625 -> 3.75
        let l = line(3, "9.99", "12.5");
        assert_eq!(l.discount_amount, dec("3.75"));
        assert_eq!(l.subtotal, dec("26.22"));
    }

    #[test]
    fn test_order_totals_worked_example() {
        // qty=10, price=100, discount=10% -> subtotal 900, tax 171, total 1071
        let order = order_with(vec![line(10, "100", "10")]);
        assert_eq!(order.subtotal, dec("900.00"));
        assert_eq!(order.tax_amount, dec("171.00"));
        assert_eq!(order.total, dec("1071.00"));
    }

    #[test]
    fn test_total_identity_with_order_discount() {
        let mut order = order_with(vec![line(2, "50", "0"), line(1, "25.5", "0")]);
        order.discount = dec("10.00");
        order.recompute_totals(MoneyRounding::default());
        assert_eq!(order.total, order.subtotal + order.tax_amount - order.discount);
    }

    #[test]
    fn test_register_receipt_increments() {
        let mut l = line(10, "100", "0");
        l.register_receipt(4).unwrap();
        assert_eq!(l.quantity_received, 4);
        assert_eq!(l.status(), LineStatus::Partial);
        l.register_receipt(6).unwrap();
        assert_eq!(l.status(), LineStatus::Complete);
    }

    #[test]
    fn test_register_receipt_rejects_non_positive() {
        let mut l = line(5, "10", "0");
        assert_eq!(l.register_receipt(0), Err(ReceiptError::InvalidQuantity));
        assert_eq!(l.register_receipt(-3), Err(ReceiptError::InvalidQuantity));
        assert_eq!(l.quantity_received, 0);
    }

    #[test]
    fn test_register_receipt_over_receipt() {
        let mut l = line(5, "10", "0");
        l.register_receipt(2).unwrap();
        let err = l.register_receipt(7).unwrap_err();
        assert_eq!(
            err,
            ReceiptError::OverReceipt {
                ordered: 5,
                received: 2,
                pending: 3,
                requested: 7,
            }
        );
        // failed receipt leaves the line untouched
        assert_eq!(l.quantity_received, 2);
    }

    #[test]
    fn test_line_status_pending() {
        let l = line(5, "10", "0");
        assert_eq!(l.status(), LineStatus::Pending);
    }

    #[test]
    fn test_push_line_assigns_numbers() {
        let mut order = order_with(vec![]);
        order.push_line(line(1, "10", "0"), MoneyRounding::default());
        order.push_line(line(2, "20", "0"), MoneyRounding::default());
        assert_eq!(order.lines[0].line_number, 1);
        assert_eq!(order.lines[1].line_number, 2);
        assert_eq!(order.subtotal, dec("50.00"));
    }

    #[test]
    fn test_remove_line_renumbers() {
        let mut order = order_with(vec![line(1, "10", "0"), line(2, "20", "0"), line(3, "30", "0")]);
        for (idx, l) in order.lines.iter_mut().enumerate() {
            l.line_number = idx as i32 + 1;
        }
        let second = order.lines[1].id;
        assert!(order.remove_line(second, MoneyRounding::default()));
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.lines[0].line_number, 1);
        assert_eq!(order.lines[1].line_number, 2);
    }

    #[test]
    fn test_remove_line_missing_id() {
        let mut order = order_with(vec![line(1, "10", "0")]);
        assert!(!order.remove_line(Uuid::new_v4(), MoneyRounding::default()));
        assert_eq!(order.lines.len(), 1);
    }

    #[test]
    fn test_state_predicates() {
        assert!(OrderState::Draft.is_modifiable());
        assert!(OrderState::Pending.is_modifiable());
        assert!(!OrderState::Sent.is_modifiable());

        assert!(OrderState::Sent.is_receivable());
        assert!(OrderState::Confirmed.is_receivable());
        assert!(!OrderState::Draft.is_receivable());
        assert!(!OrderState::Completed.is_receivable());
        assert!(!OrderState::Cancelled.is_receivable());

        assert!(OrderState::Draft.is_cancelable());
        assert!(OrderState::Confirmed.is_cancelable());
        assert!(!OrderState::Completed.is_cancelable());
        assert!(!OrderState::Cancelled.is_cancelable());

        assert!(OrderState::Pending.is_approvable());
        assert!(!OrderState::Draft.is_approvable());
        assert!(!OrderState::Sent.is_approvable());
        assert!(!OrderState::Completed.is_approvable());
        assert!(!OrderState::Cancelled.is_approvable());
    }

    #[test]
    fn test_sendable_requires_lines() {
        let mut order = order_with(vec![]);
        assert!(!order.is_sendable());

        order.push_line(line(1, "10", "0"), MoneyRounding::default());
        assert!(order.is_sendable());

        order.state = OrderState::Pending;
        assert!(order.is_sendable());

        order.state = OrderState::Sent;
        assert!(!order.is_sendable());
    }

    #[test]
    fn test_register_receipt_near_i32_max() {
        let mut l = line(i32::MAX, "10", "0");
        l.register_receipt(1).unwrap();

        // The addition must not wrap; the request is over-receipt either way
        let err = l.register_receipt(i32::MAX).unwrap_err();
        assert_eq!(
            err,
            ReceiptError::OverReceipt {
                ordered: i32::MAX,
                received: 1,
                pending: i32::MAX - 1,
                requested: i32::MAX,
            }
        );
        assert_eq!(l.quantity_received, 1);
    }

    #[test]
    fn test_state_round_trip() {
        for s in [
            OrderState::Draft,
            OrderState::Pending,
            OrderState::Sent,
            OrderState::Confirmed,
            OrderState::Completed,
            OrderState::Cancelled,
        ] {
            assert_eq!(OrderState::from_str(s.as_str()), Some(s));
        }
        assert_eq!(OrderState::from_str("unknown"), None);
    }

    #[test]
    fn test_percent_received() {
        let mut order = order_with(vec![line(10, "10", "0"), line(5, "10", "0")]);
        assert_eq!(order.percent_received(), Decimal::ZERO);
        order.lines[0].register_receipt(3).unwrap();
        // 3 of 15 units = 20%
        assert_eq!(order.percent_received(), dec("20"));
    }

    #[test]
    fn test_percent_received_empty_order() {
        let order = order_with(vec![]);
        assert_eq!(order.percent_received(), Decimal::ZERO);
    }
}
