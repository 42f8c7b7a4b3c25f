//! Common types used across the platform

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Rounding policy for monetary amounts.
///
/// Half-up at a configurable scale; the scale comes from deployment
/// configuration because currency precision varies by locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoneyRounding {
    pub scale: u32,
}

impl MoneyRounding {
    pub fn new(scale: u32) -> Self {
        Self { scale }
    }

    /// Round a monetary amount half-up to the configured scale
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.scale, RoundingStrategy::MidpointAwayFromZero)
    }
}

impl Default for MoneyRounding {
    fn default() -> Self {
        Self { scale: 2 }
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) as i64 - 1) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, pagination: &Pagination, total_items: u64) -> Self {
        let per_page = pagination.per_page.max(1);
        let total_pages = ((total_items + per_page as u64 - 1) / per_page as u64) as u32;
        Self {
            data,
            pagination: PaginationMeta {
                page: pagination.page,
                per_page: pagination.per_page,
                total_items,
                total_pages,
            },
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

/// Date range for queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_round_half_up() {
        let rounding = MoneyRounding::default();
        assert_eq!(
            rounding.round(Decimal::from_str("10.005").unwrap()),
            Decimal::from_str("10.01").unwrap()
        );
        assert_eq!(
            rounding.round(Decimal::from_str("10.004").unwrap()),
            Decimal::from_str("10.00").unwrap()
        );
    }

    #[test]
    fn test_round_custom_scale() {
        let rounding = MoneyRounding::new(0);
        assert_eq!(
            rounding.round(Decimal::from_str("170.5").unwrap()),
            Decimal::from(171)
        );
    }

    #[test]
    fn test_pagination_offset() {
        let p = Pagination {
            page: 3,
            per_page: 20,
        };
        assert_eq!(p.offset(), 40);
        assert_eq!(p.limit(), 20);
    }

    #[test]
    fn test_paginated_response_meta() {
        let p = Pagination {
            page: 1,
            per_page: 10,
        };
        let resp = PaginatedResponse::new(vec![1, 2, 3], &p, 25);
        assert_eq!(resp.pagination.total_pages, 3);
        assert_eq!(resp.pagination.total_items, 25);
    }
}
