//! HTTP request handlers for the Commerce Management Platform

mod health;
mod inventory;
mod orders;
mod products;

pub use health::*;
pub use inventory::*;
pub use orders::*;
pub use products::*;

use serde::Deserialize;
use shared::types::Pagination;

/// Common pagination query parameters
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    pub fn into_pagination(self) -> Pagination {
        let defaults = Pagination::default();
        Pagination {
            page: self.page.unwrap_or(defaults.page).max(1),
            per_page: self.per_page.unwrap_or(defaults.per_page).clamp(1, 100),
        }
    }
}
