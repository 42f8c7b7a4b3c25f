//! Domain models for the Commerce Management Platform

mod inventory;
mod product;
mod purchase_order;

pub use inventory::*;
pub use product::*;
pub use purchase_order::*;
