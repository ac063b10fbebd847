//! Shared identifier types used across the POS backend crates.

pub mod types;

pub use types::{ProductId, SaleId, SaleItemId, UserId};
