//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod products;
pub mod sales;
