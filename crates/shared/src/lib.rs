// Shared crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! KidsDraw Shared Library
//!
//! Cross-crate types and helpers used by both the billing crate and the
//! API server: plan tiers, the product-id catalog, and database pool
//! construction.

pub mod db;
pub mod types;

pub use db::{create_pool, run_migrations};
pub use types::{BillingPeriod, PlanCatalog, PlanConfig, PlanTier};
