// API crate clippy configuration
// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! KidsDraw Billing API Server
//!
//! HTTP surface for the billing service: the Creem webhook endpoint plus
//! the user-facing checkout, customer-portal, and generation-permission
//! routes.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
