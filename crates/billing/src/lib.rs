// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! KidsDraw Billing Module
//!
//! Handles Creem integration for subscriptions and entitlements.
//!
//! ## Features
//!
//! - **Webhooks**: Verify, deduplicate, and process Creem events
//! - **Entitlements**: Derive each user's paid flag and plan tier from the
//!   event stream; nothing else writes those columns
//! - **Event Log**: Append-only audit trail of every delivery, also the
//!   substrate for refund order-id backfill
//! - **Checkout / Portal**: Create hosted checkout sessions and
//!   customer-portal links via the Creem API
//! - **Usage Metering**: Billing-cycle usage aggregation against plan quotas

pub mod checkout;
pub mod client;
pub mod entitlement;
pub mod error;
pub mod events;
pub mod normalize;
pub mod portal;
pub mod signature;
pub mod usage;
pub mod webhooks;


// Checkout
pub use checkout::CheckoutService;

// Client
pub use client::{
    CheckoutCustomer, CheckoutSession, CreateCheckoutRequest, CreemClient, CreemConfig,
    CustomerPortalLink,
};

// Entitlement
pub use entitlement::{
    transition, EntitlementChange, EntitlementService, GenerationPermission, UserEntitlement,
};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{EventExtra, PaymentEventLogger, PaymentEventRecord};

// Normalize
pub use normalize::{EventType, WebhookEvent};

// Portal
pub use portal::PortalService;

// Signature
pub use signature::{compute_signature, verify_signature};

// Usage
pub use usage::{current_cycle, CycleUsage, UsageMeter};

// Webhooks
pub use webhooks::{WebhookHandler, WebhookOutcome};

use kidsdraw_shared::PlanCatalog;
use sqlx::PgPool;

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub checkout: CheckoutService,
    pub entitlements: EntitlementService,
    pub portal: PortalService,
    pub usage: UsageMeter,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let config = CreemConfig::from_env()?;
        let catalog = PlanCatalog::from_env();
        if catalog.is_empty() {
            tracing::warn!(
                "No Creem products configured (CREEM_PID_*); plan resolution will fail for every event"
            );
        }
        Ok(Self::new(config, catalog, pool))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: CreemConfig, catalog: PlanCatalog, pool: PgPool) -> Self {
        let client = CreemClient::new(config.clone());
        Self {
            checkout: CheckoutService::new(client.clone(), pool.clone(), catalog.clone()),
            entitlements: EntitlementService::new(pool.clone()),
            portal: PortalService::new(client, pool.clone()),
            usage: UsageMeter::new(pool.clone()),
            webhooks: WebhookHandler::new(config, catalog, pool),
        }
    }
}
