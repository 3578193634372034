//! Customer portal links
//!
//! Creem keys portal sessions by its own customer id, which this service
//! never stores on the user row — it is recovered from the user's recorded
//! payment events instead. Users without a recorded customer id (legacy
//! subscriptions, test accounts) get a structured not-found error.

use sqlx::PgPool;
use uuid::Uuid;

use crate::client::{CreemClient, CustomerPortalLink};
use crate::error::{BillingError, BillingResult};
use crate::events::PaymentEventLogger;

/// Creates Creem customer-portal links for paid users
#[derive(Clone)]
pub struct PortalService {
    client: CreemClient,
    pool: PgPool,
    events: PaymentEventLogger,
}

impl PortalService {
    pub fn new(client: CreemClient, pool: PgPool) -> Self {
        let events = PaymentEventLogger::new(pool.clone());
        Self {
            client,
            pool,
            events,
        }
    }

    /// Create a portal link for a paid subscriber.
    pub async fn create_portal(&self, user_id: Uuid) -> BillingResult<CustomerPortalLink> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT is_paid FROM user_meta WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        if !matches!(row, Some((true,))) {
            return Err(BillingError::NotPaidSubscriber);
        }

        let customer_id = self
            .events
            .latest_customer_id(user_id)
            .await?
            .ok_or(BillingError::CustomerNotFound)?;

        let link = self.client.create_customer_portal(&customer_id).await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer_id,
            "Customer portal link created"
        );

        Ok(link)
    }
}
