//! Checkout session creation
//!
//! Builds the hosted-checkout request for a plan purchase. The caller's
//! internal user id is stamped into the session metadata here; the webhook
//! pipeline later extracts it from provider events to attribute the
//! purchase. Without this stamp the events would be unattributable.

use sqlx::PgPool;
use uuid::Uuid;

use kidsdraw_shared::{PlanCatalog, PlanTier};

use crate::client::{CheckoutCustomer, CheckoutSession, CreateCheckoutRequest, CreemClient};
use crate::error::{BillingError, BillingResult};

/// Creates Creem checkout sessions for plan purchases
#[derive(Clone)]
pub struct CheckoutService {
    client: CreemClient,
    pool: PgPool,
    catalog: PlanCatalog,
}

impl CheckoutService {
    pub fn new(client: CreemClient, pool: PgPool, catalog: PlanCatalog) -> Self {
        Self {
            client,
            pool,
            catalog,
        }
    }

    /// Create a checkout session for the given user and plan tier.
    pub async fn create_checkout(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        plan: PlanTier,
    ) -> BillingResult<CheckoutSession> {
        if !plan.is_paid() {
            return Err(BillingError::ProductNotConfigured(plan.to_string()));
        }
        let product_id = self
            .catalog
            .product_id(plan)
            .ok_or_else(|| BillingError::ProductNotConfigured(plan.to_string()))?;

        let username = self.lookup_username(user_id).await;

        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "internal_user_id".to_string(),
            serde_json::Value::String(user_id.to_string()),
        );
        metadata.insert(
            "username".to_string(),
            serde_json::Value::String(username.unwrap_or_else(|| "Unknown".to_string())),
        );
        metadata.insert(
            "plan_type".to_string(),
            serde_json::Value::String(plan.as_str().to_string()),
        );

        let request = CreateCheckoutRequest {
            product_id: product_id.to_string(),
            customer: email.map(|e| CheckoutCustomer {
                email: Some(e.to_string()),
            }),
            success_url: self.client.config().success_url.clone(),
            request_id: Some(format!("{}-{}", user_id, Uuid::new_v4())),
            metadata,
        };

        let session = self.client.create_checkout(&request).await?;

        tracing::info!(
            user_id = %user_id,
            plan = %plan,
            session_id = %session.id,
            "Checkout session created"
        );

        Ok(session)
    }

    async fn lookup_username(&self, user_id: Uuid) -> Option<String> {
        let row: Result<Option<(Option<String>,)>, sqlx::Error> =
            sqlx::query_as("SELECT username FROM user_meta WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await;

        match row {
            Ok(row) => row.and_then(|(name,)| name),
            Err(e) => {
                // Metadata enrichment only; checkout proceeds without it.
                tracing::warn!(user_id = %user_id, error = %e, "Username lookup failed");
                None
            }
        }
    }
}
