//! Payment event log
//!
//! Append-only record of every webhook delivery, processed or not. The log
//! serves three purposes: it is the idempotency substrate (the provider
//! event id is the natural dedup key), an audit trail for operators, and
//! the lookup table the refund backfill correlates order ids against.
//!
//! Rows are created once and never updated or deleted.

use serde_json::Value;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use kidsdraw_shared::PlanTier;

use crate::error::BillingResult;
use crate::normalize::WebhookEvent;

/// A recorded payment event row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentEventRecord {
    pub id: Uuid,
    pub event_id: String,
    pub event_type: String,
    pub user_id: Option<Uuid>,
    pub plan_type: Option<String>,
    pub creem_customer_id: Option<String>,
    pub creem_order_id: Option<String>,
    pub amount: Option<i64>,
    pub currency: String,
    pub processed_at: OffsetDateTime,
}

/// Optional correlation data recorded alongside an event
#[derive(Debug, Clone, Default)]
pub struct EventExtra {
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    pub amount: Option<i64>,
}

/// Append-only logger over `payment_events`
#[derive(Clone)]
pub struct PaymentEventLogger {
    pool: PgPool,
}

impl PaymentEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check whether this provider event id was already recorded.
    ///
    /// "Not found" is the expected non-error outcome. A genuine query
    /// failure is logged and reported as "not duplicate": processing
    /// continues (fail-open), preferring a rare double-delivery — which the
    /// unique constraint on `event_id` and the idempotent-by-value
    /// entitlement mutations absorb — over dropping a paid event.
    pub async fn is_duplicate(&self, event_id: &str) -> bool {
        let result: Result<Option<(Uuid,)>, sqlx::Error> =
            sqlx::query_as("SELECT id FROM payment_events WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await;

        match result {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                tracing::error!(
                    event_id = %event_id,
                    error = %e,
                    "Idempotency lookup failed; continuing with processing"
                );
                false
            }
        }
    }

    /// Persist an event, partial data allowed.
    ///
    /// Always attempted, even when no user could be resolved (operators
    /// backfill later from the raw payload). Failure is logged and never
    /// propagated: the entitlement mutation has already been applied or
    /// deliberately skipped, and the provider must still see success.
    /// `ON CONFLICT DO NOTHING` makes the event-id uniqueness constraint
    /// the authoritative duplicate gate when two deliveries race past the
    /// lookup above.
    pub async fn record(
        &self,
        event: &WebhookEvent,
        user_id: Option<Uuid>,
        plan: Option<PlanTier>,
        extra: EventExtra,
    ) {
        let metadata = if event.object.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            event.object.clone()
        };

        let result = sqlx::query(
            r#"
            INSERT INTO payment_events
                (event_id, event_type, user_id, plan_type, creem_customer_id,
                 creem_order_id, amount, currency, processed_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'usd', NOW(), $8)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&event.id)
        .bind(event.event_type.as_str())
        .bind(user_id)
        .bind(plan.map(|p| p.as_str()))
        .bind(extra.customer_id.as_deref())
        .bind(extra.order_id.as_deref())
        .bind(extra.amount)
        .bind(&metadata)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                tracing::info!(
                    event_id = %event.id,
                    "Event already recorded by a concurrent delivery"
                );
            }
            Ok(_) => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    user_id = ?user_id,
                    "Payment event recorded"
                );
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to record payment event"
                );
            }
        }
    }

    /// Recover the owning user for an order id from prior events.
    ///
    /// Refunds issued through Creem's administrative flow omit the metadata
    /// the programmatic checkout flow stamps in; the order id is the only
    /// correlation key stable across both. Most recent match wins.
    pub async fn find_user_by_order_id(&self, order_id: &str) -> BillingResult<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT user_id FROM payment_events
            WHERE creem_order_id = $1 AND user_id IS NOT NULL
            ORDER BY processed_at DESC
            LIMIT 1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id,)| id))
    }

    /// Most recent Creem customer id recorded for a user (portal lookup).
    pub async fn latest_customer_id(&self, user_id: Uuid) -> BillingResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT creem_customer_id FROM payment_events
            WHERE user_id = $1 AND creem_customer_id IS NOT NULL
            ORDER BY processed_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id,)| id))
    }
}
