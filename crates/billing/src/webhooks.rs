//! Creem webhook handling
//!
//! Receives billing-provider events and reconciles user entitlement state:
//! verify signature, parse the envelope, skip duplicates, resolve the user
//! and plan, apply the transition, and append the event to the audit log.
//!
//! Every branch that cannot resolve a required field degrades to "record
//! the event, skip the mutation, report a structured status". The provider
//! retries on non-2xx, so an event this service can never complete must
//! still be answered with success or it will be redelivered forever.

use uuid::Uuid;

use kidsdraw_shared::{PlanCatalog, PlanTier};
use sqlx::PgPool;

use crate::client::CreemConfig;
use crate::entitlement::{transition, EntitlementService};
use crate::error::{BillingError, BillingResult};
use crate::events::{EventExtra, PaymentEventLogger};
use crate::normalize::{
    extract_amount, extract_checkout_product_id, extract_customer_id, extract_object_id,
    extract_order_id, extract_plan_hint, extract_subscription_product_id, extract_user_id,
    EventType, WebhookEvent,
};
use crate::signature::verify_signature;

/// Result of processing a verified event
///
/// All of these are 2xx to the provider; the status string is the
/// structured detail callers surface in the response body.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Entitlement mutation applied (or deliberately none, for events
    /// like cancellation that carry no immediate entitlement change).
    Processed {
        user_id: Uuid,
        plan: Option<PlanTier>,
    },
    /// Event id already recorded; nothing done.
    Duplicate,
    /// Unrecognized event type; recorded for audit only.
    Unhandled,
    /// No user id could be resolved, directly or via backfill.
    MissingUser,
    /// Product id did not map to a known plan; no mutation applied.
    UnknownProduct,
    /// Mutation write failed; event still recorded for reconciliation.
    MutationFailed,
}

impl WebhookOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed { .. } => "processed",
            WebhookOutcome::Duplicate => "already_processed",
            WebhookOutcome::Unhandled => "unhandled",
            WebhookOutcome::MissingUser => "missing_user",
            WebhookOutcome::UnknownProduct => "unknown_product",
            WebhookOutcome::MutationFailed => "error",
        }
    }
}

/// Webhook handler for Creem events
#[derive(Clone)]
pub struct WebhookHandler {
    config: CreemConfig,
    catalog: PlanCatalog,
    entitlements: EntitlementService,
    events: PaymentEventLogger,
}

impl WebhookHandler {
    pub fn new(config: CreemConfig, catalog: PlanCatalog, pool: PgPool) -> Self {
        let entitlements = EntitlementService::new(pool.clone());
        let events = PaymentEventLogger::new(pool);
        Self {
            config,
            catalog,
            entitlements,
            events,
        }
    }

    /// Verify the signature over the raw body and parse the envelope.
    ///
    /// Verification runs on the exact bytes received, before any JSON
    /// parsing of the body.
    pub fn verify_event(&self, payload: &[u8], signature: &str) -> BillingResult<WebhookEvent> {
        let secret = &self.config.webhook_secret;
        if secret.is_empty() {
            return Err(BillingError::WebhookSecretMissing);
        }

        if !verify_signature(payload, signature, secret) {
            return Err(BillingError::WebhookSignatureInvalid);
        }

        WebhookEvent::parse(payload).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse webhook event JSON");
            BillingError::InvalidPayload(e.to_string())
        })
    }

    /// Process a verified event.
    pub async fn handle_event(&self, event: WebhookEvent) -> BillingResult<WebhookOutcome> {
        if self.events.is_duplicate(&event.id).await {
            tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Duplicate webhook event, skipping"
            );
            return Ok(WebhookOutcome::Duplicate);
        }

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Processing webhook event"
        );

        match &event.event_type {
            EventType::CheckoutCompleted => self.handle_checkout_completed(&event).await,
            EventType::SubscriptionActive | EventType::SubscriptionPaid => {
                self.handle_subscription_paid(&event).await
            }
            EventType::SubscriptionTrialing => self.handle_subscription_trialing(&event).await,
            EventType::SubscriptionUpdate => self.handle_subscription_update(&event).await,
            EventType::SubscriptionCanceled => self.handle_subscription_canceled(&event).await,
            EventType::SubscriptionExpired => self.handle_subscription_expired(&event).await,
            EventType::RefundCreated => self.handle_refund_created(&event).await,
            EventType::Other(event_type) => {
                // Track which provider events arrive unhandled; a new type
                // showing up here is the signal to add a handler.
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event_type,
                    "Unhandled event type, recording only"
                );
                self.events
                    .record(&event, None, None, EventExtra::default())
                    .await;
                Ok(WebhookOutcome::Unhandled)
            }
        }
    }

    async fn handle_checkout_completed(
        &self,
        event: &WebhookEvent,
    ) -> BillingResult<WebhookOutcome> {
        let extras = EventExtra {
            // Checkout sessions without an expanded order fall back to the
            // session id as the correlation key.
            order_id: extract_order_id(&event.object).or_else(|| extract_object_id(&event.object)),
            customer_id: extract_customer_id(&event.object),
            amount: extract_amount(&event.object),
        };

        let Some(user_id) = self.resolve_user_id(event) else {
            tracing::error!(event_id = %event.id, "No user id in checkout metadata");
            self.events.record(event, None, None, extras).await;
            return Ok(WebhookOutcome::MissingUser);
        };

        let product_id = extract_checkout_product_id(&event.object);
        let plan = product_id
            .as_deref()
            .and_then(|id| self.catalog.resolve_product(id));

        let Some(plan) = plan else {
            tracing::error!(
                event_id = %event.id,
                user_id = %user_id,
                product_id = ?product_id,
                "Unknown product on completed checkout"
            );
            self.events.record(event, Some(user_id), None, extras).await;
            return Ok(WebhookOutcome::UnknownProduct);
        };

        let outcome = self
            .apply_transition(user_id, &event.event_type, Some(plan))
            .await;
        self.events
            .record(event, Some(user_id), Some(plan), extras)
            .await;

        tracing::info!(
            event_id = %event.id,
            user_id = %user_id,
            plan = %plan,
            "Checkout completed"
        );
        Ok(outcome)
    }

    /// subscription.active and subscription.paid: renewal. The paid flag
    /// and billing-cycle anchor refresh even when the plan is unknown.
    async fn handle_subscription_paid(
        &self,
        event: &WebhookEvent,
    ) -> BillingResult<WebhookOutcome> {
        let extras = subscription_extras(event);

        let Some(user_id) = self.resolve_user_id(event) else {
            tracing::error!(event_id = %event.id, "No user id in subscription metadata");
            self.events.record(event, None, None, extras).await;
            return Ok(WebhookOutcome::MissingUser);
        };

        let plan = self.resolve_subscription_plan(event);
        if plan.is_none() {
            tracing::warn!(
                event_id = %event.id,
                user_id = %user_id,
                "Could not determine plan for renewal; leaving stored tier unchanged"
            );
        }

        let outcome = self.apply_transition(user_id, &event.event_type, plan).await;
        self.events.record(event, Some(user_id), plan, extras).await;

        tracing::info!(
            event_id = %event.id,
            user_id = %user_id,
            plan = ?plan,
            "Subscription renewal processed"
        );
        Ok(outcome)
    }

    async fn handle_subscription_trialing(
        &self,
        event: &WebhookEvent,
    ) -> BillingResult<WebhookOutcome> {
        let extras = subscription_extras(event);

        let Some(user_id) = self.resolve_user_id(event) else {
            tracing::error!(event_id = %event.id, "No user id in trial metadata");
            self.events.record(event, None, None, extras).await;
            return Ok(WebhookOutcome::MissingUser);
        };

        let Some(plan) = self.resolve_subscription_plan(event) else {
            tracing::error!(
                event_id = %event.id,
                user_id = %user_id,
                "Unknown product on trial start; no entitlement granted"
            );
            self.events.record(event, Some(user_id), None, extras).await;
            return Ok(WebhookOutcome::UnknownProduct);
        };

        let outcome = self
            .apply_transition(user_id, &event.event_type, Some(plan))
            .await;
        self.events
            .record(event, Some(user_id), Some(plan), extras)
            .await;

        tracing::info!(
            event_id = %event.id,
            user_id = %user_id,
            plan = %plan,
            "Trial entitlement granted"
        );
        Ok(outcome)
    }

    async fn handle_subscription_update(
        &self,
        event: &WebhookEvent,
    ) -> BillingResult<WebhookOutcome> {
        let extras = subscription_extras(event);

        let Some(user_id) = self.resolve_user_id(event) else {
            tracing::error!(event_id = %event.id, "No user id in subscription update metadata");
            self.events.record(event, None, None, extras).await;
            return Ok(WebhookOutcome::MissingUser);
        };

        let Some(plan) = self.resolve_subscription_plan(event) else {
            tracing::error!(
                event_id = %event.id,
                user_id = %user_id,
                "Unknown product on subscription update; tier left unchanged"
            );
            self.events.record(event, Some(user_id), None, extras).await;
            return Ok(WebhookOutcome::UnknownProduct);
        };

        let outcome = self
            .apply_transition(user_id, &event.event_type, Some(plan))
            .await;
        self.events
            .record(event, Some(user_id), Some(plan), extras)
            .await;

        tracing::info!(
            event_id = %event.id,
            user_id = %user_id,
            plan = %plan,
            "Subscription plan updated"
        );
        Ok(outcome)
    }

    /// Cancellation records intent only. The user paid for the current
    /// period; access is revoked by `subscription.expired` at period end.
    async fn handle_subscription_canceled(
        &self,
        event: &WebhookEvent,
    ) -> BillingResult<WebhookOutcome> {
        let extras = subscription_extras(event);

        let Some(user_id) = self.resolve_user_id(event) else {
            tracing::error!(event_id = %event.id, "No user id in cancellation metadata");
            self.events.record(event, None, None, extras).await;
            return Ok(WebhookOutcome::MissingUser);
        };

        let plan = self.resolve_subscription_plan(event);
        self.events.record(event, Some(user_id), plan, extras).await;

        tracing::info!(
            event_id = %event.id,
            user_id = %user_id,
            "Subscription canceled; access continues until period end"
        );
        Ok(WebhookOutcome::Processed {
            user_id,
            plan: None,
        })
    }

    async fn handle_subscription_expired(
        &self,
        event: &WebhookEvent,
    ) -> BillingResult<WebhookOutcome> {
        let extras = subscription_extras(event);

        let Some(user_id) = self.resolve_user_id(event) else {
            tracing::error!(event_id = %event.id, "No user id in expiration metadata");
            self.events.record(event, None, None, extras).await;
            return Ok(WebhookOutcome::MissingUser);
        };

        let outcome = self.apply_transition(user_id, &event.event_type, None).await;
        self.events
            .record(event, Some(user_id), Some(PlanTier::Free), extras)
            .await;

        tracing::info!(
            event_id = %event.id,
            user_id = %user_id,
            "Subscription expired; user downgraded to free"
        );
        Ok(outcome)
    }

    async fn handle_refund_created(&self, event: &WebhookEvent) -> BillingResult<WebhookOutcome> {
        let order_id = extract_order_id(&event.object);
        let extras = EventExtra {
            order_id: order_id.clone(),
            customer_id: extract_customer_id(&event.object),
            amount: extract_amount(&event.object),
        };

        // Administrative refunds may omit the metadata the checkout flow
        // stamps in; correlate through the order id recorded with the
        // original purchase.
        let mut user_id = self.resolve_user_id(event);
        if user_id.is_none() {
            if let Some(order_id) = order_id.as_deref() {
                user_id = match self.events.find_user_by_order_id(order_id).await {
                    Ok(found) => {
                        if let Some(found) = found {
                            tracing::info!(
                                event_id = %event.id,
                                order_id = %order_id,
                                user_id = %found,
                                "Refund user resolved via order id backfill"
                            );
                        }
                        found
                    }
                    Err(e) => {
                        tracing::error!(
                            event_id = %event.id,
                            order_id = %order_id,
                            error = %e,
                            "Backfill lookup failed"
                        );
                        None
                    }
                };
            }
        }

        let Some(user_id) = user_id else {
            // Deliberate fail-safe: leave the entitlement unchanged and
            // flag for manual review rather than guess the owner.
            tracing::error!(
                event_id = %event.id,
                order_id = ?order_id,
                "No user id resolvable for refund; recording for manual review"
            );
            self.events.record(event, None, None, extras).await;
            return Ok(WebhookOutcome::MissingUser);
        };

        let outcome = self.apply_transition(user_id, &event.event_type, None).await;
        self.events
            .record(event, Some(user_id), Some(PlanTier::Free), extras)
            .await;

        tracing::info!(
            event_id = %event.id,
            user_id = %user_id,
            "Refund processed; user downgraded to free"
        );
        Ok(outcome)
    }

    /// Extract and parse the user id. An unparseable id is treated the
    /// same as a missing one: recorded, flagged, never guessed.
    fn resolve_user_id(&self, event: &WebhookEvent) -> Option<Uuid> {
        let raw = extract_user_id(&event.object)?;
        match raw.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::error!(
                    event_id = %event.id,
                    user_id = %raw,
                    "Extracted user id is not a valid uuid"
                );
                None
            }
        }
    }

    /// Plan for subscription-shaped events: product id lookup first, then
    /// the plan hint stamped into metadata at checkout time.
    fn resolve_subscription_plan(&self, event: &WebhookEvent) -> Option<PlanTier> {
        extract_subscription_product_id(&event.object)
            .and_then(|id| self.catalog.resolve_product(&id))
            .or_else(|| extract_plan_hint(&event.object))
    }

    /// Run the transition table and write the result.
    ///
    /// A write failure is logged and reported as a structured outcome, not
    /// an error: the event is still recorded afterwards, and the provider
    /// still sees success.
    async fn apply_transition(
        &self,
        user_id: Uuid,
        event_type: &EventType,
        plan: Option<PlanTier>,
    ) -> WebhookOutcome {
        let Some(change) = transition(event_type, plan) else {
            return WebhookOutcome::Processed { user_id, plan };
        };

        match self.entitlements.apply(user_id, &change).await {
            Ok(()) => WebhookOutcome::Processed { user_id, plan },
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    event_type = %event_type,
                    error = %e,
                    "Entitlement update failed; event will still be recorded"
                );
                WebhookOutcome::MutationFailed
            }
        }
    }
}

fn subscription_extras(event: &WebhookEvent) -> EventExtra {
    EventExtra {
        order_id: extract_order_id(&event.object),
        customer_id: extract_customer_id(&event.object),
        amount: extract_amount(&event.object),
    }
}
