//! User entitlement state and the event transition table
//!
//! Entitlement (paid flag, plan tier, paid-at timestamp) is derived
//! exclusively from verified provider events; nothing else writes these
//! columns. The full transition set lives in [`transition`] as one
//! exhaustive match so it can be reviewed in one place and the compiler
//! enforces coverage when an event type is added.
//!
//! Two deliberate asymmetries:
//!
//! - `subscription.canceled` changes nothing. Cancellation is a statement
//!   of future intent; the user already paid for the current period and
//!   keeps access until the provider fires `subscription.expired`.
//! - Trial grants set the paid flag but never touch `paid_at`, which is how
//!   a trial grant stays distinguishable from a payment grant.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use kidsdraw_shared::PlanTier;

use crate::error::BillingResult;
use crate::normalize::EventType;
use crate::usage::UsageMeter;

/// Durable entitlement state, one row per user (`user_meta`)
#[derive(Debug, Clone, PartialEq)]
pub struct UserEntitlement {
    pub user_id: Uuid,
    pub is_paid: bool,
    pub plan_type: PlanTier,
    pub paid_at: Option<OffsetDateTime>,
    pub updated_at: OffsetDateTime,
}

impl UserEntitlement {
    /// Fresh unentitled state for a user with no prior billing history.
    pub fn unentitled(user_id: Uuid, now: OffsetDateTime) -> Self {
        Self {
            user_id,
            is_paid: false,
            plan_type: PlanTier::Free,
            paid_at: None,
            updated_at: now,
        }
    }

    /// Apply a change to an in-memory copy of the state.
    ///
    /// This is the same semantics [`EntitlementService::apply`] writes to
    /// the database, exposed for sequence-level reasoning and tests.
    pub fn apply_change(&mut self, change: &EntitlementChange, now: OffsetDateTime) {
        self.is_paid = change.is_paid;
        if let Some(plan) = change.plan {
            self.plan_type = plan;
        }
        if change.set_paid_at {
            self.paid_at = Some(now);
        }
        self.updated_at = now;
    }
}

/// The mutation a single event produces
///
/// `plan: None` means "leave the stored tier unchanged" (a renewal whose
/// product id could not be resolved still refreshes the paid flag).
/// `set_paid_at` distinguishes payment grants from trial grants and from
/// downgrades, which preserve the historical timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntitlementChange {
    pub is_paid: bool,
    pub plan: Option<PlanTier>,
    pub set_paid_at: bool,
}

/// The transition table: event type + resolved plan -> mutation (or none).
///
/// `None` means no entitlement mutation: either the event carries no
/// entitlement semantics (cancellation, unrecognized types) or a required
/// plan could not be resolved, in which case the caller records the event
/// and reports a structured skip instead of guessing.
///
/// Each transition is a function of the incoming event alone plus whatever
/// the store currently holds; nothing assumes delivery order.
pub fn transition(
    event_type: &EventType,
    resolved_plan: Option<PlanTier>,
) -> Option<EntitlementChange> {
    match event_type {
        // First purchase: the plan must be resolvable.
        EventType::CheckoutCompleted => resolved_plan.map(|plan| EntitlementChange {
            is_paid: true,
            plan: Some(plan),
            set_paid_at: true,
        }),

        // Renewal: refresh the paid flag and billing-cycle anchor even when
        // the plan cannot be determined (tier stays as stored).
        EventType::SubscriptionActive | EventType::SubscriptionPaid => Some(EntitlementChange {
            is_paid: true,
            plan: resolved_plan,
            set_paid_at: true,
        }),

        // Trial: paid features without a payment timestamp.
        EventType::SubscriptionTrialing => resolved_plan.map(|plan| EntitlementChange {
            is_paid: true,
            plan: Some(plan),
            set_paid_at: false,
        }),

        // Plan change: only applied when the new plan is known.
        EventType::SubscriptionUpdate => resolved_plan.map(|plan| EntitlementChange {
            is_paid: true,
            plan: Some(plan),
            set_paid_at: true,
        }),

        // Cancellation: access continues until the period actually ends.
        EventType::SubscriptionCanceled => None,

        // Period end: revoke. paid_at is preserved for history.
        EventType::SubscriptionExpired => Some(EntitlementChange {
            is_paid: false,
            plan: Some(PlanTier::Free),
            set_paid_at: false,
        }),

        // Refund: immediate downgrade, paid_at preserved.
        EventType::RefundCreated => Some(EntitlementChange {
            is_paid: false,
            plan: Some(PlanTier::Free),
            set_paid_at: false,
        }),

        EventType::Other(_) => None,
    }
}

/// Permission summary for the generation flow
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPermission {
    pub can_generate: bool,
    pub current_usage: i64,
    pub limit: i64,
    pub remaining: i64,
    pub is_paid: bool,
    pub plan_type: PlanTier,
    pub billing_cycle_start: time::Date,
    pub billing_cycle_end: time::Date,
}

/// Reads and writes entitlement rows
#[derive(Clone)]
pub struct EntitlementService {
    pool: PgPool,
    usage: UsageMeter,
}

impl EntitlementService {
    pub fn new(pool: PgPool) -> Self {
        let usage = UsageMeter::new(pool.clone());
        Self { pool, usage }
    }

    /// Load a user's entitlement. `None` when the user has no row yet.
    pub async fn get(&self, user_id: Uuid) -> BillingResult<Option<UserEntitlement>> {
        let row: Option<(bool, String, Option<OffsetDateTime>, OffsetDateTime)> = sqlx::query_as(
            "SELECT is_paid, plan_type, paid_at, updated_at FROM user_meta WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(is_paid, plan_type, paid_at, updated_at)| {
            let plan = plan_type.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    user_id = %user_id,
                    plan_type = %plan_type,
                    "Stored plan_type is not a known tier; treating as free"
                );
                PlanTier::Free
            });
            UserEntitlement {
                user_id,
                is_paid,
                plan_type: plan,
                paid_at,
                updated_at,
            }
        }))
    }

    /// Write an entitlement change for a user.
    ///
    /// A missing `user_meta` row (user never completed signup) is logged,
    /// not an error: the event is still recorded for backfill.
    pub async fn apply(&self, user_id: Uuid, change: &EntitlementChange) -> BillingResult<()> {
        let result = match (change.plan, change.set_paid_at) {
            (Some(plan), true) => {
                sqlx::query(
                    r#"
                    UPDATE user_meta
                    SET is_paid = $2, plan_type = $3, paid_at = NOW(), updated_at = NOW()
                    WHERE user_id = $1
                    "#,
                )
                .bind(user_id)
                .bind(change.is_paid)
                .bind(plan.as_str())
                .execute(&self.pool)
                .await?
            }
            (Some(plan), false) => {
                sqlx::query(
                    r#"
                    UPDATE user_meta
                    SET is_paid = $2, plan_type = $3, updated_at = NOW()
                    WHERE user_id = $1
                    "#,
                )
                .bind(user_id)
                .bind(change.is_paid)
                .bind(plan.as_str())
                .execute(&self.pool)
                .await?
            }
            (None, true) => {
                sqlx::query(
                    r#"
                    UPDATE user_meta
                    SET is_paid = $2, paid_at = NOW(), updated_at = NOW()
                    WHERE user_id = $1
                    "#,
                )
                .bind(user_id)
                .bind(change.is_paid)
                .execute(&self.pool)
                .await?
            }
            (None, false) => {
                sqlx::query(
                    "UPDATE user_meta SET is_paid = $2, updated_at = NOW() WHERE user_id = $1",
                )
                .bind(user_id)
                .bind(change.is_paid)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            tracing::warn!(
                user_id = %user_id,
                "No user_meta row to update; event recorded without entitlement mutation"
            );
        } else {
            tracing::info!(
                user_id = %user_id,
                is_paid = change.is_paid,
                plan = ?change.plan,
                "Entitlement updated"
            );
        }

        Ok(())
    }

    /// The entitlement check the generation pipeline relies on: current
    /// billing-cycle usage vs. the plan's monthly quota.
    pub async fn check_generation(&self, user_id: Uuid) -> BillingResult<GenerationPermission> {
        let entitlement = self.get(user_id).await?;
        let (is_paid, plan, paid_at) = match &entitlement {
            Some(e) => (e.is_paid, e.plan_type, e.paid_at),
            None => (false, PlanTier::Free, None),
        };

        let cycle = self.usage.cycle_usage(user_id, paid_at).await?;
        let limit = plan.monthly_quota();

        Ok(GenerationPermission {
            can_generate: cycle.usage < limit,
            current_usage: cycle.usage,
            limit,
            remaining: (limit - cycle.usage).max(0),
            is_paid,
            plan_type: plan,
            billing_cycle_start: cycle.cycle_start,
            billing_cycle_end: cycle.cycle_end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn now() -> OffsetDateTime {
        datetime!(2025-06-15 12:00 UTC)
    }

    #[test]
    fn checkout_requires_resolvable_plan() {
        let change = transition(
            &EventType::CheckoutCompleted,
            Some(PlanTier::ExplorerYearly),
        )
        .unwrap();
        assert!(change.is_paid);
        assert_eq!(change.plan, Some(PlanTier::ExplorerYearly));
        assert!(change.set_paid_at);

        assert_eq!(transition(&EventType::CheckoutCompleted, None), None);
    }

    #[test]
    fn renewal_applies_without_plan() {
        for event_type in [EventType::SubscriptionActive, EventType::SubscriptionPaid] {
            let change = transition(&event_type, None).unwrap();
            assert!(change.is_paid);
            assert_eq!(change.plan, None, "tier must stay as stored");
            assert!(change.set_paid_at, "renewal restarts the billing cycle");
        }
    }

    #[test]
    fn trial_grants_entitlement_without_paid_at() {
        let change =
            transition(&EventType::SubscriptionTrialing, Some(PlanTier::StarterMonthly)).unwrap();
        assert!(change.is_paid);
        assert_eq!(change.plan, Some(PlanTier::StarterMonthly));
        assert!(!change.set_paid_at);

        let mut state = UserEntitlement::unentitled(Uuid::new_v4(), now());
        state.apply_change(&change, now());
        assert!(state.is_paid);
        assert_eq!(state.plan_type, PlanTier::StarterMonthly);
        assert_eq!(state.paid_at, None);
    }

    #[test]
    fn update_with_unknown_product_is_a_no_op() {
        assert_eq!(transition(&EventType::SubscriptionUpdate, None), None);

        let change =
            transition(&EventType::SubscriptionUpdate, Some(PlanTier::CreatorYearly)).unwrap();
        assert_eq!(change.plan, Some(PlanTier::CreatorYearly));
        assert!(change.set_paid_at);
    }

    #[test]
    fn cancel_then_expire_sequence() {
        let user_id = Uuid::new_v4();
        let mut state = UserEntitlement {
            user_id,
            is_paid: true,
            plan_type: PlanTier::CreatorMonthly,
            paid_at: Some(now()),
            updated_at: now(),
        };

        // Cancellation: no mutation, access continues until period end.
        assert_eq!(transition(&EventType::SubscriptionCanceled, None), None);
        assert!(state.is_paid);
        assert_eq!(state.plan_type, PlanTier::CreatorMonthly);

        // Expiration: revoke, preserve paid_at.
        let later = now() + time::Duration::days(30);
        let change = transition(&EventType::SubscriptionExpired, None).unwrap();
        state.apply_change(&change, later);
        assert!(!state.is_paid);
        assert_eq!(state.plan_type, PlanTier::Free);
        assert_eq!(state.paid_at, Some(now()));
    }

    #[test]
    fn refund_downgrades_and_preserves_history() {
        let change = transition(&EventType::RefundCreated, None).unwrap();
        assert!(!change.is_paid);
        assert_eq!(change.plan, Some(PlanTier::Free));
        assert!(!change.set_paid_at);

        let mut state = UserEntitlement {
            user_id: Uuid::new_v4(),
            is_paid: true,
            plan_type: PlanTier::ExplorerMonthly,
            paid_at: Some(now()),
            updated_at: now(),
        };
        state.apply_change(&change, now() + time::Duration::hours(1));
        assert!(!state.is_paid);
        assert_eq!(state.plan_type, PlanTier::Free);
        assert_eq!(state.paid_at, Some(now()), "paid_at kept for history");
    }

    #[test]
    fn unrecognized_events_never_mutate() {
        assert_eq!(
            transition(&EventType::Other("dispute.created".to_string()), None),
            None
        );
        assert_eq!(
            transition(
                &EventType::Other("dispute.created".to_string()),
                Some(PlanTier::CreatorMonthly)
            ),
            None
        );
    }
}
