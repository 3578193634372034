//! Billing routes: checkout, customer portal, permission check

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kidsdraw_billing::GenerationPermission;
use kidsdraw_shared::{BillingPeriod, PlanTier};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request to create a checkout session
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub plan_type: String,
}

/// Response from creating a checkout session
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
}

/// Response from creating a portal link
#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub success: bool,
    pub customer_portal_link: String,
}

/// Request for a generation-permission check
#[derive(Debug, Deserialize)]
pub struct CheckPermissionsRequest {
    pub user_id: Uuid,
}

/// Create a Creem checkout session for the signed-in user.
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateCheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let billing = state.billing_service().ok_or(ApiError::ServiceUnavailable)?;

    let plan: PlanTier = req
        .plan_type
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid plan type".to_string()))?;

    let session = billing
        .checkout
        .create_checkout(auth_user.user_id, auth_user.email.as_deref(), plan)
        .await?;

    Ok(Json(CheckoutResponse {
        checkout_url: session.checkout_url,
        session_id: session.id,
    }))
}

/// Create a customer-portal link for the signed-in (paid) user.
pub async fn create_customer_portal(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<PortalResponse>> {
    let billing = state.billing_service().ok_or(ApiError::ServiceUnavailable)?;

    let link = billing.portal.create_portal(auth_user.user_id).await?;

    Ok(Json(PortalResponse {
        success: true,
        customer_portal_link: link.customer_portal_link,
    }))
}

/// Quota check used by the generation pipeline before each transform.
pub async fn check_permissions(
    State(state): State<AppState>,
    Json(req): Json<CheckPermissionsRequest>,
) -> ApiResult<Json<GenerationPermission>> {
    let billing = state.billing_service().ok_or(ApiError::ServiceUnavailable)?;

    let permission = billing.entitlements.check_generation(req.user_id).await?;
    Ok(Json(permission))
}

/// A purchasable plan as shown on the pricing page
#[derive(Debug, Serialize)]
pub struct PlanInfo {
    pub plan_type: PlanTier,
    pub name: &'static str,
    pub price_cents: i64,
    pub billing_period: BillingPeriod,
    pub monthly_limit: i64,
}

/// List the purchasable plan tiers (free is the default state, not a product).
pub async fn list_plans() -> Json<Vec<PlanInfo>> {
    let plans = PlanTier::ALL
        .into_iter()
        .filter(|tier| tier.is_paid())
        .map(|tier| {
            let config = tier.config();
            PlanInfo {
                plan_type: tier,
                name: config.name,
                price_cents: config.price_cents,
                billing_period: config.billing_period,
                monthly_limit: tier.monthly_quota(),
            }
        })
        .collect();
    Json(plans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_plans_excludes_free_and_carries_quotas() {
        let Json(plans) = list_plans().await;
        assert_eq!(plans.len(), 6);
        assert!(plans.iter().all(|p| p.plan_type != PlanTier::Free));

        let explorer_yearly = plans
            .iter()
            .find(|p| p.plan_type == PlanTier::ExplorerYearly)
            .unwrap();
        assert_eq!(explorer_yearly.monthly_limit, 200);
        assert_eq!(explorer_yearly.price_cents, 9900);
    }
}
