//! HTTP routes

pub mod billing;
pub mod webhooks;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::auth::require_auth;
use crate::state::AppState;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    // Routes that act on behalf of a signed-in user
    let authed = Router::new()
        .route("/api/creem/checkout", post(billing::create_checkout))
        .route(
            "/api/creem/customer-portal",
            post(billing::create_customer_portal),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api/plans", get(billing::list_plans))
        // Authenticated by payload signature, not by session
        .route("/api/webhooks/creem", post(webhooks::creem_webhook))
        // Internal permission check used by the generation pipeline
        .route("/api/check-permissions", post(billing::check_permissions))
        .merge(authed)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
