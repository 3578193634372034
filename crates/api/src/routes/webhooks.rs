//! Creem webhook endpoint
//!
//! Response contract toward the provider:
//!
//! - 200: event accepted — processed, duplicate-skipped, or recorded
//!   without a mutation. The body carries a structured status so an
//!   operator reading provider logs can tell these apart.
//! - 401: signature missing or invalid. No side effects.
//! - 500: webhook secret not configured, or an unexpected internal fault.
//!
//! Anything the service can never complete (missing user id, unknown
//! product) is still a 200: the provider retries non-2xx responses, and
//! redelivering an unprocessable event forever helps no one.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use kidsdraw_billing::{BillingError, WebhookOutcome};

use crate::state::AppState;

const SIGNATURE_HEADER: &str = "creem-signature";

/// Handle an inbound Creem webhook delivery.
pub async fn creem_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(billing) = state.billing_service() else {
        tracing::error!("Webhook received but billing is not configured");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook secret not configured",
        );
    };

    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        tracing::warn!("Webhook delivery without a signature header");
        return error_response(StatusCode::UNAUTHORIZED, "Missing signature");
    };

    let event = match billing.webhooks.verify_event(&body, signature) {
        Ok(event) => event,
        Err(e) => return verification_error_response(&e),
    };

    match billing.webhooks.handle_event(event).await {
        Ok(outcome) => outcome_response(&outcome),
        Err(e) => {
            tracing::error!(error = %e, "Webhook processing failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn outcome_response(outcome: &WebhookOutcome) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "received": true, "status": outcome.status() })),
    )
        .into_response()
}

fn verification_error_response(error: &BillingError) -> Response {
    match error {
        BillingError::WebhookSecretMissing => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook secret not configured",
        ),
        BillingError::WebhookSignatureInvalid => {
            error_response(StatusCode::UNAUTHORIZED, "Invalid signature")
        }
        other => {
            tracing::error!(error = %other, "Webhook verification failed unexpectedly");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
