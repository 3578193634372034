//! API error types and response mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use kidsdraw_billing::BillingError;

/// Result alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by HTTP handlers
///
/// Every variant renders as `{ "error": "..." }` with the matching status
/// code. Internal detail is logged, never leaked to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Payment system not configured")]
    ServiceUnavailable,

    /// Error relayed from the billing provider, keeping its status code.
    #[error("{message}")]
    Provider { status: u16, message: String },

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Provider { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(detail = %detail, "Internal error");
        }
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::NotPaidSubscriber => {
                ApiError::Forbidden("Only paid subscribers can access billing portal".to_string())
            }
            BillingError::CustomerNotFound => ApiError::NotFound(
                "Unable to access billing portal. Please contact support if you have an active subscription."
                    .to_string(),
            ),
            BillingError::ProductNotConfigured(_) => {
                ApiError::BadRequest("Invalid plan type".to_string())
            }
            BillingError::Provider { status, message } => ApiError::Provider { status, message },
            BillingError::Config(msg) => {
                tracing::error!(error = %msg, "Billing configuration error");
                ApiError::ServiceUnavailable
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}
