//! Billing error types

/// Result alias used throughout the billing crate
pub type BillingResult<T> = Result<T, BillingError>;

/// Errors produced by billing operations
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// CREEM_WEBHOOK_SECRET is not set; operator-actionable, maps to 500.
    #[error("Webhook secret not configured")]
    WebhookSecretMissing,

    /// Signature header absent or failed verification; maps to 401.
    #[error("Invalid webhook signature")]
    WebhookSignatureInvalid,

    /// Body passed signature verification but is not a parseable event.
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// Required configuration missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// User must be on a paid plan for this operation.
    #[error("Not a paid subscriber")]
    NotPaidSubscriber,

    /// No Creem customer id could be recovered for the user.
    #[error("No billing customer found for user")]
    CustomerNotFound,

    /// Requested plan tier is not purchasable or has no configured product.
    #[error("No product configured for plan: {0}")]
    ProductNotConfigured(String),

    /// The Creem API rejected or failed a request.
    #[error("Creem API error (status {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
