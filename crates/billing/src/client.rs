//! Creem API client
//!
//! Thin REST client over the provider API. Creem ships no Rust SDK, so
//! requests go through `reqwest` directly with `x-api-key` auth. Only the
//! two outbound operations this service needs are wrapped: checkout-session
//! creation and customer-portal link creation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BillingError, BillingResult};

const DEFAULT_API_URL: &str = "https://test-api.creem.io/v1";

/// Creem configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct CreemConfig {
    pub api_url: String,
    pub api_key: String,
    /// Shared secret for webhook signatures. May be empty in deployments
    /// that never receive webhooks; the webhook handler rejects with a
    /// configuration error in that case.
    pub webhook_secret: String,
    /// Where Creem redirects the customer after a successful checkout.
    pub success_url: Option<String>,
}

impl CreemConfig {
    pub fn from_env() -> BillingResult<Self> {
        let api_key = std::env::var("CREEM_API_KEY")
            .map_err(|_| BillingError::Config("CREEM_API_KEY not set".to_string()))?;

        Ok(Self {
            api_url: std::env::var("CREEM_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            api_key,
            webhook_secret: std::env::var("CREEM_WEBHOOK_SECRET").unwrap_or_default(),
            success_url: std::env::var("CREEM_SUCCESS_URL").ok().filter(|s| !s.is_empty()),
        })
    }
}

/// Request body for `POST /checkouts`
#[derive(Debug, Clone, Serialize)]
pub struct CreateCheckoutRequest {
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CheckoutCustomer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutCustomer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Checkout session returned by Creem
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub checkout_url: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Portal link returned by `POST /customers/billing`
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerPortalLink {
    pub customer_portal_link: String,
}

/// HTTP client for the Creem API
#[derive(Clone)]
pub struct CreemClient {
    config: CreemConfig,
    http: reqwest::Client,
}

impl CreemClient {
    pub fn new(config: CreemConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &CreemConfig {
        &self.config
    }

    /// Create a hosted checkout session.
    pub async fn create_checkout(
        &self,
        request: &CreateCheckoutRequest,
    ) -> BillingResult<CheckoutSession> {
        let url = format!("{}/checkouts", self.config.api_url);
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = status.as_u16(),
                product_id = %request.product_id,
                body = %body,
                "Creem checkout creation failed"
            );
            return Err(provider_error(status.as_u16(), &body));
        }

        let session: CheckoutSession = serde_json::from_str(&body).map_err(|e| {
            BillingError::Internal(format!("Invalid checkout response from Creem: {}", e))
        })?;

        tracing::info!(
            session_id = %session.id,
            product_id = %request.product_id,
            "Creem checkout session created"
        );
        Ok(session)
    }

    /// Create a customer-portal link for subscription self-service.
    pub async fn create_customer_portal(
        &self,
        customer_id: &str,
    ) -> BillingResult<CustomerPortalLink> {
        let url = format!("{}/customers/billing", self.config.api_url);
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .json(&serde_json::json!({ "customer_id": customer_id }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = status.as_u16(),
                customer_id = %customer_id,
                body = %body,
                "Creem portal link creation failed"
            );
            return Err(provider_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            BillingError::Internal(format!("Invalid portal response from Creem: {}", e))
        })
    }
}

/// Map a provider error body to a structured error, preferring the
/// provider's own message when it sends one.
fn provider_error(status: u16, body: &str) -> BillingError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.chars().take(200).collect());

    BillingError::Provider { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn config_from_env_requires_api_key() {
        std::env::remove_var("CREEM_API_KEY");
        assert!(matches!(
            CreemConfig::from_env(),
            Err(BillingError::Config(_))
        ));

        std::env::set_var("CREEM_API_KEY", "creem_live_key");
        std::env::remove_var("CREEM_API_URL");
        std::env::remove_var("CREEM_WEBHOOK_SECRET");
        std::env::remove_var("CREEM_SUCCESS_URL");

        let config = CreemConfig::from_env().unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.webhook_secret.is_empty());
        assert_eq!(config.success_url, None);

        std::env::remove_var("CREEM_API_KEY");
    }

    fn test_config(api_url: String) -> CreemConfig {
        CreemConfig {
            api_url,
            api_key: "creem_test_key".to_string(),
            webhook_secret: "whsec_test".to_string(),
            success_url: Some("https://app.example.com/dashboard".to_string()),
        }
    }

    fn checkout_request() -> CreateCheckoutRequest {
        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "internal_user_id".to_string(),
            Value::String("5f2d0001-0000-0000-0000-000000000001".to_string()),
        );
        CreateCheckoutRequest {
            product_id: "prod_explorer_y".to_string(),
            customer: Some(CheckoutCustomer {
                email: Some("parent@example.com".to_string()),
            }),
            success_url: Some("https://app.example.com/dashboard".to_string()),
            request_id: None,
            metadata,
        }
    }

    #[tokio::test]
    async fn create_checkout_returns_session() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/checkouts")
            .match_header("x-api-key", "creem_test_key")
            .with_status(200)
            .with_body(r#"{"id":"cs_1","checkout_url":"https://pay.creem.io/cs_1","status":"open"}"#)
            .create_async()
            .await;

        let client = CreemClient::new(test_config(server.url()));
        let session = client.create_checkout(&checkout_request()).await.unwrap();

        assert_eq!(session.id, "cs_1");
        assert_eq!(session.checkout_url, "https://pay.creem.io/cs_1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_checkout_surfaces_provider_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/checkouts")
            .with_status(400)
            .with_body(r#"{"message":"unknown product"}"#)
            .create_async()
            .await;

        let client = CreemClient::new(test_config(server.url()));
        let err = client.create_checkout(&checkout_request()).await.unwrap_err();

        match err {
            BillingError::Provider { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "unknown product");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_portal_returns_link() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/customers/billing")
            .with_status(200)
            .with_body(r#"{"customer_portal_link":"https://pay.creem.io/portal/abc"}"#)
            .create_async()
            .await;

        let client = CreemClient::new(test_config(server.url()));
        let link = client.create_customer_portal("cus_1").await.unwrap();
        assert_eq!(link.customer_portal_link, "https://pay.creem.io/portal/abc");
    }

    #[tokio::test]
    async fn non_json_error_body_is_truncated_not_fatal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/customers/billing")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let client = CreemClient::new(test_config(server.url()));
        let err = client.create_customer_portal("cus_1").await.unwrap_err();
        match err {
            BillingError::Provider { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }
}
