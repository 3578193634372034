//! Application state

use std::sync::Arc;

use reqwest::Client;
use sqlx::PgPool;

use kidsdraw_billing::BillingService;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    /// Billing service; `None` when Creem is not configured, in which case
    /// billing routes answer with a service-unavailable error.
    pub billing: Option<Arc<BillingService>>,
    /// HTTP client for Supabase token verification
    pub http_client: Client,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let billing = match BillingService::from_env(pool.clone()) {
            Ok(svc) => {
                tracing::info!("Creem billing service initialized");
                Some(Arc::new(svc))
            }
            Err(e) => {
                tracing::warn!("Creem billing not configured: {}", e);
                None
            }
        };

        if config.supabase_url.is_empty() {
            tracing::warn!(
                "Supabase verification not configured (missing SUPABASE_URL) - authenticated routes will reject"
            );
        } else if config.supabase_anon_key.is_empty() {
            tracing::warn!(
                "Supabase URL configured but SUPABASE_ANON_KEY is missing - token verification will fail"
            );
        } else {
            tracing::info!("Supabase token verification enabled via {}", config.supabase_url);
        }

        Self {
            pool,
            config,
            billing,
            http_client: Client::new(),
        }
    }

    /// Get billing service reference
    pub fn billing_service(&self) -> Option<&Arc<BillingService>> {
        self.billing.as_ref()
    }
}
