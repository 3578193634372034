//! Authentication middleware
//!
//! Identity lives with Supabase; this service holds no credentials of its
//! own. The middleware verifies the caller's bearer token against the
//! Supabase `/auth/v1/user` endpoint and injects the resulting
//! [`AuthUser`] for downstream handlers. The webhook route does not pass
//! through here — its authentication is the payload signature.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated user extracted from a verified Supabase token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// Response from the Supabase `/auth/v1/user` endpoint
#[derive(Debug, Deserialize)]
struct SupabaseUserResponse {
    id: String,
    email: Option<String>,
}

/// Require a valid Supabase bearer token; inserts [`AuthUser`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&request).ok_or(ApiError::Unauthorized)?;
    let user = verify_supabase_token(&state, &token).await?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

async fn verify_supabase_token(state: &AppState, token: &str) -> Result<AuthUser, ApiError> {
    if state.config.supabase_url.is_empty() || state.config.supabase_anon_key.is_empty() {
        tracing::error!("Supabase verification not configured; rejecting authenticated request");
        return Err(ApiError::Unauthorized);
    }

    let url = format!("{}/auth/v1/user", state.config.supabase_url);
    let response = state
        .http_client
        .get(&url)
        .header("apikey", &state.config.supabase_anon_key)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Supabase verification request failed");
            ApiError::Unauthorized
        })?;

    if !response.status().is_success() {
        tracing::warn!(
            status = response.status().as_u16(),
            "Supabase rejected token"
        );
        return Err(ApiError::Unauthorized);
    }

    let user: SupabaseUserResponse = response.json().await.map_err(|e| {
        tracing::error!(error = %e, "Invalid Supabase user response");
        ApiError::Unauthorized
    })?;

    let user_id = Uuid::parse_str(&user.id).map_err(|_| ApiError::Unauthorized)?;

    Ok(AuthUser {
        user_id,
        email: user.email,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use sqlx::PgPool;

    fn request_with_auth(value: Option<&str>) -> Request {
        let mut builder = HttpRequest::builder().uri("/api/creem/checkout");
        if let Some(value) = value {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn test_state(supabase_url: String) -> AppState {
        AppState {
            pool: PgPool::connect_lazy("postgres://localhost/kidsdraw_test").unwrap(),
            config: Config {
                database_url: "postgres://localhost/kidsdraw_test".to_string(),
                bind_address: "127.0.0.1:0".to_string(),
                supabase_url,
                supabase_anon_key: "anon_key".to_string(),
            },
            billing: None,
            http_client: reqwest::Client::new(),
        }
    }

    #[test]
    fn extracts_bearer_token() {
        let request = request_with_auth(Some("Bearer sbp_token_123"));
        assert_eq!(
            extract_bearer_token(&request),
            Some("sbp_token_123".to_string())
        );
    }

    #[test]
    fn rejects_missing_or_malformed_headers() {
        assert_eq!(extract_bearer_token(&request_with_auth(None)), None);
        assert_eq!(
            extract_bearer_token(&request_with_auth(Some("Basic abc"))),
            None
        );
        assert_eq!(
            extract_bearer_token(&request_with_auth(Some("Bearer "))),
            None
        );
    }

    #[tokio::test]
    async fn verifies_token_against_supabase() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/v1/user")
            .match_header("apikey", "anon_key")
            .with_status(200)
            .with_body(
                r#"{"id":"5f2d0001-0000-0000-0000-000000000001","email":"parent@example.com"}"#,
            )
            .create_async()
            .await;

        let state = test_state(server.url());
        let user = verify_supabase_token(&state, "sbp_token").await.unwrap();
        assert_eq!(
            user.user_id.to_string(),
            "5f2d0001-0000-0000-0000-000000000001"
        );
        assert_eq!(user.email.as_deref(), Some("parent@example.com"));
    }

    #[tokio::test]
    async fn rejected_token_is_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/v1/user")
            .with_status(401)
            .with_body(r#"{"message":"invalid token"}"#)
            .create_async()
            .await;

        let state = test_state(server.url());
        assert!(matches!(
            verify_supabase_token(&state, "expired").await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn unconfigured_supabase_rejects() {
        let state = test_state(String::new());
        assert!(matches!(
            verify_supabase_token(&state, "token").await,
            Err(ApiError::Unauthorized)
        ));
    }
}
