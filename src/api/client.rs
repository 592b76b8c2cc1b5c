//! HTTP client for the Matchdesk auth gateway.
//!
//! Issues the login request and converts the gateway's dynamic response
//! shape into the crate's typed credential and identity.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::Credential;
use crate::models::Identity;

use super::{AuthGateway, GatewayError, LoginGrant};

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Issued tokens are honored for 7 days from login.
const TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    #[serde(rename = "emailAddress")]
    email_address: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    status: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<LoginPayload>,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    token: String,
    admin: Identity,
}

/// Gateway client for the Matchdesk backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    /// Create a client for the gateway at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Strict parse of a 2xx login body into a [`LoginGrant`].
    ///
    /// Any shape mismatch is a gateway error; the session core never sees a
    /// partially-populated grant. The validity window is derived here since
    /// the gateway does not echo one.
    fn parse_login_response(text: &str) -> Result<LoginGrant, GatewayError> {
        let response: LoginResponse = serde_json::from_str(text)
            .map_err(|e| GatewayError::Server(format!("Malformed login response: {}", e)))?;

        if !response.status {
            let message = response
                .message
                .unwrap_or_else(|| "login rejected".to_string());
            return Err(GatewayError::Server(message));
        }

        let payload = response
            .data
            .ok_or_else(|| GatewayError::Server("Login response missing data".to_string()))?;

        if payload.token.is_empty() {
            return Err(GatewayError::Server(
                "Login response missing token".to_string(),
            ));
        }

        let issued_at = Utc::now();
        Ok(LoginGrant {
            credential: Credential {
                token: payload.token,
                issued_at,
                expires_at: issued_at + Duration::days(TOKEN_TTL_DAYS),
            },
            identity: payload.admin,
        })
    }
}

#[async_trait]
impl AuthGateway for AuthClient {
    async fn login(
        &self,
        email_address: &str,
        password: &str,
    ) -> Result<LoginGrant, GatewayError> {
        let url = format!("{}/auth/login", self.base_url);
        debug!(url = %url, "Sending login request");

        let body = LoginRequest {
            email_address,
            password,
        };

        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(status = %status, "Login rejected by gateway");
            return Err(GatewayError::from_status(status, &text));
        }

        Self::parse_login_response(&text)
    }
}
