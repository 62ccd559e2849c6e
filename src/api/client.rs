//! HTTP client for the Inkdesk platform.
//!
//! Two hosts are involved: the auth service issues login challenges and
//! resolves them into session tokens, and the data API serves account data
//! once a token is held. Both hosts can be overridden in the config file
//! (useful against a staging deployment).

use std::time::Duration;

use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::models::UserProfile;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Base URL for authentication endpoints
const DEFAULT_AUTH_BASE_URL: &str = "https://auth.inkdesk.io/api";

/// Base URL for data endpoints
const DEFAULT_API_BASE_URL: &str = "https://api.inkdesk.io";

/// HTTP request timeout in seconds.
/// Kept short: the status poll repeats every 2s, so a slow check is better
/// abandoned than stacked behind the next one.
const REQUEST_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChallengeResponse {
    #[serde(rename = "authorizeUrl")]
    authorize_url: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
}

/// A freshly issued login challenge: the URL to put inside the scannable
/// code plus the opaque correlation state used to poll for its resolution.
#[derive(Debug, Clone)]
pub struct LoginChallenge {
    pub authorize_url: String,
    pub state: String,
}

/// Resolution state of a login challenge.
#[derive(Debug, Clone)]
pub enum LoginStatus {
    /// Not scanned and confirmed yet.
    Pending,
    /// Confirmed on the mobile app; carries the session token.
    Authorized(String),
}

/// API client for the Inkdesk platform.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    auth_base: String,
    api_base: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client, honoring base-URL overrides from the config
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            auth_base: config
                .auth_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_AUTH_BASE_URL.to_string()),
            api_base: config
                .api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Drop the bearer token (sign-out)
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    // =========================================================================
    // Authentication endpoints
    // =========================================================================

    /// Request a fresh login challenge: a URL to render as a scannable code
    /// and the correlation state identifying this attempt. Each call
    /// invalidates any challenge previously issued to this client.
    pub async fn get_login_url(&self) -> Result<LoginChallenge, ApiError> {
        let url = format!("{}/auth/qrcode", self.auth_base);

        let response = self.client.post(&url).send().await?;
        let response = Self::check_response(response).await?;

        let challenge: ChallengeResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("challenge body: {}", e)))?;

        debug!(state = %challenge.state, "Login challenge issued");
        Ok(LoginChallenge {
            authorize_url: challenge.authorize_url,
            state: challenge.state,
        })
    }

    /// Check whether the challenge identified by `state` has been scanned
    /// and confirmed. Stale correlation states resolve as `Pending` forever
    /// on the server side; the flow controller stops asking about them.
    pub async fn check_login_status(&self, state: &str) -> Result<LoginStatus, ApiError> {
        let url = format!("{}/auth/qrcode/status", self.auth_base);

        let response = self
            .client
            .get(&url)
            .query(&[("state", state)])
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        let status: StatusResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("status body: {}", e)))?;

        match status.status.as_str() {
            "authorized" => match status.access_token {
                Some(token) => Ok(LoginStatus::Authorized(token)),
                None => Err(ApiError::InvalidResponse(
                    "authorized status without accessToken".to_string(),
                )),
            },
            "pending" | "scanned" => Ok(LoginStatus::Pending),
            other => Err(ApiError::InvalidResponse(format!(
                "unknown challenge status {:?}",
                other
            ))),
        }
    }

    /// Password login. Returns the session token.
    pub async fn login_with_password(
        &self,
        open_id: &str,
        password: &str,
    ) -> Result<String, ApiError> {
        let url = format!("{}/auth/login", self.auth_base);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "openId": open_id,
                "password": password,
            }))
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("login body: {}", e)))?;

        Ok(login.access_token)
    }

    // =========================================================================
    // Data endpoints
    // =========================================================================

    /// Fetch the signed-in user's profile. Fails with `Unauthorized` when
    /// the stored token has been rejected by the platform.
    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        let token = self.token.as_deref().ok_or(ApiError::Unauthorized)?;
        let url = format!("{}/user/profile", self.api_base);

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let response = Self::check_response(response).await?;

        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("profile body: {}", e)))
    }

    /// Turn non-2xx responses into `ApiError`s
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}
