//! Authentication handling for the Bessa API.
//!
//! Bessa issues an opaque session key from `POST /v1/auth/login/`. The key is sent as
//! `Authorization: Token <key>` (not `Bearer`) and lives until the server answers 401.

use reqwest::{Client, StatusCode};

use crate::client::error::{ApiError, ApiResult};
use crate::client::types::{AuthRequest, AuthToken, LoginErrorBody};

/// Login credentials for a Bessa account.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// # Bessa Authentication Handler
///
/// Holds the account credentials and the cached session token. The token is kept in
/// memory for the lifetime of the process and dropped by the client on a 401, which
/// makes the next request log in again.
pub struct BessaAuth {
    base_url: String,
    client: Client,
    credentials: Credentials,
    token: Option<String>,
}

impl BessaAuth {
    pub fn new(base_url: String, client: Client, credentials: Credentials) -> Self {
        Self {
            base_url,
            client,
            credentials,
            token: None,
        }
    }

    /// Logs in with the stored credentials and caches the returned token.
    pub async fn authenticate(&mut self) -> ApiResult<String> {
        let email = self.credentials.email.trim().to_string();
        tracing::info!("Attempting authentication for: {}", email);

        let auth_request = AuthRequest {
            email: email.clone(),
            password: self.credentials.password.clone(),
        };
        let auth_url = format!("{}/v1/auth/login/", self.base_url);

        tracing::debug!("Making authentication request to: {}", auth_url);

        let response = self
            .client
            .post(&auth_url)
            .header("Accept", "application/json")
            .json(&auth_request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Network error during authentication: {}", e);
                ApiError::TransientNetwork(format!(
                    "Failed to connect to Bessa at {}: {}",
                    self.base_url, e
                ))
            })?;

        let status = response.status();
        tracing::debug!("Authentication response status: {}", status);

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            tracing::error!("Authentication failed with status {}: {}", status, error_body);

            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    let message = serde_json::from_str::<LoginErrorBody>(&error_body)
                        .ok()
                        .and_then(|body| body.message())
                        .unwrap_or_else(|| "Invalid email or password".to_string());
                    ApiError::AuthenticationFailure(message)
                }
                StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
                s if s.is_server_error() => {
                    ApiError::TransientNetwork(format!("Bessa server error ({}): {}", s, error_body))
                }
                s => ApiError::UnexpectedStatus {
                    status: s.as_u16(),
                    message: error_body,
                },
            });
        }

        let auth_token: AuthToken = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse authentication response: {}", e);
            ApiError::MalformedResponse(format!("Invalid login response: {}", e))
        })?;

        let token = auth_token
            .key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ApiError::MalformedResponse("No token in login response".to_string()))?;

        tracing::info!("Authentication successful for: {}", email);
        tracing::debug!("Received token: {}", token_preview(&token));

        self.token = Some(token.clone());
        Ok(token)
    }

    pub fn get_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Replaces the credentials and forgets the cached token.
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
        self.token = None;
    }
}

/// First ten characters of a token, for logs.
pub fn token_preview(token: &str) -> String {
    let cut = token
        .char_indices()
        .nth(10)
        .map(|(idx, _)| idx)
        .unwrap_or(token.len());
    format!("{}...", &token[..cut])
}
