//! Bearer-token providers.
//!
//! A fresh token is requested for every backend call; nothing is cached in
//! memory. Providers never put token material into error messages.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::error::CommandError;

/// Token endpoint that exchanges a refresh token for an ID token.
pub const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

const NOT_LOGGED_IN: &str =
    "set RUNOS_TOKEN, or refresh_token and firebase.api_key in config.json";

/// Supplies the bearer token for one backend call.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token valid for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Auth`] when no token can be obtained.
    async fn bearer_token(&self) -> Result<String, CommandError>;
}

/// A fixed token, typically from `RUNOS_TOKEN`.
pub struct StaticToken(String);

impl StaticToken {
    /// Wraps `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String, CommandError> {
        Ok(self.0.clone())
    }
}

/// Provider used when no credentials are configured; every call fails.
pub struct Unauthenticated;

#[async_trait]
impl TokenProvider for Unauthenticated {
    async fn bearer_token(&self) -> Result<String, CommandError> {
        Err(CommandError::Auth(NOT_LOGGED_IN.to_string()))
    }
}

/// Exchanges a stored refresh token for an ID token on every call.
pub struct RefreshTokenProvider {
    http: reqwest::Client,
    token_url: String,
    api_key: String,
    refresh_token: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
}

#[derive(Deserialize)]
struct TokenErrorBody {
    error: TokenErrorDetail,
}

#[derive(Deserialize)]
struct TokenErrorDetail {
    message: String,
}

impl RefreshTokenProvider {
    /// Creates a provider against the default token endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_key: api_key.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Points the provider at another token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }
}

#[async_trait]
impl TokenProvider for RefreshTokenProvider {
    async fn bearer_token(&self) -> Result<String, CommandError> {
        let response = self
            .http
            .post(&self.token_url)
            .timeout(std::time::Duration::from_secs(10))
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CommandError::Auth(format!("token refresh failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<TokenErrorBody>()
                .await
                .map_or_else(|_| format!("status {}", status.as_u16()), |b| b.error.message);
            return Err(CommandError::Auth(format!("token refresh failed: {detail}")));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|_| CommandError::Auth("token refresh returned no ID token".to_string()))?;
        tracing::debug!("Refreshed ID token");
        Ok(body.id_token)
    }
}

/// Picks the provider for the loaded configuration.
///
/// A static token from the environment wins; otherwise a stored refresh
/// token together with the Firebase API key enables refreshing. With
/// neither, every call fails with an authentication error.
#[must_use]
pub fn provider_from_config(config: &Config) -> Box<dyn TokenProvider> {
    if let Some(token) = config.static_token() {
        return Box::new(StaticToken::new(token));
    }
    match (config.refresh_token(), config.firebase_api_key()) {
        (Some(refresh), Some(key)) => Box::new(RefreshTokenProvider::new(key, refresh)),
        _ => Box::new(Unauthenticated),
    }
}
