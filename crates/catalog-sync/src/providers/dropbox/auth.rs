//! Dropbox authentication using a long-lived refresh token
//!
//! Every call exchanges the refresh token for a fresh access token; nothing is cached.

use reqwest::Client;
use std::time::Duration;

use crate::config::DropboxConfig;
use crate::error::{Error, Result};

/// Dropbox OAuth2 token manager
pub struct DropboxAuth {
    client: Client,
    token_url: String,
    app_key: String,
    app_secret: String,
    refresh_token: String,
    timeout: Duration,
}

impl DropboxAuth {
    /// Create from configuration
    pub fn new(client: Client, config: &DropboxConfig) -> Self {
        Self {
            client,
            token_url: config.token_url.clone(),
            app_key: config.app_key.clone(),
            app_secret: config.app_secret.clone(),
            refresh_token: config.refresh_token.clone(),
            timeout: config.request_timeout(),
        }
    }

    /// Exchange the refresh token for an access token
    pub async fn access_token(&self) -> Result<String> {
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.app_key, Some(&self.app_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("Token refresh failed ({}): {}", status, body)));
        }

        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: Option<String>,
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("Failed to parse token response: {}", e)))?;

        let token = token_response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth("Token response has no access_token".to_string()))?;

        tracing::debug!("Access token refreshed");
        Ok(token)
    }
}
