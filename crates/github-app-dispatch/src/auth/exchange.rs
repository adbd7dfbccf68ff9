//! Installation token exchange against the platform API.
//!
//! One upstream call: `POST /app/installations/{id}/access_tokens`,
//! authenticated with a fresh self-assertion. The exchanger performs no
//! retries; retry policy belongs to the API client layer, and the token
//! cache coalesces concurrent demand before it reaches this point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{AccessToken, AssertionSigner, InstallationId};
use crate::error::AuthError;

/// Performs the upstream installation-token exchange.
///
/// Abstracted as a trait so the token cache can be exercised against mock
/// exchangers in tests.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Exchange the App identity for an installation-scoped access token.
    async fn exchange(&self, installation_id: InstallationId) -> Result<AccessToken, AuthError>;
}

/// Wire shape of the platform's token response.
#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

/// HTTP implementation of the token exchange.
pub struct HttpTokenExchanger {
    http: reqwest::Client,
    base_url: Url,
    signer: AssertionSigner,
}

impl HttpTokenExchanger {
    /// Create an exchanger against the given API base URL.
    pub fn new(http: reqwest::Client, base_url: Url, signer: AssertionSigner) -> Self {
        Self {
            http,
            base_url,
            signer,
        }
    }

    fn exchange_url(&self, installation_id: InstallationId) -> String {
        format!(
            "{}/app/installations/{}/access_tokens",
            self.base_url.as_str().trim_end_matches('/'),
            installation_id
        )
    }
}

impl std::fmt::Debug for HttpTokenExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTokenExchanger")
            .field("base_url", &self.base_url.as_str())
            .field("app_id", &self.signer.app_id())
            .finish()
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(&self, installation_id: InstallationId) -> Result<AccessToken, AuthError> {
        let assertion = self.signer.sign()?;
        let url = self.exchange_url(installation_id);

        debug!(
            installation_id = %installation_id,
            app_id = %self.signer.app_id(),
            "Exchanging self-assertion for installation token"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(assertion.token())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| AuthError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();

        if status.is_success() {
            let body: ExchangeResponse =
                response.json().await.map_err(|e| AuthError::ExchangeFailed {
                    status: status.as_u16(),
                    message: format!("Unparseable token response: {}", e),
                })?;

            return Ok(AccessToken::new(
                body.token,
                installation_id,
                body.expires_at,
            ));
        }

        let message = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 | 403 => Err(AuthError::ExchangeRejected {
                status: status.as_u16(),
                message,
            }),
            404 => Err(AuthError::InstallationNotFound { installation_id }),
            code => Err(AuthError::ExchangeFailed {
                status: code,
                message,
            }),
        }
    }
}

#[cfg(test)]
#[path = "exchange_tests.rs"]
mod tests;
