//! Authenticated API client and the client factory.
//!
//! The `ClientFactory` resolves a credential for one of three scopes and
//! hands back a ready-to-use `ApiClient`:
//!
//! - *App scope*: a fresh signed self-assertion (no tenant);
//! - *Installation scope*: a cached or freshly exchanged installation
//!   token (through the token cache);
//! - *Static-token scope*: the pre-configured fixed token.
//!
//! The `ApiClient` is the only place in the core that retries: transient
//! upstream failures (5xx, 429, transport) back off exponentially with
//! jitter. The dispatch pipeline above it never retries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::ACCEPT;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{
    AssertionSigner, AuthMode, HttpTokenExchanger, InstallationId, InstallationTokenCache,
    StaticToken,
};
use crate::error::{ApiError, AuthError};

/// Media type the platform expects on API requests.
const ACCEPT_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Request timeout for all upstream calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Retry Policy
// ============================================================================

/// Exponential-backoff retry policy for transient API failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,

    /// Initial delay before first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier (e.g., 2.0 for doubling)
    pub backoff_multiplier: f64,

    /// Whether to add jitter to delays
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Disable jitter. Useful for deterministic tests.
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Check if another retry attempt should be made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Calculate the delay before the given retry attempt (1-indexed).
    ///
    /// Exponential backoff capped at `max_delay`, with ±25% jitter when
    /// enabled.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let multiplier = self.backoff_multiplier.powi(attempt as i32 - 1);
        let delay_ms = (self.initial_delay.as_millis() as f64 * multiplier) as u64;
        let mut delay = Duration::from_millis(delay_ms);

        if delay > self.max_delay {
            delay = self.max_delay;
        }

        if self.use_jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.75..=1.25);
            delay = Duration::from_millis((delay.as_millis() as f64 * jitter_factor) as u64);
        }

        delay
    }
}

// ============================================================================
// Rate Limit Info
// ============================================================================

/// Rate limit state reported by the platform in response headers.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// Maximum number of requests allowed in the window
    pub limit: u64,

    /// Number of requests remaining
    pub remaining: u64,

    /// Time when the rate limit resets
    pub reset_at: DateTime<Utc>,
}

impl RateLimitInfo {
    /// Parse rate limit info from response headers, if present.
    pub fn from_headers(headers: &reqwest::header::HeaderMap) -> Option<Self> {
        let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        let limit = get("x-ratelimit-limit")?.parse::<u64>().ok()?;
        let remaining = get("x-ratelimit-remaining")?.parse::<u64>().ok()?;
        let reset = get("x-ratelimit-reset")?.parse::<i64>().ok()?;
        let reset_at = DateTime::from_timestamp(reset, 0)?;

        Some(Self {
            limit,
            remaining,
            reset_at,
        })
    }

    /// Check whether the window is exhausted.
    pub fn is_limited(&self) -> bool {
        self.remaining == 0
    }
}

// ============================================================================
// Credential Scope
// ============================================================================

/// Which credential an API client should carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScope {
    /// App-level: self-assertion only, no tenant.
    App,
    /// Tenant-level: installation token via the cache.
    Installation(InstallationId),
    /// The pre-configured static token.
    Token,
}

impl std::fmt::Display for AuthScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::App => write!(f, "app"),
            Self::Installation(id) => write!(f, "installation({})", id),
            Self::Token => write!(f, "token"),
        }
    }
}

// ============================================================================
// API Client
// ============================================================================

/// Authenticated API client carrying one resolved credential.
///
/// Thin wrapper over `reqwest` with the base URL, bearer credential, and
/// retry policy applied. Cloning is cheap and shares the underlying
/// connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    bearer: String,
    retry: RetryPolicy,
}

impl ApiClient {
    pub(crate) fn new(
        http: reqwest::Client,
        base_url: Url,
        bearer: String,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            base_url,
            bearer,
            retry,
        }
    }

    /// The API base URL this client targets.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Perform a GET request, returning the parsed JSON body.
    pub async fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        self.execute(Method::GET, path, None).await
    }

    /// Perform a POST request with a JSON body, returning the parsed
    /// JSON response.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.execute(Method::POST, path, Some(body)).await
    }

    /// Perform a PATCH request with a JSON body.
    pub async fn patch_json(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.execute(Method::PATCH, path, Some(body)).await
    }

    /// Perform a DELETE request.
    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.execute(Method::DELETE, path, None).await
    }

    /// Build a pre-authenticated request for an arbitrary method and
    /// path, for calls the JSON helpers don't cover. The caller owns
    /// sending and retrying.
    pub fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, ApiError> {
        let url = self.url(path)?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(&self.bearer)
            .header(ACCEPT, ACCEPT_MEDIA_TYPE))
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = self.url(path)?;
        let mut attempt = 0u32;

        loop {
            match self.send_once(method.clone(), url.clone(), body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && self.retry.should_retry(attempt) => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient API failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.bearer)
            .header(ACCEPT, ACCEPT_MEDIA_TYPE);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;

        if let Some(rate) = RateLimitInfo::from_headers(response.headers()) {
            if rate.is_limited() {
                warn!(reset_at = %rate.reset_at, "API rate limit exhausted");
            } else {
                debug!(remaining = rate.remaining, limit = rate.limit, "API rate limit");
            }
        }

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Json {
                message: e.to_string(),
            })
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| ApiError::InvalidUrl {
            message: e.to_string(),
        })
    }
}

// Security: Don't expose the bearer credential in debug output
impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("bearer", &"<REDACTED>")
            .finish()
    }
}

// ============================================================================
// Client Factory
// ============================================================================

/// Resolved auth machinery per mode.
enum FactoryAuth {
    App {
        signer: AssertionSigner,
        cache: Arc<InstallationTokenCache>,
    },
    Token(StaticToken),
}

/// Builds authenticated API clients for a requested credential scope.
///
/// One factory instance is wired per app; installation-scope requests go
/// through the shared token cache, so a single delivery never triggers
/// more than one exchange.
pub struct ClientFactory {
    auth: FactoryAuth,
    http: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl ClientFactory {
    /// Create a factory for the given auth mode and API base URL.
    pub fn new(
        mode: AuthMode,
        base_url: Url,
        user_agent: &str,
        cache_capacity: u64,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Network {
                message: e.to_string(),
            })?;

        let auth = match mode {
            AuthMode::App(credentials) => {
                let signer = AssertionSigner::new(credentials);
                let exchanger =
                    HttpTokenExchanger::new(http.clone(), base_url.clone(), signer.clone());
                let cache =
                    InstallationTokenCache::new(Arc::new(exchanger), cache_capacity);
                FactoryAuth::App {
                    signer,
                    cache: Arc::new(cache),
                }
            }
            AuthMode::Token(token) => FactoryAuth::Token(token),
        };

        Ok(Self {
            auth,
            http,
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy applied to produced clients.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check whether the factory runs in static token-auth mode.
    pub fn is_token_mode(&self) -> bool {
        matches!(self.auth, FactoryAuth::Token(_))
    }

    /// Build a client carrying the credential for the requested scope.
    ///
    /// In token-auth mode every scope resolves to the static token.
    /// Installation scope may suspend on the token cache's upstream
    /// exchange.
    pub async fn client_for(&self, scope: AuthScope) -> Result<ApiClient, AuthError> {
        let bearer = match (&self.auth, scope) {
            (FactoryAuth::Token(token), _) => token.expose().to_string(),
            (FactoryAuth::App { signer, .. }, AuthScope::App) => signer.sign()?.into_token(),
            (FactoryAuth::App { cache, .. }, AuthScope::Installation(id)) => {
                cache.get_token(id).await?.token().to_string()
            }
            (FactoryAuth::App { .. }, AuthScope::Token) => {
                return Err(AuthError::ScopeUnavailable {
                    scope: "static-token",
                });
            }
        };

        Ok(ApiClient::new(
            self.http.clone(),
            self.base_url.clone(),
            bearer,
            self.retry.clone(),
        ))
    }
}

impl std::fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.auth {
            FactoryAuth::App { .. } => "app",
            FactoryAuth::Token(_) => "token",
        };
        f.debug_struct("ClientFactory")
            .field("mode", &mode)
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
