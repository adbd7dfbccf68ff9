//! Error types for the event-dispatch core.
//!
//! Each concern carries its own error enum, with transience classification
//! where a retry decision is meaningful. Retry policy itself lives in the
//! API client layer; nothing in this module retries.

use thiserror::Error;

use crate::auth::InstallationId;

/// Authentication and credential-resolution errors.
///
/// `AuthError` is `Clone`: a single in-flight token exchange can fail on
/// behalf of many coalesced callers, and every one of them receives the
/// same error. Causes from non-clonable library errors (reqwest, serde)
/// are captured as strings at the boundary where they occur.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The configured private key could not be parsed (non-retryable).
    #[error("Invalid private key: {message}")]
    InvalidPrivateKey { message: String },

    /// Signing the App self-assertion failed (non-retryable).
    #[error("Failed to encode assertion: {message}")]
    AssertionFailed { message: String },

    /// The platform rejected the App credentials during token exchange
    /// (non-retryable; a misconfigured credential stays misconfigured).
    #[error("Token exchange rejected: {status} - {message}")]
    ExchangeRejected { status: u16, message: String },

    /// Installation not found or access revoked (non-retryable).
    #[error("Installation {installation_id} not found or access denied")]
    InstallationNotFound { installation_id: InstallationId },

    /// The token exchange returned an unexpected error response.
    #[error("Token exchange failed: {status} - {message}")]
    ExchangeFailed { status: u16, message: String },

    /// The exchange succeeded but the token is already inside the expiry
    /// safety margin. Treated as an upstream anomaly, not retried here.
    #[error("Exchange for installation {installation_id} returned a token already near expiry")]
    StaleToken { installation_id: InstallationId },

    /// The requested credential scope is not available in the configured
    /// auth mode (e.g. static-token scope without a configured token).
    #[error("Credential scope {scope} is not available in this auth mode")]
    ScopeUnavailable { scope: &'static str },

    /// Network connectivity or transport error.
    #[error("Network error: {message}")]
    Network { message: String },
}

impl AuthError {
    /// Check if this error represents a transient condition that may
    /// succeed if the caller retries the surrounding operation.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::InvalidPrivateKey { .. } => false,
            Self::AssertionFailed { .. } => false,
            Self::ExchangeRejected { .. } => false,
            Self::InstallationNotFound { .. } => false,
            Self::ExchangeFailed { status, .. } => *status >= 500 || *status == 429,
            Self::StaleToken { .. } => false,
            Self::ScopeUnavailable { .. } => false,
            Self::Network { .. } => true,
        }
    }
}

/// Errors from authenticated API client operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP error response from the platform API.
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// The request path could not be joined onto the API base URL.
    #[error("Invalid request URL: {message}")]
    InvalidUrl { message: String },

    /// The response body was not the expected JSON shape.
    #[error("JSON parsing error: {message}")]
    Json { message: String },

    /// HTTP client error (network, TLS, timeout).
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl ApiError {
    /// Check if this error represents a transient condition.
    ///
    /// Server errors (5xx), rate limiting (429), and transport failures
    /// are transient; everything else is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidUrl { .. } => false,
            Self::Json { .. } => false,
            Self::HttpClient(_) => true,
        }
    }
}

/// Errors constructing an event envelope from an inbound delivery.
#[derive(Debug, Error)]
pub enum EventError {
    /// A required webhook header is absent.
    #[error("Missing {name} header")]
    MissingHeader { name: &'static str },

    /// The delivery body is not valid JSON.
    #[error("Invalid event payload: {message}")]
    InvalidPayload { message: String },
}

/// Webhook signature verification errors.
///
/// The classifier (`classify`) matches on the literal `Display` text of
/// these variants; changing the wording is a contract change.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The delivery carried no signature header.
    #[error("Missing x-hub-signature-256 header")]
    MissingSignature,

    /// The computed HMAC does not match the delivered signature.
    #[error("Webhook signature does not match the request body")]
    SignatureMismatch,

    /// The signature header is not in the expected `sha256=<hex>` format.
    #[error("Invalid signature format: {message}")]
    InvalidSignatureFormat { message: String },

    /// HMAC construction failed.
    #[error("HMAC error: {message}")]
    Hmac { message: String },
}

/// Errors from handler registration and event dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The subscription pattern string is malformed.
    #[error("Invalid event pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The subscription registry lock was poisoned.
    #[error("Subscription registry unavailable: {message}")]
    Registry { message: String },

    /// Building the execution context failed; the event was not delivered
    /// to any handler.
    #[error("Failed to build context for event {event_id}: {message}")]
    Context {
        event_id: String,
        message: String,
        #[source]
        source: AuthError,
    },

    /// One or more handlers failed. Carries the first failure; all
    /// matching handlers ran to completion before this was produced.
    #[error("{failed} of {matched} handlers failed for event {event_id}")]
    Handler {
        event_id: String,
        matched: usize,
        failed: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither App credentials nor a static token were supplied.
    #[error("No credentials configured: set app_id + private_key, or a static token")]
    MissingCredentials,

    /// App credentials and a static token are mutually exclusive.
    #[error("Both App credentials and a static token configured; pick one auth mode")]
    ConflictingCredentials,

    /// An App id was supplied without a private key, or vice versa.
    #[error("Incomplete App credentials: both app_id and private_key are required")]
    IncompleteCredentials,

    /// The webhook shared secret is empty.
    #[error("Webhook secret must not be empty")]
    MissingWebhookSecret,

    /// The API base URL is not a valid absolute URL.
    #[error("Invalid API base URL: {message}")]
    InvalidApiBaseUrl { message: String },

    /// The configured private key failed validation.
    #[error("Private key rejected: {0}")]
    Key(#[source] AuthError),

    /// Constructing the HTTP client stack failed.
    #[error("Client construction failed: {0}")]
    Client(#[source] AuthError),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
