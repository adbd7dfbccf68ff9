//! App and installation identity types.
//!
//! This module provides the credential model for the dispatch core:
//! - ID types (`AppId`, `InstallationId`)
//! - Key material (`SigningKey`, validated PEM)
//! - Auth modes (`AuthMode`: App identity or static token)
//! - The installation-scoped `AccessToken`
//!
//! Secret-bearing types redact their contents in Debug output.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::num::ParseIntError;
use std::str::FromStr;

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;

use crate::error::AuthError;

pub mod assertion;
pub mod cache;
pub mod exchange;

pub use assertion::{AssertionSigner, SignedAssertion, ASSERTION_LIFETIME_SECS};
pub use cache::{InstallationTokenCache, DEFAULT_CACHE_CAPACITY, EXPIRY_MARGIN_SECS};
pub use exchange::{HttpTokenExchanger, TokenExchanger};

// ============================================================================
// Core ID Types
// ============================================================================

/// App identifier assigned by the platform during app registration.
///
/// Used as the `iss` claim of the self-assertion when exchanging for
/// installation tokens.
///
/// # Examples
///
/// ```
/// use github_app_dispatch::auth::AppId;
///
/// let app_id = AppId::new(123456);
/// assert_eq!(app_id.as_u64(), 123456);
/// assert_eq!(app_id.to_string(), "123456");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppId(u64);

impl AppId {
    /// Create a new App ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AppId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self::new)
    }
}

/// Installation identifier for a tenant-scoped grant of the App.
///
/// When the App is installed on an account or organization, the platform
/// assigns an installation ID. It keys the token cache and the token
/// exchange endpoint.
///
/// # Examples
///
/// ```
/// use github_app_dispatch::auth::InstallationId;
///
/// let installation = InstallationId::new(98765);
/// assert_eq!(installation.as_u64(), 98765);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstallationId(u64);

impl InstallationId {
    /// Create a new installation ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for InstallationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstallationId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self::new)
    }
}

// ============================================================================
// Key Material
// ============================================================================

/// PEM-encoded RSA private key for signing self-assertions.
///
/// Validated at construction; holding a `SigningKey` means the PEM parsed
/// as an RSA private key. The key material is never exposed in Debug
/// output.
#[derive(Clone)]
pub struct SigningKey {
    pem: String,
}

impl SigningKey {
    /// Create a signing key from a PEM-encoded string.
    ///
    /// Accepts PKCS#1 (`BEGIN RSA PRIVATE KEY`) and PKCS#8
    /// (`BEGIN PRIVATE KEY`) encodings.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidPrivateKey` if the PEM is empty, lacks
    /// BEGIN/END markers, or does not parse as an RSA private key.
    pub fn from_pem(pem: &str) -> Result<Self, AuthError> {
        let pem = pem.trim();

        if pem.is_empty() {
            return Err(AuthError::InvalidPrivateKey {
                message: "PEM string cannot be empty".to_string(),
            });
        }

        if !pem.contains("-----BEGIN") || !pem.contains("-----END") {
            return Err(AuthError::InvalidPrivateKey {
                message: "Invalid PEM format: missing BEGIN/END markers".to_string(),
            });
        }

        RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| AuthError::InvalidPrivateKey {
                message: format!("Failed to parse RSA private key: {}", e),
            })?;

        Ok(Self {
            pem: pem.to_string(),
        })
    }

    /// Get the PEM bytes for JWT encoding.
    pub(crate) fn pem_bytes(&self) -> &[u8] {
        self.pem.as_bytes()
    }
}

// Security: Don't expose key data in debug output
impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("pem", &"<REDACTED>")
            .finish()
    }
}

/// The App's long-lived identity: id plus signing key.
///
/// Created at process start from configuration; immutable for the process
/// lifetime.
#[derive(Debug, Clone)]
pub struct AppCredentials {
    app_id: AppId,
    key: SigningKey,
}

impl AppCredentials {
    /// Create App credentials from an id and a validated signing key.
    pub fn new(app_id: AppId, key: SigningKey) -> Self {
        Self { app_id, key }
    }

    /// Get the App ID.
    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    /// Get the signing key.
    pub fn key(&self) -> &SigningKey {
        &self.key
    }
}

/// A pre-configured fixed access token for token-auth mode.
///
/// Used when the framework runs without App-identity credentials. The
/// token string is never exposed in Debug output.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap a static token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the token string for use in an Authorization header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticToken").field(&"<REDACTED>").finish()
    }
}

/// How the framework authenticates against the platform.
///
/// The two modes are mutually exclusive and fixed at configuration time:
/// App-identity mode (assertions and installation tokens) or simple
/// token-auth mode (one fixed token for everything).
#[derive(Debug, Clone)]
pub enum AuthMode {
    /// App identity: self-assertions plus per-installation tokens.
    App(AppCredentials),
    /// Simple token-auth mode: a single pre-configured token.
    Token(StaticToken),
}

impl AuthMode {
    /// Check whether this is static token-auth mode.
    pub fn is_token_mode(&self) -> bool {
        matches!(self, Self::Token(_))
    }
}

// ============================================================================
// Access Token
// ============================================================================

/// Installation-scoped access token returned by the token exchange.
///
/// Tokens are short-lived (about one hour on the hosted platform). The
/// token string is never exposed in Debug output.
#[derive(Clone)]
pub struct AccessToken {
    token: String,
    installation_id: InstallationId,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Create a new access token.
    pub fn new(
        token: String,
        installation_id: InstallationId,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            installation_id,
            expires_at,
        }
    }

    /// Get the token string for use in API requests.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the installation this token is scoped to.
    pub fn installation_id(&self) -> InstallationId {
        self.installation_id
    }

    /// Get when this token expires.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Check if the token is currently expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Check if the token will expire within the margin period.
    pub fn expires_soon(&self, margin: Duration) -> bool {
        Utc::now() + margin >= self.expires_at
    }
}

// Security: Redact token in debug output
impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("installation_id", &self.installation_id)
            .field("expires_at", &self.expires_at)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
