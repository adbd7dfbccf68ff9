//! Installation token cache with coalesced exchange.
//!
//! The cache is the only cross-task shared resource in the dispatch core.
//! Its contract:
//!
//! - a live cached token is returned without touching the upstream;
//! - concurrent requests for the same installation coalesce into exactly
//!   one upstream exchange, every caller receiving the same token or the
//!   same error (errors are never cached);
//! - a token within the expiry safety margin is indistinguishable from
//!   "not cached";
//! - the cache is bounded, evicting least-recently-used entries under
//!   pressure. Eviction costs one extra API call, never correctness.
//!
//! Contention is scoped to a single installation id; there is no global
//! lock around the exchange.

use moka::future::Cache;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use super::{AccessToken, InstallationId, TokenExchanger};
use crate::error::AuthError;

/// Safety margin below the platform's real token expiry, in seconds.
///
/// A token is treated as absent once it is within this margin of its
/// `expires_at`, so a handler never receives a token that could expire
/// mid-request.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Production default capacity, sized for tens of thousands of tenants.
pub const DEFAULT_CACHE_CAPACITY: u64 = 32_768;

/// Per-entry expiry: an entry lives until `expires_at` minus the safety
/// margin, then the cache treats it as gone.
struct TokenExpiry;

impl Expiry<InstallationId, AccessToken> for TokenExpiry {
    fn expire_after_create(
        &self,
        _key: &InstallationId,
        value: &AccessToken,
        _created_at: Instant,
    ) -> Option<StdDuration> {
        let live = value.expires_at() - Duration::seconds(EXPIRY_MARGIN_SECS) - Utc::now();
        Some(live.to_std().unwrap_or(StdDuration::ZERO))
    }
}

/// Bounded, coalescing cache of installation access tokens.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use github_app_dispatch::auth::{InstallationId, InstallationTokenCache, TokenExchanger};
/// # async fn example(exchanger: Arc<dyn TokenExchanger>) -> Result<(), Box<dyn std::error::Error>> {
/// let cache = InstallationTokenCache::new(exchanger, 1024);
///
/// // First call exchanges; later calls within the token lifetime do not.
/// let token = cache.get_token(InstallationId::new(42)).await?;
/// # Ok(())
/// # }
/// ```
pub struct InstallationTokenCache {
    entries: Cache<InstallationId, AccessToken>,
    exchanger: Arc<dyn TokenExchanger>,
}

impl InstallationTokenCache {
    /// Create a cache over the given exchanger, bounded to `capacity`
    /// entries.
    pub fn new(exchanger: Arc<dyn TokenExchanger>, capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity)
            .expire_after(TokenExpiry)
            .build();

        Self { entries, exchanger }
    }

    /// Get a token valid for at least the safety margin from now.
    ///
    /// Returns the cached token when live; otherwise performs (or joins)
    /// the single in-flight exchange for this installation. Exchange
    /// failures propagate to every waiting caller and are not cached.
    pub async fn get_token(
        &self,
        installation_id: InstallationId,
    ) -> Result<AccessToken, AuthError> {
        let margin = Duration::seconds(EXPIRY_MARGIN_SECS);

        let token = self.lookup(installation_id).await?;
        if !token.expires_soon(margin) {
            return Ok(token);
        }

        // Clock-edge guard: per-entry expiry should already have evicted
        // this entry. Drop it and exchange once more.
        warn!(
            installation_id = %installation_id,
            expires_at = %token.expires_at(),
            "Cached token inside expiry margin; forcing a fresh exchange"
        );
        self.entries.invalidate(&installation_id).await;

        let token = self.lookup(installation_id).await?;
        if token.expires_soon(margin) {
            return Err(AuthError::StaleToken { installation_id });
        }
        Ok(token)
    }

    /// Drop the cached token for an installation, if any.
    ///
    /// Used when a tenant revokes the App and the token is known dead.
    pub async fn invalidate(&self, installation_id: InstallationId) {
        self.entries.invalidate(&installation_id).await;
    }

    async fn lookup(&self, installation_id: InstallationId) -> Result<AccessToken, AuthError> {
        let exchanger = Arc::clone(&self.exchanger);
        self.entries
            .try_get_with(installation_id, async move {
                debug!(
                    installation_id = %installation_id,
                    "Token cache miss; starting exchange"
                );
                exchanger.exchange(installation_id).await
            })
            .await
            // Coalesced waiters share one Arc'd failure; hand each caller
            // its own clone.
            .map_err(|e| (*e).clone())
    }
}

impl std::fmt::Debug for InstallationTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationTokenCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
