//! Tests for the coalescing installation token cache.

use super::*;
use async_trait::async_trait;
use chrono::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// Helper Functions
// ============================================================================

/// Exchanger that counts calls and issues tokens with a fixed lifetime.
struct CountingExchanger {
    calls: AtomicUsize,
    lifetime: Duration,
}

impl CountingExchanger {
    fn new(lifetime: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            lifetime,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchanger for CountingExchanger {
    async fn exchange(&self, installation_id: InstallationId) -> Result<AccessToken, AuthError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AccessToken::new(
            format!("ghs_{}_{}", installation_id, call),
            installation_id,
            Utc::now() + self.lifetime,
        ))
    }
}

/// Exchanger that always fails with a non-transient rejection.
struct FailingExchanger {
    calls: AtomicUsize,
}

impl FailingExchanger {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TokenExchanger for FailingExchanger {
    async fn exchange(&self, _installation_id: InstallationId) -> Result<AccessToken, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AuthError::ExchangeRejected {
            status: 401,
            message: "Bad credentials".to_string(),
        })
    }
}

// ============================================================================
// Cache Hit/Miss Tests
// ============================================================================

mod hit_miss_tests {
    use super::*;

    /// Verify the first request exchanges and later requests reuse the
    /// cached token.
    #[tokio::test]
    async fn test_cached_token_reused() {
        let exchanger = Arc::new(CountingExchanger::new(Duration::hours(1)));
        let cache = InstallationTokenCache::new(exchanger.clone(), 128);
        let id = InstallationId::new(42);

        let first = cache.get_token(id).await.expect("Should exchange");
        let second = cache.get_token(id).await.expect("Should hit cache");

        assert_eq!(first.token(), second.token());
        assert_eq!(exchanger.calls(), 1);
    }

    /// Verify distinct installations exchange independently.
    #[tokio::test]
    async fn test_per_installation_entries() {
        let exchanger = Arc::new(CountingExchanger::new(Duration::hours(1)));
        let cache = InstallationTokenCache::new(exchanger.clone(), 128);

        let a = cache
            .get_token(InstallationId::new(1))
            .await
            .expect("Should exchange");
        let b = cache
            .get_token(InstallationId::new(2))
            .await
            .expect("Should exchange");

        assert_ne!(a.token(), b.token());
        assert_eq!(exchanger.calls(), 2);
    }

    /// Verify explicit invalidation forces a fresh exchange.
    #[tokio::test]
    async fn test_invalidate_drops_entry() {
        let exchanger = Arc::new(CountingExchanger::new(Duration::hours(1)));
        let cache = InstallationTokenCache::new(exchanger.clone(), 128);
        let id = InstallationId::new(42);

        let first = cache.get_token(id).await.expect("Should exchange");
        cache.invalidate(id).await;
        let second = cache.get_token(id).await.expect("Should re-exchange");

        assert_ne!(first.token(), second.token());
        assert_eq!(exchanger.calls(), 2);
    }
}

// ============================================================================
// Coalescing Tests
// ============================================================================

mod coalescing_tests {
    use super::*;

    /// Verify N concurrent requests for one installation produce exactly
    /// one upstream exchange, all callers receiving the same token.
    #[tokio::test]
    async fn test_concurrent_requests_coalesce() {
        let exchanger = Arc::new(CountingExchanger::new(Duration::hours(1)));
        let cache = Arc::new(InstallationTokenCache::new(exchanger.clone(), 128));
        let id = InstallationId::new(42);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.get_token(id).await }));
        }

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().expect("Should get token"));
        }

        assert_eq!(exchanger.calls(), 1);
        let first = tokens[0].token();
        assert!(tokens.iter().all(|t| t.token() == first));
    }

    /// Verify a failed exchange propagates to every concurrent caller and
    /// is not cached: the next request exchanges again.
    #[tokio::test]
    async fn test_failure_shared_but_not_cached() {
        let exchanger = Arc::new(FailingExchanger::new());
        let cache = Arc::new(InstallationTokenCache::new(exchanger.clone(), 128));
        let id = InstallationId::new(42);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.get_token(id).await }));
        }

        for handle in handles {
            let result = handle.await.unwrap();
            assert!(matches!(
                result,
                Err(AuthError::ExchangeRejected { status: 401, .. })
            ));
        }

        let calls_after_burst = exchanger.calls.load(Ordering::SeqCst);
        assert!(calls_after_burst >= 1);

        // A later request must try the upstream again.
        let result = cache.get_token(id).await;
        assert!(result.is_err());
        assert!(exchanger.calls.load(Ordering::SeqCst) > calls_after_burst);
    }
}

// ============================================================================
// Expiry Tests
// ============================================================================

mod expiry_tests {
    use super::*;

    /// Verify a token already inside the safety margin at issue time is
    /// refused rather than handed to a caller.
    #[tokio::test]
    async fn test_token_inside_margin_rejected() {
        // Lifetime below the margin: every issued token is already stale.
        let exchanger = Arc::new(CountingExchanger::new(Duration::seconds(EXPIRY_MARGIN_SECS / 2)));
        let cache = InstallationTokenCache::new(exchanger.clone(), 128);
        let id = InstallationId::new(42);

        let result = cache.get_token(id).await;

        assert!(matches!(
            result,
            Err(AuthError::StaleToken { installation_id }) if installation_id == id
        ));
        // One initial exchange plus one forced refresh.
        assert_eq!(exchanger.calls(), 2);
    }

    /// Verify a token with lifetime just above the margin is served.
    #[tokio::test]
    async fn test_token_just_outside_margin_served() {
        let exchanger = Arc::new(CountingExchanger::new(Duration::seconds(
            EXPIRY_MARGIN_SECS + 30,
        )));
        let cache = InstallationTokenCache::new(exchanger.clone(), 128);

        let token = cache
            .get_token(InstallationId::new(42))
            .await
            .expect("Should serve token");
        assert!(!token.is_expired());
        assert_eq!(exchanger.calls(), 1);
    }
}
