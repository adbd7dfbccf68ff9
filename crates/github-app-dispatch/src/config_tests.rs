//! Tests for configuration validation and auth-mode resolution.

use super::*;
use crate::error::ConfigError;

// ============================================================================
// Helper Functions
// ============================================================================

fn generate_test_key_pem() -> String {
    use rsa::pkcs1::EncodeRsaPrivateKey;

    let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048)
        .expect("Should generate RSA key");
    key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
        .expect("Should encode key")
        .to_string()
}

// ============================================================================
// Auth Mode Resolution Tests
// ============================================================================

mod auth_mode_tests {
    use super::*;

    /// Verify app credentials resolve to App mode.
    #[test]
    fn test_app_credentials() {
        let config = AppConfig::new()
            .with_app_id(123456)
            .with_private_key_pem(generate_test_key_pem());

        let mode = config.auth_mode().expect("Should resolve");
        assert!(!mode.is_token_mode());
    }

    /// Verify a static token resolves to token mode.
    #[test]
    fn test_static_token() {
        let config = AppConfig::new().with_static_token("ghp_x");

        let mode = config.auth_mode().expect("Should resolve");
        assert!(mode.is_token_mode());
    }

    /// Verify no credentials at all is an error.
    #[test]
    fn test_missing_credentials() {
        let result = AppConfig::new().auth_mode();
        assert!(matches!(result, Err(ConfigError::MissingCredentials)));
    }

    /// Verify an empty static token counts as no credentials, matching
    /// the webhook secret's emptiness check.
    #[test]
    fn test_empty_static_token_rejected() {
        let result = AppConfig::new().with_static_token("").auth_mode();
        assert!(matches!(result, Err(ConfigError::MissingCredentials)));
    }

    /// Verify supplying both credential sets is an error.
    #[test]
    fn test_conflicting_credentials() {
        let config = AppConfig::new()
            .with_app_id(1)
            .with_private_key_pem(generate_test_key_pem())
            .with_static_token("ghp_x");

        assert!(matches!(
            config.auth_mode(),
            Err(ConfigError::ConflictingCredentials)
        ));
    }

    /// Verify half an app credential pair is an error either way.
    #[test]
    fn test_incomplete_credentials() {
        let only_id = AppConfig::new().with_app_id(1);
        assert!(matches!(
            only_id.auth_mode(),
            Err(ConfigError::IncompleteCredentials)
        ));

        let only_key = AppConfig::new().with_private_key_pem(generate_test_key_pem());
        assert!(matches!(
            only_key.auth_mode(),
            Err(ConfigError::IncompleteCredentials)
        ));
    }

    /// Verify a garbage private key surfaces the key error.
    #[test]
    fn test_invalid_key_rejected() {
        let config = AppConfig::new()
            .with_app_id(1)
            .with_private_key_pem("not a key");

        assert!(matches!(config.auth_mode(), Err(ConfigError::Key(_))));
    }
}

// ============================================================================
// Defaults Tests
// ============================================================================

mod defaults_tests {
    use super::*;
    use crate::auth::DEFAULT_CACHE_CAPACITY;

    /// Verify the built-in defaults.
    #[test]
    fn test_defaults() {
        let config = AppConfig::new();

        assert_eq!(config.api_base_url(), DEFAULT_API_BASE_URL);
        assert_eq!(config.webhook_path(), DEFAULT_WEBHOOK_PATH);
        assert_eq!(config.cache_capacity(), DEFAULT_CACHE_CAPACITY);
        assert!(config.user_agent().contains(env!("CARGO_PKG_NAME")));
    }

    /// Verify overrides stick.
    #[test]
    fn test_overrides() {
        let config = AppConfig::new()
            .with_api_base_url("https://ghe.example.com/api/v3")
            .with_webhook_path("/hooks/github")
            .with_user_agent("my-bot/2.0")
            .with_cache_capacity(64);

        assert_eq!(config.api_base_url(), "https://ghe.example.com/api/v3");
        assert_eq!(config.webhook_path(), "/hooks/github");
        assert_eq!(config.user_agent(), "my-bot/2.0");
        assert_eq!(config.cache_capacity(), 64);
    }

    /// Verify the webhook secret must be present and non-empty.
    #[test]
    fn test_webhook_secret_required() {
        let missing = AppConfig::new();
        assert!(matches!(
            missing.webhook_secret(),
            Err(ConfigError::MissingWebhookSecret)
        ));

        let empty = AppConfig::new().with_webhook_secret("");
        assert!(matches!(
            empty.webhook_secret(),
            Err(ConfigError::MissingWebhookSecret)
        ));

        let present = AppConfig::new().with_webhook_secret("s3cret");
        assert_eq!(present.webhook_secret().unwrap(), "s3cret");
    }
}
