//! Contract tests for error classification.
//!
//! These pin the literal failure signatures the table matches on. A
//! failing test here means an error message changed somewhere and the
//! table (and its revision) needs the same change.

use super::*;
use crate::auth::InstallationId;
use crate::error::{AuthError, ValidationError};

// ============================================================================
// Signature Contract Tests
// ============================================================================

mod contract_tests {
    use super::*;

    /// Verify the signature-mismatch error text triggers classification.
    #[test]
    fn test_signature_mismatch_is_known() {
        let diagnosis = classify(&ValidationError::SignatureMismatch);
        assert!(diagnosis.is_known);
        assert!(diagnosis.message.contains("webhook secret"));
    }

    /// Verify the missing-signature error text triggers classification.
    #[test]
    fn test_missing_signature_is_known() {
        let diagnosis = classify(&ValidationError::MissingSignature);
        assert!(diagnosis.is_known);
    }

    /// Verify the key-parse failure text triggers classification.
    #[test]
    fn test_key_parse_failure_is_known() {
        let error = AuthError::InvalidPrivateKey {
            message: "Failed to parse RSA private key: pem decode error".to_string(),
        };
        let diagnosis = classify(&error);
        assert!(diagnosis.is_known);
        assert!(diagnosis.message.contains("PEM"));
    }

    /// Verify the assertion-encode failure text triggers classification.
    #[test]
    fn test_assertion_failure_is_known() {
        let error = AuthError::AssertionFailed {
            message: "InvalidKeyFormat".to_string(),
        };
        assert!(classify(&error).is_known);
    }

    /// Verify the platform's credential rejection body triggers
    /// classification when carried in an exchange error.
    #[test]
    fn test_bad_credentials_is_known() {
        let error = AuthError::ExchangeRejected {
            status: 401,
            message: "{\"message\":\"Bad credentials\"}".to_string(),
        };
        let diagnosis = classify(&error);
        assert!(diagnosis.is_known);
        assert!(diagnosis.message.contains("app id"));
    }
}

// ============================================================================
// Pass-Through Tests
// ============================================================================

mod pass_through_tests {
    use super::*;

    /// Verify unknown errors pass through with their original text.
    #[test]
    fn test_unknown_error_unmodified() {
        let error = AuthError::InstallationNotFound {
            installation_id: InstallationId::new(42),
        };
        let diagnosis = classify(&error);

        assert!(!diagnosis.is_known);
        assert_eq!(diagnosis.message, error.to_string());
    }

    /// Verify the source chain is rendered into the matched text.
    #[test]
    fn test_source_chain_rendered() {
        use crate::error::DispatchError;

        let error = DispatchError::Context {
            event_id: "d-1".to_string(),
            message: "context build failed".to_string(),
            source: AuthError::ExchangeRejected {
                status: 401,
                message: "Bad credentials".to_string(),
            },
        };

        // The signature lives in the source, not the top-level message.
        assert!(classify(&error).is_known);
    }
}

// ============================================================================
// Idempotence Tests
// ============================================================================

mod idempotence_tests {
    use super::*;

    /// Verify classifying an already-classified message never re-matches:
    /// remediation texts must avoid every signature substring.
    #[test]
    fn test_classification_is_idempotent() {
        let errors: Vec<String> = vec![
            ValidationError::SignatureMismatch.to_string(),
            ValidationError::MissingSignature.to_string(),
            "Failed to parse RSA private key: truncated".to_string(),
            "Failed to encode assertion: key mismatch".to_string(),
            "Token exchange rejected: 401 - Bad credentials".to_string(),
        ];

        for original in errors {
            let first = classify_message(&original);
            assert!(first.is_known, "{:?} should classify", original);

            let second = classify_message(&first.message);
            assert!(
                !second.is_known,
                "remediation for {:?} re-matched the table",
                original
            );
            assert_eq!(second.message, first.message);
        }
    }

    /// Verify classify_message and classify agree on plain errors.
    #[test]
    fn test_message_and_error_paths_agree() {
        let error = ValidationError::SignatureMismatch;
        assert_eq!(
            classify(&error),
            classify_message(&error.to_string())
        );
    }
}
