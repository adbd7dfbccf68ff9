//! Error classification for operator-facing diagnostics.
//!
//! Auth and verification failures often surface as opaque library
//! errors. `classify` maps known failure signatures (literal substrings
//! of the rendered error text) to remediation messages an operator can
//! act on. Everything else passes through unmodified.
//!
//! Matching on message text is a known brittleness boundary: the
//! signatures are tied to the wording of this crate's own errors and of
//! the upstream platform. The table is versioned, and the contract tests
//! pin every literal signature currently in use. Bump `TABLE_REVISION`
//! whenever a signature or remediation changes.

/// Revision of the signature table.
pub const TABLE_REVISION: u32 = 1;

/// Known failure signatures and their remediations.
///
/// Remediation texts deliberately avoid every signature substring, so
/// feeding an already-classified message back through `classify` yields
/// a stable unknown result instead of re-matching.
const KNOWN_FAILURES: &[(&str, &str)] = &[
    (
        "signature does not match",
        "Webhook verification failed: the configured webhook secret is not the one the \
         platform signs deliveries with. Update the secret in the app settings or in this \
         deployment's configuration.",
    ),
    (
        "Missing x-hub-signature-256 header",
        "The delivery carried no signing header. Either the platform app has no webhook \
         secret configured, or the request did not come from the platform.",
    ),
    (
        "Failed to parse RSA private key",
        "The configured private key is not a valid PEM-encoded RSA key. Re-download the \
         key for this app and configure it unmodified, including the BEGIN/END markers.",
    ),
    (
        "Failed to encode assertion",
        "The private key was readable but could not produce a valid self-assertion. The \
         key likely belongs to a different app or is corrupted; generate a fresh one.",
    ),
    (
        "Bad credentials",
        "The platform rejected the app credentials: the app id and private key do not \
         belong to the same app. Check that both come from the same app registration.",
    ),
];

/// Result of classifying one error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    /// The remediation text for known failures, or the original rendered
    /// error for unknown ones.
    pub message: String,
    /// Whether a known signature matched.
    pub is_known: bool,
}

/// Classify an error by its rendered message chain.
///
/// Total and infallible: never panics, never inspects error types. The
/// identity of thrown errors crosses library boundaries this core does
/// not control, so only the message text is trusted.
pub fn classify(error: &(dyn std::error::Error + 'static)) -> Diagnosis {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    classify_message(&rendered)
}

/// Classify an already-rendered error message.
pub fn classify_message(message: &str) -> Diagnosis {
    for (signature, remediation) in KNOWN_FAILURES {
        if message.contains(signature) {
            return Diagnosis {
                message: (*remediation).to_string(),
                is_known: true,
            };
        }
    }

    Diagnosis {
        message: message.to_string(),
        is_known: false,
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
