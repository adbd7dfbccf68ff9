//! Inbound webhook boundary: request shape, signature verification, and
//! the receiver that turns a verified delivery into a dispatched event.
//!
//! The HTTP server itself lives outside this crate; it hands over a
//! `WebhookRequest` (headers plus raw body) and maps the returned
//! `WebhookResponse` to an HTTP status. The receiver awaits dispatch;
//! final disposition of a failed event belongs to this top-level caller.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::classify::classify;
use crate::dispatch::EventRouter;
use crate::error::{EventError, ValidationError};
use crate::events::EventEnvelope;

/// Header carrying the event type.
pub const EVENT_HEADER: &str = "x-github-event";
/// Header carrying the unique delivery id.
pub const DELIVERY_HEADER: &str = "x-github-delivery";
/// Header carrying the HMAC signature over the raw body.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

// ============================================================================
// Webhook Request
// ============================================================================

/// Raw data of one inbound webhook HTTP request.
///
/// # Examples
///
/// ```
/// use github_app_dispatch::webhook::WebhookRequest;
/// use std::collections::HashMap;
///
/// let headers = HashMap::from([
///     ("x-github-event".to_string(), "pull_request".to_string()),
///     ("x-github-delivery".to_string(), "12345".to_string()),
/// ]);
/// let request = WebhookRequest::new(headers, b"{\"action\":\"opened\"}".to_vec().into());
///
/// assert_eq!(request.event_type(), Some("pull_request"));
/// assert_eq!(request.delivery_id(), Some("12345"));
/// ```
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    headers: HashMap<String, String>,
    body: Bytes,
}

impl WebhookRequest {
    /// Create a request from headers and the raw body. Header names are
    /// normalized to lowercase.
    pub fn new(headers: HashMap<String, String>, body: Bytes) -> Self {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        Self { headers, body }
    }

    /// The event type from the `x-github-event` header.
    pub fn event_type(&self) -> Option<&str> {
        self.headers.get(EVENT_HEADER).map(String::as_str)
    }

    /// The delivery id from the `x-github-delivery` header.
    pub fn delivery_id(&self) -> Option<&str> {
        self.headers.get(DELIVERY_HEADER).map(String::as_str)
    }

    /// The signature from the `x-hub-signature-256` header.
    pub fn signature(&self) -> Option<&str> {
        self.headers.get(SIGNATURE_HEADER).map(String::as_str)
    }

    /// The raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.body
    }
}

// ============================================================================
// Signature Validation
// ============================================================================

/// HMAC-SHA256 webhook signature verification with constant-time
/// comparison.
#[derive(Clone)]
pub struct SignatureValidator {
    secret: String,
}

impl SignatureValidator {
    /// Create a validator over the shared webhook secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify a signature over the raw payload.
    ///
    /// `signature` is the `x-hub-signature-256` value in the form
    /// `sha256=<hex>`, or `None` when the header was absent.
    ///
    /// # Errors
    ///
    /// - `MissingSignature` when no header was delivered;
    /// - `InvalidSignatureFormat` for a malformed header;
    /// - `SignatureMismatch` when the HMAC does not match.
    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> Result<(), ValidationError> {
        let signature = signature.ok_or(ValidationError::MissingSignature)?;
        let delivered = Self::parse_signature(signature)?;
        let expected = self.compute_hmac(payload)?;

        if Self::constant_time_compare(&delivered, &expected) {
            Ok(())
        } else {
            Err(ValidationError::SignatureMismatch)
        }
    }

    /// Extract the hex-encoded signature bytes from `sha256=<hex>`.
    fn parse_signature(signature: &str) -> Result<Vec<u8>, ValidationError> {
        const PREFIX: &str = "sha256=";

        let hex_signature = signature.strip_prefix(PREFIX).ok_or_else(|| {
            ValidationError::InvalidSignatureFormat {
                message: format!(
                    "Signature must start with '{}', got: '{}'",
                    PREFIX,
                    signature.chars().take(10).collect::<String>()
                ),
            }
        })?;

        hex::decode(hex_signature).map_err(|e| ValidationError::InvalidSignatureFormat {
            message: format!("Invalid hex encoding in signature: {}", e),
        })
    }

    fn compute_hmac(&self, payload: &[u8]) -> Result<Vec<u8>, ValidationError> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|e| {
            ValidationError::Hmac {
                message: format!("Failed to create HMAC instance: {}", e),
            }
        })?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
        use subtle::ConstantTimeEq;

        // Length is not secret; only the content comparison must be
        // constant-time.
        if a.len() != b.len() {
            return false;
        }
        a.ct_eq(b).into()
    }
}

// Security: Don't expose the secret in debug output
impl std::fmt::Debug for SignatureValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureValidator")
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

// ============================================================================
// Receiver
// ============================================================================

/// Response the embedding HTTP server should translate to a status code.
#[derive(Debug, Clone)]
pub enum WebhookResponse {
    /// 200 OK - event verified, dispatched, and settled without failure
    Accepted { event_id: String, matched: usize },

    /// 400 Bad Request - malformed request (missing headers, invalid JSON)
    BadRequest { message: String },

    /// 401 Unauthorized - missing or invalid signature
    Unauthorized { message: String },

    /// 500 Internal Server Error - context build or handler failure
    Failed { event_id: String, message: String },
}

impl WebhookResponse {
    /// The HTTP status code for this response.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Accepted { .. } => 200,
            Self::BadRequest { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Failed { .. } => 500,
        }
    }

    /// Check if the delivery was accepted and fully dispatched.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Verifies inbound deliveries and feeds them to the router.
#[derive(Debug)]
pub struct WebhookReceiver {
    validator: SignatureValidator,
    router: Arc<EventRouter>,
}

impl WebhookReceiver {
    /// Create a receiver over a validator and a router.
    pub fn new(validator: SignatureValidator, router: Arc<EventRouter>) -> Self {
        Self { validator, router }
    }

    /// Construct the event envelope from a verified request.
    ///
    /// The delivery id falls back to a generated UUID when the header is
    /// absent (replayed or hand-crafted deliveries).
    pub fn envelope_from(request: &WebhookRequest) -> Result<EventEnvelope, EventError> {
        let name = request.event_type().ok_or(EventError::MissingHeader {
            name: EVENT_HEADER,
        })?;

        let payload: serde_json::Value =
            serde_json::from_slice(request.payload()).map_err(|e| EventError::InvalidPayload {
                message: e.to_string(),
            })?;

        let id = match request.delivery_id() {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };

        Ok(EventEnvelope::new(id, name, payload))
    }

    /// Receive one delivery: verify, normalize, dispatch, settle.
    pub async fn receive(&self, request: WebhookRequest) -> WebhookResponse {
        if let Err(e) = self.validator.verify(request.payload(), request.signature()) {
            let diagnosis = classify(&e);
            warn!(
                delivery_id = ?request.delivery_id(),
                known = diagnosis.is_known,
                error = %diagnosis.message,
                "Rejected webhook delivery"
            );
            return WebhookResponse::Unauthorized {
                message: diagnosis.message,
            };
        }

        let envelope = match Self::envelope_from(&request) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    delivery_id = ?request.delivery_id(),
                    error = %e,
                    "Malformed webhook delivery"
                );
                return WebhookResponse::BadRequest {
                    message: e.to_string(),
                };
            }
        };

        let event_id = envelope.id().to_string();

        match self.router.dispatch(&envelope).await {
            Ok(outcome) => {
                info!(
                    event_id = %event_id,
                    matched = outcome.matched,
                    "Webhook delivery settled"
                );
                WebhookResponse::Accepted {
                    event_id,
                    matched: outcome.matched,
                }
            }
            Err(e) => WebhookResponse::Failed {
                event_id,
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
