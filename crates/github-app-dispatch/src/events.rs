//! Event envelope and name normalization.
//!
//! An `EventEnvelope` is the normalized representation of one inbound
//! delivery: a delivery id, a dotted event name, and an arbitrary JSON
//! payload. It is constructed once per delivery, is immutable, and is
//! discarded after dispatch settles.
//!
//! Normalization follows the first-dot rule: `"issues.opened"` is type
//! `issues`, action `opened`. For bare names the action is resolved from
//! `payload.action` when present. Normalization is pure.

use serde_json::Value;

use crate::auth::InstallationId;

/// Normalized representation of one inbound webhook delivery.
///
/// # Examples
///
/// ```
/// use github_app_dispatch::events::EventEnvelope;
/// use serde_json::json;
///
/// let event = EventEnvelope::new("d-1", "issues", json!({"action": "opened"}));
/// assert_eq!(event.base_type(), "issues");
/// assert_eq!(event.action(), Some("opened"));
///
/// let event = EventEnvelope::new("d-2", "pull_request.closed", json!({}));
/// assert_eq!(event.base_type(), "pull_request");
/// assert_eq!(event.action(), Some("closed"));
///
/// let event = EventEnvelope::new("d-3", "push", json!({}));
/// assert_eq!(event.action(), None);
/// ```
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    id: String,
    name: String,
    base_type: String,
    action: Option<String>,
    payload: Value,
}

impl EventEnvelope {
    /// Create an envelope from a raw `{id, name, payload}` triple,
    /// normalizing the name.
    pub fn new(id: impl Into<String>, name: &str, payload: Value) -> Self {
        let (base_type, action_from_name) = match name.split_once('.') {
            Some((base, action)) if !action.is_empty() => (base, Some(action)),
            Some((base, _)) => (base, None),
            None => (name, None),
        };

        let action = action_from_name
            .map(str::to_string)
            .or_else(|| {
                payload
                    .get("action")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });

        Self {
            id: id.into(),
            name: name.to_string(),
            base_type: base_type.to_string(),
            action,
            payload,
        }
    }

    /// The delivery id, unique per delivery.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The event name as delivered (possibly dotted).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The event type without any action suffix.
    pub fn base_type(&self) -> &str {
        &self.base_type
    }

    /// The resolved action, from the name or from `payload.action`.
    ///
    /// `None` when neither carries one; only exact-type subscriptions
    /// match such an event.
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// The raw payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The installation the event belongs to, when the payload carries
    /// one (`payload.installation.id`).
    pub fn installation_id(&self) -> Option<InstallationId> {
        self.payload
            .get("installation")
            .and_then(|i| i.get("id"))
            .and_then(Value::as_u64)
            .map(InstallationId::new)
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
