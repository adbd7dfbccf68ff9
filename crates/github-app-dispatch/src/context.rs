//! Per-event execution context.
//!
//! The context carries what a handler needs: the event envelope, an API
//! client already holding the right credential, and a scoped logger. One
//! context is built per dispatched event and shared by every matching
//! handler, so a single delivery never resolves its credential twice.

use serde_json::Value;
use tracing::debug;

use crate::client::{ApiClient, AuthScope, ClientFactory};
use crate::error::AuthError;
use crate::events::EventEnvelope;

/// Execution context handed to each matching handler.
#[derive(Debug)]
pub struct EventContext {
    event: EventEnvelope,
    client: ApiClient,
    logger: tracing::Span,
}

impl EventContext {
    /// The event being dispatched.
    pub fn event(&self) -> &EventEnvelope {
        &self.event
    }

    /// The event payload. Shorthand for `event().payload()`.
    pub fn payload(&self) -> &Value {
        self.event.payload()
    }

    /// An API client scoped to this event's credential.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// A span carrying the event id and name; handlers can enter it or
    /// attach it to their own spans for correlated logs.
    pub fn logger(&self) -> &tracing::Span {
        &self.logger
    }
}

/// Builds execution contexts, deciding the credential scope per event.
#[derive(Debug)]
pub struct ContextBuilder {
    factory: ClientFactory,
}

impl ContextBuilder {
    /// Create a builder over the given client factory.
    pub fn new(factory: ClientFactory) -> Self {
        Self { factory }
    }

    /// Decide which credential scope an event authenticates with.
    ///
    /// - Static token-auth mode wins unconditionally.
    /// - Events without a `payload.installation`, and `installation`
    ///   events with action `deleted`, resolve to App scope: a tenant
    ///   identity being revoked must not authenticate its own revocation
    ///   event.
    /// - Everything else resolves to the payload's installation.
    pub fn select_scope(&self, event: &EventEnvelope) -> AuthScope {
        if self.factory.is_token_mode() {
            return AuthScope::Token;
        }

        match event.installation_id() {
            None => AuthScope::App,
            Some(_)
                if event.base_type() == "installation" && event.action() == Some("deleted") =>
            {
                AuthScope::App
            }
            Some(id) => AuthScope::Installation(id),
        }
    }

    /// Build the context for one event.
    ///
    /// Credential-resolution failures are surfaced unchanged; the
    /// dispatcher classifies and reports them.
    pub async fn build(&self, event: &EventEnvelope) -> Result<EventContext, AuthError> {
        let scope = self.select_scope(event);
        debug!(event_id = %event.id(), %scope, "Resolving event credential scope");

        let client = self.factory.client_for(scope).await?;
        let logger = tracing::info_span!(
            "event",
            event_id = %event.id(),
            event = %event.name()
        );

        Ok(EventContext {
            event: event.clone(),
            client,
            logger,
        })
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
