//! Subscription registry and event dispatcher.
//!
//! Handlers register under string patterns: an exact type (`"issues"`),
//! a dotted type.action (`"issues.opened"`), or the wildcard (`"*"`).
//! Dispatch per event is a fixed progression: normalize, snapshot the
//! registry, build one context, invoke matches serially in registration
//! order, settle. One handler's failure never prevents the rest from
//! running; the first failure is the one propagated, after all have run.
//!
//! Distinct events dispatch concurrently with no ordering between them;
//! serialization exists only within a single event, to keep log
//! interleaving bounded and failure attribution unambiguous.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info};

use crate::classify::classify;
use crate::context::{ContextBuilder, EventContext};
use crate::error::DispatchError;
use crate::events::EventEnvelope;

/// Error type handlers report. Opaque to the dispatcher; it is logged,
/// classified, and carried in the dispatch outcome.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Application-provided event handler.
///
/// Handlers for the same event run serially in registration order; a
/// handler only needs `Send + Sync` because distinct events dispatch
/// concurrently.
///
/// # Examples
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use github_app_dispatch::dispatch::{EventHandler, HandlerError};
/// use github_app_dispatch::context::EventContext;
///
/// struct Greeter;
///
/// #[async_trait]
/// impl EventHandler for Greeter {
///     async fn handle(&self, ctx: &EventContext) -> Result<(), HandlerError> {
///         println!("issue opened in delivery {}", ctx.event().id());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event. The context is shared with the event's other
    /// matching handlers.
    async fn handle(&self, ctx: &EventContext) -> Result<(), HandlerError>;
}

// ============================================================================
// Patterns
// ============================================================================

/// A parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPattern {
    /// Matches every event regardless of type or action.
    Any,
    /// Matches any action of one event type.
    Type(String),
    /// Matches exactly one type and action.
    TypeAction(String, String),
}

impl EventPattern {
    /// Parse a pattern string.
    ///
    /// `"*"` is the wildcard; `"issues"` matches any `issues` action;
    /// `"issues.opened"` matches only that action. Empty segments are
    /// rejected.
    pub fn parse(pattern: &str) -> Result<Self, DispatchError> {
        let trimmed = pattern.trim();

        if trimmed.is_empty() {
            return Err(DispatchError::InvalidPattern {
                pattern: pattern.to_string(),
                message: "pattern must not be empty".to_string(),
            });
        }

        if trimmed == "*" {
            return Ok(Self::Any);
        }

        match trimmed.split_once('.') {
            None => Ok(Self::Type(trimmed.to_string())),
            Some((base, action)) if !base.is_empty() && !action.is_empty() => {
                Ok(Self::TypeAction(base.to_string(), action.to_string()))
            }
            Some(_) => Err(DispatchError::InvalidPattern {
                pattern: pattern.to_string(),
                message: "type and action must both be non-empty".to_string(),
            }),
        }
    }

    /// Check whether an event matches this pattern.
    pub fn matches(&self, event: &EventEnvelope) -> bool {
        match self {
            Self::Any => true,
            Self::Type(base) => event.base_type() == base,
            Self::TypeAction(base, action) => {
                event.base_type() == base && event.action() == Some(action.as_str())
            }
        }
    }
}

impl std::fmt::Display for EventPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Type(base) => write!(f, "{}", base),
            Self::TypeAction(base, action) => write!(f, "{}.{}", base, action),
        }
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

/// One registered pattern/handler pair.
///
/// A handler registered under several patterns yields several
/// subscriptions, each matched independently, so it may fire more than
/// once for one event.
#[derive(Clone)]
struct Subscription {
    pattern: EventPattern,
    handler: Arc<dyn EventHandler>,
}

/// Outcome of a settled dispatch with no propagated failure.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Delivery id of the dispatched event.
    pub event_id: String,
    /// How many subscriptions matched (and were invoked).
    pub matched: usize,
}

// ============================================================================
// Router
// ============================================================================

/// The subscription registry and dispatcher.
///
/// Registration order is preserved and respected as dispatch order.
/// Dispatch takes a snapshot of the registry at start, so an in-flight
/// event never observes handlers registered after its dispatch began.
pub struct EventRouter {
    subscriptions: RwLock<Vec<Subscription>>,
    context_builder: ContextBuilder,
}

impl EventRouter {
    /// Create an empty router over the given context builder.
    pub fn new(context_builder: ContextBuilder) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            context_builder,
        }
    }

    /// Register a handler under one pattern.
    pub fn on(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), DispatchError> {
        let pattern = EventPattern::parse(pattern)?;
        self.push(Subscription { pattern, handler })
    }

    /// Register a handler under several patterns, each treated as an
    /// independent subscription.
    pub fn on_patterns(
        &self,
        patterns: &[&str],
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), DispatchError> {
        // Parse everything first so a bad pattern registers nothing.
        let parsed = patterns
            .iter()
            .map(|p| EventPattern::parse(p))
            .collect::<Result<Vec<_>, _>>()?;

        for pattern in parsed {
            self.push(Subscription {
                pattern,
                handler: Arc::clone(&handler),
            })?;
        }
        Ok(())
    }

    /// Register a handler for every event.
    pub fn on_any(&self, handler: Arc<dyn EventHandler>) -> Result<(), DispatchError> {
        self.push(Subscription {
            pattern: EventPattern::Any,
            handler,
        })
    }

    /// Number of registered subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().map(|s| s.len()).unwrap_or(0)
    }

    fn push(&self, subscription: Subscription) -> Result<(), DispatchError> {
        let mut subscriptions =
            self.subscriptions
                .write()
                .map_err(|e| DispatchError::Registry {
                    message: format!("Failed to acquire write lock: {}", e),
                })?;
        subscriptions.push(subscription);
        Ok(())
    }

    /// Dispatch one event to every matching handler.
    ///
    /// Zero matches is not an error: the event settles with no work
    /// done and no context built. With matches, the context is built
    /// once, handlers run serially in registration order, and after all
    /// have settled the first failure (if any) is returned, classified
    /// and logged with the event id.
    pub async fn dispatch(&self, event: &EventEnvelope) -> Result<DispatchOutcome, DispatchError> {
        let snapshot: Vec<Subscription> = {
            let subscriptions =
                self.subscriptions
                    .read()
                    .map_err(|e| DispatchError::Registry {
                        message: format!("Failed to acquire read lock: {}", e),
                    })?;
            subscriptions
                .iter()
                .filter(|s| s.pattern.matches(event))
                .cloned()
                .collect()
        };

        if snapshot.is_empty() {
            debug!(
                event_id = %event.id(),
                event = %event.name(),
                "No subscriptions match; event settled without work"
            );
            return Ok(DispatchOutcome {
                event_id: event.id().to_string(),
                matched: 0,
            });
        }

        let ctx = match self.context_builder.build(event).await {
            Ok(ctx) => ctx,
            Err(e) => {
                let diagnosis = classify(&e);
                error!(
                    event_id = %event.id(),
                    event = %event.name(),
                    known = diagnosis.is_known,
                    error = %diagnosis.message,
                    "Failed to build event context"
                );
                return Err(DispatchError::Context {
                    event_id: event.id().to_string(),
                    message: diagnosis.message,
                    source: e,
                });
            }
        };

        let matched = snapshot.len();
        let mut first_error: Option<HandlerError> = None;
        let mut failed = 0usize;

        for (index, subscription) in snapshot.iter().enumerate() {
            debug!(
                event_id = %event.id(),
                pattern = %subscription.pattern,
                position = index,
                "Invoking handler"
            );

            if let Err(e) = subscription.handler.handle(&ctx).await {
                failed += 1;
                let diagnosis = classify(e.as_ref());
                error!(
                    event_id = %event.id(),
                    pattern = %subscription.pattern,
                    position = index,
                    known = diagnosis.is_known,
                    error = %diagnosis.message,
                    "Handler failed"
                );
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(source) => Err(DispatchError::Handler {
                event_id: event.id().to_string(),
                matched,
                failed,
                source,
            }),
            None => {
                info!(
                    event_id = %event.id(),
                    event = %event.name(),
                    matched,
                    "Event dispatched"
                );
                Ok(DispatchOutcome {
                    event_id: event.id().to_string(),
                    matched,
                })
            }
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
