//! Top-level application wiring: configuration in, a ready-to-serve
//! webhook pipeline out.

use std::sync::Arc;

use crate::client::ClientFactory;
use crate::config::AppConfig;
use crate::context::ContextBuilder;
use crate::dispatch::{DispatchOutcome, EventHandler, EventRouter};
use crate::error::{ConfigError, DispatchError};
use crate::events::EventEnvelope;
use crate::webhook::{SignatureValidator, WebhookReceiver, WebhookRequest, WebhookResponse};

/// The assembled event-dispatch pipeline.
///
/// Owns the client factory, the router, and the webhook receiver. The
/// embedding HTTP server routes requests at [`webhook_path`](Self::webhook_path)
/// into [`receive`](Self::receive) and maps the response to a status code.
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use github_app_dispatch::app::App;
/// use github_app_dispatch::config::AppConfig;
/// use github_app_dispatch::context::EventContext;
/// use github_app_dispatch::dispatch::{EventHandler, HandlerError};
///
/// struct IssueGreeter;
///
/// #[async_trait]
/// impl EventHandler for IssueGreeter {
///     async fn handle(&self, ctx: &EventContext) -> Result<(), HandlerError> {
///         println!("new issue: {}", ctx.payload()["issue"]["title"]);
///         Ok(())
///     }
/// }
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let app = App::new(
///     AppConfig::new()
///         .with_static_token("ghs_example")
///         .with_webhook_secret("development-secret"),
/// )?;
///
/// app.on("issues.opened", IssueGreeter)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct App {
    router: Arc<EventRouter>,
    receiver: WebhookReceiver,
    webhook_path: String,
}

impl App {
    /// Assemble the pipeline from a configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the credential set is missing,
    /// conflicting, or incomplete, when the webhook secret is absent,
    /// or when the API base URL or private key fails to parse.
    pub fn new(config: AppConfig) -> Result<Self, ConfigError> {
        let mode = config.auth_mode()?;
        let secret = config.webhook_secret()?.to_string();

        let base_url = url::Url::parse(config.api_base_url()).map_err(|e| {
            ConfigError::InvalidApiBaseUrl {
                message: e.to_string(),
            }
        })?;

        let factory = ClientFactory::new(
            mode,
            base_url,
            &config.user_agent(),
            config.cache_capacity(),
        )
        .map_err(ConfigError::Client)?;

        let router = Arc::new(EventRouter::new(ContextBuilder::new(factory)));
        let receiver = WebhookReceiver::new(SignatureValidator::new(secret), Arc::clone(&router));

        Ok(Self {
            router,
            receiver,
            webhook_path: config.webhook_path().to_string(),
        })
    }

    /// Register a handler for an event pattern (`"*"`, `"issues"`, or
    /// `"issues.opened"`).
    pub fn on<H>(&self, pattern: &str, handler: H) -> Result<(), DispatchError>
    where
        H: EventHandler + 'static,
    {
        self.router.on(pattern, Arc::new(handler))
    }

    /// Register one handler under several patterns at once. Either all
    /// patterns register or none do.
    pub fn on_patterns<H>(&self, patterns: &[&str], handler: H) -> Result<(), DispatchError>
    where
        H: EventHandler + 'static,
    {
        self.router.on_patterns(patterns, Arc::new(handler))
    }

    /// Register a handler that receives every event.
    pub fn on_any<H>(&self, handler: H) -> Result<(), DispatchError>
    where
        H: EventHandler + 'static,
    {
        self.router.on_any(Arc::new(handler))
    }

    /// Dispatch an already-verified envelope directly, bypassing the
    /// webhook boundary. Useful for replays and tests.
    pub async fn dispatch(&self, event: &EventEnvelope) -> Result<DispatchOutcome, DispatchError> {
        self.router.dispatch(event).await
    }

    /// Receive one raw webhook delivery.
    pub async fn receive(&self, request: WebhookRequest) -> WebhookResponse {
        self.receiver.receive(request).await
    }

    /// The path the webhook receiver expects to be mounted at.
    pub fn webhook_path(&self) -> &str {
        &self.webhook_path
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
