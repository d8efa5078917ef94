//! Minimal bot-framework layer: activities, turn context, middleware, and the
//! contracts a channel adapter implements.
//!
//! A webhook request flows through a [`WebhookHandler`], which builds an
//! [`Activity`], wraps it in a [`TurnContext`], and runs the
//! [`MiddlewareSet`] followed by the [`Bot`] logic. Replies sent through the
//! context go back out via the adapter's [`ChannelAdapter::send_activities`].

use async_trait::async_trait;

pub mod activity;
pub mod context;
pub mod echo;
pub(crate) mod lenient;
pub mod middleware;

pub use activity::{
    Activity, ActivityType, Attachment, ChannelAccount, ConversationAccount, ResourceResponse,
};
pub use context::{TurnContext, TurnState};
pub use echo::EchoBot;
pub use middleware::{MiddlewareSet, Next, TraceMiddleware};

/// Errors raised while running a turn.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Outbound delivery failed and the adapter was configured to propagate it.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Bot logic or middleware failed.
    #[error("turn failed: {0}")]
    Logic(#[from] anyhow::Error),
}

/// Bot business logic, invoked once per inbound activity.
#[async_trait]
pub trait Bot: Send + Sync {
    /// Handle one turn.
    ///
    /// # Errors
    ///
    /// Returns an error when the turn cannot be completed; the hosting adapter
    /// answers the webhook with a server error.
    async fn on_turn(&self, ctx: &mut TurnContext<'_>) -> Result<(), BotError>;
}

/// Per-turn middleware.
///
/// Implementations call `next.run(ctx)` to continue the pipeline, or return
/// without calling it to short-circuit the turn.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process the turn, optionally delegating to the rest of the pipeline.
    ///
    /// # Errors
    ///
    /// Propagates errors from downstream middleware and logic.
    async fn on_turn(&self, ctx: &mut TurnContext<'_>, next: Next<'_>) -> Result<(), BotError>;
}

/// Outbound half of the adapter contract.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Deliver `activities` in order on behalf of the turn in `ctx`.
    ///
    /// Returns one [`ResourceResponse`] per input activity.
    ///
    /// # Errors
    ///
    /// Returns an error only when the adapter is configured to surface
    /// delivery failures.
    async fn send_activities(
        &self,
        ctx: &TurnContext<'_>,
        activities: Vec<Activity>,
    ) -> Result<Vec<ResourceResponse>, BotError>;
}

/// Raw inbound webhook request.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Action discriminator taken from the route (`message`, `start-conversation`).
    pub action: String,
    /// Raw request body.
    pub body: Vec<u8>,
}

/// Status and optional JSON body to write back to the webhook caller.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookResponse {
    /// HTTP status code.
    pub status: u16,
    /// JSON body, if the logic set one.
    pub body: Option<serde_json::Value>,
}

impl WebhookResponse {
    /// Response with no body.
    pub fn status(status: u16) -> Self {
        Self { status, body: None }
    }
}

/// Inbound half of the adapter contract.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    /// Translate a webhook request into a turn, run `logic`, and report the
    /// HTTP response the turn produced.
    async fn process_activity(&self, request: WebhookRequest, logic: &dyn Bot) -> WebhookResponse;
}
