//! Ordered middleware pipeline ending in the bot logic.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Bot, BotError, Middleware, TurnContext};

/// Remainder of the pipeline handed to each middleware.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
    logic: &'a dyn Bot,
}

impl Next<'_> {
    /// Run the remaining middleware, then the logic.
    ///
    /// # Errors
    ///
    /// Propagates the first error raised downstream.
    pub async fn run(self, ctx: &mut TurnContext<'_>) -> Result<(), BotError> {
        match self.rest.split_first() {
            Some((head, rest)) => {
                head.on_turn(
                    ctx,
                    Next {
                        rest,
                        logic: self.logic,
                    },
                )
                .await
            }
            None => self.logic.on_turn(ctx).await,
        }
    }
}

/// Middleware registered on an adapter, run in registration order.
#[derive(Clone, Default)]
pub struct MiddlewareSet {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareSet {
    /// Empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware.
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    /// Number of registered middleware.
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    /// Whether no middleware is registered.
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Run every middleware and then `logic` for one turn.
    ///
    /// # Errors
    ///
    /// Propagates the first error raised by a middleware or the logic.
    pub async fn run(&self, ctx: &mut TurnContext<'_>, logic: &dyn Bot) -> Result<(), BotError> {
        Next {
            rest: &self.middleware,
            logic,
        }
        .run(ctx)
        .await
    }
}

/// Logs each turn's channel, conversation, and duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceMiddleware;

#[async_trait]
impl Middleware for TraceMiddleware {
    async fn on_turn(&self, ctx: &mut TurnContext<'_>, next: Next<'_>) -> Result<(), BotError> {
        let started = Instant::now();
        let channel = ctx.activity().channel_id.clone();
        let conversation = ctx.activity().conversation.id.clone();
        debug!(%channel, %conversation, kind = %ctx.activity().activity_type, "turn started");

        let result = next.run(ctx).await;

        info!(
            %channel,
            %conversation,
            status = ctx.state.http_status,
            responded = ctx.responded(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            ok = result.is_ok(),
            "turn finished"
        );
        result
    }
}
