//! MutantWhats channel adapter.
//!
//! Implements both halves of the bot contract:
//! - [`WebhookHandler`]: webhook body → [`Activity`] → middleware + logic →
//!   HTTP status/body
//! - [`ChannelAdapter`]: outbound activities → provider calls, one at a time

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{error, info, warn};

use super::client::{MutantWhatsClient, ProviderReply, DEFAULT_CLOSE_STATUS};
use super::envelope::{ActionKind, InboundEnvelope};
use super::format::{parse_activity, OutboundMessage};
use super::session::SessionParams;
use super::{MutantWhatsError, CHANNEL_ID};
use crate::bot::{
    Activity, ActivityType, Bot, BotError, ChannelAccount, ChannelAdapter, ConversationAccount,
    Middleware, MiddlewareSet, ResourceResponse, TurnContext, WebhookHandler, WebhookRequest,
    WebhookResponse,
};
use crate::config::AdapterConfig;

/// Timezone stamped on inbound activities unless configured otherwise.
pub const DEFAULT_LOCAL_TIMEZONE: &str = "America/Sao_Paulo";

/// Pause used for delay activities that carry no value.
pub const DEFAULT_DELAY_MS: u64 = 1000;

/// What to do when a provider call fails mid-batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Log the failure, record a placeholder result, and keep going.
    #[default]
    LogAndContinue,
    /// Stop the batch and return the failure to the sender.
    Propagate,
}

/// Adapter settings fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterOptions {
    /// Include request payloads in client logs.
    pub debug: bool,
    /// Timezone stamped on inbound activities.
    pub local_timezone: String,
    /// Failure handling for outbound batches.
    pub delivery: DeliveryPolicy,
    /// Pause for delay activities without a value.
    pub default_delay_ms: u64,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            debug: false,
            local_timezone: DEFAULT_LOCAL_TIMEZONE.to_owned(),
            delivery: DeliveryPolicy::default(),
            default_delay_ms: DEFAULT_DELAY_MS,
        }
    }
}

impl From<&AdapterConfig> for AdapterOptions {
    fn from(config: &AdapterConfig) -> Self {
        Self {
            debug: config.debug,
            local_timezone: config.local_timezone.clone(),
            delivery: if config.strict_delivery {
                DeliveryPolicy::Propagate
            } else {
                DeliveryPolicy::LogAndContinue
            },
            default_delay_ms: config.default_delay_ms,
        }
    }
}

/// Bridges the bot layer to the MutantWhats API.
pub struct MutantWhatsAdapter {
    bot_account: ChannelAccount,
    options: AdapterOptions,
    http: reqwest::Client,
    middleware: MiddlewareSet,
}

impl MutantWhatsAdapter {
    /// Create an adapter that speaks as `bot_account` (its role is forced to `bot`).
    pub fn new(bot_account: ChannelAccount, options: AdapterOptions) -> Self {
        let http = reqwest::Client::builder().build().unwrap_or_else(|e| {
            warn!(error = %e, "failed to build HTTP client, using default");
            reqwest::Client::default()
        });
        Self {
            bot_account: ChannelAccount {
                role: Some("bot".to_owned()),
                ..bot_account
            },
            options,
            http,
            middleware: MiddlewareSet::new(),
        }
    }

    /// Replace the pooled HTTP client.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Register a middleware (builder form).
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.use_middleware(middleware);
        self
    }

    /// Register a middleware; middleware runs in registration order.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    /// Account the adapter speaks as.
    pub fn bot_account(&self) -> &ChannelAccount {
        &self.bot_account
    }

    /// Construction-time settings.
    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    /// Normalize an inbound envelope into an activity.
    ///
    /// # Errors
    ///
    /// Returns [`MutantWhatsError::InvalidEnvelope`] when a `message` envelope
    /// has no activities or a `start-conversation` envelope has no contact.
    pub fn build_activity(
        &self,
        action: &ActionKind,
        envelope: &InboundEnvelope,
    ) -> Result<Activity, MutantWhatsError> {
        self.build_activity_at(action, envelope, Utc::now())
    }

    /// [`MutantWhatsAdapter::build_activity`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`MutantWhatsAdapter::build_activity`].
    pub fn build_activity_at(
        &self,
        action: &ActionKind,
        envelope: &InboundEnvelope,
        now: DateTime<Utc>,
    ) -> Result<Activity, MutantWhatsError> {
        let conversation_id = envelope.conversation_id().unwrap_or_default().to_owned();

        let mut activity = Activity {
            activity_type: ActivityType::Message,
            id: envelope.ticket_id.clone(),
            timestamp: Some(now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()),
            local_timestamp: Some(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
            local_timezone: Some(self.options.local_timezone.clone()),
            channel_id: CHANNEL_ID.to_owned(),
            conversation: ConversationAccount {
                id: conversation_id.clone(),
                ..ConversationAccount::default()
            },
            recipient: self.bot_account.clone(),
            label: Some(conversation_id),
            channel_data: Some(envelope.channel_data(action)),
            ..Activity::default()
        };

        match action {
            ActionKind::Message => {
                let first = envelope.activities.first().ok_or_else(|| {
                    MutantWhatsError::InvalidEnvelope("`activities` is empty".to_owned())
                })?;
                activity.text = first.text.clone();
                activity.attachments = first.attachments.clone();
                activity.from = first.from.clone().unwrap_or_default();
            }
            ActionKind::StartConversation => {
                let contact = envelope.contact.as_ref().ok_or_else(|| {
                    MutantWhatsError::InvalidEnvelope("`contact` is missing".to_owned())
                })?;
                activity.from = ChannelAccount::user(&contact.identifier, &contact.name);
                activity.text = envelope.start_message.clone();
            }
            ActionKind::Other(other) => {
                warn!(action = %other, "unknown webhook action, passing base activity through");
            }
        }

        Ok(activity)
    }

    /// Format an outbound activity as a provider message from this bot.
    pub fn parse_activity(&self, activity: &Activity) -> OutboundMessage {
        parse_activity(activity, &self.bot_account)
    }

    async fn dispatch(
        &self,
        client: &MutantWhatsClient,
        activity: Activity,
    ) -> Result<ResourceResponse, MutantWhatsError> {
        match &activity.activity_type {
            ActivityType::Delay => {
                let millis = delay_millis(activity.value.as_ref())
                    .unwrap_or(self.options.default_delay_ms);
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok(ResourceResponse::default())
            }
            ActivityType::Message => {
                let message = self.parse_activity(&activity);
                let reply = client.send_message(&message).await?;
                Ok(resource_response(&reply))
            }
            ActivityType::Handoff => {
                let reply = client
                    .send_transfer_conversation(activity.code.as_deref())
                    .await?;
                Ok(resource_response(&reply))
            }
            ActivityType::EndOfConversation => {
                let status = activity
                    .code
                    .as_deref()
                    .filter(|code| !code.is_empty())
                    .unwrap_or(DEFAULT_CLOSE_STATUS);
                let reply = client.send_close_conversation(status, &[]).await?;
                Ok(resource_response(&reply))
            }
            ActivityType::Attachment => {
                let upload = activity.attachments.first().and_then(|attachment| {
                    let file = attachment.file.clone()?;
                    Some((file, attachment.filename.clone().unwrap_or_default()))
                });
                let Some((file, filename)) = upload else {
                    warn!("attachment activity has no file content, skipping");
                    return Ok(ResourceResponse::default());
                };
                let message = self.parse_activity(&activity);
                let reply = client.send_attachment(&message, file, &filename).await?;
                Ok(resource_response(&reply))
            }
            ActivityType::Other(kind) => {
                warn!("MutantWhatsAdapter.send_activities(): Activities of type '{kind}' aren't supported.");
                Ok(ResourceResponse::default())
            }
        }
    }
}

#[async_trait]
impl ChannelAdapter for MutantWhatsAdapter {
    async fn send_activities(
        &self,
        ctx: &TurnContext<'_>,
        activities: Vec<Activity>,
    ) -> Result<Vec<ResourceResponse>, BotError> {
        let session = match SessionParams::from_channel_data(ctx.activity().channel_data.as_ref())
        {
            Ok(session) => session,
            Err(e) if self.options.delivery == DeliveryPolicy::Propagate => {
                return Err(BotError::Delivery(e.to_string()));
            }
            Err(e) => {
                warn!(error = %e, "unreadable session fields in channel data");
                SessionParams::default()
            }
        };
        let client = MutantWhatsClient::new(self.http.clone(), session, self.options.debug);

        let mut responses = Vec::with_capacity(activities.len());
        for activity in activities {
            let kind = activity.activity_type.clone();
            match self.dispatch(&client, activity).await {
                Ok(response) => responses.push(response),
                Err(e) => match self.options.delivery {
                    DeliveryPolicy::LogAndContinue => {
                        warn!(%kind, error = %e, "delivery failed, continuing batch");
                        responses.push(ResourceResponse::default());
                    }
                    DeliveryPolicy::Propagate => {
                        return Err(BotError::Delivery(format!("{kind}: {e}")));
                    }
                },
            }
        }
        Ok(responses)
    }
}

#[async_trait]
impl WebhookHandler for MutantWhatsAdapter {
    async fn process_activity(&self, request: WebhookRequest, logic: &dyn Bot) -> WebhookResponse {
        let envelope = match InboundEnvelope::from_slice(&request.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(action = %request.action, error = %e, "rejecting webhook");
                return WebhookResponse::status(400);
            }
        };

        let action = ActionKind::parse(&request.action);
        let activity = match self.build_activity(&action, &envelope) {
            Ok(activity) => activity,
            Err(e) => {
                warn!(%action, error = %e, "rejecting webhook");
                return WebhookResponse::status(400);
            }
        };
        info!(
            %action,
            conversation = %activity.conversation.id,
            ticket = ?activity.id,
            "webhook accepted"
        );

        let mut ctx = TurnContext::new(self, activity);
        if let Err(e) = self.middleware.run(&mut ctx, logic).await {
            error!(%action, error = %e, "turn failed");
            return WebhookResponse::status(500);
        }

        WebhookResponse {
            status: ctx.state.http_status,
            body: ctx.state.http_body.take(),
        }
    }
}

/// Delay in milliseconds from a number or numeric string. Fractions are
/// dropped; negative values are rejected.
fn delay_millis(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| whole_millis(&n.to_string())),
        Value::String(s) => whole_millis(s.trim()),
        _ => None,
    }
}

fn whole_millis(text: &str) -> Option<u64> {
    text.split_once('.')
        .map_or(text, |(whole, _)| whole)
        .parse()
        .ok()
}

fn resource_response(reply: &ProviderReply) -> ResourceResponse {
    ResourceResponse {
        id: reply.resource_id().unwrap_or_default(),
    }
}
