//! Default logic served by the `mutantwhats-bridge` binary.
//!
//! Echoes message text back, greets new conversations, and maps two
//! commands onto the provider's conversation controls:
//! - `/handoff <campaign>` transfers the conversation
//! - `/close [status]` ends it

use async_trait::async_trait;

use super::{Activity, Bot, BotError, TurnContext};

/// Action tag stamped into channel data for conversation starts.
const START_CONVERSATION: &str = "start-conversation";

/// Echo logic with handoff and close commands.
#[derive(Debug, Clone)]
pub struct EchoBot {
    greeting: String,
}

impl EchoBot {
    /// Create an echo bot that opens new conversations with `greeting`.
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            greeting: greeting.into(),
        }
    }

    fn reply_for(&self, ctx: &TurnContext<'_>) -> Vec<Activity> {
        let activity = ctx.activity();
        let action = activity
            .channel_data
            .as_ref()
            .and_then(|data| data.get("actionType"))
            .and_then(|v| v.as_str());

        if action == Some(START_CONVERSATION) {
            return vec![Activity::message(self.greeting.clone())];
        }

        let text = activity.text.as_deref().unwrap_or_default().trim();
        if let Some(campaign) = text.strip_prefix("/handoff") {
            let campaign = campaign.trim();
            if campaign.is_empty() {
                return vec![Activity::message("usage: /handoff <campaign>")];
            }
            return vec![Activity::handoff(campaign)];
        }
        if let Some(status) = text.strip_prefix("/close") {
            let status = status.trim();
            let status = (!status.is_empty()).then(|| status.to_owned());
            return vec![Activity::end_of_conversation(status)];
        }
        if text.is_empty() {
            return Vec::new();
        }
        vec![Activity::message(text)]
    }
}

impl Default for EchoBot {
    fn default() -> Self {
        Self::new("Hi! Send me a message and I'll repeat it.")
    }
}

#[async_trait]
impl Bot for EchoBot {
    async fn on_turn(&self, ctx: &mut TurnContext<'_>) -> Result<(), BotError> {
        let replies = self.reply_for(ctx);
        ctx.send_activities(replies).await?;
        Ok(())
    }
}
