//! Inbound webhook envelope sent by MutantWhats.
//!
//! Two shapes share one envelope:
//! - `message`: `{conversationId, ticket_id, activities: [{text, attachments, from}], ...}`
//! - `start-conversation`: `{conversationId, contact: {identifier, name}, start_message, ...}`
//!
//! The conversation id may arrive as `conversationId` or `conversation_id`;
//! ids may be JSON strings or numbers.

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::MutantWhatsError;
use crate::bot::lenient::{id_string, json_kind, null_as_default, opt_id_string};
use crate::bot::{Attachment, ChannelAccount};

/// Which webhook route the envelope arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// A user message (`message`).
    Message,
    /// A new conversation opened by a contact (`start-conversation`).
    StartConversation,
    /// Anything else; passed through with a base activity.
    Other(String),
}

impl ActionKind {
    /// Parse the route segment.
    pub fn parse(action: &str) -> Self {
        match action {
            "message" => Self::Message,
            "start-conversation" => Self::StartConversation,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Route segment for this action.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::StartConversation => "start-conversation",
            Self::Other(action) => action,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the `activities` array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundActivity {
    /// Message text.
    #[serde(default)]
    pub text: Option<String>,
    /// Attached media.
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<Attachment>,
    /// Sender.
    #[serde(default)]
    pub from: Option<ChannelAccount>,
}

/// Contact that opened a conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    /// Provider contact id (usually the phone number).
    #[serde(deserialize_with = "id_string")]
    pub identifier: String,
    /// Display name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

/// Parsed webhook envelope.
///
/// Typed fields cover what the adapter reads; every top-level field is also
/// retained in [`InboundEnvelope::raw`] for channel data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "conversationId", default, deserialize_with = "opt_id_string")]
    conversation_id_camel: Option<String>,
    #[serde(rename = "conversation_id", default, deserialize_with = "opt_id_string")]
    conversation_id_snake: Option<String>,
    /// Ticket id, used as the activity id.
    #[serde(default, deserialize_with = "opt_id_string")]
    pub ticket_id: Option<String>,
    /// Message entries (`message` action).
    #[serde(default, deserialize_with = "null_as_default")]
    pub activities: Vec<InboundActivity>,
    /// Opening contact (`start-conversation` action).
    #[serde(default)]
    pub contact: Option<Contact>,
    /// Opening text (`start-conversation` action).
    #[serde(default)]
    pub start_message: Option<String>,
    /// Every top-level field as received.
    #[serde(skip)]
    pub raw: Map<String, Value>,
}

impl InboundEnvelope {
    /// Parse a webhook body.
    ///
    /// # Errors
    ///
    /// Returns [`MutantWhatsError::InvalidEnvelope`] when the body is empty,
    /// not JSON, not a non-empty JSON object, or has mistyped fields.
    pub fn from_slice(body: &[u8]) -> Result<Self, MutantWhatsError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(MutantWhatsError::InvalidEnvelope("empty body".to_owned()));
        }
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| MutantWhatsError::InvalidEnvelope(format!("body is not JSON: {e}")))?;
        let raw = match value {
            Value::Object(map) if !map.is_empty() => map,
            Value::Object(_) => {
                return Err(MutantWhatsError::InvalidEnvelope("empty object".to_owned()))
            }
            other => {
                return Err(MutantWhatsError::InvalidEnvelope(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };
        let mut envelope: Self = serde_json::from_value(Value::Object(raw.clone()))
            .map_err(|e| MutantWhatsError::InvalidEnvelope(e.to_string()))?;
        envelope.raw = raw;
        Ok(envelope)
    }

    /// Conversation id, preferring `conversationId` over `conversation_id`.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id_camel
            .as_deref()
            .or(self.conversation_id_snake.as_deref())
    }

    /// Channel data for the normalized activity.
    ///
    /// `message` keeps every top-level field except `activities`;
    /// `start-conversation` keeps the whole envelope; other actions carry
    /// only the two stamped keys. `conversationId` and `actionType` are
    /// always set.
    pub fn channel_data(&self, action: &ActionKind) -> Value {
        let mut data = match action {
            ActionKind::Message => {
                let mut map = self.raw.clone();
                map.remove("activities");
                map
            }
            ActionKind::StartConversation => self.raw.clone(),
            ActionKind::Other(_) => Map::new(),
        };
        data.insert(
            "conversationId".to_owned(),
            self.conversation_id()
                .map_or(Value::Null, |id| Value::String(id.to_owned())),
        );
        data.insert(
            "actionType".to_owned(),
            Value::String(action.as_str().to_owned()),
        );
        Value::Object(data)
    }
}
