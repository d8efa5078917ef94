//! Provider-agnostic activity records exchanged between adapters and bot logic.
//!
//! Field names serialize in camelCase to match the bot-framework wire shape,
//! so an [`Activity`] can be logged or echoed back as JSON unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient;

/// Activity type tag.
///
/// Unknown tags are kept verbatim in [`ActivityType::Other`] so the adapter
/// can report them instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActivityType {
    /// Text message (`message`).
    #[default]
    Message,
    /// Pause between outbound activities (`delay`).
    Delay,
    /// File upload (`attachment`).
    Attachment,
    /// Transfer to a human queue (`Handoff`).
    Handoff,
    /// Close the conversation (`EndOfConversation`).
    EndOfConversation,
    /// Any other tag.
    Other(String),
}

impl ActivityType {
    /// Wire tag for this type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::Delay => "delay",
            Self::Attachment => "attachment",
            Self::Handoff => "Handoff",
            Self::EndOfConversation => "EndOfConversation",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for ActivityType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "message" => Self::Message,
            "delay" => Self::Delay,
            "attachment" => Self::Attachment,
            "Handoff" => Self::Handoff,
            "EndOfConversation" => Self::EndOfConversation,
            _ => Self::Other(tag),
        }
    }
}

impl From<ActivityType> for String {
    fn from(kind: ActivityType) -> Self {
        match kind {
            ActivityType::Other(tag) => tag,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant in a conversation (user or bot).
///
/// Numeric ids are read as strings, `null` names as empty, and fields this
/// type does not know are kept in [`ChannelAccount::extra`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    /// Channel-specific participant id.
    #[serde(default, deserialize_with = "lenient::id_or_empty")]
    pub id: String,
    /// Display name.
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub name: String,
    /// `user` or `bot`, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Provider-specific fields carried through unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChannelAccount {
    /// Account with the `bot` role.
    pub fn bot(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: Some("bot".to_owned()),
            extra: Map::new(),
        }
    }

    /// Account with the `user` role.
    pub fn user(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: Some("user".to_owned()),
            extra: Map::new(),
        }
    }
}

/// Conversation descriptor carried on every activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    /// Conversation id.
    #[serde(default)]
    pub id: String,
    /// Whether the conversation has more than two participants.
    #[serde(default)]
    pub is_group: bool,
    /// Channel-specific conversation flavour.
    #[serde(default)]
    pub conversation_type: Option<String>,
    /// Tenant the conversation belongs to.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// Media or file attached to an activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Remote location of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Inline structured content (cards and the like).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// Raw file bytes for uploads. Base64 in JSON.
    #[serde(
        default,
        with = "file_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub file: Option<Vec<u8>>,
    /// File name used for uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl Attachment {
    /// Attachment carrying file bytes for upload.
    pub fn file(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file: Some(bytes),
            filename: Some(filename.into()),
            ..Self::default()
        }
    }
}

/// A single unit of conversational content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// Type tag.
    #[serde(rename = "type", default)]
    pub activity_type: ActivityType,
    /// Activity id.
    #[serde(default)]
    pub id: Option<String>,
    /// UTC timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Local timestamp (RFC 3339).
    #[serde(default)]
    pub local_timestamp: Option<String>,
    /// IANA timezone name of the sender.
    #[serde(default)]
    pub local_timezone: Option<String>,
    /// Channel the activity belongs to.
    #[serde(default)]
    pub channel_id: String,
    /// Conversation descriptor.
    #[serde(default)]
    pub conversation: ConversationAccount,
    /// Receiving account.
    #[serde(default)]
    pub recipient: ChannelAccount,
    /// Sending account.
    #[serde(default)]
    pub from: ChannelAccount,
    /// Free-form label.
    #[serde(default)]
    pub label: Option<String>,
    /// Message text, possibly with markup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Attached media.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Channel-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<Value>,
    /// Type-specific value (delay duration in milliseconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Type-specific code (handoff campaign, close status).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Activity {
    /// Outbound text message.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            activity_type: ActivityType::Message,
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Pause of `millis` milliseconds.
    pub fn delay(millis: u64) -> Self {
        Self {
            activity_type: ActivityType::Delay,
            value: Some(Value::from(millis)),
            ..Self::default()
        }
    }

    /// File upload with an optional caption.
    pub fn attachment(attachment: Attachment, caption: Option<String>) -> Self {
        Self {
            activity_type: ActivityType::Attachment,
            text: caption,
            attachments: vec![attachment],
            ..Self::default()
        }
    }

    /// Transfer to the given campaign.
    pub fn handoff(campaign_id: impl Into<String>) -> Self {
        Self {
            activity_type: ActivityType::Handoff,
            code: Some(campaign_id.into()),
            ..Self::default()
        }
    }

    /// Close the conversation, optionally with a status code.
    pub fn end_of_conversation(status: Option<String>) -> Self {
        Self {
            activity_type: ActivityType::EndOfConversation,
            code: status,
            ..Self::default()
        }
    }
}

/// Result entry for one sent activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceResponse {
    /// Provider-assigned id, empty when the provider returns none.
    #[serde(default)]
    pub id: String,
}

mod file_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_str(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
