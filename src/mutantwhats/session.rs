//! Per-batch session parameters read from inbound channel data.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use super::MutantWhatsError;
use crate::bot::lenient::{null_as_default, opt_id_string};

/// Credentials and endpoints for one outbound batch.
///
/// Built once per [`send_activities`] call from the channel data of the turn
/// that triggered it; nothing is kept between batches.
///
/// [`send_activities`]: crate::bot::ChannelAdapter::send_activities
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    /// Bearer token for message and upload calls.
    #[serde(default, deserialize_with = "null_as_default")]
    pub token: String,
    /// Cookie header for message and upload calls.
    #[serde(default, deserialize_with = "null_as_default")]
    pub cookie: String,
    /// Messages endpoint (`.../activities`).
    #[serde(default, rename = "messageUrl")]
    pub messages_url: Option<String>,
    /// Transfer endpoint.
    #[serde(default, rename = "transferTo")]
    pub transfer_url: Option<String>,
    /// Close endpoint.
    #[serde(default, rename = "closeUrl")]
    pub close_url: Option<String>,
    /// Provider conversation id.
    #[serde(default, deserialize_with = "opt_id_string")]
    pub conversation_id: Option<String>,
}

impl SessionParams {
    /// Read session fields from an activity's channel data.
    ///
    /// Missing or `null` fields stay empty; the client reports a missing
    /// endpoint only when a call actually needs it.
    ///
    /// # Errors
    ///
    /// Returns [`MutantWhatsError::InvalidEnvelope`] when a present field has
    /// the wrong JSON type.
    pub fn from_channel_data(channel_data: Option<&Value>) -> Result<Self, MutantWhatsError> {
        match channel_data {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => Self::deserialize(value)
                .map_err(|e| MutantWhatsError::InvalidEnvelope(format!("channel data: {e}"))),
        }
    }

    /// Upload endpoint: the messages URL with its first `/activities`
    /// segment replaced by `/upload`.
    pub fn upload_url(&self) -> Option<String> {
        self.messages_url
            .as_deref()
            .map(|url| url.replacen("/activities", "/upload", 1))
    }
}

impl fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParams")
            .field("token", &"__REDACTED__")
            .field("cookie", &"__REDACTED__")
            .field("messages_url", &self.messages_url)
            .field("transfer_url", &self.transfer_url)
            .field("close_url", &self.close_url)
            .field("conversation_id", &self.conversation_id)
            .finish()
    }
}
