//! Outbound formatting: HTML-like markup to WhatsApp markers, and the
//! provider's outbound message envelope.

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;

use crate::bot::{Activity, ChannelAccount};

/// Channel id the provider expects on outbound messages.
const OUTBOUND_CHANNEL_ID: &str = "webchat";

/// Tag rewrites applied in order: bold, italic, strike, code.
static MARKUP_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?is)<b>(.*?)</b>", "*${1}*"),
        (r"(?is)<i>(.*?)</i>", "_${1}_"),
        (r"(?is)<s>(.*?)</s>", "~${1}~"),
        (r"(?is)<code>(.*?)</code>", "```${1}```"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
        Ok(re) => Some((re, replacement)),
        Err(e) => {
            tracing::error!(pattern, error = %e, "invalid markup pattern");
            None
        }
    })
    .collect()
});

/// Correlation fields the provider echoes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientChannelData {
    /// Client-generated correlation id.
    #[serde(rename = "clientActivityID")]
    pub client_activity_id: String,
    /// Client timestamp (RFC 3339, milliseconds).
    #[serde(rename = "clientTimestamp")]
    pub client_timestamp: String,
}

/// Message body posted to the provider's messages endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    /// Correlation fields.
    pub channel_data: ClientChannelData,
    /// Formatted text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Always `plain`.
    pub text_format: &'static str,
    /// Always `message`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Always `webchat`.
    pub channel_id: &'static str,
    /// The bot account.
    pub from: ChannelAccount,
    /// Same instant as the client timestamp.
    pub timestamp: String,
}

/// Rewrite `<b>`, `<i>`, `<s>` and `<code>` spans to `*`, `_`, `~` and
/// triple-backtick markers.
///
/// Matching is case-insensitive, spans newlines, and pairs each opening tag
/// with the nearest closing one. Text without these tags is returned as is.
pub fn to_whatsapp_markup(text: &str) -> String {
    MARKUP_RULES
        .iter()
        .fold(text.to_owned(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}

/// Build the provider message for `activity`, sent as `bot`.
pub fn parse_activity(activity: &Activity, bot: &ChannelAccount) -> OutboundMessage {
    parse_activity_at(activity, bot, Utc::now())
}

/// [`parse_activity`] with an explicit clock.
pub fn parse_activity_at(
    activity: &Activity,
    bot: &ChannelAccount,
    now: DateTime<Utc>,
) -> OutboundMessage {
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    OutboundMessage {
        channel_data: ClientChannelData {
            client_activity_id: client_activity_id(now),
            client_timestamp: timestamp.clone(),
        },
        text: activity.text.as_deref().map(to_whatsapp_markup),
        text_format: "plain",
        kind: "message",
        channel_id: OUTBOUND_CHANNEL_ID,
        from: bot.clone(),
        timestamp,
    }
}

/// Epoch milliseconds followed by ten random lowercase hex characters.
fn client_activity_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", now.timestamp_millis(), &suffix[..10])
}
