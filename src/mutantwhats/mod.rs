//! MutantWhats channel: webhook envelope parsing, outbound formatting, the
//! per-session HTTP client, and the adapter tying them to the bot layer.
//!
//! Inbound payloads arrive on the webhook server and become [`Activity`]
//! records; outbound activities are dispatched through a
//! [`MutantWhatsClient`] built from the session fields carried in channel
//! data.
//!
//! [`Activity`]: crate::bot::Activity

pub mod adapter;
pub mod client;
pub mod envelope;
pub mod format;
pub mod session;

pub use adapter::{AdapterOptions, DeliveryPolicy, MutantWhatsAdapter};
pub use client::{MutantWhatsClient, ProviderReply, RequestBody, RequestDescriptor};
pub use envelope::{ActionKind, Contact, InboundActivity, InboundEnvelope};
pub use format::{parse_activity, to_whatsapp_markup, OutboundMessage};
pub use session::SessionParams;

/// Channel id stamped on inbound activities.
pub const CHANNEL_ID: &str = "whatsapp";

/// Errors from the MutantWhats channel.
#[derive(Debug, thiserror::Error)]
pub enum MutantWhatsError {
    /// The webhook body was empty, not JSON, or missing required fields.
    #[error("invalid inbound envelope: {0}")]
    InvalidEnvelope(String),

    /// A provider endpoint needed for the call is absent from channel data.
    #[error("missing provider endpoint: {0}")]
    MissingEndpoint(&'static str),

    /// Transport-level failure (connect, TLS, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },

    /// Outbound payload could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl MutantWhatsError {
    /// HTTP status of the failed call, when the provider answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
