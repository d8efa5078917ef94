//! HTTP client for the MutantWhats provider API.
//!
//! One client per outbound batch. Every call is described by a
//! [`RequestDescriptor`] and goes through [`MutantWhatsClient::send_request`],
//! which logs the attempt, performs it, and logs any failure with the status
//! and response body before returning it as a typed error.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use super::format::OutboundMessage;
use super::session::SessionParams;
use super::MutantWhatsError;

/// Longest error body kept in logs and errors.
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Status sent on close when the caller gives none.
pub const DEFAULT_CLOSE_STATUS: &str = "solved";

static BEARER_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/=\-]+").ok());

/// Request payload.
#[derive(Clone, PartialEq)]
pub enum RequestBody {
    /// JSON document.
    Json(Value),
    /// Multipart upload: serialized activity plus one file.
    Multipart {
        /// JSON-encoded outbound message, sent as the `activity` field.
        activity: String,
        /// File content, sent as the `file` field.
        file: Vec<u8>,
        /// File name attached to the `file` field.
        filename: String,
    },
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{value}"),
            Self::Multipart {
                activity,
                file,
                filename,
            } => f
                .debug_struct("Multipart")
                .field("activity", activity)
                .field("filename", filename)
                .field("file_bytes", &file.len())
                .finish(),
        }
    }
}

/// A provider call, fully described before it is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    /// Operation name used in logs.
    pub operation: &'static str,
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: String,
    /// Extra headers. `Content-Type` for bodies is set by the body encoder.
    pub headers: Vec<(&'static str, String)>,
    /// Payload.
    pub body: RequestBody,
}

impl RequestDescriptor {
    /// Header list with credential values masked.
    pub fn redacted_headers(&self) -> Vec<(&'static str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| match *name {
                "Authorization" | "Cookie" => (*name, "__REDACTED__"),
                _ => (*name, value.as_str()),
            })
            .collect()
    }
}

/// Successful provider answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReply {
    /// HTTP status code (2xx).
    pub status: u16,
    /// Raw response body.
    pub body: String,
}

impl ProviderReply {
    /// `id` field of a JSON response body, if any.
    pub fn resource_id(&self) -> Option<String> {
        let value: Value = serde_json::from_str(&self.body).ok()?;
        match value.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Client bound to one conversation's session.
pub struct MutantWhatsClient {
    http: reqwest::Client,
    session: SessionParams,
    debug: bool,
}

impl MutantWhatsClient {
    /// Create a client for `session`, reusing the pooled `http` client.
    ///
    /// With `debug` set, request payloads are included in logs.
    pub fn new(http: reqwest::Client, session: SessionParams, debug: bool) -> Self {
        Self {
            http,
            session,
            debug,
        }
    }

    /// Session this client is bound to.
    pub fn session(&self) -> &SessionParams {
        &self.session
    }

    /// POST a formatted message to the messages endpoint.
    ///
    /// # Errors
    ///
    /// See [`MutantWhatsClient::send_request`]; also fails when the session
    /// has no messages URL.
    pub async fn send_message(
        &self,
        message: &OutboundMessage,
    ) -> Result<ProviderReply, MutantWhatsError> {
        let url = self.endpoint("sendMessage", "messageUrl", self.session.messages_url.clone())?;
        let descriptor = RequestDescriptor {
            operation: "sendMessage",
            method: Method::POST,
            url,
            headers: self.auth_headers(),
            body: RequestBody::Json(serde_json::to_value(message)?),
        };
        self.send_request(descriptor).await
    }

    /// Upload a file with its message to the upload endpoint.
    ///
    /// # Errors
    ///
    /// See [`MutantWhatsClient::send_request`]; also fails when the session
    /// has no messages URL.
    pub async fn send_attachment(
        &self,
        message: &OutboundMessage,
        file: Vec<u8>,
        filename: &str,
    ) -> Result<ProviderReply, MutantWhatsError> {
        let url = self.endpoint("sendAttachment", "messageUrl", self.session.upload_url())?;
        let descriptor = RequestDescriptor {
            operation: "sendAttachment",
            method: Method::POST,
            url,
            headers: self.auth_headers(),
            body: RequestBody::Multipart {
                activity: serde_json::to_string(message)?,
                file,
                filename: filename.to_owned(),
            },
        };
        self.send_request(descriptor).await
    }

    /// Transfer the conversation to `campaign_id`. Without one the body is
    /// an empty object and the provider picks the queue.
    ///
    /// # Errors
    ///
    /// See [`MutantWhatsClient::send_request`]; also fails when the session
    /// has no transfer URL.
    pub async fn send_transfer_conversation(
        &self,
        campaign_id: Option<&str>,
    ) -> Result<ProviderReply, MutantWhatsError> {
        let url = self.endpoint(
            "sendTransferConversation",
            "transferTo",
            self.session.transfer_url.clone(),
        )?;
        let descriptor = RequestDescriptor {
            operation: "sendTransferConversation",
            method: Method::PUT,
            url,
            headers: Vec::new(),
            body: RequestBody::Json(match campaign_id {
                Some(id) => json!({ "campaign_id": id }),
                None => json!({}),
            }),
        };
        self.send_request(descriptor).await
    }

    /// Close the conversation with `status` and `reasons`.
    ///
    /// # Errors
    ///
    /// See [`MutantWhatsClient::send_request`]; also fails when the session
    /// has no close URL.
    pub async fn send_close_conversation(
        &self,
        status: &str,
        reasons: &[String],
    ) -> Result<ProviderReply, MutantWhatsError> {
        let url = self.endpoint(
            "sendCloseConversation",
            "closeUrl",
            self.session.close_url.clone(),
        )?;
        let descriptor = RequestDescriptor {
            operation: "sendCloseConversation",
            method: Method::PUT,
            url,
            headers: Vec::new(),
            body: RequestBody::Json(json!({ "status": status, "reasons": reasons })),
        };
        self.send_request(descriptor).await
    }

    /// Perform a described request.
    ///
    /// Failures are logged with status code and body (or transport message)
    /// before being returned.
    ///
    /// # Errors
    ///
    /// Returns [`MutantWhatsError::Http`] on transport failure and
    /// [`MutantWhatsError::Status`] on a non-success status.
    pub async fn send_request(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<ProviderReply, MutantWhatsError> {
        let operation = descriptor.operation;
        info!(
            operation,
            method = %descriptor.method,
            url = %descriptor.url,
            headers = ?descriptor.redacted_headers(),
            conversation = ?self.session.conversation_id,
            "[MutantWhats Client] sending request"
        );
        if self.debug {
            info!(operation, payload = ?descriptor.body, "[MutantWhats Client] request payload");
        }

        let mut request = self.http.request(descriptor.method, &descriptor.url);
        for (name, value) in descriptor.headers {
            request = request.header(name, value);
        }
        request = match descriptor.body {
            RequestBody::Json(value) => request.json(&value),
            RequestBody::Multipart {
                activity,
                file,
                filename,
            } => {
                let form = Form::new()
                    .text("activity", activity)
                    .part("file", Part::bytes(file).file_name(filename));
                request.multipart(form)
            }
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    operation,
                    status_code = ?e.status().map(|s| s.as_u16()),
                    error = %e,
                    "[MutantWhats Client] request failed"
                );
                return Err(e.into());
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                error!(
                    operation,
                    status_code = status.as_u16(),
                    error = %e,
                    "[MutantWhats Client] failed to read response body"
                );
                return Err(e.into());
            }
        };

        if !status.is_success() {
            let body = self.sanitize_error_body(&body);
            error!(
                operation,
                status_code = status.as_u16(),
                data = %body,
                "[MutantWhats Client] request failed with status {status}"
            );
            return Err(MutantWhatsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(operation, status_code = status.as_u16(), "[MutantWhats Client] request succeeded");
        Ok(ProviderReply {
            status: status.as_u16(),
            body,
        })
    }

    fn auth_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Authorization", format!("Bearer {}", self.session.token))];
        if !self.session.cookie.is_empty() {
            headers.push(("Cookie", self.session.cookie.clone()));
        }
        headers
    }

    fn endpoint(
        &self,
        operation: &'static str,
        field: &'static str,
        url: Option<String>,
    ) -> Result<String, MutantWhatsError> {
        match url.filter(|u| !u.is_empty()) {
            Some(url) => Ok(url),
            None => {
                error!(operation, field, "[MutantWhats Client] endpoint missing from channel data");
                Err(MutantWhatsError::MissingEndpoint(field))
            }
        }
    }

    /// Collapse whitespace, mask session credentials and bearer tokens, and
    /// truncate.
    fn sanitize_error_body(&self, raw: &str) -> String {
        let mut sanitized = raw.split_whitespace().collect::<Vec<_>>().join(" ");

        for secret in [&self.session.token, &self.session.cookie] {
            if !secret.is_empty() {
                sanitized = sanitized.replace(secret.as_str(), "[REDACTED]");
            }
        }
        if let Some(re) = BEARER_PATTERN.as_ref() {
            sanitized = re.replace_all(&sanitized, "Bearer [REDACTED]").into_owned();
        }

        if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
            let shortened = sanitized
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect::<String>();
            return format!("{shortened}...[truncated]");
        }
        sanitized
    }
}
