//! Turn context: the inbound activity plus per-turn state and a handle back
//! to the adapter for replies.

use serde_json::Value;

use super::{Activity, BotError, ChannelAdapter, ResourceResponse};

/// HTTP status written back when the logic leaves it untouched.
pub const DEFAULT_HTTP_STATUS: u16 = 200;

/// Values the logic can set during a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnState {
    /// Status code for the webhook response.
    pub http_status: u16,
    /// Optional JSON body for the webhook response.
    pub http_body: Option<Value>,
}

impl Default for TurnState {
    fn default() -> Self {
        Self {
            http_status: DEFAULT_HTTP_STATUS,
            http_body: None,
        }
    }
}

/// Context for a single turn.
pub struct TurnContext<'a> {
    adapter: &'a dyn ChannelAdapter,
    activity: Activity,
    /// Mutable per-turn state.
    pub state: TurnState,
    responded: bool,
}

impl<'a> TurnContext<'a> {
    /// Create a context for `activity`, routing replies through `adapter`.
    pub fn new(adapter: &'a dyn ChannelAdapter, activity: Activity) -> Self {
        Self {
            adapter,
            activity,
            state: TurnState::default(),
            responded: false,
        }
    }

    /// The inbound activity that started this turn.
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Whether at least one reply was sent during this turn.
    pub fn responded(&self) -> bool {
        self.responded
    }

    /// Set the webhook response status.
    pub fn set_http_status(&mut self, status: u16) {
        self.state.http_status = status;
    }

    /// Set the webhook response body.
    pub fn set_http_body(&mut self, body: Value) {
        self.state.http_body = Some(body);
    }

    /// Send a single reply.
    ///
    /// # Errors
    ///
    /// See [`ChannelAdapter::send_activities`].
    pub async fn send_activity(&mut self, activity: Activity) -> Result<ResourceResponse, BotError> {
        let mut responses = self.send_activities(vec![activity]).await?;
        Ok(responses.pop().unwrap_or_default())
    }

    /// Send replies in order.
    ///
    /// # Errors
    ///
    /// See [`ChannelAdapter::send_activities`].
    pub async fn send_activities(
        &mut self,
        activities: Vec<Activity>,
    ) -> Result<Vec<ResourceResponse>, BotError> {
        if activities.is_empty() {
            return Ok(Vec::new());
        }
        let adapter = self.adapter;
        let responses = adapter.send_activities(self, activities).await?;
        self.responded = true;
        Ok(responses)
    }
}
