//! Adapter: inbound normalization, webhook handling, and outbound dispatch.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::http::Method;
use chrono::{TimeZone, Utc};
use serde_json::json;

use mutantwhats_bridge::bot::{
    Activity, ActivityType, Attachment, Bot, BotError, ChannelAccount, ChannelAdapter,
    ResourceResponse, TurnContext, WebhookHandler, WebhookRequest,
};
use mutantwhats_bridge::mutantwhats::{
    ActionKind, AdapterOptions, DeliveryPolicy, InboundEnvelope, MutantWhatsAdapter,
};

use crate::common::{LogCapture, MockProvider, COOKIE, TOKEN};

fn adapter() -> MutantWhatsAdapter {
    MutantWhatsAdapter::new(
        ChannelAccount {
            id: "bot-1".to_owned(),
            name: "Helper".to_owned(),
            role: None,
            ..ChannelAccount::default()
        },
        AdapterOptions::default(),
    )
}

fn strict_adapter() -> MutantWhatsAdapter {
    MutantWhatsAdapter::new(
        ChannelAccount::bot("bot-1", "Helper"),
        AdapterOptions {
            delivery: DeliveryPolicy::Propagate,
            ..AdapterOptions::default()
        },
    )
}

fn envelope(value: serde_json::Value) -> InboundEnvelope {
    let body = serde_json::to_vec(&value).expect("serialize envelope");
    InboundEnvelope::from_slice(&body).expect("envelope should parse")
}

/// Inbound activity whose channel data points at `mock`.
fn inbound_for(mock: &MockProvider) -> Activity {
    Activity {
        channel_id: "whatsapp".to_owned(),
        channel_data: Some(mock.channel_data()),
        ..Activity::default()
    }
}

/// Counts turns and optionally replies or sets a response.
#[derive(Default)]
struct ScriptedBot {
    turns: AtomicUsize,
    reply: Option<String>,
    status: Option<u16>,
    fail: bool,
}

#[async_trait]
impl Bot for ScriptedBot {
    async fn on_turn(&self, ctx: &mut TurnContext<'_>) -> Result<(), BotError> {
        self.turns.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BotError::Logic(anyhow::anyhow!("logic exploded")));
        }
        if let Some(status) = self.status {
            ctx.set_http_status(status);
            ctx.set_http_body(json!({ "accepted": true }));
        }
        if let Some(reply) = &self.reply {
            ctx.send_activity(Activity::message(reply.clone())).await?;
        }
        Ok(())
    }
}

// ── Inbound normalization ───────────────────────────────────────

#[test]
fn message_envelope_maps_first_activity() {
    let env = envelope(json!({
        "conversationId": "c1",
        "ticket_id": "t1",
        "activities": [
            {
                "text": "first",
                "attachments": [{ "contentType": "image/png", "contentUrl": "https://cdn.test/a.png" }],
                "from": { "id": "5511", "name": "Ana", "role": "user" },
            },
            { "text": "second" },
        ],
    }));
    let now = Utc
        .with_ymd_and_hms(2026, 10, 17, 12, 0, 0)
        .single()
        .expect("valid timestamp");
    let activity = adapter()
        .build_activity_at(&ActionKind::Message, &env, now)
        .expect("activity should build");

    let first = &env.activities[0];
    assert_eq!(activity.text, first.text);
    assert_eq!(activity.attachments, first.attachments);
    assert_eq!(Some(activity.from.clone()), first.from);

    assert_eq!(activity.activity_type, ActivityType::Message);
    assert_eq!(activity.id.as_deref(), Some("t1"));
    assert_eq!(activity.channel_id, "whatsapp");
    assert_eq!(activity.conversation.id, "c1");
    assert!(!activity.conversation.is_group);
    assert_eq!(activity.label.as_deref(), Some("c1"));
    assert_eq!(activity.recipient.id, "bot-1");
    assert_eq!(activity.recipient.role.as_deref(), Some("bot"));
    assert_eq!(activity.local_timezone.as_deref(), Some("America/Sao_Paulo"));
    assert_eq!(
        activity.timestamp.as_deref(),
        Some("Sat, 17 Oct 2026 12:00:00 GMT")
    );
    assert_eq!(
        activity.local_timestamp.as_deref(),
        Some("2026-10-17T12:00:00.000Z")
    );
    let data = activity.channel_data.expect("channel data");
    assert_eq!(data["actionType"], "message");
    assert_eq!(data["conversationId"], "c1");
}

#[test]
fn numeric_sender_id_and_extra_fields_are_kept() {
    let env = envelope(json!({
        "conversationId": "c1",
        "activities": [{
            "text": "hi",
            "from": { "id": 5511999990000_u64, "name": "Ana", "phone": "+55 11 99999-0000" },
        }],
    }));
    let activity = adapter()
        .build_activity(&ActionKind::Message, &env)
        .expect("activity should build");

    assert_eq!(Some(activity.from.clone()), env.activities[0].from);
    assert_eq!(activity.from.id, "5511999990000");
    assert_eq!(activity.from.name, "Ana");
    assert_eq!(activity.from.extra["phone"], "+55 11 99999-0000");
}

#[test]
fn null_sender_name_becomes_empty() {
    let env = envelope(json!({
        "conversationId": "c1",
        "activities": [{ "text": "hi", "from": { "id": "5511", "name": null } }],
    }));
    let activity = adapter()
        .build_activity(&ActionKind::Message, &env)
        .expect("activity should build");

    assert_eq!(activity.from.id, "5511");
    assert!(activity.from.name.is_empty());
}

#[test]
fn start_conversation_maps_contact() {
    let env = envelope(json!({
        "conversation_id": "c2",
        "contact": { "identifier": "5511999990000", "name": "Bia" },
        "start_message": "quero ajuda",
    }));
    let activity = adapter()
        .build_activity(&ActionKind::StartConversation, &env)
        .expect("activity should build");

    assert_eq!(activity.from.id, "5511999990000");
    assert_eq!(activity.from.name, "Bia");
    assert_eq!(activity.from.role.as_deref(), Some("user"));
    assert_eq!(activity.text.as_deref(), Some("quero ajuda"));
    assert_eq!(activity.conversation.id, "c2");
    let data = activity.channel_data.expect("channel data");
    assert_eq!(data["actionType"], "start-conversation");
    assert_eq!(data["contact"]["identifier"], "5511999990000");
}

#[test]
fn incomplete_envelopes_are_rejected() {
    let adapter = adapter();
    let no_activities = envelope(json!({ "conversationId": "c1", "activities": [] }));
    assert!(adapter
        .build_activity(&ActionKind::Message, &no_activities)
        .is_err());

    let no_contact = envelope(json!({ "conversationId": "c1", "start_message": "hi" }));
    assert!(adapter
        .build_activity(&ActionKind::StartConversation, &no_contact)
        .is_err());
}

#[test]
fn unknown_action_builds_base_activity() {
    let env = envelope(json!({ "conversationId": "c9" }));
    let activity = adapter()
        .build_activity(&ActionKind::parse("typing"), &env)
        .expect("activity should build");
    assert_eq!(activity.conversation.id, "c9");
    assert!(activity.text.is_none());
    assert_eq!(activity.from, ChannelAccount::default());
}

// ── Webhook handling ────────────────────────────────────────────

fn request(action: &str, body: &[u8]) -> WebhookRequest {
    WebhookRequest {
        action: action.to_owned(),
        body: body.to_vec(),
    }
}

#[tokio::test]
async fn empty_body_is_rejected_without_running_logic() {
    let mock = MockProvider::ok().await;
    let logic = ScriptedBot {
        reply: Some("should not be sent".to_owned()),
        ..ScriptedBot::default()
    };

    let response = adapter().process_activity(request("message", b""), &logic).await;

    assert_eq!(response.status, 400);
    assert!(response.body.is_none());
    assert_eq!(logic.turns.load(Ordering::SeqCst), 0);
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn message_without_activities_is_a_bad_request() {
    let logic = ScriptedBot::default();
    let body = serde_json::to_vec(&json!({ "conversationId": "c1" })).expect("serialize");

    let response = adapter().process_activity(request("message", &body), &logic).await;

    assert_eq!(response.status, 400);
    assert_eq!(logic.turns.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn default_response_is_200_without_body() {
    let logic = ScriptedBot::default();
    let body = serde_json::to_vec(&json!({
        "conversationId": "c1",
        "activities": [{ "text": "hi" }],
    }))
    .expect("serialize");

    let response = adapter().process_activity(request("message", &body), &logic).await;

    assert_eq!(response.status, 200);
    assert!(response.body.is_none());
    assert_eq!(logic.turns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn logic_can_set_status_and_body() {
    let logic = ScriptedBot {
        status: Some(202),
        ..ScriptedBot::default()
    };
    let body = serde_json::to_vec(&json!({
        "conversationId": "c1",
        "contact": { "identifier": "1", "name": "Ana" },
    }))
    .expect("serialize");

    let response = adapter()
        .process_activity(request("start-conversation", &body), &logic)
        .await;

    assert_eq!(response.status, 202);
    assert_eq!(response.body, Some(json!({ "accepted": true })));
}

#[tokio::test]
async fn logic_failure_answers_500() {
    let logic = ScriptedBot {
        fail: true,
        ..ScriptedBot::default()
    };
    let body = serde_json::to_vec(&json!({
        "conversationId": "c1",
        "activities": [{ "text": "hi" }],
    }))
    .expect("serialize");

    let response = adapter().process_activity(request("message", &body), &logic).await;
    assert_eq!(response.status, 500);
}

#[tokio::test]
async fn replies_use_session_fields_from_the_webhook() {
    let mock = MockProvider::ok().await;
    let logic = ScriptedBot {
        reply: Some("<b>pong</b>".to_owned()),
        ..ScriptedBot::default()
    };
    let body = serde_json::to_vec(&json!({
        "conversationId": "c1",
        "token": "tok-secret-123",
        "cookie": "sid=abc123",
        "messageUrl": mock.messages_url(),
        "activities": [{ "text": "ping" }],
    }))
    .expect("serialize");

    let response = adapter().process_activity(request("message", &body), &logic).await;

    assert_eq!(response.status, 200);
    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].json()["text"], "*pong*");
    assert_eq!(requests[0].header("cookie"), Some("sid=abc123"));
}

#[tokio::test]
async fn loosely_typed_sender_still_runs_the_turn() {
    let bodies = [
        json!({
            "conversationId": "c1",
            "activities": [{ "text": "hi", "from": { "id": 5511999990000_u64, "name": "Ana" } }],
        }),
        json!({
            "conversationId": "c1",
            "activities": [{ "text": "hi", "from": { "id": "5511", "name": null } }],
        }),
    ];
    for body in bodies {
        let logic = ScriptedBot::default();
        let body = serde_json::to_vec(&body).expect("serialize");

        let response = adapter().process_activity(request("message", &body), &logic).await;

        assert_eq!(response.status, 200);
        assert_eq!(logic.turns.load(Ordering::SeqCst), 1);
    }
}

// ── Outbound dispatch ───────────────────────────────────────────

#[tokio::test]
async fn batch_dispatches_every_type_in_order() {
    let mock = MockProvider::ok().await;
    let adapter = adapter();
    let ctx = TurnContext::new(&adapter, inbound_for(&mock));

    let activities = vec![
        Activity::message("<s>old</s> new"),
        Activity::delay(0),
        Activity::handoff("77"),
        Activity::attachment(
            Attachment::file("photo.jpg", b"JPEGDATA".to_vec()),
            Some("caption".to_owned()),
        ),
        Activity::end_of_conversation(None),
        Activity {
            activity_type: ActivityType::Other("typing".to_owned()),
            ..Activity::default()
        },
    ];
    let count = activities.len();
    let responses = adapter
        .send_activities(&ctx, activities)
        .await
        .expect("batch should succeed");

    assert_eq!(responses.len(), count);
    assert_eq!(responses[0].id, "msg-1");
    assert_eq!(responses[1], ResourceResponse::default());
    assert_eq!(responses[5], ResourceResponse::default());

    let requests = mock.requests();
    let calls: Vec<(Method, String)> = requests
        .iter()
        .map(|r| (r.method.clone(), r.path.clone()))
        .collect();
    assert_eq!(
        calls,
        vec![
            (Method::POST, "/v1/conversations/c1/activities".to_owned()),
            (Method::PUT, "/v1/conversations/c1/transfer".to_owned()),
            (Method::POST, "/v1/conversations/c1/upload".to_owned()),
            (Method::PUT, "/v1/conversations/c1/close".to_owned()),
        ]
    );
    assert_eq!(requests[0].json()["text"], "~old~ new");
    assert_eq!(requests[1].json(), json!({ "campaign_id": "77" }));
    assert!(requests[2].body_text().contains("JPEGDATA"));
    assert_eq!(requests[3].json(), json!({ "status": "solved", "reasons": [] }));
}

#[tokio::test]
async fn close_uses_activity_code_as_status() {
    let mock = MockProvider::ok().await;
    let adapter = adapter();
    let ctx = TurnContext::new(&adapter, inbound_for(&mock));

    adapter
        .send_activities(
            &ctx,
            vec![Activity::end_of_conversation(Some("abandoned".to_owned()))],
        )
        .await
        .expect("close should succeed");

    assert_eq!(mock.requests()[0].json()["status"], "abandoned");
}

#[tokio::test]
async fn attachment_without_file_still_yields_an_entry() {
    let mock = MockProvider::ok().await;
    let adapter = adapter();
    let ctx = TurnContext::new(&adapter, inbound_for(&mock));

    let responses = adapter
        .send_activities(
            &ctx,
            vec![Activity::attachment(Attachment::default(), None)],
        )
        .await
        .expect("batch should succeed");

    assert_eq!(responses.len(), 1);
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn provider_failure_is_absorbed_by_default() {
    let mock = MockProvider::start(500, "internal error").await;
    let adapter = adapter();
    let ctx = TurnContext::new(&adapter, inbound_for(&mock));

    let responses = adapter
        .send_activities(
            &ctx,
            vec![Activity::message("one"), Activity::message("two")],
        )
        .await
        .expect("failures should not propagate");

    assert_eq!(responses.len(), 2);
    assert!(responses.iter().all(|r| r.id.is_empty()));
    assert_eq!(mock.requests().len(), 2);
}

#[tokio::test]
async fn strict_delivery_stops_the_batch() {
    let mock = MockProvider::start(500, "internal error").await;
    let adapter = strict_adapter();
    let ctx = TurnContext::new(&adapter, inbound_for(&mock));

    let result = adapter
        .send_activities(
            &ctx,
            vec![Activity::message("one"), Activity::message("two")],
        )
        .await;

    match result {
        Err(BotError::Delivery(detail)) => assert!(detail.contains("500")),
        Err(other) => panic!("expected delivery error, got: {other}"),
        Ok(responses) => panic!("strict delivery should fail, got {responses:?}"),
    }
    assert_eq!(mock.requests().len(), 1);
}

#[tokio::test]
async fn missing_endpoints_are_absorbed_by_default() {
    let adapter = adapter();
    let ctx = TurnContext::new(&adapter, Activity::default());

    let responses = adapter
        .send_activities(
            &ctx,
            vec![Activity::message("hi"), Activity::handoff("1")],
        )
        .await
        .expect("failures should not propagate");
    assert_eq!(responses.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn delay_without_value_uses_configured_default() {
    let adapter = MutantWhatsAdapter::new(
        ChannelAccount::bot("bot-1", "Helper"),
        AdapterOptions {
            default_delay_ms: 1500,
            ..AdapterOptions::default()
        },
    );
    let ctx = TurnContext::new(&adapter, Activity::default());
    let mut delay = Activity::delay(0);
    delay.value = None;

    let started = tokio::time::Instant::now();
    let responses = adapter
        .send_activities(&ctx, vec![delay, Activity::delay(500)])
        .await
        .expect("delays should succeed");

    assert_eq!(responses.len(), 2);
    assert!(started.elapsed() >= std::time::Duration::from_millis(2000));
}

#[test]
fn bot_account_role_is_forced_to_bot() {
    assert_eq!(adapter().bot_account().role.as_deref(), Some("bot"));
}

#[tokio::test]
async fn null_credentials_keep_the_session_endpoints() {
    let mock = MockProvider::ok().await;
    let adapter = adapter();
    let mut channel_data = mock.channel_data();
    channel_data["cookie"] = serde_json::Value::Null;
    channel_data["token"] = serde_json::Value::Null;
    channel_data["conversationId"] = json!(42);
    let inbound = Activity {
        channel_data: Some(channel_data),
        ..Activity::default()
    };
    let ctx = TurnContext::new(&adapter, inbound);

    let responses = adapter
        .send_activities(&ctx, vec![Activity::message("hi")])
        .await
        .expect("send should succeed");

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].id, "msg-1");
    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].header("cookie").is_none());
}

#[tokio::test]
async fn absorbed_failure_is_logged_without_credentials() {
    let mock = MockProvider::start(500, "internal error").await;
    let adapter = adapter();
    let ctx = TurnContext::new(&adapter, inbound_for(&mock));
    let logs = LogCapture::default();

    {
        let _guard = logs.install();
        adapter
            .send_activities(&ctx, vec![Activity::message("one")])
            .await
            .expect("failures should not propagate");
    }

    let output = logs.contents();
    assert!(output.contains("status_code=500"));
    assert!(output.contains("data=internal error"));
    assert!(output.contains("delivery failed, continuing batch"));
    assert!(!output.contains(TOKEN));
    assert!(!output.contains(COOKIE));
}

#[tokio::test(start_paused = true)]
async fn fractional_and_string_delays_use_whole_milliseconds() {
    let adapter = adapter();
    let ctx = TurnContext::new(&adapter, Activity::default());
    let mut fractional = Activity::delay(0);
    fractional.value = Some(json!(250.9));
    let mut text = Activity::delay(0);
    text.value = Some(json!("300"));

    let started = tokio::time::Instant::now();
    adapter
        .send_activities(&ctx, vec![fractional, text])
        .await
        .expect("delays should succeed");

    let elapsed = started.elapsed();
    assert!(elapsed >= std::time::Duration::from_millis(550));
    assert!(elapsed < std::time::Duration::from_millis(1000));
}
