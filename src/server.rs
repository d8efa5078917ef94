//! Webhook HTTP server.
//!
//! Routes:
//! - `POST /api/mutantwhats/{action}`: provider webhook, handed to the adapter
//! - `GET /health`: liveness probe

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use crate::bot::{Bot, WebhookHandler, WebhookRequest, WebhookResponse};
use crate::config::ServerConfig;
use crate::mutantwhats::{MutantWhatsAdapter, CHANNEL_ID};

/// Shared handler state.
#[derive(Clone)]
struct AppState {
    adapter: Arc<MutantWhatsAdapter>,
    logic: Arc<dyn Bot>,
}

/// Build the webhook router.
pub fn router(adapter: Arc<MutantWhatsAdapter>, logic: Arc<dyn Bot>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/mutantwhats/{action}", post(webhook))
        .with_state(AppState { adapter, logic })
}

/// Bind `config.bind:config.port` and serve until Ctrl+C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(
    config: &ServerConfig,
    adapter: Arc<MutantWhatsAdapter>,
    logic: Arc<dyn Bot>,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    serve_listener(listener, adapter, logic, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve_listener(
    listener: TcpListener,
    adapter: Arc<MutantWhatsAdapter>,
    logic: Arc<dyn Bot>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "webhook server listening");
    axum::serve(listener, router(adapter, logic))
        .with_graceful_shutdown(shutdown)
        .await
        .context("webhook server failed")?;
    info!("webhook server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

/// POST /api/mutantwhats/{action}
async fn webhook(
    State(state): State<AppState>,
    Path(action): Path<String>,
    body: Bytes,
) -> Response {
    let request = WebhookRequest {
        action,
        body: body.to_vec(),
    };
    let response = state
        .adapter
        .process_activity(request, state.logic.as_ref())
        .await;
    into_http(response)
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "channel": CHANNEL_ID }))
}

fn into_http(response: WebhookResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or_else(|_| {
        tracing::warn!(status = response.status, "turn set an invalid HTTP status");
        StatusCode::INTERNAL_SERVER_ERROR
    });
    match response.body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    }
}
