//! Inbound plumbing: long polling or webhook producers feeding one consumer.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use shopbot_runtime::{RouteOutcome, ShopRuntime};
use shopbot_telegram::{parse_update, InboundInteraction, TelegramUpdatePoller};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

pub(crate) const QUEUE_CAPACITY: usize = 256;
const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ConsumerSummary {
    pub handled: usize,
    pub ignored: usize,
    pub failed: usize,
}

/// Handles queued interactions one at a time until every sender is gone.
pub(crate) async fn run_consumer(
    runtime: &mut ShopRuntime,
    queue: &mut mpsc::Receiver<InboundInteraction>,
) -> ConsumerSummary {
    let mut summary = ConsumerSummary::default();
    while let Some(interaction) = queue.recv().await {
        match runtime.handle(&interaction, Utc::now()).await {
            Ok(RouteOutcome::Ignored) => summary.ignored += 1,
            Ok(_) => summary.handled += 1,
            Err(error) => {
                summary.failed += 1;
                error!(
                    "interaction failed: update_id={} user_id={} error={error:#}",
                    interaction.update_id, interaction.user_id
                );
            }
        }
    }
    summary
}

/// Long-polls `getUpdates` forever, backing off after failures. Returns once
/// the consumer is gone.
pub(crate) async fn run_poller(
    mut poller: TelegramUpdatePoller,
    queue: mpsc::Sender<InboundInteraction>,
    backoff: Duration,
) {
    loop {
        match poller.next_batch().await {
            Ok(batch) => {
                for interaction in batch {
                    if queue.send(interaction).await.is_err() {
                        debug!("consumer closed; poller stopping");
                        return;
                    }
                }
            }
            Err(error) => {
                warn!(
                    "getUpdates failed: offset={} reason_code={} retryable={} detail={}",
                    poller.offset(),
                    error.reason_code,
                    error.retryable,
                    error.detail
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct WebhookState {
    pub queue: mpsc::Sender<InboundInteraction>,
    pub secret: Option<String>,
}

pub(crate) fn build_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhooks/telegram", post(handle_telegram_webhook))
        .route("/healthz", get(handle_webhook_health))
        .with_state(state)
}

async fn handle_webhook_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status":"ok"})))
}

async fn handle_telegram_webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    if let Some(expected_secret) = state.secret.as_deref() {
        let observed = headers
            .get(SECRET_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .unwrap_or("");
        if observed != expected_secret.trim() {
            warn!("telegram webhook secret mismatch");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error":{"code":"auth_failed","message":"invalid telegram webhook secret"}})),
            );
        }
    }
    let update = match serde_json::from_str::<Value>(&body) {
        Ok(update) => update,
        Err(error) => {
            warn!("telegram webhook payload rejected: error={error}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error":{"code":"invalid_payload","message":error.to_string()}})),
            );
        }
    };
    let Some(interaction) = parse_update(&update) else {
        return (StatusCode::OK, Json(json!({"status":"ignored"})));
    };
    let update_id = interaction.update_id;
    if state.queue.send(interaction).await.is_err() {
        error!("consumer closed; webhook update dropped: update_id={update_id}");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error":{"code":"consumer_closed","message":"bot is shutting down"}})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"status":"accepted","update_id":update_id})),
    )
}
