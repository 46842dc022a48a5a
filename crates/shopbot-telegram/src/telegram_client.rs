//! HTTPS client for the Telegram Bot API.
//!
//! Every call is a JSON `POST {api_base}/bot{token}/{method}`. Responses are
//! classified the same way for all methods: HTTP 429 and 5xx are retryable,
//! other 4xx are terminal, and the Bot API `description` becomes the error
//! detail so callers can recognise "message is not modified".

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::telegram_error::{
    classify_http_status, TelegramDeliveryError, REASON_INVALID_RESPONSE, REASON_TRANSPORT_ERROR,
};
use crate::telegram_transport::{MessengerTransport, TransportResult};
use crate::telegram_types::{OutboundMessage, RemoteMessage};

const DETAIL_LIMIT: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramClientConfig {
    pub api_base: String,
    pub bot_token: String,
    pub http_timeout_ms: u64,
}

impl Default for TelegramClientConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            bot_token: String::new(),
            http_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramBotClient {
    config: TelegramClientConfig,
    client: reqwest::Client,
}

impl TelegramBotClient {
    pub fn new(config: TelegramClientConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(anyhow!("telegram bot token cannot be empty"));
        }
        if config.api_base.trim().trim_end_matches('/').is_empty() {
            return Err(anyhow!("telegram api base cannot be empty"));
        }
        if config.http_timeout_ms == 0 {
            return Err(anyhow!("telegram http timeout must be greater than 0"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()
            .context("failed to build telegram http client")?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim().trim_end_matches('/'),
            self.config.bot_token.trim(),
            method
        )
    }

    /// Calls one Bot API method and returns its `result` field.
    pub async fn call(&self, method: &str, body: &Value) -> TransportResult<Value> {
        self.call_with_timeout(method, body, None).await
    }

    async fn call_with_timeout(
        &self,
        method: &str,
        body: &Value,
        timeout: Option<Duration>,
    ) -> TransportResult<Value> {
        let mut request = self.client.post(self.endpoint(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(|error| {
            TelegramDeliveryError::new(
                method,
                REASON_TRANSPORT_ERROR,
                error.without_url().to_string(),
                true,
                None,
            )
        })?;
        let status = response.status().as_u16();
        let raw = response.text().await.unwrap_or_default();
        let payload = serde_json::from_str::<Value>(&raw).unwrap_or(Value::Null);
        let ok = payload.get("ok").and_then(Value::as_bool).unwrap_or(false);
        if (200..300).contains(&status) && ok {
            return Ok(payload.get("result").cloned().unwrap_or(Value::Null));
        }

        let detail = payload
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| truncate_detail(&raw));
        let (reason_code, retryable) = if (200..300).contains(&status) {
            (REASON_INVALID_RESPONSE, false)
        } else {
            classify_http_status(status)
        };
        debug!(
            "telegram call failed: method={} status={} reason_code={}",
            method, status, reason_code
        );
        Err(TelegramDeliveryError::new(
            method,
            reason_code,
            detail,
            retryable,
            Some(status),
        ))
    }

    /// Long-polls `getUpdates` from `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> TransportResult<Vec<Value>> {
        let body = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        let http_timeout = Duration::from_millis(self.config.http_timeout_ms)
            + Duration::from_secs(timeout_secs);
        let result = self
            .call_with_timeout("getUpdates", &body, Some(http_timeout))
            .await?;
        match result {
            Value::Array(updates) => Ok(updates),
            _ => Err(TelegramDeliveryError::new(
                "getUpdates",
                REASON_INVALID_RESPONSE,
                "getUpdates result is not an array",
                false,
                None,
            )),
        }
    }

    pub async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> TransportResult<()> {
        let mut body = json!({
            "url": url,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(secret) = secret_token {
            body["secret_token"] = json!(secret);
        }
        self.call("setWebhook", &body).await.map(|_| ())
    }

    pub async fn delete_webhook(&self) -> TransportResult<()> {
        self.call("deleteWebhook", &json!({})).await.map(|_| ())
    }
}

fn message_id_from(method: &str, result: &Value) -> TransportResult<i64> {
    result
        .get("message_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            TelegramDeliveryError::new(
                method,
                REASON_INVALID_RESPONSE,
                "response did not include result.message_id",
                false,
                None,
            )
        })
}

fn text_from(message: &Value) -> Option<String> {
    message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn truncate_detail(raw: &str) -> String {
    if raw.chars().count() <= DETAIL_LIMIT {
        return raw.to_string();
    }
    let mut output = raw.chars().take(DETAIL_LIMIT).collect::<String>();
    output.push_str("...");
    output
}

#[async_trait]
impl MessengerTransport for TelegramBotClient {
    async fn send_message(
        &self,
        chat_id: i64,
        message: &OutboundMessage,
    ) -> TransportResult<i64> {
        let body = message.body_fields(json!({ "chat_id": chat_id }));
        let result = self.call("sendMessage", &body).await?;
        message_id_from("sendMessage", &result)
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        message: &OutboundMessage,
    ) -> TransportResult<()> {
        let body = message.body_fields(json!({
            "chat_id": chat_id,
            "message_id": message_id,
        }));
        self.call("editMessageText", &body).await.map(|_| ())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> TransportResult<()> {
        let body = json!({ "chat_id": chat_id, "message_id": message_id });
        self.call("deleteMessage", &body).await.map(|_| ())
    }

    async fn pin_chat_message(&self, chat_id: i64, message_id: i64) -> TransportResult<()> {
        let body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "disable_notification": true,
        });
        self.call("pinChatMessage", &body).await.map(|_| ())
    }

    async fn pinned_message(&self, chat_id: i64) -> TransportResult<Option<RemoteMessage>> {
        let chat = self.call("getChat", &json!({ "chat_id": chat_id })).await?;
        let Some(pinned) = chat.get("pinned_message") else {
            return Ok(None);
        };
        let Some(message_id) = pinned.get("message_id").and_then(Value::as_i64) else {
            return Ok(None);
        };
        Ok(Some(RemoteMessage {
            message_id,
            text: text_from(pinned).unwrap_or_default(),
        }))
    }

    /// The Bot API cannot read a message by id, so the message is forwarded
    /// into the same chat, read from the forward, and the copy deleted.
    async fn fetch_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> TransportResult<Option<String>> {
        let body = json!({
            "chat_id": chat_id,
            "from_chat_id": chat_id,
            "message_id": message_id,
            "disable_notification": true,
        });
        let forwarded = self.call("forwardMessage", &body).await?;
        let text = text_from(&forwarded);
        if let Some(copy_id) = forwarded.get("message_id").and_then(Value::as_i64) {
            if let Err(error) = self.delete_message(chat_id, copy_id).await {
                debug!("forwarded copy cleanup failed: message_id={copy_id} {error}");
            }
        }
        Ok(text)
    }

    async fn answer_callback(&self, callback_id: &str) -> TransportResult<()> {
        let body = json!({ "callback_query_id": callback_id });
        self.call("answerCallbackQuery", &body).await.map(|_| ())
    }

    async fn send_photo(&self, chat_id: i64, photo: &str) -> TransportResult<i64> {
        let body = json!({
            "chat_id": chat_id,
            "photo": photo,
            "protect_content": true,
        });
        let result = self.call("sendPhoto", &body).await?;
        message_id_from("sendPhoto", &result)
    }
}

#[cfg(test)]
mod tests {
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    use super::{TelegramBotClient, TelegramClientConfig};
    use crate::telegram_transport::MessengerTransport;
    use crate::telegram_types::OutboundMessage;

    fn client_for(server: &MockServer) -> TelegramBotClient {
        TelegramBotClient::new(TelegramClientConfig {
            api_base: server.base_url(),
            bot_token: "test-token".to_string(),
            http_timeout_ms: 2_000,
        })
        .expect("client")
    }

    #[test]
    fn unit_client_rejects_empty_token_and_zero_timeout() {
        assert!(TelegramBotClient::new(TelegramClientConfig::default()).is_err());
        assert!(TelegramBotClient::new(TelegramClientConfig {
            bot_token: "t".to_string(),
            http_timeout_ms: 0,
            ..TelegramClientConfig::default()
        })
        .is_err());
    }

    #[tokio::test]
    async fn integration_send_message_returns_provider_message_id() {
        let server = MockServer::start();
        let sent = server.mock(|when, then| {
            when.method(POST).path("/bottest-token/sendMessage");
            then.status(200)
                .json_body(json!({"ok": true, "result": {"message_id": 55}}));
        });
        let client = client_for(&server);
        let message_id = client
            .send_message(-100, &OutboundMessage::html("<b>hallo</b>"))
            .await
            .expect("send");
        sent.assert_calls(1);
        assert_eq!(message_id, 55);
    }

    #[tokio::test]
    async fn functional_edit_not_modified_is_recognised() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/bottest-token/editMessageText");
            then.status(400).json_body(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: message is not modified: specified new message content and reply markup are exactly the same"
            }));
        });
        let client = client_for(&server);
        let error = client
            .edit_message_text(-100, 7, &OutboundMessage::plain("same"))
            .await
            .expect_err("edit should fail");
        assert!(error.is_not_modified());
        assert!(!error.retryable);
        assert_eq!(error.http_status, Some(400));
        assert_eq!(error.reason_code, "delivery_request_rejected");
    }

    #[tokio::test]
    async fn regression_server_errors_are_retryable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/bottest-token/sendMessage");
            then.status(502).body("bad gateway");
        });
        let client = client_for(&server);
        let error = client
            .send_message(1, &OutboundMessage::plain("x"))
            .await
            .expect_err("502 should fail");
        assert!(error.retryable);
        assert_eq!(error.reason_code, "delivery_provider_unavailable");
        assert_eq!(error.detail, "bad gateway");
    }

    #[tokio::test]
    async fn integration_pinned_message_reads_get_chat() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/bottest-token/getChat");
            then.status(200).json_body(json!({
                "ok": true,
                "result": {
                    "id": -100,
                    "pinned_message": {"message_id": 9, "text": "Bot-Statistik Dashboard"}
                }
            }));
        });
        let client = client_for(&server);
        let pinned = client
            .pinned_message(-100)
            .await
            .expect("getChat")
            .expect("pinned present");
        assert_eq!(pinned.message_id, 9);
        assert_eq!(pinned.text, "Bot-Statistik Dashboard");
    }

    #[tokio::test]
    async fn integration_fetch_message_text_forwards_then_deletes_copy() {
        let server = MockServer::start();
        let forward = server.mock(|when, then| {
            when.method(POST).path("/bottest-token/forwardMessage");
            then.status(200).json_body(json!({
                "ok": true,
                "result": {"message_id": 301, "text": "payload"}
            }));
        });
        let delete = server.mock(|when, then| {
            when.method(POST).path("/bottest-token/deleteMessage");
            then.status(200).json_body(json!({"ok": true, "result": true}));
        });
        let client = client_for(&server);
        let text = client.fetch_message_text(-100, 12).await.expect("fetch");
        forward.assert_calls(1);
        delete.assert_calls(1);
        assert_eq!(text.as_deref(), Some("payload"));
    }

    #[tokio::test]
    async fn integration_get_updates_returns_raw_updates() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/bottest-token/getUpdates");
            then.status(200).json_body(json!({
                "ok": true,
                "result": [{"update_id": 5}, {"update_id": 6}]
            }));
        });
        let client = client_for(&server);
        let updates = client.get_updates(0, 0).await.expect("updates");
        assert_eq!(updates.len(), 2);
    }
}
