//! Inbound update normalisation and long polling.

use serde_json::Value;
use tracing::{debug, warn};

use crate::telegram_client::TelegramBotClient;
use crate::telegram_transport::TransportResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionKind {
    /// `/name arg1 arg2`, name lowercased without a `@botname` suffix.
    Command { name: String, args: Vec<String> },
    Button {
        callback_id: String,
        data: String,
        message_id: Option<i64>,
    },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One user action taken from a raw Bot API update.
pub struct InboundInteraction {
    pub update_id: i64,
    pub user_id: i64,
    pub first_name: String,
    pub chat_id: i64,
    pub kind: InteractionKind,
}

impl InboundInteraction {
    pub fn is_private_chat(&self) -> bool {
        self.chat_id == self.user_id
    }
}

fn sender(from: &Value) -> Option<(i64, String)> {
    let user_id = from.get("id").and_then(Value::as_i64)?;
    let first_name = from
        .get("first_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some((user_id, first_name))
}

fn parse_command(text: &str) -> Option<InteractionKind> {
    let rest = text.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    Some(InteractionKind::Command {
        name,
        args: parts.map(str::to_string).collect(),
    })
}

/// Returns `None` for update types the bot does not handle (edits, joins,
/// channel posts, media without text).
pub fn parse_update(update: &Value) -> Option<InboundInteraction> {
    let update_id = update.get("update_id").and_then(Value::as_i64)?;

    if let Some(callback) = update.get("callback_query") {
        let (user_id, first_name) = sender(callback.get("from")?)?;
        let message = callback.get("message");
        let chat_id = message
            .and_then(|message| message.pointer("/chat/id"))
            .and_then(Value::as_i64)
            .unwrap_or(user_id);
        return Some(InboundInteraction {
            update_id,
            user_id,
            first_name,
            chat_id,
            kind: InteractionKind::Button {
                callback_id: callback.get("id").and_then(Value::as_str)?.to_string(),
                data: callback
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                message_id: message
                    .and_then(|message| message.get("message_id"))
                    .and_then(Value::as_i64),
            },
        });
    }

    let message = update.get("message")?;
    let (user_id, first_name) = sender(message.get("from")?)?;
    let chat_id = message.pointer("/chat/id").and_then(Value::as_i64)?;
    let text = message.get("text").and_then(Value::as_str)?.trim();
    if text.is_empty() {
        return None;
    }
    let kind = parse_command(text).unwrap_or_else(|| InteractionKind::Text(text.to_string()));
    Some(InboundInteraction {
        update_id,
        user_id,
        first_name,
        chat_id,
        kind,
    })
}

#[derive(Debug, Clone)]
/// Tracks the `getUpdates` offset across polls.
pub struct TelegramUpdatePoller {
    client: TelegramBotClient,
    offset: i64,
    long_poll_secs: u64,
}

impl TelegramUpdatePoller {
    pub fn new(client: TelegramBotClient, long_poll_secs: u64) -> Self {
        Self {
            client,
            offset: 0,
            long_poll_secs,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Fetches the next batch and advances the offset past every update seen,
    /// including ones that do not parse.
    pub async fn next_batch(&mut self) -> TransportResult<Vec<InboundInteraction>> {
        let updates = self
            .client
            .get_updates(self.offset, self.long_poll_secs)
            .await?;
        let mut interactions = Vec::with_capacity(updates.len());
        for update in &updates {
            let Some(update_id) = update.get("update_id").and_then(Value::as_i64) else {
                warn!("telegram update without update_id skipped");
                continue;
            };
            self.offset = self.offset.max(update_id.saturating_add(1));
            match parse_update(update) {
                Some(interaction) => interactions.push(interaction),
                None => debug!("telegram update ignored: update_id={update_id}"),
            }
        }
        Ok(interactions)
    }
}
