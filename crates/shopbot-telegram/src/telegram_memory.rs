//! In-process transport used by tests and dry runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::telegram_error::TelegramDeliveryError;
use crate::telegram_transport::{MessengerTransport, TransportResult};
use crate::telegram_types::{visible_text, OutboundMessage, RemoteMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
/// One recorded outbound operation.
pub enum TransportCall {
    Send { chat_id: i64, message_id: i64 },
    Edit { chat_id: i64, message_id: i64 },
    Delete { chat_id: i64, message_id: i64 },
    Pin { chat_id: i64, message_id: i64 },
    AnswerCallback { callback_id: String },
    Photo { chat_id: i64, photo: String },
}

#[derive(Debug, Default)]
struct MemoryState {
    next_message_id: i64,
    messages: BTreeMap<(i64, i64), OutboundMessage>,
    pinned: BTreeMap<i64, i64>,
    calls: Vec<TransportCall>,
    blocked_chats: BTreeSet<i64>,
    locked_messages: BTreeSet<(i64, i64)>,
}

#[derive(Debug, Default)]
/// Keeps every message in memory and mimics the Bot API failure modes the
/// engine reacts to: blocked users, vanished messages, unchanged edits.
pub struct InMemoryTransport {
    state: Mutex<MemoryState>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Places an existing message without recording a call.
    pub fn seed_message(&self, chat_id: i64, message: OutboundMessage) -> i64 {
        let mut state = self.lock();
        state.next_message_id += 1;
        let message_id = state.next_message_id;
        state.messages.insert((chat_id, message_id), message);
        message_id
    }

    pub fn pin(&self, chat_id: i64, message_id: i64) {
        self.lock().pinned.insert(chat_id, message_id);
    }

    pub fn block_chat(&self, chat_id: i64) {
        self.lock().blocked_chats.insert(chat_id);
    }

    /// Drops a message as if someone deleted it by hand.
    pub fn forget_message(&self, chat_id: i64, message_id: i64) {
        let mut state = self.lock();
        state.messages.remove(&(chat_id, message_id));
        if state.pinned.get(&chat_id) == Some(&message_id) {
            state.pinned.remove(&chat_id);
        }
    }

    /// Makes a message readable but no longer editable.
    pub fn lock_message(&self, chat_id: i64, message_id: i64) {
        self.lock().locked_messages.insert((chat_id, message_id));
    }

    /// Raw text (markup included) of a stored message.
    pub fn text_of(&self, chat_id: i64, message_id: i64) -> Option<String> {
        self.lock()
            .messages
            .get(&(chat_id, message_id))
            .map(|message| message.text.clone())
    }

    pub fn message(&self, chat_id: i64, message_id: i64) -> Option<OutboundMessage> {
        self.lock().messages.get(&(chat_id, message_id)).cloned()
    }

    pub fn pinned_id(&self, chat_id: i64) -> Option<i64> {
        self.lock().pinned.get(&chat_id).copied()
    }

    /// Messages currently present in a chat, oldest first.
    pub fn sent_to(&self, chat_id: i64) -> Vec<OutboundMessage> {
        self.lock()
            .messages
            .iter()
            .filter(|((chat, _), _)| *chat == chat_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn last_message(&self, chat_id: i64) -> Option<OutboundMessage> {
        self.sent_to(chat_id).pop()
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

#[async_trait]
impl MessengerTransport for InMemoryTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        message: &OutboundMessage,
    ) -> TransportResult<i64> {
        if !message.fits_text_limit() {
            return Err(TelegramDeliveryError::rejected(
                "sendMessage",
                "Bad Request: message is too long",
            ));
        }
        let mut state = self.lock();
        if state.blocked_chats.contains(&chat_id) {
            return Err(TelegramDeliveryError::new(
                "sendMessage",
                "delivery_request_rejected",
                "Forbidden: bot was blocked by the user",
                false,
                Some(403),
            ));
        }
        state.next_message_id += 1;
        let message_id = state.next_message_id;
        state.messages.insert((chat_id, message_id), message.clone());
        state.calls.push(TransportCall::Send {
            chat_id,
            message_id,
        });
        Ok(message_id)
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        message: &OutboundMessage,
    ) -> TransportResult<()> {
        if !message.fits_text_limit() {
            return Err(TelegramDeliveryError::rejected(
                "editMessageText",
                "Bad Request: MESSAGE_TOO_LONG",
            ));
        }
        let mut state = self.lock();
        let key = (chat_id, message_id);
        if state.locked_messages.contains(&key) {
            return Err(TelegramDeliveryError::rejected(
                "editMessageText",
                "Bad Request: message can't be edited",
            ));
        }
        let Some(current) = state.messages.get_mut(&key) else {
            return Err(TelegramDeliveryError::rejected(
                "editMessageText",
                "Bad Request: message to edit not found",
            ));
        };
        if current.text == message.text && current.keyboard == message.keyboard {
            return Err(TelegramDeliveryError::rejected(
                "editMessageText",
                "Bad Request: message is not modified",
            ));
        }
        *current = message.clone();
        state.calls.push(TransportCall::Edit {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> TransportResult<()> {
        let mut state = self.lock();
        if state.messages.remove(&(chat_id, message_id)).is_none() {
            return Err(TelegramDeliveryError::rejected(
                "deleteMessage",
                "Bad Request: message to delete not found",
            ));
        }
        if state.pinned.get(&chat_id) == Some(&message_id) {
            state.pinned.remove(&chat_id);
        }
        state.calls.push(TransportCall::Delete {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn pin_chat_message(&self, chat_id: i64, message_id: i64) -> TransportResult<()> {
        let mut state = self.lock();
        if !state.messages.contains_key(&(chat_id, message_id)) {
            return Err(TelegramDeliveryError::rejected(
                "pinChatMessage",
                "Bad Request: message to pin not found",
            ));
        }
        state.pinned.insert(chat_id, message_id);
        state.calls.push(TransportCall::Pin {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn pinned_message(&self, chat_id: i64) -> TransportResult<Option<RemoteMessage>> {
        let state = self.lock();
        let Some(message_id) = state.pinned.get(&chat_id).copied() else {
            return Ok(None);
        };
        Ok(state
            .messages
            .get(&(chat_id, message_id))
            .map(|message| RemoteMessage {
                message_id,
                text: visible_text(&message.text, message.parse_mode),
            }))
    }

    async fn fetch_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> TransportResult<Option<String>> {
        let state = self.lock();
        match state.messages.get(&(chat_id, message_id)) {
            Some(message) => Ok(Some(visible_text(&message.text, message.parse_mode))),
            None => Err(TelegramDeliveryError::rejected(
                "forwardMessage",
                "Bad Request: message to forward not found",
            )),
        }
    }

    async fn answer_callback(&self, callback_id: &str) -> TransportResult<()> {
        self.lock().calls.push(TransportCall::AnswerCallback {
            callback_id: callback_id.to_string(),
        });
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, photo: &str) -> TransportResult<i64> {
        let mut state = self.lock();
        if state.blocked_chats.contains(&chat_id) {
            return Err(TelegramDeliveryError::new(
                "sendPhoto",
                "delivery_request_rejected",
                "Forbidden: bot was blocked by the user",
                false,
                Some(403),
            ));
        }
        state.next_message_id += 1;
        let message_id = state.next_message_id;
        state
            .messages
            .insert((chat_id, message_id), OutboundMessage::plain(photo));
        state.calls.push(TransportCall::Photo {
            chat_id,
            photo: photo.to_string(),
        });
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryTransport, TransportCall};
    use crate::telegram_transport::MessengerTransport;
    use crate::telegram_types::{OutboundMessage, MESSAGE_TEXT_LIMIT};

    #[tokio::test]
    async fn regression_oversized_text_is_rejected_like_the_bot_api() {
        let transport = InMemoryTransport::new();
        let oversized = OutboundMessage::plain("x".repeat(MESSAGE_TEXT_LIMIT + 1));
        let error = transport
            .send_message(-1, &oversized)
            .await
            .expect_err("send must fail");
        assert!(!error.retryable);
        assert_eq!(error.http_status, Some(400));
        let id = transport.seed_message(-1, OutboundMessage::plain("kurz"));
        assert!(transport.edit_message_text(-1, id, &oversized).await.is_err());
        assert_eq!(transport.text_of(-1, id).as_deref(), Some("kurz"));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn functional_send_edit_and_read_back_visible_text() {
        let transport = InMemoryTransport::new();
        let id = transport
            .send_message(-1, &OutboundMessage::html("<b>A &amp; B</b>"))
            .await
            .expect("send");
        assert_eq!(
            transport.fetch_message_text(-1, id).await.expect("fetch"),
            Some("A & B".to_string())
        );
        transport
            .edit_message_text(-1, id, &OutboundMessage::html("<b>C</b>"))
            .await
            .expect("edit");
        assert_eq!(transport.text_of(-1, id).as_deref(), Some("<b>C</b>"));
        assert_eq!(
            transport.calls(),
            vec![
                TransportCall::Send {
                    chat_id: -1,
                    message_id: id
                },
                TransportCall::Edit {
                    chat_id: -1,
                    message_id: id
                },
            ]
        );
    }

    #[tokio::test]
    async fn unit_identical_edit_reports_not_modified() {
        let transport = InMemoryTransport::new();
        let id = transport.seed_message(-1, OutboundMessage::plain("same"));
        let error = transport
            .edit_message_text(-1, id, &OutboundMessage::plain("same"))
            .await
            .expect_err("no-op edit");
        assert!(error.is_not_modified());
    }

    #[tokio::test]
    async fn regression_blocked_and_missing_targets_fail() {
        let transport = InMemoryTransport::new();
        transport.block_chat(42);
        let blocked = transport
            .send_message(42, &OutboundMessage::plain("hi"))
            .await
            .expect_err("blocked");
        assert_eq!(blocked.http_status, Some(403));

        let id = transport.seed_message(-1, OutboundMessage::plain("log"));
        transport.forget_message(-1, id);
        assert!(transport
            .edit_message_text(-1, id, &OutboundMessage::plain("new"))
            .await
            .is_err());
        assert!(transport.fetch_message_text(-1, id).await.is_err());
    }

    #[tokio::test]
    async fn functional_pinned_message_follows_pin_and_delete() {
        let transport = InMemoryTransport::new();
        let id = transport.seed_message(-1, OutboundMessage::plain("dashboard"));
        transport.pin_chat_message(-1, id).await.expect("pin");
        let pinned = transport
            .pinned_message(-1)
            .await
            .expect("read")
            .expect("pinned");
        assert_eq!(pinned.message_id, id);
        assert_eq!(pinned.text, "dashboard");
        transport.delete_message(-1, id).await.expect("delete");
        assert!(transport.pinned_message(-1).await.expect("read").is_none());
    }
}
