use async_trait::async_trait;

use crate::telegram_error::TelegramDeliveryError;
use crate::telegram_types::{OutboundMessage, RemoteMessage};

pub type TransportResult<T> = Result<T, TelegramDeliveryError>;

#[async_trait]
/// Outbound operations the engine needs from the chat platform.
///
/// Chat and message ids are the platform's numeric ids.
pub trait MessengerTransport: Send + Sync {
    /// Sends a message and returns its message id.
    async fn send_message(&self, chat_id: i64, message: &OutboundMessage)
        -> TransportResult<i64>;

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        message: &OutboundMessage,
    ) -> TransportResult<()>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> TransportResult<()>;

    /// Pins silently.
    async fn pin_chat_message(&self, chat_id: i64, message_id: i64) -> TransportResult<()>;

    async fn pinned_message(&self, chat_id: i64) -> TransportResult<Option<RemoteMessage>>;

    /// Reads back the visible text of an existing message.
    async fn fetch_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> TransportResult<Option<String>>;

    async fn answer_callback(&self, callback_id: &str) -> TransportResult<()>;

    /// Sends a photo by file id or URL with content protection enabled.
    async fn send_photo(&self, chat_id: i64, photo: &str) -> TransportResult<i64>;
}
