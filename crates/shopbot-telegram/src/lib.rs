//! Telegram Bot API plumbing for the storefront bot.
//!
//! The engine talks to the chat platform only through [`MessengerTransport`].
//! [`TelegramBotClient`] implements it over HTTPS; [`InMemoryTransport`] is a
//! deterministic stand-in that records every call. Inbound updates are
//! normalised into [`InboundInteraction`] values by [`parse_update`].

pub mod telegram_client;
pub mod telegram_error;
pub mod telegram_memory;
pub mod telegram_transport;
pub mod telegram_types;
pub mod telegram_updates;

pub use telegram_client::{TelegramBotClient, TelegramClientConfig};
pub use telegram_error::TelegramDeliveryError;
pub use telegram_memory::{InMemoryTransport, TransportCall};
pub use telegram_transport::{MessengerTransport, TransportResult};
pub use telegram_types::{
    escape_html, visible_text, InlineButton, InlineKeyboard, OutboundMessage, ParseMode,
    RemoteMessage, MESSAGE_TEXT_LIMIT,
};
pub use telegram_updates::{
    parse_update, InboundInteraction, InteractionKind, TelegramUpdatePoller,
};
